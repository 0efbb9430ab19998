// Library interface for integration tests and the demo binary

pub mod audio_system;
pub mod config;
pub mod error;
pub mod game;
pub mod messaging;
