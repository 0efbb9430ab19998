/// Headless falling-block game
///
/// Board rules and scoring only; drawing and key mapping live elsewhere.
/// The session publishes `GameEvent`s that drive the audio.
pub mod autopilot;
pub mod board;
pub mod session;
pub mod tetromino;

pub use autopilot::Autopilot;
pub use board::{Board, COLS, ROWS};
pub use session::{Input, Screen, Session, LEVEL_STEP, SCORE_TABLE};
pub use tetromino::{Piece, TetrominoKind};
