pub mod buffer;
pub mod cache;
pub mod device;
pub mod fetch;
pub mod handle;
pub mod manager;
/// Audio system module
///
/// Loads, caches and plays the game's sounds:
/// - A randomized background playlist that advances on its own
/// - Looping title music, exclusive with the background
/// - One-shot stings (level up, game over) layered over the music
/// - Mute, pause and reset that never leave two tracks sounding at once
///
/// ## Architecture
///
/// ```text
/// AudioManager
///   ├── SoundRegistry   (effect keys and playlist URLs)
///   ├── BufferCache     (fetch + decode, one load per URL in flight)
///   │     └── AssetFetcher (HTTP / directory / memory)
///   └── OutputDevice    (rodio speakers or a silent clock)
///         └── Voice ─── PlaybackHandle ─── Slot (background, title, stings)
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// use audio_system::{AudioManager, ManagerSettings, RodioDevice, HttpFetcher};
///
/// let manager = AudioManager::new(
///     Arc::new(RodioDevice::open(1.0)?),
///     Arc::new(HttpFetcher::new("http://localhost:8080")),
///     config.registry(),
///     ManagerSettings::from_config(&config),
/// );
///
/// manager.play_effect("title", true).await?;
/// manager.play_random_background();
/// manager.play_effect("gameOver", false).await?;
/// manager.reset().await;
/// ```
pub mod registry;
pub mod synth;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use buffer::SoundBuffer;
pub use cache::BufferCache;
pub use device::{OutputDevice, RodioDevice, SilentDevice, Voice, VoiceRecord};
pub use fetch::{AssetFetcher, FileFetcher, HttpFetcher, MemoryFetcher};
pub use handle::{PlaybackHandle, Slot};
pub use manager::{AudioManager, AudioStatus, ManagerSettings, MusicPhase, Scene};
pub use registry::{SoundKey, SoundRegistry};
