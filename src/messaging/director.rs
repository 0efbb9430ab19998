/// Audio director
///
/// Turns game events into audio manager calls. Events are applied one at a
/// time, in publish order, on a dedicated thread that drives the async
/// manager through a tokio runtime handle.
use std::ops::ControlFlow;
use std::thread;

use tokio::runtime::Handle;

use super::bus::EventBus;
use super::events::GameEvent;
use crate::audio_system::{AudioManager, PlaybackHandle, SoundKey};

pub struct AudioDirector {
    audio: AudioManager,
}

impl AudioDirector {
    pub fn new(audio: AudioManager) -> Self {
        Self { audio }
    }

    /// Subscribe to `bus` and process events until `Shutdown`
    ///
    /// The subscription is made before this returns, so nothing published
    /// afterwards is missed.
    pub fn spawn(self, bus: &EventBus, runtime: Handle) -> std::io::Result<thread::JoinHandle<()>> {
        let (events, subscription) = bus.subscribe();
        let bus = bus.clone();

        thread::Builder::new()
            .name("audio-director".to_string())
            .spawn(move || {
                tracing::info!("Audio director started");

                while let Ok(event) = events.recv() {
                    if runtime.block_on(self.apply(&event)).is_break() {
                        break;
                    }
                }

                bus.unsubscribe(subscription);
                tracing::info!("Audio director stopped");
            })
    }

    /// Apply one event; breaks on `Shutdown`
    pub async fn apply(&self, event: &GameEvent) -> ControlFlow<()> {
        tracing::debug!("Director handling: {}", event);

        match event {
            GameEvent::TitleEntered => {
                self.play(SoundKey::Title, true).await;
            }
            GameEvent::StartRequested => {
                self.audio.stop_music().await;
                // The game starts once the dial-up tone has played out
                if let Some(modem) = self.play(SoundKey::Modem, false).await {
                    modem.finished().await;
                }
                self.audio.play_random_background();
            }
            GameEvent::LinesCleared { .. } => {}
            GameEvent::LevelUp { .. } => {
                self.play(SoundKey::LevelUp, false).await;
            }
            GameEvent::PauseChanged { paused } => {
                self.audio.set_pause(*paused).await;
            }
            GameEvent::MuteToggled => {
                self.audio.toggle_mute().await;
            }
            GameEvent::GameOver { .. } => {
                self.audio.stop_music().await;
                self.play(SoundKey::GameOver, false).await;
            }
            GameEvent::Restarted => {
                self.audio.reset().await;
                self.audio.play_random_background();
            }
            GameEvent::Exited => {
                self.audio.reset().await;
                self.play(SoundKey::Title, true).await;
            }
            GameEvent::Shutdown => {
                self.audio.stop_all_sounds().await;
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    async fn play(&self, key: SoundKey, looped: bool) -> Option<PlaybackHandle> {
        match self.audio.play_effect(key, looped).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!("Cannot play {}: {}", key, err);
                None
            }
        }
    }
}
