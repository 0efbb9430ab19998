/// Messaging module for the game/audio bridge
///
/// The game publishes **events** (things that happened, past tense) on the
/// bus; the audio director subscribes and turns them into audio calls.
///
/// ## Architecture
///
/// ```text
/// ┌─────────┐     GameEvent     ┌─────────────┐    GameEvent    ┌───────────────┐
/// │ Session │ ────────────────> │  Event Bus  │ ──────────────> │ AudioDirector │
/// │ (game)  │                   │             │                 │    (thread)   │
/// └─────────┘                   └─────────────┘                 └───────────────┘
///                                                                       │
///                                                                       │ block_on
///                                                                       ▼
///                                                                ┌──────────────┐
///                                                                │ AudioManager │
///                                                                └──────────────┘
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// let bus = EventBus::new();
/// let director = AudioDirector::new(audio).spawn(&bus, Handle::current())?;
///
/// bus.publish(GameEvent::TitleEntered);
/// bus.publish(GameEvent::StartRequested);
/// // ...
/// bus.publish(GameEvent::Shutdown);
/// director.join().ok();
/// ```

pub mod bus;
pub mod director;
pub mod events;

// Re-export commonly used types
pub use bus::{EventBus, SubscriberId};
pub use director::AudioDirector;
pub use events::GameEvent;
