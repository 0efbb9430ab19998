/// Event types for the game
///
/// Events represent things that have happened (past tense).
/// They are broadcast to all subscribers.
use std::fmt;

/// Game events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// The title screen is showing
    TitleEntered,

    /// The player pressed start on the title screen
    StartRequested,

    /// One or more rows were cleared
    LinesCleared { count: u32, score: u32 },

    /// Score crossed the next level threshold
    LevelUp { level: u32 },

    /// Game paused or resumed
    PauseChanged { paused: bool },

    /// The mute key was pressed
    MuteToggled,

    /// A freshly spawned piece collided with the stack
    GameOver { score: u32, level: u32 },

    /// A new game started from the game-over screen
    Restarted,

    /// Back to the title screen
    Exited,

    /// Application is shutting down
    Shutdown,
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameEvent::TitleEntered => write!(f, "title entered"),
            GameEvent::StartRequested => write!(f, "start requested"),
            GameEvent::LinesCleared { count, score } => {
                write!(f, "{} lines cleared (score {})", count, score)
            }
            GameEvent::LevelUp { level } => write!(f, "level up to {}", level),
            GameEvent::PauseChanged { paused: true } => write!(f, "paused"),
            GameEvent::PauseChanged { paused: false } => write!(f, "resumed"),
            GameEvent::MuteToggled => write!(f, "mute toggled"),
            GameEvent::GameOver { score, level } => {
                write!(f, "game over (score {}, level {})", score, level)
            }
            GameEvent::Restarted => write!(f, "restarted"),
            GameEvent::Exited => write!(f, "exited to title"),
            GameEvent::Shutdown => write!(f, "shutdown"),
        }
    }
}
