/// Sound registry
///
/// Maps logical sound keys to asset URLs and holds the background playlist.
use std::collections::BTreeMap;
use std::fmt;

use crate::error::AudioError;

/// Logical sound keys the game asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundKey {
    /// Title screen loop
    Title,

    /// Game-over sting
    GameOver,

    /// Level-up sting
    LevelUp,

    /// Dial-up tone between title and game
    Modem,
}

impl fmt::Display for SoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for SoundKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl SoundKey {
    /// Registry name of this key
    pub fn as_str(&self) -> &'static str {
        match self {
            SoundKey::Title => "title",
            SoundKey::GameOver => "gameOver",
            SoundKey::LevelUp => "levelUp",
            SoundKey::Modem => "modem",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "title" => Some(SoundKey::Title),
            "gameOver" => Some(SoundKey::GameOver),
            "levelUp" => Some(SoundKey::LevelUp),
            "modem" => Some(SoundKey::Modem),
            _ => None,
        }
    }

    /// Protected effects play to completion; music stops never cut them off
    pub fn is_protected(&self) -> bool {
        match self {
            SoundKey::GameOver => true,
            SoundKey::LevelUp => true,
            SoundKey::Title => false,
            SoundKey::Modem => false,
        }
    }
}

/// Fixed key-to-URL mapping plus the background playlist
#[derive(Debug, Clone)]
pub struct SoundRegistry {
    effects: BTreeMap<String, String>,
    playlist: Vec<String>,
}

impl SoundRegistry {
    pub fn new(effects: BTreeMap<String, String>, playlist: Vec<String>) -> Self {
        Self { effects, playlist }
    }

    /// Resolve an effect key to its asset URL
    pub fn effect_url(&self, key: &str) -> Result<&str, AudioError> {
        self.effects
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| AudioError::UnknownSound(key.to_string()))
    }

    pub fn playlist(&self) -> &[String] {
        &self.playlist
    }
}
