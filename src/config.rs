use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio_system::registry::{SoundKey, SoundRegistry};
use crate::error::ConfigError;

fn default_sounds() -> BTreeMap<String, String> {
    [
        (SoundKey::Title, "/static/music/01-title.mp3"),
        (SoundKey::LevelUp, "/static/music/05-level-up.mp3"),
        (SoundKey::GameOver, "/static/music/08-game-over.mp3"),
        (SoundKey::Modem, "synth:modem"),
    ]
    .into_iter()
    .map(|(key, path)| (key.as_str().to_string(), path.to_string()))
    .collect()
}

fn default_playlist() -> Vec<String> {
    [
        "/static/music/melody/02-a-type-music-version-1_1.mp3",
        "/static/music/melody/03-b-type-music.mp3",
        "/static/music/melody/04-c-type-music.mp3",
        "/static/music/melody/06-2-player-mode-danger.mp3",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Where sound assets are fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// Base URL of an HTTP server serving the static files
    Http(String),

    /// Local directory the asset paths are resolved against
    Directory(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP base URL (`http://...`) or directory holding the `static/` tree
    pub asset_root: String,

    /// Logical effect key to asset path
    #[serde(default = "default_sounds")]
    pub sounds: BTreeMap<String, String>,

    /// Background tracks, drawn from uniformly at random
    #[serde(default = "default_playlist")]
    pub playlist: Vec<String>,

    /// Wait after stopping audio before new audio may start
    pub settle_delay_ms: u64,

    /// Wait before retrying a failed background track load
    pub retry_backoff_ms: u64,

    /// Consecutive background load failures before the rotation gives up
    pub max_load_retries: u32,

    /// Output volume (0.0-1.0)
    pub master_volume: f32,

    #[serde(default)]
    pub start_muted: bool,

    /// Fixed seed for track and piece selection (random when unset)
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            asset_root: ".".to_string(),
            sounds: default_sounds(),
            playlist: default_playlist(),
            settle_delay_ms: 150,
            retry_backoff_ms: 1000,
            max_load_retries: 5,
            master_volume: 1.0,
            start_muted: false,
            rng_seed: None,
        }
    }
}

impl Config {
    /// Load configuration from the app's config directory.
    /// Creates default config if file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, writing defaults when missing
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path).map_err(|e| ConfigError::LoadFailed {
                path: config_path.display().to_string(),
                source: Box::new(e),
            })?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: config_path.display().to_string(),
                    source: Box::new(e),
                })?;
            config.validate()?;

            tracing::info!("Loaded config from: {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            tracing::info!("Created default config at: {}", config_path.display());
            Ok(config)
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, config_path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let save_failed = |e: Box<dyn std::error::Error + Send + Sync>| ConfigError::SaveFailed {
            path: config_path.display().to_string(),
            source: e,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| save_failed(Box::new(e)))?;
        fs::write(config_path, json).map_err(|e| save_failed(Box::new(e)))?;

        Ok(())
    }

    /// Reject values the audio manager cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.playlist.is_empty() {
            return Err(ConfigError::Invalid("playlist must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.master_volume) {
            return Err(ConfigError::Invalid(format!(
                "master_volume must be within 0.0-1.0, got {}",
                self.master_volume
            )));
        }
        if self.max_load_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_load_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the config file path (in app's base directory)
    fn config_path() -> Result<PathBuf, ConfigError> {
        let exe_path = env::current_exe().map_err(ConfigError::NoExecutableDir)?;
        let exe_dir = exe_path.parent().ok_or_else(|| {
            ConfigError::NoExecutableDir(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "executable has no parent directory",
            ))
        })?;

        Ok(exe_dir.join("config").join("config.json"))
    }

    /// Get the config file path for display purposes
    pub fn config_path_display() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn asset_source(&self) -> AssetSource {
        let root = self.asset_root.trim();
        if root.starts_with("http://") || root.starts_with("https://") {
            AssetSource::Http(root.trim_end_matches('/').to_string())
        } else {
            AssetSource::Directory(PathBuf::from(root))
        }
    }

    pub fn registry(&self) -> SoundRegistry {
        SoundRegistry::new(self.sounds.clone(), self.playlist.clone())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
