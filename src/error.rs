use thiserror::Error;

/// Library-level errors using thiserror for structured error handling.
///
/// `LoadError` is `Clone` because a single failed load is handed to every
/// caller that was waiting on the same pending fetch.

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Failed to fetch audio from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Audio fetch for {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to decode audio from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Load of {url} was abandoned before it completed")]
    Abandoned { url: String },
}

impl LoadError {
    /// URL of the asset that failed to load
    pub fn url(&self) -> &str {
        match self {
            LoadError::Fetch { url, .. }
            | LoadError::Status { url, .. }
            | LoadError::Decode { url, .. }
            | LoadError::Abandoned { url } => url,
        }
    }
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Unknown sound: {0}")]
    UnknownSound(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Failed to initialize audio output stream")]
    StreamInitFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Audio playback failed")]
    PlaybackFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine executable directory")]
    NoExecutableDir(#[source] std::io::Error),
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = AudioError::UnknownSound("levelUp".to_string());
        assert_eq!(err.to_string(), "Unknown sound: levelUp");

        let err = LoadError::Status {
            url: "/static/music/01-title.mp3".to_string(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "Audio fetch for /static/music/01-title.mp3 returned HTTP 404"
        );
    }

    #[test]
    fn test_load_error_is_transparent_in_audio_error() {
        let load = LoadError::Decode {
            url: "a.mp3".to_string(),
            reason: "no audio tracks".to_string(),
        };
        let err: AudioError = load.clone().into();
        assert_eq!(err.to_string(), load.to_string());
        assert_eq!(load.url(), "a.mp3");
    }

    #[test]
    fn test_error_source_chain() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let config_err = ConfigError::LoadFailed {
            path: "/test/config.json".to_string(),
            source: Box::new(io_err),
        };

        assert!(config_err.source().is_some());
        assert_eq!(
            config_err.to_string(),
            "Failed to load configuration from /test/config.json"
        );
    }
}
