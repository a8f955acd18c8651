use thiserror::Error;

use transcode_lib::{SessionReport, TranscodeError};

/// Error type of the transcoder binary
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    /// The session ran and finalized its output but did not succeed
    #[error("{source}")]
    Session {
        report: Box<SessionReport>,
        source: TranscodeError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} requires the ffmpeg feature")]
    FeatureDisabled(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
