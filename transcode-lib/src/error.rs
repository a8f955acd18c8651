use thiserror::Error;

/// Main error type for the transcoding core
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// An error originating from the underlying FFmpeg library
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid format/layout combination or unsupported conversion.
    /// Always surfaced before any processing starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The resampler cannot make forward progress with the buffers it was given
    #[error("Buffer overflow: {0}")]
    BufferOverflow(String),

    /// An encoder reported a hard failure; the lane is closed
    #[error("Encoder error on stream {stream}: {message}")]
    Encoder { stream: usize, message: String },

    /// A decoder reported a hard failure; the lane is closed
    #[error("Decoder error on stream {stream}: {message}")]
    Decoder { stream: usize, message: String },

    /// The container writer rejected a header, unit or trailer
    #[error("Container writer error: {0}")]
    Writer(String),

    /// The session was cancelled before every stream finished
    #[error("Session cancelled")]
    Cancelled,

    /// One or more lanes failed; the container was still finalised
    #[error("{count} lane(s) failed: {summary}")]
    LaneFailures { count: usize, summary: String },
}

impl TranscodeError {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        TranscodeError::Configuration(msg.into())
    }

    /// Whether this error only affects the lane that raised it.
    pub fn is_lane_local(&self) -> bool {
        matches!(
            self,
            TranscodeError::Encoder { .. }
                | TranscodeError::Decoder { .. }
                | TranscodeError::BufferOverflow(_)
        )
    }
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    /// Failure during global FFmpeg initialization
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    /// Failure opening an input media file
    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    /// The requested decoder could not be found or opened
    #[error("Failed to find decoder: {0}")]
    DecoderNotFound(String),

    /// The requested encoder could not be found
    #[error("Failed to find encoder: {0}")]
    EncoderNotFound(String),

    /// Failure applying configuration parameters to an encoder
    #[error("Failed to configure encoder: {0}")]
    EncoderConfigure(String),

    /// Failure creating an output format muxer
    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    /// Failure configuring stream contexts or parameters
    #[error("Stream configuration failed: {0}")]
    StreamConfig(String),

    /// The source format has no equivalent in the transcoding core
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TranscodeError>;
