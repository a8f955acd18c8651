//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use transcode_lib::{ChannelLayout, ResamplerOptions, SampleFormat};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error)
    pub level: String,
    /// Emit JSON lines instead of the human readable format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Where encoded units go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// Run every lane on its own worker thread
    pub threaded: bool,
    /// Units buffered per threaded lane
    pub queue_capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("out.log"),
            threaded: false,
            queue_capacity: 8,
        }
    }
}

impl OutputConfig {
    /// Whether the output is the built-in packet log rather than an FFmpeg container.
    pub fn is_packet_log(&self) -> bool {
        self.path
            .extension()
            .map_or(true, |ext| ext.eq_ignore_ascii_case("log"))
    }
}

/// Audio input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AudioSource {
    /// Generated sine sweep
    Sweep {
        rate: u32,
        channels: u16,
        seconds: f64,
    },
    /// Best audio stream of a media file
    File(PathBuf),
}

/// Audio stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub source: AudioSource,
    pub rate: u32,
    pub format: SampleFormat,
    pub layout: ChannelLayout,
    /// `pcm` for the built-in encoder, otherwise an FFmpeg encoder name
    pub codec: String,
    pub frame_size: usize,
    pub bit_rate: usize,
    pub resampler: ResamplerOptions,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            source: AudioSource::Sweep {
                rate: 44100,
                channels: 2,
                seconds: 5.0,
            },
            rate: 48000,
            format: SampleFormat::S16,
            layout: ChannelLayout::STEREO,
            codec: "pcm".to_string(),
            frame_size: 1024,
            bit_rate: 128_000,
            resampler: ResamplerOptions::default(),
        }
    }
}

/// Test pattern video stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub frames: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 352,
            height: 288,
            frame_rate: 25,
            frames: 125,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub output: OutputConfig,
    pub audio: Option<AudioConfig>,
    pub video: Option<VideoConfig>,
}

impl AppConfig {
    /// The stock configuration: five seconds of sweep and test pattern.
    pub fn demo() -> Self {
        Self {
            audio: Some(AudioConfig::default()),
            video: Some(VideoConfig::default()),
            ..Default::default()
        }
    }
}
