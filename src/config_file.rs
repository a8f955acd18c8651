//! Configuration file support
//!
//! Loads the application configuration from a TOML file. Every section and
//! most fields are optional; missing values take the defaults of
//! [`AppConfig::demo`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use transcode_lib::{ChannelLayout, ResamplerOptions, SampleFormat};

use crate::config::{AppConfig, AudioConfig, AudioSource, LoggingConfig, OutputConfig, VideoConfig};
use crate::error::{AppError, Result};

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub logging: Option<LoggingSettings>,
    pub output: Option<OutputSettings>,
    pub audio: Option<AudioSettings>,
    pub video: Option<VideoSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    pub path: PathBuf,
    pub threaded: Option<bool>,
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Disable the audio stream
    pub enabled: Option<bool>,
    /// Media file to decode; a sine sweep is generated when absent
    pub input: Option<PathBuf>,
    /// Sweep parameters
    pub sweep_rate: Option<u32>,
    pub sweep_channels: Option<u16>,
    pub duration_secs: Option<f64>,
    /// Encoder input
    pub rate: Option<u32>,
    pub format: Option<SampleFormat>,
    pub layout: Option<ChannelLayout>,
    pub codec: Option<String>,
    pub frame_size: Option<usize>,
    pub bit_rate: Option<usize>,
    pub resampler: Option<ResamplerOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSettings {
    pub enabled: Option<bool>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<u32>,
    pub frames: Option<u64>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Convert to AppConfig, filling in defaults.
    pub fn into_app_config(self) -> Result<AppConfig> {
        let demo = AppConfig::demo();

        let logging = match self.logging {
            Some(l) => LoggingConfig {
                level: l.level,
                json: match l.format.as_deref() {
                    None | Some("pretty") => false,
                    Some("json") => true,
                    Some(other) => {
                        return Err(AppError::Config(format!("unknown log format {}", other)))
                    }
                },
            },
            None => demo.logging,
        };

        let output = match self.output {
            Some(o) => OutputConfig {
                path: o.path,
                threaded: o.threaded.unwrap_or(false),
                queue_capacity: o.queue_capacity.unwrap_or(demo.output.queue_capacity),
            },
            None => demo.output,
        };

        let audio = match self.audio {
            Some(a) if a.enabled == Some(false) => None,
            Some(a) => {
                let d = AudioConfig::default();
                let source = match a.input {
                    Some(path) => AudioSource::File(path),
                    None => AudioSource::Sweep {
                        rate: a.sweep_rate.unwrap_or(44100),
                        channels: a.sweep_channels.unwrap_or(2),
                        seconds: a.duration_secs.unwrap_or(5.0),
                    },
                };
                Some(AudioConfig {
                    source,
                    rate: a.rate.unwrap_or(d.rate),
                    format: a.format.unwrap_or(d.format),
                    layout: a.layout.unwrap_or(d.layout),
                    codec: a.codec.unwrap_or(d.codec),
                    frame_size: a.frame_size.unwrap_or(d.frame_size),
                    bit_rate: a.bit_rate.unwrap_or(d.bit_rate),
                    resampler: a.resampler.unwrap_or_default(),
                })
            }
            None => demo.audio,
        };

        let video = match self.video {
            Some(v) if v.enabled == Some(false) => None,
            Some(v) => {
                let d = VideoConfig::default();
                Some(VideoConfig {
                    width: v.width.unwrap_or(d.width),
                    height: v.height.unwrap_or(d.height),
                    frame_rate: v.frame_rate.unwrap_or(d.frame_rate),
                    frames: v.frames.unwrap_or(d.frames),
                })
            }
            None => demo.video,
        };

        if audio.is_none() && video.is_none() {
            return Err(AppError::Config("both audio and video are disabled".to_string()));
        }
        if let Some(a) = &audio {
            a.resampler.validate()?;
        }
        Ok(AppConfig {
            logging,
            output,
            audio,
            video,
        })
    }
}

/// Load `path`, falling back to the demo configuration when the file is
/// missing or invalid. The warning is returned rather than logged because
/// logging is configured from the result.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> (AppConfig, Option<String>) {
    let path = path.as_ref();
    if !path.exists() {
        return (
            AppConfig::demo(),
            Some(format!("config file {:?} not found, using defaults", path)),
        );
    }
    match ConfigFile::from_file(path).and_then(ConfigFile::into_app_config) {
        Ok(config) => (config, None),
        Err(e) => (
            AppConfig::demo(),
            Some(format!("failed to load config file {:?}: {}. Using defaults.", path, e)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use transcode_lib::DitherMethod;

    #[test]
    fn test_empty_file_gives_demo_config() {
        let config = ConfigFile::default().into_app_config().unwrap();
        assert_eq!(config, AppConfig::demo());
    }

    #[test]
    fn test_partial_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[logging]
level = "debug"
format = "json"

[output]
path = "session.log"
threaded = true

[audio]
sweep_rate = 22050
format = "fltp"
layout = "mono"

[audio.resampler]
dither_method = "triangular"

[video]
enabled = false
"#
        )
        .unwrap();

        let config = ConfigFile::from_file(file.path())
            .unwrap()
            .into_app_config()
            .unwrap();
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "debug");
        assert!(config.output.threaded);
        assert_eq!(config.output.queue_capacity, 8);
        assert!(config.video.is_none());
        let audio = config.audio.unwrap();
        assert_eq!(audio.format, SampleFormat::FLTP);
        assert_eq!(audio.layout, ChannelLayout::MONO);
        assert_eq!(audio.resampler.dither_method, DitherMethod::Triangular);
        assert!(matches!(audio.source, AudioSource::Sweep { rate: 22050, .. }));
    }

    #[test]
    fn test_invalid_file_falls_back_with_warning() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[audio]\nformat = \"s24\"\n").unwrap();
        let (config, warning) = load_or_default(file.path());
        assert_eq!(config, AppConfig::demo());
        assert!(warning.unwrap().contains("Using defaults"));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let (config, warning) = load_or_default("/nonexistent/transcoder.toml");
        assert_eq!(config, AppConfig::demo());
        assert!(warning.is_some());
    }

    #[test]
    fn test_everything_disabled_is_rejected() {
        let file = ConfigFile {
            audio: Some(AudioSettings {
                enabled: Some(false),
                input: None,
                sweep_rate: None,
                sweep_channels: None,
                duration_secs: None,
                rate: None,
                format: None,
                layout: None,
                codec: None,
                frame_size: None,
                bit_rate: None,
                resampler: None,
            }),
            video: Some(VideoSettings {
                enabled: Some(false),
                width: None,
                height: None,
                frame_rate: None,
                frames: None,
            }),
            ..Default::default()
        };
        assert!(matches!(file.into_app_config(), Err(AppError::Config(_))));
    }
}
