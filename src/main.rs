//! Transcoder
//!
//! Loads a TOML configuration (first argument, `transcoder.toml` by default),
//! builds one transcoding session from it and runs it to completion.

mod config;
mod config_file;
mod error;
mod pipeline;

use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transcode_lib::SessionReport;

use crate::config::LoggingConfig;
use crate::error::AppError;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "transcoder";

const DEFAULT_CONFIG: &str = "transcoder.toml";

fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let (config, warning) = config_file::load_or_default(&config_path);

    init_logging(&config.logging);
    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    if let Some(warning) = warning {
        tracing::warn!("{}", warning);
    }
    tracing::debug!(?config, "configuration loaded");

    #[cfg(feature = "ffmpeg")]
    if let Err(e) = transcode_lib::ffmpeg_utils::init() {
        tracing::error!(error = %e, "FFmpeg initialization failed");
        return ExitCode::FAILURE;
    }

    match pipeline::run(&config) {
        Ok(report) => {
            log_streams(&report);
            tracing::info!(
                units = report.units_written(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                output = ?config.output.path,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let AppError::Session { report, .. } = &e {
                log_streams(report);
                for (stream, message) in &report.failures {
                    tracing::warn!(stream, error = %message, "stream failed");
                }
            }
            tracing::error!(error = %e, "transcoding failed");
            ExitCode::FAILURE
        }
    }
}

fn log_streams(report: &SessionReport) {
    for stream in &report.streams {
        tracing::info!(
            stream = stream.stream,
            units = stream.units,
            last_pts = ?stream.last_pts,
            clamps = stream.clamps,
            state = %stream.state,
            "stream finished"
        );
    }
}

/// Initialize logging with tracing. `RUST_LOG` overrides the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
