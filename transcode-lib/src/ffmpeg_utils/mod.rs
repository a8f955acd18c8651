//! FFmpeg backend: demuxer, audio decoder and encoder, and a container writer
//! implementing the capability traits.

pub mod decoder;
pub mod demux;
pub mod encoder;
pub mod helpers;
pub mod writer;

pub use decoder::FfmpegAudioDecoder;
pub use demux::FfmpegDemuxer;
pub use encoder::{AudioEncoderSettings, FfmpegAudioEncoder};
pub use ffmpeg_next as ffmpeg;
pub use writer::FfmpegWriter;

use std::path::Path;

use crate::audio::AudioSpec;
use crate::capability::DecodingSource;
use crate::error::{FfmpegError, Result};

/// Initialize the FFmpeg library. Call once at startup.
pub fn init() -> std::result::Result<(), FfmpegError> {
    ffmpeg::init()
        .map_err(|e| FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e)))?;
    tracing::info!("FFmpeg initialized");
    Ok(())
}

/// Decoded audio of the best audio stream of a file
pub type FfmpegAudioSource = DecodingSource<FfmpegDemuxer, FfmpegAudioDecoder>;

/// Open `path` as a frame source, returning what its frames look like.
pub fn open_audio_source<P: AsRef<Path>>(path: P) -> Result<(FfmpegAudioSource, AudioSpec)> {
    let demuxer = FfmpegDemuxer::open_audio(path)?;
    let decoder = demuxer.audio_decoder()?;
    let spec = decoder.spec()?;
    Ok((DecodingSource::new(demuxer, decoder), spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn test_backend_types_move_to_lane_threads() {
        assert_send::<FfmpegDemuxer>();
        assert_send::<FfmpegAudioDecoder>();
        assert_send::<FfmpegAudioEncoder>();
        assert_send::<FfmpegAudioSource>();
    }
}
