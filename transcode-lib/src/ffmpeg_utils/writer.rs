//! Container output through an FFmpeg muxer

use ffmpeg_next as ffmpeg;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::capability::{ContainerWriter, EncodedUnit, StreamDescriptor};
use crate::error::{FfmpegError, Result, TranscodeError};
use crate::types::Rational;

use super::helpers::{rational_to_ffmpeg, stream_reset_codec_tag};

/// Output stream of the muxer and the time base units arrive in
struct MappedStream {
    index: usize,
    unit_tb: Rational,
}

/// Writes units into a file whose container is picked from its extension.
///
/// Codec parameters are not derivable from a [`StreamDescriptor`], so every
/// stream must be registered with [`add_parameters`](Self::add_parameters)
/// before the header is written.
pub struct FfmpegWriter {
    output: ffmpeg::format::context::Output,
    path: PathBuf,
    parameters: HashMap<usize, ffmpeg::codec::Parameters>,
    streams: HashMap<usize, MappedStream>,
    header_written: bool,
}

impl FfmpegWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let output = ffmpeg::format::output(&path).map_err(|e| {
            FfmpegError::MuxerCreate(format!("failed to create {:?}: {}", path, e))
        })?;
        Ok(Self {
            output,
            path,
            parameters: HashMap::new(),
            streams: HashMap::new(),
            header_written: false,
        })
    }

    /// Codec parameters of output stream `stream`.
    pub fn add_parameters(&mut self, stream: usize, parameters: ffmpeg::codec::Parameters) {
        self.parameters.insert(stream, parameters);
    }
}

impl ContainerWriter for FfmpegWriter {
    fn write_header(&mut self, streams: &[StreamDescriptor]) -> Result<()> {
        if self.header_written {
            return Err(TranscodeError::Writer("header already written".to_string()));
        }
        for descriptor in streams {
            let parameters = self.parameters.remove(&descriptor.index).ok_or_else(|| {
                FfmpegError::StreamConfig(format!(
                    "no codec parameters registered for stream {}",
                    descriptor.index
                ))
            })?;
            let mut out_stream = self
                .output
                .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
                .map_err(|e| {
                    FfmpegError::StreamConfig(format!(
                        "failed to add stream {}: {}",
                        descriptor.index, e
                    ))
                })?;
            out_stream.set_parameters(parameters);
            stream_reset_codec_tag(&mut out_stream);
            out_stream.set_time_base(rational_to_ffmpeg(descriptor.time_base));
            self.streams.insert(
                descriptor.index,
                MappedStream {
                    index: out_stream.index(),
                    unit_tb: descriptor.time_base,
                },
            );
        }
        self.output
            .write_header()
            .map_err(|e| TranscodeError::Writer(format!("{:?}: header: {}", self.path, e)))?;
        self.header_written = true;
        tracing::debug!(path = ?self.path, streams = streams.len(), "ffmpeg writer: header written");
        Ok(())
    }

    fn write_unit(&mut self, stream: usize, unit: &EncodedUnit) -> Result<()> {
        let mapped = self
            .streams
            .get(&stream)
            .ok_or_else(|| TranscodeError::Writer(format!("unknown stream {}", stream)))?;
        let out_tb = self
            .output
            .stream(mapped.index)
            .map(|s| s.time_base())
            .ok_or_else(|| TranscodeError::Writer(format!("missing output stream {}", stream)))?;

        let mut packet = ffmpeg::Packet::copy(&unit.data);
        packet.set_pts(Some(unit.pts));
        packet.set_dts(Some(unit.dts));
        packet.set_duration(unit.duration);
        packet.set_stream(mapped.index);
        if unit.keyframe {
            packet.set_flags(ffmpeg::codec::packet::Flags::KEY);
        }
        packet.rescale_ts(rational_to_ffmpeg(mapped.unit_tb), out_tb);
        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| TranscodeError::Writer(format!("stream {}: {}", stream, e)))
    }

    fn write_trailer(&mut self) -> Result<()> {
        if !self.header_written {
            return Err(TranscodeError::Writer("trailer without header".to_string()));
        }
        self.output
            .write_trailer()
            .map_err(|e| TranscodeError::Writer(format!("{:?}: trailer: {}", self.path, e)))
    }
}
