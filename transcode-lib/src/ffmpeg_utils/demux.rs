//! Packet reading from a media file

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use std::path::Path;

use crate::capability::{EncodedUnit, PacketSource};
use crate::error::{FfmpegError, Result};
use crate::types::Rational;

use super::decoder::FfmpegAudioDecoder;
use super::helpers::rational_from_ffmpeg;

/// Reads the packets of one stream of an input file.
pub struct FfmpegDemuxer {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: Rational,
    packets: u64,
}

impl FfmpegDemuxer {
    /// Open `path` and select its best audio stream.
    pub fn open_audio<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let input = ffmpeg::format::input(&path).map_err(|e| {
            FfmpegError::OpenInput(format!("failed to open {:?}: {}", path, e))
        })?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Audio)
            .ok_or_else(|| FfmpegError::OpenInput(format!("{:?} has no audio stream", path)))?;
        let stream_index = stream.index();
        let time_base = rational_from_ffmpeg(stream.time_base());
        tracing::debug!(?path, stream_index, %time_base, "demuxer: opened input");
        Ok(Self {
            input,
            stream_index,
            time_base,
            packets: 0,
        })
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Open a decoder for the selected stream.
    pub fn audio_decoder(&self) -> Result<FfmpegAudioDecoder> {
        let stream = self.input.stream(self.stream_index).ok_or_else(|| {
            FfmpegError::StreamConfig(format!("stream {} disappeared", self.stream_index))
        })?;
        FfmpegAudioDecoder::open(&stream)
    }
}

impl PacketSource for FfmpegDemuxer {
    fn read_packet(&mut self) -> Result<Option<EncodedUnit>> {
        let mut packet = ffmpeg::Packet::empty();
        loop {
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    tracing::debug!(packets = self.packets, "demuxer: end of input");
                    return Ok(None);
                }
                Err(e) => {
                    return Err(FfmpegError::OpenInput(format!("read error: {}", e)).into());
                }
            }
            if packet.stream() != self.stream_index {
                continue;
            }
            self.packets += 1;
            let pts = packet.pts().or(packet.dts()).unwrap_or(0);
            return Ok(Some(EncodedUnit {
                stream_index: self.stream_index,
                pts,
                dts: packet.dts().unwrap_or(pts),
                duration: packet.duration(),
                data: Bytes::copy_from_slice(packet.data().unwrap_or(&[])),
                keyframe: packet.is_key(),
            }));
        }
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }
}
