//! Audio decoding through an FFmpeg codec context

use ffmpeg_next as ffmpeg;

use crate::audio::{AudioSpec, ChannelLayout};
use crate::capability::{Decoded, Decoder, EncodedUnit, Frame};
use crate::error::{FfmpegError, Result, TranscodeError};

use super::helpers::{audio_frame_from_ffmpeg, sample_format_from_ffmpeg};

pub struct FfmpegAudioDecoder {
    decoder: ffmpeg::decoder::Audio,
    stream_index: usize,
}

impl FfmpegAudioDecoder {
    /// Open a decoder from the stream's own codec parameters.
    pub fn open(stream: &ffmpeg::format::stream::Stream) -> Result<Self> {
        let stream_index = stream.index();
        let context =
            ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
                FfmpegError::DecoderNotFound(format!(
                    "codec context for stream {}: {}",
                    stream_index, e
                ))
            })?;
        let decoder = context.decoder().audio().map_err(|e| {
            FfmpegError::DecoderNotFound(format!(
                "audio decoder for stream {}: {}",
                stream_index, e
            ))
        })?;
        Ok(Self {
            decoder,
            stream_index,
        })
    }

    /// What decoded frames look like.
    pub fn spec(&self) -> Result<AudioSpec> {
        let format = sample_format_from_ffmpeg(self.decoder.format())?;
        Ok(AudioSpec::new(
            self.decoder.rate(),
            format,
            ChannelLayout::default_for(self.decoder.channels()),
        ))
    }

    fn failed(&self, what: &str, e: ffmpeg::Error) -> TranscodeError {
        TranscodeError::Decoder {
            stream: self.stream_index,
            message: format!("{}: {}", what, e),
        }
    }
}

impl Decoder for FfmpegAudioDecoder {
    fn send_packet(&mut self, packet: Option<&EncodedUnit>) -> Result<()> {
        let result = match packet {
            Some(unit) => {
                let mut p = ffmpeg::Packet::copy(&unit.data);
                p.set_pts(Some(unit.pts));
                p.set_dts(Some(unit.dts));
                p.set_duration(unit.duration);
                self.decoder.send_packet(&p)
            }
            None => self.decoder.send_eof(),
        };
        match result {
            Ok(()) => Ok(()),
            // pre-roll packets some decoders refuse; skip them
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(stream = self.stream_index, "decoder: skipping invalid packet");
                Ok(())
            }
            Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(self.failed("send_packet", e)),
        }
    }

    fn receive_frame(&mut self) -> Result<Decoded<Frame>> {
        let mut frame = ffmpeg::frame::Audio::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Decoded::Frame(Frame::Audio(audio_frame_from_ffmpeg(&frame)?))),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                Ok(Decoded::NeedMoreInput)
            }
            Err(ffmpeg::Error::Eof) => Ok(Decoded::EndOfStream),
            Err(e) => Err(self.failed("receive_frame", e)),
        }
    }
}
