//! Audio encoding through an FFmpeg codec context

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;

use crate::audio::AudioSpec;
use crate::capability::{Encoded, EncodedUnit, Encoder, Frame, HeaderMode};
use crate::error::{FfmpegError, Result, TranscodeError};
use crate::types::Rational;

use super::helpers::{
    audio_frame_to_ffmpeg, channel_layout_to_ffmpeg, encoder_codec_parameters, encoder_extradata,
    sample_format_to_ffmpeg,
};

/// Frame size used when the codec accepts any size
const DEFAULT_FRAME_SIZE: usize = 1024;

/// Encoder settings
#[derive(Debug, Clone)]
pub struct AudioEncoderSettings {
    /// FFmpeg encoder name, e.g. `aac` or `libopus`
    pub codec: String,
    pub spec: AudioSpec,
    pub bit_rate: usize,
    /// Ask for out-of-band codec configuration (needed by MP4-style containers)
    pub global_header: bool,
}

pub struct FfmpegAudioEncoder {
    encoder: ffmpeg::encoder::Audio,
    name: String,
    frame_size: usize,
    time_base: Rational,
    header_mode: HeaderMode,
    extradata: Option<Bytes>,
    /// Next pts for packets the codec leaves unstamped
    pts: i64,
}

impl FfmpegAudioEncoder {
    pub fn open(settings: &AudioEncoderSettings) -> Result<Self> {
        let codec = codec::encoder::find_by_name(&settings.codec).ok_or_else(|| {
            FfmpegError::EncoderNotFound(format!(
                "{} is not in this FFmpeg build",
                settings.codec
            ))
        })?;
        let spec = settings.spec;
        spec.validate("encoder")?;

        let mut context = codec::Context::new_with_codec(codec);
        context.set_time_base(ffmpeg::Rational::new(1, spec.rate as i32));
        let mut audio = context.encoder().audio().map_err(|e| {
            FfmpegError::EncoderConfigure(format!("{}: {}", settings.codec, e))
        })?;
        audio.set_rate(spec.rate as i32);
        audio.set_format(sample_format_to_ffmpeg(spec.format));
        audio.set_channel_layout(channel_layout_to_ffmpeg(spec.channels())?);
        audio.set_bit_rate(settings.bit_rate);
        if settings.global_header {
            audio.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        let encoder = audio.open_as(codec).map_err(|e| {
            FfmpegError::EncoderConfigure(format!("failed to open {}: {}", settings.codec, e))
        })?;

        let frame_size = match encoder.frame_size() as usize {
            0 => DEFAULT_FRAME_SIZE,
            n => n,
        };
        let extradata = encoder_extradata(&encoder);
        let header_mode = if settings.global_header && extradata.is_some() {
            HeaderMode::Global
        } else {
            HeaderMode::PerFrame
        };
        tracing::debug!(
            codec = %settings.codec,
            spec = %spec,
            frame_size,
            global_header = extradata.is_some(),
            "ffmpeg encoder: opened"
        );
        Ok(Self {
            encoder,
            name: settings.codec.clone(),
            frame_size,
            time_base: Rational::new(1, spec.rate as i32),
            header_mode,
            extradata,
            pts: 0,
        })
    }

    /// Codec parameters for the output stream.
    pub fn parameters(&self) -> ffmpeg::codec::Parameters {
        encoder_codec_parameters(&self.encoder)
    }

    fn failed(&self, what: &str, e: ffmpeg::Error) -> TranscodeError {
        TranscodeError::Encoder {
            stream: 0,
            message: format!("{} {}: {}", self.name, what, e),
        }
    }
}

impl Encoder for FfmpegAudioEncoder {
    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<()> {
        let result = match frame {
            Some(Frame::Audio(audio)) => {
                let frame = audio_frame_to_ffmpeg(audio)?;
                self.encoder.send_frame(&frame)
            }
            Some(Frame::Video(_)) => {
                return Err(TranscodeError::Encoder {
                    stream: 0,
                    message: format!("{}: video frame", self.name),
                })
            }
            None => self.encoder.send_eof(),
        };
        result.map_err(|e| self.failed("send_frame", e))
    }

    fn receive_unit(&mut self) -> Result<Encoded> {
        let mut packet = ffmpeg::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => {
                let pts = packet.pts().unwrap_or(self.pts);
                let duration = match packet.duration() {
                    0 => self.frame_size as i64,
                    d => d,
                };
                self.pts = pts + duration;
                Ok(Encoded::Unit(EncodedUnit {
                    stream_index: 0,
                    pts,
                    dts: packet.dts().unwrap_or(pts),
                    duration,
                    data: Bytes::copy_from_slice(packet.data().unwrap_or(&[])),
                    keyframe: packet.is_key(),
                }))
            }
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                Ok(Encoded::Buffered)
            }
            Err(ffmpeg::Error::Eof) => Ok(Encoded::EndOfStream),
            Err(e) => Err(self.failed("receive_packet", e)),
        }
    }

    fn header_mode(&self) -> HeaderMode {
        self.header_mode
    }

    fn global_header(&self) -> Option<Bytes> {
        self.extradata.clone()
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn frame_size(&self) -> Option<usize> {
        Some(self.frame_size)
    }

    fn codec_name(&self) -> &str {
        &self.name
    }
}
