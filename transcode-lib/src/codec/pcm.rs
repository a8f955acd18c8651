//! Uncompressed PCM audio encoder

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::VecDeque;

use crate::audio::{AudioSpec, SampleType};
use crate::capability::{Encoded, EncodedUnit, Encoder, Frame, HeaderMode};
use crate::error::{Result, TranscodeError};
use crate::types::Rational;

/// Encodes audio frames into interleaved little-endian PCM, one unit per frame.
pub struct PcmEncoder {
    spec: AudioSpec,
    frame_size: usize,
    codec: &'static str,
    queue: VecDeque<EncodedUnit>,
    short_frame_seen: bool,
    eof: bool,
}

fn codec_name(ty: SampleType) -> &'static str {
    match ty {
        SampleType::U8 => "pcm_u8",
        SampleType::S16 => "pcm_s16le",
        SampleType::S32 => "pcm_s32le",
        SampleType::F32 => "pcm_f32le",
        SampleType::F64 => "pcm_f64le",
    }
}

impl PcmEncoder {
    /// Accept frames in `spec` of at most `frame_size` samples.
    pub fn new(spec: AudioSpec, frame_size: usize) -> Result<Self> {
        spec.validate("pcm encoder")?;
        if frame_size == 0 {
            return Err(TranscodeError::config("pcm encoder frame size is zero"));
        }
        Ok(Self {
            spec,
            frame_size,
            codec: codec_name(spec.format.sample),
            queue: VecDeque::new(),
            short_frame_seen: false,
            eof: false,
        })
    }

    fn rejected(&self, message: String) -> TranscodeError {
        TranscodeError::Encoder {
            stream: 0,
            message: format!("{}: {}", self.codec, message),
        }
    }
}

impl Encoder for PcmEncoder {
    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<()> {
        if self.eof {
            return Err(self.rejected("frame sent after end of stream".to_string()));
        }
        let audio = match frame {
            None => {
                self.eof = true;
                return Ok(());
            }
            Some(Frame::Audio(audio)) => audio,
            Some(Frame::Video(_)) => return Err(self.rejected("video frame".to_string())),
        };
        if audio.spec() != self.spec {
            return Err(self.rejected(format!("expected {}, got {}", self.spec, audio.spec())));
        }
        let frames = audio.frames();
        if frames > self.frame_size {
            return Err(self.rejected(format!(
                "frame of {} samples exceeds frame size {}",
                frames, self.frame_size
            )));
        }
        if self.short_frame_seen {
            return Err(self.rejected("only the last frame may be short".to_string()));
        }
        self.short_frame_seen = frames < self.frame_size;

        let samples = &audio.samples;
        let channels = samples.channels();
        let mut data =
            BytesMut::with_capacity(frames * channels * self.spec.format.bytes_per_sample());
        for i in 0..frames {
            for ch in 0..channels {
                let raw = samples.sample_bytes(ch, i);
                if cfg!(target_endian = "big") {
                    raw.iter().rev().for_each(|&b| data.put_u8(b));
                } else {
                    data.put_slice(raw);
                }
            }
        }
        self.queue
            .push_back(EncodedUnit::new(0, audio.pts, frames as i64, data.freeze()));
        Ok(())
    }

    fn receive_unit(&mut self) -> Result<Encoded> {
        Ok(match self.queue.pop_front() {
            Some(unit) => Encoded::Unit(unit),
            None if self.eof => Encoded::EndOfStream,
            None => Encoded::Buffered,
        })
    }

    fn header_mode(&self) -> HeaderMode {
        HeaderMode::PerFrame
    }

    fn global_header(&self) -> Option<Bytes> {
        None
    }

    fn time_base(&self) -> Rational {
        Rational::new(1, self.spec.rate as i32)
    }

    fn frame_size(&self) -> Option<usize> {
        Some(self.frame_size)
    }

    fn codec_name(&self) -> &str {
        self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ChannelLayout, SampleBuffer, SampleFormat};
    use crate::capability::AudioFrame;

    fn frame(spec: AudioSpec, frames: usize, pts: i64) -> Frame {
        Frame::Audio(AudioFrame {
            samples: SampleBuffer::from_fn(spec.format, spec.channels(), frames, |ch, i| {
                (ch as f64 * 1000.0 + i as f64) / 32768.0
            }),
            rate: spec.rate,
            layout: spec.layout,
            pts,
        })
    }

    #[test]
    fn test_interleaved_little_endian() {
        let spec = AudioSpec::new(8000, SampleFormat::S16P, ChannelLayout::STEREO);
        let mut enc = PcmEncoder::new(spec, 4).unwrap();
        assert_eq!(enc.codec_name(), "pcm_s16le");
        assert_eq!(enc.receive_unit().unwrap(), Encoded::Buffered);
        enc.send_frame(Some(&frame(spec, 4, 8))).unwrap();
        let Encoded::Unit(unit) = enc.receive_unit().unwrap() else {
            panic!("expected a unit");
        };
        assert_eq!(unit.pts, 8);
        assert_eq!(unit.duration, 4);
        assert_eq!(unit.data.len(), 16);
        // frame 1: left = 1, right = 1001
        assert_eq!(&unit.data[4..8], &[1, 0, 0xe9, 0x03]);
    }

    #[test]
    fn test_short_frame_only_at_end() {
        let spec = AudioSpec::new(8000, SampleFormat::S16, ChannelLayout::MONO);
        let mut enc = PcmEncoder::new(spec, 4).unwrap();
        enc.send_frame(Some(&frame(spec, 2, 0))).unwrap();
        assert!(enc.send_frame(Some(&frame(spec, 4, 2))).is_err());
    }

    #[test]
    fn test_drain() {
        let spec = AudioSpec::new(8000, SampleFormat::S16, ChannelLayout::MONO);
        let mut enc = PcmEncoder::new(spec, 4).unwrap();
        enc.send_frame(Some(&frame(spec, 4, 0))).unwrap();
        enc.send_frame(None).unwrap();
        assert!(matches!(enc.receive_unit().unwrap(), Encoded::Unit(_)));
        assert_eq!(enc.receive_unit().unwrap(), Encoded::EndOfStream);
        assert!(enc.send_frame(Some(&frame(spec, 4, 4))).is_err());
    }

    #[test]
    fn test_rejects_wrong_format() {
        let spec = AudioSpec::new(8000, SampleFormat::S16, ChannelLayout::MONO);
        let other = AudioSpec::new(8000, SampleFormat::FLT, ChannelLayout::MONO);
        let mut enc = PcmEncoder::new(spec, 4).unwrap();
        assert!(matches!(
            enc.send_frame(Some(&frame(other, 4, 0))),
            Err(TranscodeError::Encoder { .. })
        ));
    }
}
