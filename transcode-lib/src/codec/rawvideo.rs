//! Uncompressed video encoder

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

use crate::capability::{
    Encoded, EncodedUnit, Encoder, Frame, HeaderMode, PixelFormat, VideoSpec,
};
use crate::error::{Result, TranscodeError};
use crate::types::Rational;

/// Concatenates the planes of each picture into one unit. The pixel format
/// tag is published as a global header.
pub struct RawVideoEncoder {
    spec: VideoSpec,
    queue: VecDeque<EncodedUnit>,
    eof: bool,
}

fn fourcc(format: PixelFormat) -> &'static [u8; 4] {
    match format {
        PixelFormat::Yuv420p => b"I420",
        PixelFormat::Rgb24 => b"RGB\x18",
        PixelFormat::Gray8 => b"Y800",
    }
}

impl RawVideoEncoder {
    pub fn new(spec: VideoSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            spec,
            queue: VecDeque::new(),
            eof: false,
        })
    }

    fn rejected(message: String) -> TranscodeError {
        TranscodeError::Encoder {
            stream: 0,
            message: format!("rawvideo: {}", message),
        }
    }
}

impl Encoder for RawVideoEncoder {
    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<()> {
        if self.eof {
            return Err(Self::rejected("frame sent after end of stream".to_string()));
        }
        let picture = match frame {
            None => {
                self.eof = true;
                return Ok(());
            }
            Some(Frame::Video(picture)) => picture,
            Some(Frame::Audio(_)) => return Err(Self::rejected("audio frame".to_string())),
        };
        if !self.spec.matches(picture) {
            return Err(Self::rejected(format!(
                "expected {}, got {}x{} {}",
                self.spec, picture.width, picture.height, picture.format
            )));
        }
        let size = picture.planes.iter().map(Vec::len).sum();
        let mut data = BytesMut::with_capacity(size);
        for plane in &picture.planes {
            data.extend_from_slice(plane);
        }
        self.queue
            .push_back(EncodedUnit::new(0, picture.pts, 1, data.freeze()));
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
        HeaderMode::Global
    }

    fn global_header(&self) -> Option<Bytes> {
        Some(Bytes::from_static(fourcc(self.spec.format)))
    }

    fn time_base(&self) -> Rational {
        self.spec.frame_rate.invert()
    }

    fn frame_size(&self) -> Option<usize> {
        None
    }

    fn codec_name(&self) -> &str {
        "rawvideo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::VideoFrame;

    fn spec() -> VideoSpec {
        VideoSpec {
            width: 4,
            height: 2,
            format: PixelFormat::Yuv420p,
            frame_rate: Rational::new(30000, 1001),
        }
    }

    #[test]
    fn test_unit_is_concatenated_planes() {
        let mut enc = RawVideoEncoder::new(spec()).unwrap();
        assert_eq!(enc.time_base(), Rational::new(1001, 30000));
        assert_eq!(enc.global_header().as_deref(), Some(&b"I420"[..]));

        let mut picture = VideoFrame::blank(4, 2, PixelFormat::Yuv420p, 7);
        picture.planes[0].fill(16);
        enc.send_frame(Some(&Frame::Video(picture))).unwrap();
        let Encoded::Unit(unit) = enc.receive_unit().unwrap() else {
            panic!("expected a unit");
        };
        assert_eq!(unit.pts, 7);
        assert_eq!(unit.duration, 1);
        assert_eq!(unit.data.len(), 8 + 2 + 2);
        assert_eq!(&unit.data[..8], &[16; 8]);
        assert_eq!(&unit.data[8..], &[128; 4]);
    }

    #[test]
    fn test_rejects_other_geometry() {
        let mut enc = RawVideoEncoder::new(spec()).unwrap();
        let picture = VideoFrame::blank(2, 2, PixelFormat::Yuv420p, 0);
        assert!(enc.send_frame(Some(&Frame::Video(picture))).is_err());
    }

    #[test]
    fn test_zero_size_rejected() {
        let mut bad = spec();
        bad.width = 0;
        assert!(RawVideoEncoder::new(bad).is_err());
    }
}
