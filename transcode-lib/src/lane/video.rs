//! Video lane: source -> pixel converter -> encoder

use tracing::debug;

use crate::capability::{
    Encoder, Frame, FrameSource, HeaderMode, PixelConverter, StreamDescriptor, StreamParams,
    VideoSpec,
};
use crate::error::{Result, TranscodeError};
use crate::types::{rescale_ts, MediaKind, Rational};

use super::{EncoderStage, Lane, LaneState, Pump};

pub struct VideoLane {
    stage: EncoderStage,
    feed: VideoFeed,
}

struct VideoFeed {
    stream: usize,
    output: VideoSpec,
    encoder_tb: Rational,
    source: Box<dyn FrameSource>,
    converter: Option<Box<dyn PixelConverter>>,
    frames: u64,
}

impl VideoLane {
    /// Build a lane encoding pictures in `output` format. Frames that do not
    /// already match are passed through `converter`.
    pub fn new(
        stream: usize,
        source: Box<dyn FrameSource>,
        output: VideoSpec,
        converter: Option<Box<dyn PixelConverter>>,
        encoder: Box<dyn Encoder>,
    ) -> Result<Self> {
        output.validate()?;
        debug!(
            stream,
            output = %output,
            codec = encoder.codec_name(),
            converter = converter.is_some(),
            "video lane: configured"
        );
        let encoder_tb = encoder.time_base();
        Ok(Self {
            stage: EncoderStage::new(stream, MediaKind::Video, encoder)?,
            feed: VideoFeed {
                stream,
                output,
                encoder_tb,
                source,
                converter,
                frames: 0,
            },
        })
    }
}

impl VideoFeed {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = match self.source.next_frame()? {
            Some(Frame::Video(frame)) => frame,
            Some(Frame::Audio(_)) => {
                return Err(TranscodeError::Decoder {
                    stream: self.stream,
                    message: "audio frame delivered to a video lane".to_string(),
                })
            }
            None => {
                debug!(stream = self.stream, frames = self.frames, "video lane: source ended");
                return Ok(None);
            }
        };
        frame.validate()?;

        let mut frame = match self.converter.as_mut() {
            Some(converter) if !self.output.matches(&frame) => converter.convert(frame)?,
            _ => frame,
        };
        if !self.output.matches(&frame) {
            return Err(TranscodeError::Decoder {
                stream: self.stream,
                message: format!(
                    "{}x{} {} frame does not match {}",
                    frame.width, frame.height, frame.format, self.output
                ),
            });
        }
        frame.pts = rescale_ts(frame.pts, self.source.time_base(), self.encoder_tb);
        self.frames += 1;
        Ok(Some(Frame::Video(frame)))
    }
}

impl Lane for VideoLane {
    fn stream_index(&self) -> usize {
        self.stage.stream()
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn time_base(&self) -> Rational {
        self.stage.encoder().time_base()
    }

    fn descriptor(&self) -> StreamDescriptor {
        let encoder = self.stage.encoder();
        let output = self.feed.output;
        StreamDescriptor {
            index: self.stage.stream(),
            kind: MediaKind::Video,
            codec: encoder.codec_name().to_string(),
            time_base: encoder.time_base(),
            global_header: match encoder.header_mode() {
                HeaderMode::Global => encoder.global_header(),
                HeaderMode::PerFrame => None,
            },
            params: StreamParams::Video {
                width: output.width,
                height: output.height,
                format: output.format,
                frame_rate: output.frame_rate,
            },
        }
    }

    fn state(&self) -> LaneState {
        self.stage.state()
    }

    fn pump(&mut self) -> Result<Pump> {
        let feed = &mut self.feed;
        self.stage.pump(|| feed.next_frame())
    }

    fn timestamp_clamps(&self) -> u64 {
        self.stage.clamps()
    }

    fn close(&mut self) {
        self.stage.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{PixelFormat, VideoFrame};
    use crate::codec::RawVideoEncoder;
    use crate::synth::TestPatternSource;

    /// Expands gray pictures to YUV 4:2:0 with neutral chroma.
    struct GrayToYuv;

    impl PixelConverter for GrayToYuv {
        fn convert(&mut self, frame: VideoFrame) -> Result<VideoFrame> {
            let mut out =
                VideoFrame::blank(frame.width, frame.height, PixelFormat::Yuv420p, frame.pts);
            out.planes[0].copy_from_slice(&frame.planes[0]);
            Ok(out)
        }
    }

    struct GraySource {
        left: i64,
    }

    impl FrameSource for GraySource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.left == 0 {
                return Ok(None);
            }
            self.left -= 1;
            Ok(Some(Frame::Video(VideoFrame::blank(
                4,
                4,
                PixelFormat::Gray8,
                (1 - self.left) * 40,
            ))))
        }

        fn time_base(&self) -> Rational {
            Rational::new(1, 1000)
        }
    }

    fn spec(format: PixelFormat) -> VideoSpec {
        VideoSpec {
            width: 4,
            height: 4,
            format,
            frame_rate: Rational::new(25, 1),
        }
    }

    #[test]
    fn test_pattern_lane_emits_one_unit_per_frame() {
        let source = TestPatternSource::new(TestPatternSource::DEFAULT_SPEC, 10);
        let output = source.spec();
        let encoder = RawVideoEncoder::new(output).unwrap();
        let mut lane =
            VideoLane::new(2, Box::new(source), output, None, Box::new(encoder)).unwrap();
        let mut pts = Vec::new();
        while let Pump::Unit(u) = lane.pump().unwrap() {
            assert_eq!(u.data.len(), 352 * 288 * 3 / 2);
            pts.push(u.pts);
        }
        assert_eq!(pts, (0..10).collect::<Vec<_>>());
        assert_eq!(lane.state(), LaneState::Closed);
    }

    #[test]
    fn test_converter_and_timestamp_rescale() {
        let output = spec(PixelFormat::Yuv420p);
        let encoder = RawVideoEncoder::new(output).unwrap();
        let mut lane = VideoLane::new(
            0,
            Box::new(GraySource { left: 2 }),
            output,
            Some(Box::new(GrayToYuv)),
            Box::new(encoder),
        )
        .unwrap();
        let mut pts = Vec::new();
        while let Pump::Unit(u) = lane.pump().unwrap() {
            pts.push(u.pts);
        }
        assert_eq!(pts, vec![0, 1]);
    }

    #[test]
    fn test_mismatched_frame_without_converter_fails() {
        let output = spec(PixelFormat::Yuv420p);
        let encoder = RawVideoEncoder::new(output).unwrap();
        let mut lane = VideoLane::new(
            5,
            Box::new(GraySource { left: 1 }),
            output,
            None,
            Box::new(encoder),
        )
        .unwrap();
        assert!(matches!(
            lane.pump(),
            Err(TranscodeError::Decoder { stream: 5, .. })
        ));
        assert_eq!(lane.state(), LaneState::Closed);
    }
}
