//! Audio lane: source -> resampler -> re-chunking -> encoder

use tracing::debug;

use crate::audio::{AudioSpec, SampleBuffer};
use crate::capability::{
    AudioFrame, Encoder, Frame, FrameSource, HeaderMode, StreamDescriptor, StreamParams,
};
use crate::error::{Result, TranscodeError};
use crate::resample::{Resampler, ResamplerOptions};
use crate::types::{rescale_rnd, rescale_ts, MediaKind, Rational};

use super::{EncoderStage, Lane, LaneState, Pump};

/// Frames requested per flush call while draining the resampler
const FLUSH_CHUNK: usize = 4096;

pub struct AudioLane {
    stage: EncoderStage,
    feed: AudioFeed,
}

/// Everything upstream of the encoder
struct AudioFeed {
    stream: usize,
    encoder_tb: Rational,
    source: Box<dyn FrameSource>,
    resampler: Resampler,
    frame_size: Option<usize>,
    /// Converted samples waiting to be grouped into encoder frames
    fifo: SampleBuffer,
    scratch: SampleBuffer,
    /// Output sample index of the first frame in `fifo`
    fifo_pts: Option<i64>,
    source_done: bool,
}

impl AudioLane {
    /// Build a lane converting `input` (what the source delivers) into
    /// `output` (what the encoder accepts).
    pub fn new(
        stream: usize,
        source: Box<dyn FrameSource>,
        input: AudioSpec,
        output: AudioSpec,
        options: ResamplerOptions,
        encoder: Box<dyn Encoder>,
    ) -> Result<Self> {
        let resampler = Resampler::new(input, output, options)?;
        let frame_size = encoder.frame_size().filter(|&n| n > 0);
        debug!(
            stream,
            input = %input,
            output = %output,
            codec = encoder.codec_name(),
            frame_size = ?frame_size,
            passthrough = resampler.is_passthrough(),
            "audio lane: configured"
        );
        let channels = output.channels();
        let encoder_tb = encoder.time_base();
        Ok(Self {
            stage: EncoderStage::new(stream, MediaKind::Audio, encoder)?,
            feed: AudioFeed {
                stream,
                encoder_tb,
                source,
                resampler,
                frame_size,
                fifo: SampleBuffer::new(output.format, channels, frame_size.unwrap_or(0)),
                scratch: SampleBuffer::new(output.format, channels, 0),
                fifo_pts: None,
                source_done: false,
            },
        })
    }

    pub fn resampler(&self) -> &Resampler {
        &self.feed.resampler
    }

    /// Access to the resampler for compensation and corrections.
    pub fn resampler_mut(&mut self) -> &mut Resampler {
        &mut self.feed.resampler
    }
}

impl AudioFeed {
    fn output_spec(&self) -> AudioSpec {
        *self.resampler.output_spec()
    }

    /// Next frame ready for the encoder, or `None` once everything was handed over.
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.take_chunk()? {
                return Ok(Some(frame));
            }
            if self.source_done {
                return Ok(None);
            }
            match self.source.next_frame()? {
                Some(Frame::Audio(frame)) => self.convert(&frame)?,
                Some(Frame::Video(_)) => {
                    return Err(TranscodeError::Decoder {
                        stream: self.stream,
                        message: "video frame delivered to an audio lane".to_string(),
                    })
                }
                None => {
                    self.drain_resampler()?;
                    self.source_done = true;
                }
            }
        }
    }

    fn convert(&mut self, frame: &AudioFrame) -> Result<()> {
        let spec = frame.spec();
        if spec != *self.resampler.input_spec() {
            return Err(TranscodeError::Decoder {
                stream: self.stream,
                message: format!(
                    "source format changed from {} to {}",
                    self.resampler.input_spec(),
                    spec
                ),
            });
        }
        let in_rate = spec.rate as i64;
        let out_rate = self.output_spec().rate as i64;
        let tb = self.source.time_base();
        let in_pts = rescale_rnd(frame.pts, tb.num as i64 * in_rate * out_rate, tb.den as i64);
        let out_pts = self.resampler.next_output_timestamp(Some(in_pts));
        if self.fifo_pts.is_none() {
            self.fifo_pts = Some(out_pts.div_euclid(in_rate));
        }

        let capacity = self.resampler.output_frames_for(frame.frames());
        let produced = self.resampler.convert(
            Some(&frame.samples),
            frame.frames(),
            &mut self.scratch,
            capacity,
        )?;
        self.fifo.append(&self.scratch, produced)
    }

    fn drain_resampler(&mut self) -> Result<()> {
        let mut total = 0;
        loop {
            let capacity = self.resampler.output_frames_for(0).max(FLUSH_CHUNK);
            let produced = self.resampler.flush(&mut self.scratch, capacity)?;
            if produced == 0 {
                break;
            }
            self.fifo.append(&self.scratch, produced)?;
            total += produced;
        }
        debug!(stream = self.stream, flushed = total, "audio lane: resampler drained");
        Ok(())
    }

    /// Cut the next encoder frame from the fifo. Only the final frame may be short.
    fn take_chunk(&mut self) -> Result<Option<Frame>> {
        let available = self.fifo.frames();
        let n = match self.frame_size {
            Some(size) if available >= size => size,
            _ if available > 0 && (self.source_done || self.frame_size.is_none()) => available,
            _ => return Ok(None),
        };
        let output = self.output_spec();
        let mut samples = SampleBuffer::new(output.format, output.channels(), n);
        samples.copy_frames_from(&self.fifo, 0, 0, n)?;
        samples.set_frames(n)?;
        self.fifo.discard_front(n);

        let start = self.fifo_pts.unwrap_or(0);
        self.fifo_pts = Some(start + n as i64);
        let pts = rescale_ts(start, Rational::new(1, output.rate as i32), self.encoder_tb);
        Ok(Some(Frame::Audio(AudioFrame {
            samples,
            rate: output.rate,
            layout: output.layout,
            pts,
        })))
    }
}

impl Lane for AudioLane {
    fn stream_index(&self) -> usize {
        self.stage.stream()
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn time_base(&self) -> Rational {
        self.stage.encoder().time_base()
    }

    fn descriptor(&self) -> StreamDescriptor {
        let encoder = self.stage.encoder();
        let output = self.feed.output_spec();
        StreamDescriptor {
            index: self.stage.stream(),
            kind: MediaKind::Audio,
            codec: encoder.codec_name().to_string(),
            time_base: encoder.time_base(),
            global_header: match encoder.header_mode() {
                HeaderMode::Global => encoder.global_header(),
                HeaderMode::PerFrame => None,
            },
            params: StreamParams::Audio {
                rate: output.rate,
                channels: output.channels(),
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
    use crate::audio::{ChannelLayout, SampleFormat};
    use crate::codec::PcmEncoder;
    use crate::synth::SineSweepSource;

    fn drain(lane: &mut AudioLane) -> Vec<crate::capability::EncodedUnit> {
        let mut units = Vec::new();
        while let Pump::Unit(u) = lane.pump().unwrap() {
            units.push(u);
        }
        units
    }

    #[test]
    fn test_rechunks_to_encoder_frame_size() {
        // 0.5 s at 8 kHz in 300-frame source frames, encoded in 1024-frame units
        let source = SineSweepSource::new(8000, 1, 300, 0.5);
        let spec = source.spec();
        let encoder = PcmEncoder::new(spec, 1024).unwrap();
        let mut lane = AudioLane::new(
            0,
            Box::new(source),
            spec,
            spec,
            ResamplerOptions::default(),
            Box::new(encoder),
        )
        .unwrap();
        assert!(lane.resampler().is_passthrough());

        let units = drain(&mut lane);
        let durations: Vec<i64> = units.iter().map(|u| u.duration).collect();
        assert_eq!(durations, vec![1024, 1024, 1024, 928]);
        let pts: Vec<i64> = units.iter().map(|u| u.pts).collect();
        assert_eq!(pts, vec![0, 1024, 2048, 3072]);
        assert_eq!(lane.state(), LaneState::Closed);
    }

    #[test]
    fn test_rate_conversion_through_lane() {
        let source = SineSweepSource::new(44100, 2, 1024, 0.1);
        let input = source.spec();
        let output = AudioSpec::new(48000, SampleFormat::S16, ChannelLayout::STEREO);
        let encoder = PcmEncoder::new(output, 1152).unwrap();
        let mut lane = AudioLane::new(
            1,
            Box::new(source),
            input,
            output,
            ResamplerOptions::default(),
            Box::new(encoder),
        )
        .unwrap();
        let units = drain(&mut lane);
        let total: i64 = units.iter().map(|u| u.duration).sum();
        // 4410 input frames -> 4800 output frames
        assert!((total - 4800).abs() <= 1, "{}", total);
        assert!(units.iter().all(|u| u.stream_index == 1));
        assert_eq!(lane.descriptor().time_base, Rational::new(1, 48000));
    }
}
