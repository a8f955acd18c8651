//! Synthetic frame sources for generating output without an input file

use std::f64::consts::PI;

use crate::audio::{AudioSpec, ChannelLayout, SampleBuffer, SampleFormat};
use crate::capability::{AudioFrame, Frame, FrameSource, PixelFormat, VideoFrame, VideoSpec};
use crate::error::Result;
use crate::types::Rational;

/// Start frequency of the sweep and its rise per second
const SWEEP_START_HZ: f64 = 110.0;
const SWEEP_RATE_HZ_PER_S: f64 = 110.0;
const SWEEP_AMPLITUDE: f64 = 0.5;

/// A sine sweep in packed S16: 110 Hz at the start, rising by 110 Hz every second.
#[derive(Debug, Clone)]
pub struct SineSweepSource {
    spec: AudioSpec,
    frame_size: usize,
    total: u64,
    produced: u64,
    phase: f64,
}

impl SineSweepSource {
    pub fn new(rate: u32, channels: u16, frame_size: usize, seconds: f64) -> Self {
        let spec = AudioSpec::new(rate, SampleFormat::S16, ChannelLayout::default_for(channels));
        Self {
            spec,
            frame_size: frame_size.max(1),
            total: (seconds.max(0.0) * rate as f64).round() as u64,
            produced: 0,
            phase: 0.0,
        }
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }
}

impl FrameSource for SineSweepSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let left = self.total - self.produced;
        if left == 0 {
            return Ok(None);
        }
        let n = (self.frame_size as u64).min(left) as usize;
        let rate = self.spec.rate as f64;
        let start = self.produced;

        let mut values = Vec::with_capacity(n);
        for i in 0..n {
            let t = (start + i as u64) as f64 / rate;
            values.push(SWEEP_AMPLITUDE * self.phase.sin());
            let freq = SWEEP_START_HZ + SWEEP_RATE_HZ_PER_S * t;
            self.phase = (self.phase + 2.0 * PI * freq / rate) % (2.0 * PI);
        }
        let samples = SampleBuffer::from_fn(self.spec.format, self.spec.channels(), n, |_, i| {
            values[i]
        });

        self.produced += n as u64;
        Ok(Some(Frame::Audio(AudioFrame {
            samples,
            rate: self.spec.rate,
            layout: self.spec.layout,
            pts: start as i64,
        })))
    }

    fn time_base(&self) -> Rational {
        Rational::new(1, self.spec.rate as i32)
    }
}

/// A moving diagonal gradient.
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    spec: VideoSpec,
    total: u64,
    produced: u64,
}

impl TestPatternSource {
    /// CIF at 25 frames per second
    pub const DEFAULT_SPEC: VideoSpec = VideoSpec {
        width: 352,
        height: 288,
        format: PixelFormat::Yuv420p,
        frame_rate: Rational::new(25, 1),
    };

    pub fn new(spec: VideoSpec, frames: u64) -> Self {
        Self {
            spec,
            total: frames,
            produced: 0,
        }
    }

    pub fn spec(&self) -> VideoSpec {
        self.spec
    }

    fn render(&self, n: u64) -> VideoFrame {
        let (w, h) = (self.spec.width as usize, self.spec.height as usize);
        let shift = (n * 2) as usize;
        let mut frame =
            VideoFrame::blank(self.spec.width, self.spec.height, self.spec.format, n as i64);
        match self.spec.format {
            PixelFormat::Yuv420p | PixelFormat::Gray8 => {
                for y in 0..h {
                    for x in 0..w {
                        frame.planes[0][y * w + x] = ((x + y + shift) & 0xff) as u8;
                    }
                }
                if self.spec.format == PixelFormat::Yuv420p {
                    let cw = w.div_ceil(2);
                    let (luma_u, v_plane) = frame.planes.split_at_mut(2);
                    for (i, (u, v)) in luma_u[1]
                        .iter_mut()
                        .zip(v_plane[0].iter_mut())
                        .enumerate()
                    {
                        let (x, y) = (i % cw, i / cw);
                        *u = ((x * 2 + shift) & 0xff) as u8;
                        *v = ((y * 2 + shift) & 0xff) as u8;
                    }
                }
            }
            PixelFormat::Rgb24 => {
                for y in 0..h {
                    for x in 0..w {
                        let o = (y * w + x) * 3;
                        frame.planes[0][o] = ((x + shift) & 0xff) as u8;
                        frame.planes[0][o + 1] = ((y + shift) & 0xff) as u8;
                        frame.planes[0][o + 2] = ((x + y) & 0xff) as u8;
                    }
                }
            }
        }
        frame
    }
}

impl FrameSource for TestPatternSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.produced == self.total {
            return Ok(None);
        }
        let frame = self.render(self.produced);
        self.produced += 1;
        Ok(Some(Frame::Video(frame)))
    }

    fn time_base(&self) -> Rational {
        self.spec.frame_rate.invert()
    }
}
