//! Shared fakes for scheduler and session tests

use bytes::Bytes;

use crate::audio::{ChannelLayout, SampleBuffer, SampleFormat};
use crate::capability::{
    AudioFrame, ContainerWriter, EncodedUnit, Frame, FrameSource, PixelFormat, StreamDescriptor,
    StreamParams,
};
use crate::error::{Result, TranscodeError};
use crate::lane::{Lane, LaneState, Pump};
use crate::types::{rescale_ts, MediaKind, Rational};

/// A lane replaying a fixed list of `(pts, duration)` units.
pub struct ScriptedLane {
    stream: usize,
    kind: MediaKind,
    time_base: Rational,
    units: Vec<(i64, i64)>,
    next: usize,
    state: LaneState,
    fail_at: Option<usize>,
    stall: bool,
    pumps: u64,
    global_header: Option<&'static [u8]>,
}

impl ScriptedLane {
    /// `count` units of `duration` ticks starting at zero.
    pub fn uniform(
        stream: usize,
        kind: MediaKind,
        time_base: Rational,
        duration: i64,
        count: usize,
    ) -> Self {
        let durations = vec![duration; count];
        Self::with_durations(stream, kind, time_base, &durations)
    }

    /// Back-to-back units with the given durations.
    pub fn with_durations(
        stream: usize,
        kind: MediaKind,
        time_base: Rational,
        durations: &[i64],
    ) -> Self {
        let mut pts = 0;
        let units = durations
            .iter()
            .map(|&d| {
                let unit = (pts, d);
                pts += d;
                unit
            })
            .collect();
        Self {
            stream,
            kind,
            time_base,
            units,
            next: 0,
            state: LaneState::Idle,
            fail_at: None,
            stall: false,
            pumps: 0,
            global_header: None,
        }
    }

    /// Fail once `n` units have been produced.
    pub fn fail_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Return `Pending` on every other pump.
    pub fn stall_every_other(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Expose a global header, but only once the lane has been pumped.
    pub fn with_global_header_after_first_pump(mut self, header: &'static [u8]) -> Self {
        self.global_header = Some(header);
        self
    }
}

impl Lane for ScriptedLane {
    fn stream_index(&self) -> usize {
        self.stream
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn descriptor(&self) -> StreamDescriptor {
        let params = match self.kind {
            MediaKind::Audio => StreamParams::Audio {
                rate: self.time_base.den as u32,
                channels: 2,
            },
            MediaKind::Video => StreamParams::Video {
                width: 16,
                height: 16,
                format: PixelFormat::Gray8,
                frame_rate: self.time_base.invert(),
            },
        };
        StreamDescriptor {
            index: self.stream,
            kind: self.kind,
            codec: "scripted".to_string(),
            time_base: self.time_base,
            global_header: self
                .global_header
                .filter(|_| self.pumps > 0)
                .map(Bytes::from_static),
            params,
        }
    }

    fn state(&self) -> LaneState {
        self.state
    }

    fn pump(&mut self) -> Result<Pump> {
        if self.state == LaneState::Closed {
            return Ok(Pump::Drained);
        }
        self.pumps += 1;
        if self.stall && self.pumps % 2 == 1 {
            return Ok(Pump::Pending);
        }
        if self.fail_at == Some(self.next) {
            self.state = LaneState::Closed;
            return Err(TranscodeError::Encoder {
                stream: self.stream,
                message: format!("scripted failure after {} units", self.next),
            });
        }
        let Some(&(pts, duration)) = self.units.get(self.next) else {
            self.state = LaneState::Closed;
            return Ok(Pump::Drained);
        };
        self.next += 1;
        self.state = LaneState::Active;
        Ok(Pump::Unit(EncodedUnit {
            stream_index: self.stream,
            pts,
            dts: pts,
            duration,
            data: Bytes::from_static(b"unit"),
            keyframe: true,
        }))
    }

    fn timestamp_clamps(&self) -> u64 {
        0
    }

    fn close(&mut self) {
        self.state = LaneState::Closed;
    }
}

/// Records everything it is given.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    pub header: Option<Vec<StreamDescriptor>>,
    pub units: Vec<(usize, EncodedUnit)>,
    pub trailer_written: bool,
    /// Reject the unit arriving when this many units are stored
    pub fail_on_unit: Option<usize>,
}

impl MemoryWriter {
    /// Start time of every written unit in seconds, given the time base of
    /// each stream indexed by stream number.
    pub fn unit_seconds(&self, time_bases: &[Rational]) -> Vec<f64> {
        self.units
            .iter()
            .map(|(stream, unit)| unit.pts as f64 * time_bases[*stream].as_f64())
            .collect()
    }

    /// Units of one stream, in write order.
    pub fn stream_units(&self, stream: usize) -> Vec<&EncodedUnit> {
        self.units
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, u)| u)
            .collect()
    }

    /// Unit start times of one stream rescaled to `to`.
    pub fn rescaled_pts(&self, stream: usize, from: Rational, to: Rational) -> Vec<i64> {
        self.stream_units(stream)
            .iter()
            .map(|u| rescale_ts(u.pts, from, to))
            .collect()
    }
}

impl ContainerWriter for MemoryWriter {
    fn write_header(&mut self, streams: &[StreamDescriptor]) -> Result<()> {
        if self.header.is_some() {
            return Err(TranscodeError::Writer("header written twice".to_string()));
        }
        self.header = Some(streams.to_vec());
        Ok(())
    }

    fn write_unit(&mut self, stream: usize, unit: &EncodedUnit) -> Result<()> {
        if self.header.is_none() || self.trailer_written {
            return Err(TranscodeError::Writer(format!(
                "unit for stream {} outside header and trailer",
                stream
            )));
        }
        if self.fail_on_unit == Some(self.units.len()) {
            return Err(TranscodeError::Writer("disk full".to_string()));
        }
        self.units.push((stream, unit.clone()));
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.trailer_written = true;
        Ok(())
    }
}

/// Audio source handing out pre-built buffers with contiguous timestamps.
pub struct BufferSource {
    rate: u32,
    layout: ChannelLayout,
    chunks: Vec<SampleBuffer>,
    pts: i64,
}

impl BufferSource {
    pub fn new(rate: u32, layout: ChannelLayout, chunks: Vec<SampleBuffer>) -> Self {
        Self {
            rate,
            layout,
            chunks: chunks.into_iter().rev().collect(),
            pts: 0,
        }
    }

    /// `total` frames of silence in chunks of at most `chunk` frames.
    pub fn silence(
        rate: u32,
        format: SampleFormat,
        layout: ChannelLayout,
        total: usize,
        chunk: usize,
    ) -> Self {
        let mut chunks = Vec::new();
        let mut left = total;
        while left > 0 {
            let n = left.min(chunk);
            chunks.push(SampleBuffer::from_fn(format, layout.channels(), n, |_, _| 0.0));
            left -= n;
        }
        Self::new(rate, layout, chunks)
    }
}

impl FrameSource for BufferSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(samples) = self.chunks.pop() else {
            return Ok(None);
        };
        let pts = self.pts;
        self.pts += samples.frames() as i64;
        Ok(Some(Frame::Audio(AudioFrame {
            samples,
            rate: self.rate,
            layout: self.layout,
            pts,
        })))
    }

    fn time_base(&self) -> Rational {
        Rational::new(1, self.rate as i32)
    }
}
