//! Encoding lanes
//!
//! A lane owns everything between a frame source and the encoded units of one
//! output stream: the source, the conversion stage (resampler or pixel
//! converter) and the encoder. The scheduler pulls one unit at a time from a
//! lane through [`Lane::pump`].

pub mod audio;
pub mod threaded;
pub mod video;

pub use audio::AudioLane;
pub use threaded::ThreadedLane;
pub use video::VideoLane;

use std::fmt;
use tracing::{debug, warn};

use crate::capability::{Encoded, EncodedUnit, Encoder, Frame, StreamDescriptor};
use crate::error::{Result, TranscodeError};
use crate::types::{MediaKind, Rational};

/// Life cycle of an output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneState {
    /// No unit produced yet
    Idle,
    /// At least one unit produced
    Active,
    /// Upstream ended, the encoder is being drained
    Flushing,
    /// Nothing more will be produced
    Closed,
}

impl fmt::Display for LaneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaneState::Idle => "idle",
            LaneState::Active => "active",
            LaneState::Flushing => "flushing",
            LaneState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outcome of one pump
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pump {
    Unit(EncodedUnit),
    /// No unit available this turn; try again later
    Pending,
    /// The lane is closed
    Drained,
}

pub trait Lane: Send {
    fn stream_index(&self) -> usize;
    fn kind(&self) -> MediaKind;
    /// Time base of the units this lane produces.
    fn time_base(&self) -> Rational;
    fn descriptor(&self) -> StreamDescriptor;
    fn state(&self) -> LaneState;
    /// Produce the next encoded unit.
    ///
    /// Errors are lane-local: the lane is closed and every further pump
    /// returns [`Pump::Drained`].
    fn pump(&mut self) -> Result<Pump>;
    /// Number of timestamps that had to be clamped to keep them increasing.
    fn timestamp_clamps(&self) -> u64;
    /// Close the lane without draining it.
    fn close(&mut self);
}

/// Encoder side shared by the audio and video lanes.
pub(crate) struct EncoderStage {
    stream: usize,
    kind: MediaKind,
    encoder: Box<dyn Encoder>,
    state: LaneState,
    last_dts: Option<i64>,
    clamps: u64,
    units: u64,
}

impl EncoderStage {
    pub fn new(stream: usize, kind: MediaKind, encoder: Box<dyn Encoder>) -> Result<Self> {
        if !encoder.time_base().is_valid_time_base() {
            return Err(TranscodeError::config(format!(
                "encoder {} for stream {} has invalid time base {}",
                encoder.codec_name(),
                stream,
                encoder.time_base()
            )));
        }
        Ok(Self {
            stream,
            kind,
            encoder,
            state: LaneState::Idle,
            last_dts: None,
            clamps: 0,
            units: 0,
        })
    }

    pub fn encoder(&self) -> &dyn Encoder {
        self.encoder.as_ref()
    }

    pub fn stream(&self) -> usize {
        self.stream
    }

    pub fn state(&self) -> LaneState {
        self.state
    }

    pub fn clamps(&self) -> u64 {
        self.clamps
    }

    pub fn close(&mut self) {
        self.state = LaneState::Closed;
    }

    /// Pull one unit from the encoder, feeding it from `next_frame` whenever
    /// it asks for more input. `next_frame` returning `None` starts the drain.
    pub fn pump<F>(&mut self, mut next_frame: F) -> Result<Pump>
    where
        F: FnMut() -> Result<Option<Frame>>,
    {
        let result = self.pump_inner(&mut next_frame);
        if result.is_err() {
            self.state = LaneState::Closed;
        }
        result
    }

    fn pump_inner<F>(&mut self, next_frame: &mut F) -> Result<Pump>
    where
        F: FnMut() -> Result<Option<Frame>>,
    {
        loop {
            if self.state == LaneState::Closed {
                return Ok(Pump::Drained);
            }
            match self.encoder.receive_unit().map_err(|e| self.encoder_error(e))? {
                Encoded::Unit(unit) => return Ok(Pump::Unit(self.finish_unit(unit))),
                Encoded::EndOfStream => self.finish(),
                Encoded::Buffered if self.state == LaneState::Flushing => self.finish(),
                Encoded::Buffered => {
                    let frame = next_frame().map_err(|e| self.decoder_error(e))?;
                    if frame.is_none() {
                        debug!(stream = self.stream, "lane: upstream ended, draining encoder");
                        self.state = LaneState::Flushing;
                    }
                    self.encoder
                        .send_frame(frame.as_ref())
                        .map_err(|e| self.encoder_error(e))?;
                }
            }
        }
    }

    fn finish(&mut self) {
        debug!(
            stream = self.stream,
            kind = %self.kind,
            units = self.units,
            clamps = self.clamps,
            "lane: closed"
        );
        self.state = LaneState::Closed;
    }

    fn finish_unit(&mut self, mut unit: EncodedUnit) -> EncodedUnit {
        unit.stream_index = self.stream;
        if let Some(last) = self.last_dts {
            if unit.dts <= last {
                warn!(
                    stream = self.stream,
                    dts = unit.dts,
                    previous = last,
                    "lane: non-increasing timestamp, clamping"
                );
                unit.dts = last + 1;
                unit.pts = unit.pts.max(unit.dts);
                self.clamps += 1;
            }
        }
        self.last_dts = Some(unit.dts);
        self.units += 1;
        if self.state == LaneState::Idle {
            self.state = LaneState::Active;
        }
        unit
    }

    fn encoder_error(&self, err: TranscodeError) -> TranscodeError {
        match err {
            TranscodeError::Encoder { message, .. } => TranscodeError::Encoder {
                stream: self.stream,
                message,
            },
            TranscodeError::BufferOverflow(_) => err,
            other => TranscodeError::Encoder {
                stream: self.stream,
                message: other.to_string(),
            },
        }
    }

    fn decoder_error(&self, err: TranscodeError) -> TranscodeError {
        match err {
            TranscodeError::Decoder { message, .. } => TranscodeError::Decoder {
                stream: self.stream,
                message,
            },
            TranscodeError::BufferOverflow(_) => err,
            other => TranscodeError::Decoder {
                stream: self.stream,
                message: other.to_string(),
            },
        }
    }
}
