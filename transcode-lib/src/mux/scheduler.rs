//! Presentation-time interleaving of encoded units
//!
//! Every step picks the open stream whose clock is furthest behind (ties go to
//! audio, then to the lower stream index), pulls one unit from its lane and
//! hands it to the container writer. The container header is written once
//! every lane has been pumped, so encoders with global headers have exposed
//! them by then.

use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::capability::{ContainerWriter, EncodedUnit, StreamDescriptor};
use crate::clock::StreamClock;
use crate::error::{Result, TranscodeError};
use crate::lane::{Lane, LaneState, Pump};

/// What one scheduling step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A unit of `stream` was written
    Emitted { stream: usize },
    /// `stream` was closed (drained or failed)
    Closed { stream: usize },
    /// The selected lane had nothing yet; retry later
    Stalled,
    /// Every stream is closed
    Finished,
}

/// A lane that failed and was closed
#[derive(Debug)]
pub struct LaneFailure {
    pub stream: usize,
    pub error: TranscodeError,
}

struct Slot {
    lane: Box<dyn Lane>,
    clock: StreamClock,
    /// Unit pulled while priming, written on the first step of this stream
    lookahead: Option<EncodedUnit>,
    primed: bool,
    closed: bool,
    units: u64,
    last_pts: Option<i64>,
}

impl Slot {
    fn is_open(&self) -> bool {
        !self.closed || self.lookahead.is_some()
    }
}

/// Per-stream counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStats {
    pub stream: usize,
    pub units: u64,
    pub last_pts: Option<i64>,
    pub clamps: u64,
    pub state: LaneState,
}

pub struct Scheduler {
    slots: Vec<Slot>,
    header_written: bool,
    failures: Vec<LaneFailure>,
}

impl Scheduler {
    /// Take ownership of `lanes`. Stream indices must be unique.
    pub fn new(lanes: Vec<Box<dyn Lane>>) -> Result<Self> {
        let mut slots: Vec<Slot> = Vec::with_capacity(lanes.len());
        for lane in lanes {
            let stream = lane.stream_index();
            if slots.iter().any(|s| s.lane.stream_index() == stream) {
                return Err(TranscodeError::config(format!(
                    "stream index {} used by more than one lane",
                    stream
                )));
            }
            let clock = StreamClock::new(stream, lane.time_base())?;
            slots.push(Slot {
                lane,
                clock,
                lookahead: None,
                primed: false,
                closed: false,
                units: 0,
                last_pts: None,
            });
        }
        if slots.is_empty() {
            return Err(TranscodeError::config("no lanes to schedule"));
        }
        Ok(Self {
            slots,
            header_written: false,
            failures: Vec::new(),
        })
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    pub fn clocks(&self) -> impl Iterator<Item = &StreamClock> {
        self.slots.iter().map(|s| &s.clock)
    }

    pub fn failures(&self) -> &[LaneFailure] {
        &self.failures
    }

    pub fn is_finished(&self) -> bool {
        self.slots.iter().all(|s| !s.is_open())
    }

    pub fn descriptors(&self) -> Vec<StreamDescriptor> {
        self.slots.iter().map(|s| s.lane.descriptor()).collect()
    }

    pub fn stats(&self) -> Vec<StreamStats> {
        self.slots
            .iter()
            .map(|s| StreamStats {
                stream: s.lane.stream_index(),
                units: s.units,
                last_pts: s.last_pts,
                clamps: s.lane.timestamp_clamps(),
                state: if s.closed {
                    LaneState::Closed
                } else {
                    s.lane.state()
                },
            })
            .collect()
    }

    /// Write the container header now, whatever the priming state.
    pub fn write_header(&mut self, writer: &mut dyn ContainerWriter) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        let descriptors = self.descriptors();
        debug!(streams = descriptors.len(), "scheduler: writing container header");
        writer.write_header(&descriptors)?;
        self.header_written = true;
        Ok(())
    }

    /// Close every lane that is still open.
    pub fn close_all(&mut self) {
        for slot in &mut self.slots {
            if !slot.closed {
                slot.lane.close();
                slot.closed = true;
            }
            slot.lookahead = None;
        }
    }

    /// Pump `slot` once, recording failures. `None` means the lane stalled.
    fn pull(slot: &mut Slot, failures: &mut Vec<LaneFailure>) -> Option<Option<EncodedUnit>> {
        match slot.lane.pump() {
            Ok(Pump::Unit(unit)) => Some(Some(unit)),
            Ok(Pump::Pending) => None,
            Ok(Pump::Drained) => {
                slot.closed = true;
                Some(None)
            }
            Err(error) => {
                let stream = slot.lane.stream_index();
                warn!(stream, error = %error, "scheduler: lane failed, closing it");
                slot.lane.close();
                slot.closed = true;
                failures.push(LaneFailure { stream, error });
                Some(None)
            }
        }
    }

    /// Pump every lane once. Returns false while some lane is stalled.
    fn prime(&mut self) -> bool {
        let mut ready = true;
        for slot in self.slots.iter_mut().filter(|s| !s.primed) {
            match Self::pull(slot, &mut self.failures) {
                Some(unit) => {
                    slot.lookahead = unit;
                    slot.primed = true;
                }
                None => ready = false,
            }
        }
        ready
    }

    fn select(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_open())
            .min_by(|(_, a), (_, b)| {
                schedule_order(
                    &a.clock,
                    a.lane.kind().priority(),
                    &b.clock,
                    b.lane.kind().priority(),
                )
            })
            .map(|(i, _)| i)
    }

    /// Emit at most one unit.
    ///
    /// Lane failures are recorded and the lane is closed; only writer errors
    /// are returned.
    pub fn step(&mut self, writer: &mut dyn ContainerWriter) -> Result<Step> {
        if !self.header_written {
            if !self.prime() {
                return Ok(Step::Stalled);
            }
            self.write_header(writer)?;
        }

        let Some(index) = self.select() else {
            return Ok(Step::Finished);
        };
        let slot = &mut self.slots[index];
        let stream = slot.lane.stream_index();
        let unit = match slot.lookahead.take() {
            Some(unit) => unit,
            None => match Self::pull(slot, &mut self.failures) {
                Some(Some(unit)) => unit,
                Some(None) => {
                    debug!(stream, units = slot.units, "scheduler: stream closed");
                    return Ok(Step::Closed { stream });
                }
                None => return Ok(Step::Stalled),
            },
        };

        writer.write_unit(stream, &unit)?;
        slot.units += 1;
        slot.last_pts = Some(unit.pts);
        slot.clock.advance(unit.duration.max(0));
        slot.clock.catch_up(unit.pts.saturating_add(unit.duration.max(0)));
        Ok(Step::Emitted { stream })
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("streams", &self.slots.len())
            .field("header_written", &self.header_written)
            .field("failures", &self.failures.len())
            .finish()
    }
}

/// Lowest clock first, then kind priority, then stream index.
fn schedule_order(a: &StreamClock, a_priority: u8, b: &StreamClock, b_priority: u8) -> Ordering {
    a.compare(b)
        .then_with(|| a_priority.cmp(&b_priority))
        .then_with(|| a.stream_id().cmp(&b.stream_id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::{MemoryWriter, ScriptedLane};
    use crate::types::{MediaKind, Rational};

    fn run(scheduler: &mut Scheduler, writer: &mut MemoryWriter) {
        loop {
            match scheduler.step(writer).unwrap() {
                Step::Finished => break,
                Step::Stalled => continue,
                _ => {}
            }
        }
    }

    #[test]
    fn test_interleaves_by_presentation_time() {
        // audio: 1024-sample units at 48 kHz, video: 25 fps
        let audio = ScriptedLane::uniform(0, MediaKind::Audio, Rational::new(1, 48000), 1024, 10);
        let video = ScriptedLane::uniform(1, MediaKind::Video, Rational::new(1, 25), 1, 5);
        let mut scheduler = Scheduler::new(vec![Box::new(audio), Box::new(video)]).unwrap();
        let mut writer = MemoryWriter::default();
        run(&mut scheduler, &mut writer);

        assert_eq!(writer.units.len(), 15);
        let seconds = writer.unit_seconds(&[Rational::new(1, 48000), Rational::new(1, 25)]);
        assert!(seconds.windows(2).all(|w| w[0] <= w[1]), "{:?}", seconds);
        // both start at zero: audio wins the tie
        assert_eq!(writer.units[0].0, 0);
        assert_eq!(writer.units[1].0, 1);
        assert!(!writer.trailer_written);
    }

    #[test]
    fn test_tie_break_by_kind_then_index() {
        let v2 = ScriptedLane::uniform(2, MediaKind::Video, Rational::new(1, 10), 1, 2);
        let a3 = ScriptedLane::uniform(3, MediaKind::Audio, Rational::new(1, 10), 1, 2);
        let a1 = ScriptedLane::uniform(1, MediaKind::Audio, Rational::new(1, 10), 1, 2);
        let mut scheduler =
            Scheduler::new(vec![Box::new(v2), Box::new(a3), Box::new(a1)]).unwrap();
        let mut writer = MemoryWriter::default();
        run(&mut scheduler, &mut writer);
        let order: Vec<usize> = writer.units.iter().map(|(s, _)| *s).collect();
        assert_eq!(order, vec![1, 3, 2, 1, 3, 2]);
    }

    #[test]
    fn test_failed_lane_is_closed_and_others_continue() {
        let good = ScriptedLane::uniform(0, MediaKind::Audio, Rational::new(1, 100), 10, 6);
        let bad =
            ScriptedLane::uniform(1, MediaKind::Video, Rational::new(1, 10), 1, 6).fail_at(2);
        let mut scheduler = Scheduler::new(vec![Box::new(good), Box::new(bad)]).unwrap();
        let mut writer = MemoryWriter::default();
        run(&mut scheduler, &mut writer);

        assert_eq!(writer.units.iter().filter(|(s, _)| *s == 0).count(), 6);
        assert_eq!(writer.units.iter().filter(|(s, _)| *s == 1).count(), 2);
        assert_eq!(scheduler.failures().len(), 1);
        assert_eq!(scheduler.failures()[0].stream, 1);
        let stats = scheduler.stats();
        assert!(stats.iter().all(|s| s.state == LaneState::Closed));
    }

    #[test]
    fn test_header_written_after_priming_with_global_header() {
        let lane = ScriptedLane::uniform(0, MediaKind::Audio, Rational::new(1, 10), 1, 1)
            .with_global_header_after_first_pump(b"cfg");
        let mut scheduler = Scheduler::new(vec![Box::new(lane)]).unwrap();
        let mut writer = MemoryWriter::default();
        assert_eq!(scheduler.step(&mut writer).unwrap(), Step::Emitted { stream: 0 });
        let header = writer.header.as_ref().unwrap();
        assert_eq!(header[0].global_header.as_deref(), Some(&b"cfg"[..]));
    }

    #[test]
    fn test_stalled_lane_blocks_only_its_turn() {
        let lane = ScriptedLane::uniform(0, MediaKind::Video, Rational::new(1, 10), 1, 2)
            .stall_every_other();
        let mut scheduler = Scheduler::new(vec![Box::new(lane)]).unwrap();
        let mut writer = MemoryWriter::default();
        let mut stalls = 0;
        loop {
            match scheduler.step(&mut writer).unwrap() {
                Step::Finished => break,
                Step::Stalled => stalls += 1,
                _ => {}
            }
        }
        assert!(stalls > 0);
        assert_eq!(writer.units.len(), 2);
    }

    #[test]
    fn test_duplicate_stream_index_rejected() {
        let a = ScriptedLane::uniform(0, MediaKind::Audio, Rational::new(1, 10), 1, 1);
        let b = ScriptedLane::uniform(0, MediaKind::Video, Rational::new(1, 10), 1, 1);
        assert!(Scheduler::new(vec![Box::new(a), Box::new(b)]).is_err());
        assert!(Scheduler::new(Vec::new()).is_err());
    }
}
