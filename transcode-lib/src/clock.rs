//! Per-stream presentation clocks

use std::cmp::Ordering;

use crate::error::{Result, TranscodeError};
use crate::types::{compare_ts, Rational};

/// Presentation time of one output stream, counted in its time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamClock {
    stream_id: usize,
    time_base: Rational,
    counter: i64,
}

impl StreamClock {
    pub fn new(stream_id: usize, time_base: Rational) -> Result<Self> {
        if !time_base.is_valid_time_base() {
            return Err(TranscodeError::config(format!(
                "stream {} has invalid time base {}",
                stream_id, time_base
            )));
        }
        Ok(Self {
            stream_id,
            time_base,
            counter: 0,
        })
    }

    pub fn stream_id(&self) -> usize {
        self.stream_id
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Current position in time base ticks.
    pub fn ticks(&self) -> i64 {
        self.counter
    }

    pub fn current_time_seconds(&self) -> f64 {
        self.counter as f64 * self.time_base.as_f64()
    }

    /// Exact ordering of two clocks regardless of their time bases.
    pub fn compare(&self, other: &StreamClock) -> Ordering {
        compare_ts(self.counter, self.time_base, other.counter, other.time_base)
    }

    pub(crate) fn advance(&mut self, ticks: i64) {
        self.counter += ticks;
    }

    /// Move the clock forward to `ticks` if it is behind.
    pub(crate) fn catch_up(&mut self, ticks: i64) {
        self.counter = self.counter.max(ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_time_base() {
        assert!(StreamClock::new(0, Rational::new(0, 1)).is_err());
        assert!(StreamClock::new(0, Rational::new(1, 0)).is_err());
    }

    #[test]
    fn test_compare_across_time_bases() {
        let mut audio = StreamClock::new(0, Rational::new(1, 44100)).unwrap();
        let mut video = StreamClock::new(1, Rational::new(1, 25)).unwrap();
        assert_eq!(audio.compare(&video), Ordering::Equal);
        audio.advance(1764);
        video.advance(1);
        assert_eq!(audio.compare(&video), Ordering::Equal);
        audio.advance(1);
        assert_eq!(audio.compare(&video), Ordering::Greater);
        assert!((video.current_time_seconds() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_catch_up_never_rewinds() {
        let mut clock = StreamClock::new(0, Rational::new(1, 1000)).unwrap();
        clock.catch_up(40);
        clock.catch_up(10);
        assert_eq!(clock.ticks(), 40);
    }
}
