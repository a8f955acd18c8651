use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Rational number used for time bases and rate ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Value as floating point seconds (for logging; never used for ordering).
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn invert(&self) -> Self {
        Self::new(self.den, self.num)
    }

    /// A rational with a non-positive denominator or zero numerator is not a usable time base.
    pub fn is_valid_time_base(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    pub fn reduced(&self) -> Self {
        let g = gcd(self.num.unsigned_abs() as u64, self.den.unsigned_abs() as u64).max(1) as i32;
        Self::new(self.num / g, self.den / g)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Kind of elementary stream handled by a lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Interleave tie-break priority: lower goes first. Audio precedes video.
    pub fn priority(&self) -> u8 {
        match self {
            MediaKind::Audio => 0,
            MediaKind::Video => 1,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Compute `a * b / c` rounded to nearest, halves away from zero.
pub fn rescale_rnd(a: i64, b: i64, c: i64) -> i64 {
    let n = a as i128 * b as i128;
    let c = c as i128;
    let r = if (n < 0) != (c < 0) {
        (n - c / 2) / c
    } else {
        (n + c / 2) / c
    };
    r.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Convert timestamps from one time base to another
pub fn rescale_ts(ts: i64, from: Rational, to: Rational) -> i64 {
    let b = from.num as i64 * to.den as i64;
    let c = from.den as i64 * to.num as i64;
    rescale_rnd(ts, b, c)
}

/// Exact comparison of two timestamps expressed in different time bases.
pub fn compare_ts(a: i64, tb_a: Rational, b: i64, tb_b: Rational) -> Ordering {
    let lhs = a as i128 * tb_a.num as i128 * tb_b.den as i128;
    let rhs = b as i128 * tb_b.num as i128 * tb_a.den as i128;
    lhs.cmp(&rhs)
}
