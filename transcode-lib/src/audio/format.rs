//! Sample formats
//!
//! A [`SampleFormat`] is a storage type (`U8`, `S16`, `S32`, `F32`, `F64`)
//! combined with a packing mode (interleaved or one plane per channel).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Storage type of a single sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SampleType {
    U8,
    S16,
    S32,
    F32,
    F64,
}

impl SampleType {
    pub fn bytes(&self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::S16 => 2,
            SampleType::S32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleType::F32 | SampleType::F64)
    }

    /// Significant bits for integer types; `None` for floating point.
    pub fn integer_bits(&self) -> Option<u32> {
        match self {
            SampleType::U8 => Some(8),
            SampleType::S16 => Some(16),
            SampleType::S32 => Some(32),
            SampleType::F32 | SampleType::F64 => None,
        }
    }
}

/// Sample storage type plus packing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SampleFormat {
    pub sample: SampleType,
    pub planar: bool,
}

impl SampleFormat {
    pub const U8: SampleFormat = SampleFormat::packed(SampleType::U8);
    pub const S16: SampleFormat = SampleFormat::packed(SampleType::S16);
    pub const S32: SampleFormat = SampleFormat::packed(SampleType::S32);
    pub const FLT: SampleFormat = SampleFormat::packed(SampleType::F32);
    pub const DBL: SampleFormat = SampleFormat::packed(SampleType::F64);
    pub const U8P: SampleFormat = SampleFormat::planar(SampleType::U8);
    pub const S16P: SampleFormat = SampleFormat::planar(SampleType::S16);
    pub const S32P: SampleFormat = SampleFormat::planar(SampleType::S32);
    pub const FLTP: SampleFormat = SampleFormat::planar(SampleType::F32);
    pub const DBLP: SampleFormat = SampleFormat::planar(SampleType::F64);

    pub const ALL: [SampleFormat; 10] = [
        Self::U8,
        Self::S16,
        Self::S32,
        Self::FLT,
        Self::DBL,
        Self::U8P,
        Self::S16P,
        Self::S32P,
        Self::FLTP,
        Self::DBLP,
    ];

    pub const fn packed(sample: SampleType) -> Self {
        Self {
            sample,
            planar: false,
        }
    }

    pub const fn planar(sample: SampleType) -> Self {
        Self {
            sample,
            planar: true,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.sample.bytes()
    }

    /// Number of data buffers a [`SampleBuffer`](super::SampleBuffer) in this
    /// format holds for `channels` channels.
    pub fn plane_count(&self, channels: usize) -> usize {
        if self.planar {
            channels
        } else {
            1
        }
    }

    pub fn name(&self) -> &'static str {
        match (self.sample, self.planar) {
            (SampleType::U8, false) => "u8",
            (SampleType::S16, false) => "s16",
            (SampleType::S32, false) => "s32",
            (SampleType::F32, false) => "flt",
            (SampleType::F64, false) => "dbl",
            (SampleType::U8, true) => "u8p",
            (SampleType::S16, true) => "s16p",
            (SampleType::S32, true) => "s32p",
            (SampleType::F32, true) => "fltp",
            (SampleType::F64, true) => "dblp",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == lower)
            .or(match lower.as_str() {
                "f32" => Some(Self::FLT),
                "f32p" => Some(Self::FLTP),
                "f64" => Some(Self::DBL),
                "f64p" => Some(Self::DBLP),
                _ => None,
            })
            .ok_or_else(|| format!("Unknown sample format: {}", s))
    }
}

impl TryFrom<String> for SampleFormat {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SampleFormat> for String {
    fn from(value: SampleFormat) -> Self {
        value.name().to_string()
    }
}
