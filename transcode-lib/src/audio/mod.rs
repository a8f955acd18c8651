//! Audio sample representation: formats, layouts and owned buffers

pub mod buffer;
pub mod element;
pub mod format;
pub mod layout;

pub use buffer::SampleBuffer;
pub use element::Element;
pub use format::{SampleFormat, SampleType};
pub use layout::{Channel, ChannelLayout};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TranscodeError};

/// Rate, storage format and channel layout of one end of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    pub rate: u32,
    pub format: SampleFormat,
    pub layout: ChannelLayout,
}

impl AudioSpec {
    pub fn new(rate: u32, format: SampleFormat, layout: ChannelLayout) -> Self {
        Self {
            rate,
            format,
            layout,
        }
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn validate(&self, side: &str) -> Result<()> {
        if self.rate == 0 {
            return Err(TranscodeError::config(format!("{} sample rate is zero", side)));
        }
        if self.channels() == 0 {
            return Err(TranscodeError::config(format!("{} has no channels", side)));
        }
        let unknown = self.layout.unknown_positions();
        if unknown != 0 {
            return Err(TranscodeError::config(format!(
                "{} layout {} has unknown channel positions 0x{:x}",
                side, self.layout, unknown
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AudioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz {} {}", self.rate, self.format, self.layout)
    }
}
