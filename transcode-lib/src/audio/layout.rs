//! Channel layouts
//!
//! Layouts are speaker-position bitmasks in native order: channel `n` of a
//! buffer is the `n`-th lowest set bit. A layout with an empty mask only
//! carries a channel count ("unspecified order").

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Speaker positions, valued by their bit index in a layout mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Channel {
    FrontLeft = 0,
    FrontRight = 1,
    FrontCenter = 2,
    LowFrequency = 3,
    BackLeft = 4,
    BackRight = 5,
    FrontLeftOfCenter = 6,
    FrontRightOfCenter = 7,
    BackCenter = 8,
    SideLeft = 9,
    SideRight = 10,
    TopCenter = 11,
    StereoLeft = 29,
    StereoRight = 30,
}

impl Channel {
    pub const fn bit(self) -> u64 {
        1u64 << (self as u8)
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    fn from_index(index: u32) -> Option<Channel> {
        use Channel::*;
        Some(match index {
            0 => FrontLeft,
            1 => FrontRight,
            2 => FrontCenter,
            3 => LowFrequency,
            4 => BackLeft,
            5 => BackRight,
            6 => FrontLeftOfCenter,
            7 => FrontRightOfCenter,
            8 => BackCenter,
            9 => SideLeft,
            10 => SideRight,
            11 => TopCenter,
            29 => StereoLeft,
            30 => StereoRight,
            _ => return None,
        })
    }
}

/// Highest bit position a layout mask may use
pub const MAX_CHANNEL_BITS: usize = 64;

/// Every position `Channel` names
const KNOWN_MASK: u64 = 0x0fff | (1 << 29) | (1 << 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelLayout {
    mask: u64,
    count: u16,
}

const FL: u64 = Channel::FrontLeft.bit();
const FR: u64 = Channel::FrontRight.bit();
const FC: u64 = Channel::FrontCenter.bit();
const LFE: u64 = Channel::LowFrequency.bit();
const BL: u64 = Channel::BackLeft.bit();
const BR: u64 = Channel::BackRight.bit();
const BC: u64 = Channel::BackCenter.bit();
const SL: u64 = Channel::SideLeft.bit();
const SR: u64 = Channel::SideRight.bit();
const DL: u64 = Channel::StereoLeft.bit();
const DR: u64 = Channel::StereoRight.bit();

impl ChannelLayout {
    pub const MONO: ChannelLayout = ChannelLayout::from_mask(FC);
    pub const STEREO: ChannelLayout = ChannelLayout::from_mask(FL | FR);
    pub const LAYOUT_2POINT1: ChannelLayout = ChannelLayout::from_mask(FL | FR | LFE);
    pub const SURROUND: ChannelLayout = ChannelLayout::from_mask(FL | FR | FC);
    pub const LAYOUT_4POINT0: ChannelLayout = ChannelLayout::from_mask(FL | FR | FC | BC);
    pub const QUAD: ChannelLayout = ChannelLayout::from_mask(FL | FR | BL | BR);
    pub const LAYOUT_5POINT0: ChannelLayout = ChannelLayout::from_mask(FL | FR | FC | SL | SR);
    pub const LAYOUT_5POINT1: ChannelLayout =
        ChannelLayout::from_mask(FL | FR | FC | LFE | SL | SR);
    pub const LAYOUT_5POINT1_BACK: ChannelLayout =
        ChannelLayout::from_mask(FL | FR | FC | LFE | BL | BR);
    pub const LAYOUT_6POINT1: ChannelLayout =
        ChannelLayout::from_mask(FL | FR | FC | LFE | BC | SL | SR);
    pub const LAYOUT_7POINT1: ChannelLayout =
        ChannelLayout::from_mask(FL | FR | FC | LFE | BL | BR | SL | SR);
    pub const STEREO_DOWNMIX: ChannelLayout = ChannelLayout::from_mask(DL | DR);

    const NAMED: [(&'static str, ChannelLayout); 12] = [
        ("mono", Self::MONO),
        ("stereo", Self::STEREO),
        ("2.1", Self::LAYOUT_2POINT1),
        ("3.0", Self::SURROUND),
        ("4.0", Self::LAYOUT_4POINT0),
        ("quad", Self::QUAD),
        ("5.0", Self::LAYOUT_5POINT0),
        ("5.1", Self::LAYOUT_5POINT1),
        ("5.1(back)", Self::LAYOUT_5POINT1_BACK),
        ("6.1", Self::LAYOUT_6POINT1),
        ("7.1", Self::LAYOUT_7POINT1),
        ("downmix", Self::STEREO_DOWNMIX),
    ];

    pub const fn from_mask(mask: u64) -> Self {
        Self {
            mask,
            count: mask.count_ones() as u16,
        }
    }

    /// A layout that only knows its channel count.
    pub const fn unspecified(count: u16) -> Self {
        Self { mask: 0, count }
    }

    /// The conventional layout for a channel count.
    pub fn default_for(channels: u16) -> Self {
        match channels {
            1 => Self::MONO,
            2 => Self::STEREO,
            3 => Self::LAYOUT_2POINT1,
            4 => Self::LAYOUT_4POINT0,
            5 => Self::LAYOUT_5POINT0,
            6 => Self::LAYOUT_5POINT1,
            7 => Self::LAYOUT_6POINT1,
            8 => Self::LAYOUT_7POINT1,
            n => Self::unspecified(n),
        }
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn channels(&self) -> usize {
        self.count as usize
    }

    pub fn is_specified(&self) -> bool {
        self.mask != 0
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.mask & channel.bit() != 0
    }

    /// Mask bits with no known speaker position.
    pub fn unknown_positions(&self) -> u64 {
        self.mask & !KNOWN_MASK
    }

    /// Buffer index of `channel` within this layout.
    pub fn index_of(&self, channel: Channel) -> Option<usize> {
        if !self.contains(channel) {
            return None;
        }
        Some((self.mask & (channel.bit() - 1)).count_ones() as usize)
    }

    /// Speaker positions in buffer order.
    pub fn positions(&self) -> Vec<Channel> {
        (0..MAX_CHANNEL_BITS as u32)
            .filter(|bit| self.mask & (1u64 << bit) != 0)
            .filter_map(Channel::from_index)
            .collect()
    }

    pub fn name(&self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(_, layout)| layout == self)
            .map(|(name, _)| *name)
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None if self.mask == 0 => write!(f, "{}c", self.count),
            None => write!(f, "0x{:x}", self.mask),
        }
    }
}

impl FromStr for ChannelLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if let Some((_, layout)) = Self::NAMED.iter().find(|(name, _)| *name == lower) {
            return Ok(*layout);
        }
        if let Some(hex) = lower.strip_prefix("0x") {
            let mask = u64::from_str_radix(hex, 16)
                .map_err(|e| format!("Invalid channel mask {}: {}", s, e))?;
            return Ok(Self::from_mask(mask));
        }
        if let Some(count) = lower.strip_suffix('c') {
            let n: u16 = count
                .parse()
                .map_err(|_| format!("Invalid channel count: {}", s))?;
            return Ok(Self::default_for(n));
        }
        Err(format!("Unknown channel layout: {}", s))
    }
}

impl TryFrom<String> for ChannelLayout {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChannelLayout> for String {
    fn from(value: ChannelLayout) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        assert_eq!(ChannelLayout::MONO.channels(), 1);
        assert_eq!(ChannelLayout::STEREO.channels(), 2);
        assert_eq!(ChannelLayout::LAYOUT_5POINT1.channels(), 6);
        assert_eq!(ChannelLayout::LAYOUT_7POINT1.channels(), 8);
        assert_eq!(ChannelLayout::unspecified(3).channels(), 3);
    }

    #[test]
    fn test_unknown_positions() {
        assert_eq!(ChannelLayout::LAYOUT_7POINT1.unknown_positions(), 0);
        assert_eq!(ChannelLayout::STEREO_DOWNMIX.unknown_positions(), 0);
        assert_eq!(ChannelLayout::from_mask(0x1003).unknown_positions(), 0x1000);
    }

    #[test]
    fn test_index_of() {
        let l = ChannelLayout::LAYOUT_5POINT1;
        assert_eq!(l.index_of(Channel::FrontLeft), Some(0));
        assert_eq!(l.index_of(Channel::FrontCenter), Some(2));
        assert_eq!(l.index_of(Channel::LowFrequency), Some(3));
        assert_eq!(l.index_of(Channel::SideRight), Some(5));
        assert_eq!(l.index_of(Channel::BackLeft), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("5.1".parse::<ChannelLayout>().unwrap(), ChannelLayout::LAYOUT_5POINT1);
        assert_eq!("2c".parse::<ChannelLayout>().unwrap(), ChannelLayout::STEREO);
        assert_eq!("0x3".parse::<ChannelLayout>().unwrap(), ChannelLayout::STEREO);
        assert!("surround-sound".parse::<ChannelLayout>().is_err());
        assert_eq!(ChannelLayout::QUAD.to_string(), "quad");
    }

    #[test]
    fn test_positions_in_order() {
        assert_eq!(
            ChannelLayout::QUAD.positions(),
            vec![
                Channel::FrontLeft,
                Channel::FrontRight,
                Channel::BackLeft,
                Channel::BackRight
            ]
        );
    }
}
