//! Owned audio sample storage
//!
//! A [`SampleBuffer`] holds either one interleaved buffer (packed formats) or
//! one buffer per channel (planar formats). Capacity is tracked in frames and
//! only ever grows; `frames` is the number of valid frames.

use crate::error::{Result, TranscodeError};

use super::format::{SampleFormat, SampleType};

#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    format: SampleFormat,
    channels: usize,
    frames: usize,
    capacity: usize,
    planes: Vec<Vec<u8>>,
}

impl SampleBuffer {
    /// Allocate a silent buffer able to hold `capacity` frames.
    pub fn new(format: SampleFormat, channels: usize, capacity: usize) -> Self {
        let mut buffer = Self {
            format,
            channels,
            frames: 0,
            capacity: 0,
            planes: vec![Vec::new(); format.plane_count(channels)],
        };
        buffer.reserve(capacity);
        buffer
    }

    /// Build a buffer of `frames` frames from normalized sample values.
    pub fn from_fn<F>(format: SampleFormat, channels: usize, frames: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        let mut buffer = Self::new(format, channels, frames);
        buffer.frames = frames;
        for i in 0..frames {
            for ch in 0..channels {
                buffer.set_sample(ch, i, f(ch, i));
            }
        }
        buffer
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    fn plane_len(&self, frames: usize) -> usize {
        let per_frame = if self.format.planar {
            1
        } else {
            self.channels
        };
        frames * per_frame * self.format.bytes_per_sample()
    }

    /// Grow capacity to at least `frames`. Never shrinks.
    pub fn reserve(&mut self, frames: usize) {
        if frames <= self.capacity {
            return;
        }
        let len = self.plane_len(frames);
        let old_len = self.plane_len(self.capacity);
        let silence = silence_byte(self.format.sample);
        for plane in &mut self.planes {
            plane.resize(len, 0);
            if silence != 0 {
                plane[old_len..].fill(silence);
            }
        }
        self.capacity = frames;
    }

    /// Set the number of valid frames.
    pub fn set_frames(&mut self, frames: usize) -> Result<()> {
        if frames > self.capacity {
            return Err(TranscodeError::BufferOverflow(format!(
                "{} frames exceed buffer capacity of {}",
                frames, self.capacity
            )));
        }
        self.frames = frames;
        Ok(())
    }

    /// Valid bytes of plane `index`.
    pub fn plane(&self, index: usize) -> &[u8] {
        let len = self.plane_len(self.frames);
        &self.planes[index][..len]
    }

    /// Whole plane `index`, including unused capacity.
    pub fn plane_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.planes[index]
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn locate(&self, channel: usize, frame: usize) -> (usize, usize) {
        if self.format.planar {
            (channel, frame)
        } else {
            (0, frame * self.channels + channel)
        }
    }

    /// Read one sample normalized to `[-1.0, 1.0)` (floats are returned as stored).
    pub fn sample(&self, channel: usize, frame: usize) -> f64 {
        let (plane, index) = self.locate(channel, frame);
        read_sample(&self.planes[plane], self.format.sample, index)
    }

    /// Write one normalized sample, rounding and clipping for integer formats.
    pub fn set_sample(&mut self, channel: usize, frame: usize, value: f64) {
        let (plane, index) = self.locate(channel, frame);
        let ty = self.format.sample;
        write_sample(&mut self.planes[plane], ty, index, value);
    }

    /// Fill `count` frames starting at `start` with silence.
    pub fn fill_silence(&mut self, start: usize, count: usize) {
        let silence = silence_byte(self.format.sample);
        let from = self.plane_len(start);
        let to = self.plane_len(start + count);
        for plane in &mut self.planes {
            plane[from..to].fill(silence);
        }
    }

    /// Copy `count` frames from `src` (same format and channel count) into this
    /// buffer at `dst_start` without any sample conversion.
    pub fn copy_frames_from(
        &mut self,
        src: &SampleBuffer,
        src_start: usize,
        dst_start: usize,
        count: usize,
    ) -> Result<()> {
        if src.format != self.format || src.channels != self.channels {
            return Err(TranscodeError::config(format!(
                "cannot copy {} x{} frames into {} x{} buffer",
                src.format, src.channels, self.format, self.channels
            )));
        }
        if dst_start + count > self.capacity || src_start + count > src.capacity {
            return Err(TranscodeError::BufferOverflow(format!(
                "copy of {} frames out of bounds",
                count
            )));
        }
        let (s0, s1) = (src.plane_len(src_start), src.plane_len(src_start + count));
        let d0 = self.plane_len(dst_start);
        for (dst, src) in self.planes.iter_mut().zip(&src.planes) {
            dst[d0..d0 + (s1 - s0)].copy_from_slice(&src[s0..s1]);
        }
        Ok(())
    }

    /// Append the first `count` frames of `src`, growing capacity as needed.
    pub fn append(&mut self, src: &SampleBuffer, count: usize) -> Result<()> {
        let start = self.frames;
        self.reserve(start + count);
        self.copy_frames_from(src, 0, start, count)?;
        self.frames = start + count;
        Ok(())
    }

    /// Remove `count` frames from the front, shifting the rest down.
    pub fn discard_front(&mut self, count: usize) {
        let count = count.min(self.frames);
        let cut = self.plane_len(count);
        let end = self.plane_len(self.frames);
        for plane in &mut self.planes {
            plane.copy_within(cut..end, 0);
        }
        self.frames -= count;
    }

    /// Raw bytes of one sample in native byte order.
    pub fn sample_bytes(&self, channel: usize, frame: usize) -> &[u8] {
        let (plane, index) = self.locate(channel, frame);
        let bps = self.format.bytes_per_sample();
        &self.planes[plane][index * bps..(index + 1) * bps]
    }

    /// All valid samples as normalized planar `f64`.
    pub fn to_planar_f64(&self) -> Vec<Vec<f64>> {
        (0..self.channels)
            .map(|ch| (0..self.frames).map(|i| self.sample(ch, i)).collect())
            .collect()
    }
}

fn silence_byte(ty: SampleType) -> u8 {
    match ty {
        SampleType::U8 => 0x80,
        _ => 0,
    }
}

pub(crate) fn read_sample(bytes: &[u8], ty: SampleType, index: usize) -> f64 {
    match ty {
        SampleType::U8 => (bytes[index] as f64 - 128.0) / 128.0,
        SampleType::S16 => {
            let o = index * 2;
            i16::from_ne_bytes([bytes[o], bytes[o + 1]]) as f64 / 32768.0
        }
        SampleType::S32 => {
            let o = index * 4;
            let v = i32::from_ne_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);
            v as f64 / 2_147_483_648.0
        }
        SampleType::F32 => {
            let o = index * 4;
            f32::from_ne_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]) as f64
        }
        SampleType::F64 => {
            let o = index * 8;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[o..o + 8]);
            f64::from_ne_bytes(raw)
        }
    }
}

pub(crate) fn write_sample(bytes: &mut [u8], ty: SampleType, index: usize, value: f64) {
    match ty {
        SampleType::U8 => {
            bytes[index] = ((value * 128.0).round() + 128.0).clamp(0.0, 255.0) as u8;
        }
        SampleType::S16 => {
            let v = (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            let o = index * 2;
            bytes[o..o + 2].copy_from_slice(&v.to_ne_bytes());
        }
        SampleType::S32 => {
            let v = (value * 2_147_483_648.0)
                .round()
                .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
            let o = index * 4;
            bytes[o..o + 4].copy_from_slice(&v.to_ne_bytes());
        }
        SampleType::F32 => {
            let o = index * 4;
            bytes[o..o + 4].copy_from_slice(&(value as f32).to_ne_bytes());
        }
        SampleType::F64 => {
            let o = index * 8;
            bytes[o..o + 8].copy_from_slice(&value.to_ne_bytes());
        }
    }
}
