//! Typed conversion pipeline
//!
//! Input is decoded into planar working samples, then mixed and rate
//! converted in the configured order. Finished output frames wait in a
//! per-channel queue until the caller provides room for them.

use std::collections::VecDeque;

use crate::audio::{Element, SampleBuffer};
use crate::error::Result;

use super::filter::RateStage;
use super::options::ResamplerOptions;
use super::rematrix::{Matrix, Mixer};

pub(crate) struct Pipeline<T: Element> {
    channel_map: Option<Vec<Option<usize>>>,
    used_channels: usize,
    out_channels: usize,
    mixer: Option<Mixer<T>>,
    rate: Option<RateStage<T>>,
    resample_first: bool,
    ready: Vec<VecDeque<T>>,
    decoded: Vec<Vec<T>>,
    stage_a: Vec<Vec<T>>,
    stage_b: Vec<Vec<T>>,
}

fn clear_planes<T>(planes: &mut Vec<Vec<T>>, channels: usize) {
    planes.resize_with(channels, Vec::new);
    planes.iter_mut().for_each(Vec::clear);
}

impl<T: Element> Pipeline<T> {
    pub fn new(
        channel_map: Option<Vec<Option<usize>>>,
        used_channels: usize,
        out_channels: usize,
        mixer: Option<Mixer<T>>,
        rate: Option<RateStage<T>>,
        resample_first: bool,
    ) -> Self {
        Self {
            channel_map,
            used_channels,
            out_channels,
            mixer,
            rate,
            resample_first,
            ready: vec![VecDeque::new(); out_channels],
            decoded: Vec::new(),
            stage_a: Vec::new(),
            stage_b: Vec::new(),
        }
    }

    /// Channel count seen by the rate stage.
    pub fn rate_channels(&self) -> usize {
        if self.resample_first {
            self.used_channels
        } else {
            self.out_channels
        }
    }

    pub fn set_mixer(&mut self, mixer: Option<Mixer<T>>) {
        self.mixer = mixer;
    }

    pub fn rate_stage(&self) -> Option<&RateStage<T>> {
        self.rate.as_ref()
    }

    /// Start (or cancel) gradual compensation, creating a rate stage at the
    /// full phase count when the rates are equal.
    pub fn set_compensation(
        &mut self,
        delta: i64,
        distance: i64,
        in_rate: u32,
        out_rate: u32,
        options: &ResamplerOptions,
    ) -> Result<()> {
        if self.rate.is_none() {
            if delta == 0 {
                return Ok(());
            }
            let full = 1usize << options.phase_shift;
            self.rate = Some(RateStage::new(
                self.rate_channels(),
                in_rate,
                out_rate,
                full,
                options,
            ));
        }
        match self.rate.as_mut() {
            Some(rate) => rate.set_compensation(delta, distance),
            None => Ok(()),
        }
    }

    fn decode(&mut self, input: &SampleBuffer, frames: usize) {
        clear_planes(&mut self.decoded, self.used_channels);
        for (ch, plane) in self.decoded.iter_mut().enumerate() {
            let source = match &self.channel_map {
                Some(map) => map.get(ch).copied().flatten(),
                None => Some(ch),
            };
            match source {
                Some(src) => {
                    plane.extend((0..frames).map(|i| T::from_normalized(input.sample(src, i))))
                }
                None => plane.resize(frames, T::default()),
            }
        }
    }

    fn mix(mixer: &Option<Mixer<T>>, input: &[Vec<T>], frames: usize, out: &mut Vec<Vec<T>>, channels: usize) {
        clear_planes(out, channels);
        match mixer {
            Some(mixer) => mixer.mix(input, frames, out),
            None => {
                for (dst, src) in out.iter_mut().zip(input) {
                    dst.extend_from_slice(&src[..frames]);
                }
            }
        }
    }

    fn enqueue(ready: &mut [VecDeque<T>], planes: &[Vec<T>], frames: usize) {
        for (queue, plane) in ready.iter_mut().zip(planes) {
            queue.extend(&plane[..frames]);
        }
    }

    /// Convert `frames` frames of `input` into the ready queue.
    pub fn ingest(&mut self, input: &SampleBuffer, frames: usize) {
        self.decode(input, frames);
        let out_channels = self.out_channels;
        match self.rate.as_mut() {
            None => {
                Self::mix(&self.mixer, &self.decoded, frames, &mut self.stage_a, out_channels);
                Self::enqueue(&mut self.ready, &self.stage_a, frames);
            }
            Some(rate) if self.resample_first => {
                rate.push(&self.decoded, frames);
                clear_planes(&mut self.stage_a, self.used_channels);
                let n = rate.process(&mut self.stage_a);
                Self::mix(&self.mixer, &self.stage_a, n, &mut self.stage_b, out_channels);
                Self::enqueue(&mut self.ready, &self.stage_b, n);
            }
            Some(rate) => {
                Self::mix(&self.mixer, &self.decoded, frames, &mut self.stage_a, out_channels);
                rate.push(&self.stage_a, frames);
                clear_planes(&mut self.stage_b, out_channels);
                let n = rate.process(&mut self.stage_b);
                Self::enqueue(&mut self.ready, &self.stage_b, n);
            }
        }
    }

    /// Drain the rate stage into the ready queue.
    pub fn flush(&mut self) {
        let out_channels = self.out_channels;
        let Some(rate) = self.rate.as_mut() else {
            return;
        };
        if self.resample_first {
            clear_planes(&mut self.stage_a, self.used_channels);
            let n = rate.flush(&mut self.stage_a);
            Self::mix(&self.mixer, &self.stage_a, n, &mut self.stage_b, out_channels);
            Self::enqueue(&mut self.ready, &self.stage_b, n);
        } else {
            clear_planes(&mut self.stage_b, out_channels);
            let n = rate.flush(&mut self.stage_b);
            Self::enqueue(&mut self.ready, &self.stage_b, n);
        }
    }

    pub fn ready_frames(&self) -> usize {
        self.ready.first().map(VecDeque::len).unwrap_or(0)
    }

    /// Discard up to `frames` ready frames, returning how many were dropped.
    pub fn drop_ready(&mut self, frames: usize) -> usize {
        let n = frames.min(self.ready_frames());
        for queue in &mut self.ready {
            queue.drain(..n);
        }
        n
    }

    /// Move `frames` ready frames into `dst` starting at `offset`, as normalized values.
    pub fn take(&mut self, frames: usize, dst: &mut [Vec<f64>], offset: usize) {
        for (queue, plane) in self.ready.iter_mut().zip(dst.iter_mut()) {
            for (slot, v) in plane[offset..offset + frames]
                .iter_mut()
                .zip(queue.drain(..frames))
            {
                *slot = v.to_normalized();
            }
        }
    }

    /// Carried input not yet converted, as a fraction of input samples.
    pub fn pending_input(&self) -> (i128, i128) {
        self.rate
            .as_ref()
            .map(RateStage::pending_input)
            .unwrap_or((0, 1))
    }

    pub fn outputs_for(&self, frames: usize) -> usize {
        let converted = match &self.rate {
            Some(rate) => rate.outputs_for(frames),
            None => frames,
        };
        converted + self.ready_frames()
    }
}

/// A pipeline specialized for the working format.
pub(crate) enum Engine {
    S16(Pipeline<i16>),
    F32(Pipeline<f32>),
    F64(Pipeline<f64>),
}

macro_rules! dispatch {
    ($engine:expr, $p:ident => $body:expr) => {
        match $engine {
            Engine::S16($p) => $body,
            Engine::F32($p) => $body,
            Engine::F64($p) => $body,
        }
    };
}

impl Engine {
    pub fn ingest(&mut self, input: &SampleBuffer, frames: usize) {
        dispatch!(self, p => p.ingest(input, frames))
    }

    pub fn flush(&mut self) {
        dispatch!(self, p => p.flush())
    }

    pub fn ready_frames(&self) -> usize {
        dispatch!(self, p => p.ready_frames())
    }

    pub fn drop_ready(&mut self, frames: usize) -> usize {
        dispatch!(self, p => p.drop_ready(frames))
    }

    pub fn take(&mut self, frames: usize, dst: &mut [Vec<f64>], offset: usize) {
        dispatch!(self, p => p.take(frames, dst, offset))
    }

    pub fn pending_input(&self) -> (i128, i128) {
        dispatch!(self, p => p.pending_input())
    }

    pub fn outputs_for(&self, frames: usize) -> usize {
        dispatch!(self, p => p.outputs_for(frames))
    }

    pub fn has_rate_stage(&self) -> bool {
        dispatch!(self, p => p.rate_stage().is_some())
    }

    pub fn is_compensating(&self) -> bool {
        dispatch!(self, p => p.rate_stage().map(RateStage::is_compensating).unwrap_or(false))
    }

    pub fn set_compensation(
        &mut self,
        delta: i64,
        distance: i64,
        in_rate: u32,
        out_rate: u32,
        options: &ResamplerOptions,
    ) -> Result<()> {
        dispatch!(self, p => p.set_compensation(delta, distance, in_rate, out_rate, options))
    }

    pub fn set_matrix(&mut self, matrix: Option<&Matrix>) {
        match self {
            Engine::S16(p) => p.set_mixer(matrix.map(Mixer::new)),
            Engine::F32(p) => p.set_mixer(matrix.map(Mixer::new)),
            Engine::F64(p) => p.set_mixer(matrix.map(Mixer::new)),
        }
    }
}
