//! Polyphase FIR rate conversion
//!
//! The stage keeps a carry buffer per channel, prefilled with `center` zeros
//! so that output 0 is aligned with input sample 0. The read position is an
//! exact rational `index + rem / den` advancing by `incr / den` input samples
//! per output. Nominally `den = out_rate` and `incr = in_rate`; compensation
//! scales both by the correction distance so positions stay exact.

use std::f64::consts::PI;

use tracing::debug;

use crate::audio::Element;
use crate::error::{Result, TranscodeError};
use crate::types::gcd;

use super::options::{FilterType, ResamplerOptions};

/// Coefficient table: `phase_count + 1` rows of `taps` coefficients each.
#[derive(Debug, Clone)]
pub struct FilterBank {
    pub taps: usize,
    pub center: usize,
    pub phase_count: usize,
    rows: Vec<Vec<f64>>,
}

/// Zeroth-order modified Bessel function of the first kind.
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > sum * 1e-16 {
        term *= (half / k) * (half / k);
        sum += term;
        k += 1.0;
    }
    sum
}

impl FilterBank {
    pub fn build(
        in_rate: u32,
        out_rate: u32,
        phase_count: usize,
        options: &ResamplerOptions,
    ) -> FilterBank {
        let factor = (out_rate as f64 * options.cutoff / in_rate as f64).min(options.cutoff);
        let taps = ((options.filter_size as f64 / factor).ceil() as usize).max(1);
        let center = (taps - 1) / 2;

        let mut rows = Vec::with_capacity(phase_count + 1);
        for ph in 0..=phase_count {
            let offset = ph as f64 / phase_count as f64;
            let mut row: Vec<f64> = (0..taps)
                .map(|i| {
                    let pos = (i as f64 - center as f64) - offset;
                    kernel(pos, factor, taps, options)
                })
                .collect();
            let norm: f64 = row.iter().sum();
            if norm.abs() > f64::EPSILON {
                row.iter_mut().for_each(|c| *c /= norm);
            }
            rows.push(row);
        }

        debug!(
            in_rate,
            out_rate,
            taps,
            phase_count,
            filter = ?options.filter_type,
            "built polyphase filter bank"
        );

        FilterBank {
            taps,
            center,
            phase_count,
            rows,
        }
    }

    pub fn row(&self, phase: usize) -> &[f64] {
        &self.rows[phase]
    }

    fn typed<T: Element>(&self) -> Vec<Vec<T::Coeff>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|&c| T::coeff(c)).collect())
            .collect()
    }
}

/// Kernel value at distance `pos` (in input samples) from the output instant.
fn kernel(pos: f64, factor: f64, taps: usize, options: &ResamplerOptions) -> f64 {
    match options.filter_type {
        FilterType::Cubic => {
            const D: f64 = -0.5;
            let x = (pos * factor).abs();
            if x < 1.0 {
                1.0 - 3.0 * x * x + 2.0 * x * x * x + D * (-x * x + x * x * x)
            } else if x < 2.0 {
                D * (-4.0 + 8.0 * x - 5.0 * x * x + x * x * x)
            } else {
                0.0
            }
        }
        FilterType::BlackmanNuttall | FilterType::Kaiser => {
            let x = PI * pos * factor;
            let sinc = if x == 0.0 { 1.0 } else { x.sin() / x };
            // w spans [-1, 1] across the filter length
            let w = 2.0 * pos / taps as f64;
            let window = if options.filter_type == FilterType::Kaiser {
                bessel_i0(options.kaiser_beta * (1.0 - w * w).max(0.0).sqrt())
            } else {
                let t = -(PI * w).cos();
                0.3635819 - 0.4891775 * t + 0.1365995 * (2.0 * t * t - 1.0)
                    - 0.0106411 * (4.0 * t * t * t - 3.0 * t)
            };
            sinc * window
        }
    }
}

/// Number of phases for a rate pair.
pub fn phase_count_for(in_rate: u32, out_rate: u32, options: &ResamplerOptions) -> usize {
    let full = 1usize << options.phase_shift;
    if options.exact_rational {
        let g = gcd(in_rate as u64, out_rate as u64).max(1);
        let exact = (out_rate as u64 / g) as usize;
        if exact <= full {
            return exact.max(1);
        }
    }
    full
}

#[derive(Debug, Clone, Copy)]
struct Compensation {
    remaining: u64,
    distance: i64,
}

/// Stateful rate converter over planar samples of type `T`.
#[derive(Debug)]
pub struct RateStage<T: Element> {
    in_rate: u32,
    out_rate: u32,
    options: ResamplerOptions,
    bank: Vec<Vec<T::Coeff>>,
    taps: usize,
    center: usize,
    phase_count: usize,
    buffers: Vec<Vec<T>>,
    /// Window start of the next output, in buffer coordinates
    index: usize,
    rem: i64,
    den: i64,
    incr: i64,
    /// One past the last real (non-padding) sample in the buffers
    valid_end: usize,
    compensation: Option<Compensation>,
}

impl<T: Element> RateStage<T> {
    pub fn new(
        channels: usize,
        in_rate: u32,
        out_rate: u32,
        phase_count: usize,
        options: &ResamplerOptions,
    ) -> Self {
        let bank = FilterBank::build(in_rate, out_rate, phase_count, options);
        let mut stage = RateStage {
            in_rate,
            out_rate,
            options: options.clone(),
            bank: bank.typed::<T>(),
            taps: bank.taps,
            center: bank.center,
            phase_count: bank.phase_count,
            buffers: vec![Vec::new(); channels],
            index: 0,
            rem: 0,
            den: out_rate as i64,
            incr: in_rate as i64,
            valid_end: 0,
            compensation: None,
        };
        stage.reset();
        stage
    }

    /// Return to the start-of-stream state, discarding carried input.
    pub fn reset(&mut self) {
        for buf in &mut self.buffers {
            buf.clear();
            buf.resize(self.center, T::default());
        }
        self.index = 0;
        self.rem = 0;
        self.valid_end = self.center;
        self.compensation = None;
        self.den = self.out_rate as i64;
        self.incr = self.in_rate as i64;
    }

    pub fn phase_count(&self) -> usize {
        self.phase_count
    }

    pub fn taps(&self) -> usize {
        self.taps
    }

    /// Rebuild the coefficient table with a different phase count, keeping
    /// the carried input and read position.
    pub fn set_phase_count(&mut self, phase_count: usize) {
        if phase_count == self.phase_count {
            return;
        }
        let bank = FilterBank::build(self.in_rate, self.out_rate, phase_count, &self.options);
        self.bank = bank.typed::<T>();
        self.phase_count = phase_count;
    }

    /// Spread `delta` extra output frames over the next `distance` outputs.
    pub fn set_compensation(&mut self, delta: i64, distance: i64) -> Result<()> {
        self.end_compensation();
        if delta == 0 {
            return Ok(());
        }
        if distance <= 0 {
            return Err(TranscodeError::config(
                "compensation distance must be positive for a non-zero delta",
            ));
        }
        if delta.abs() >= distance {
            return Err(TranscodeError::config(format!(
                "compensation of {} frames cannot be spread over {} frames",
                delta, distance
            )));
        }
        let full = 1usize << self.options.phase_shift;
        self.set_phase_count(full);
        self.rem *= distance;
        self.den *= distance;
        self.incr = self.in_rate as i64 * (distance - delta);
        self.compensation = Some(Compensation {
            remaining: distance as u64,
            distance,
        });
        Ok(())
    }

    fn end_compensation(&mut self) {
        if let Some(comp) = self.compensation.take() {
            // exact after a full span; a span cut short rounds to the nearest phase
            self.rem = (self.rem + comp.distance / 2) / comp.distance;
            self.den /= comp.distance;
            self.incr = self.in_rate as i64;
            if self.rem >= self.den {
                self.rem -= self.den;
                self.index += 1;
            }
        }
    }

    pub fn is_compensating(&self) -> bool {
        self.compensation.is_some()
    }

    /// Append input frames to the carry buffers.
    pub fn push(&mut self, input: &[Vec<T>], frames: usize) {
        for (buf, src) in self.buffers.iter_mut().zip(input) {
            buf.truncate(self.valid_end);
            buf.extend_from_slice(&src[..frames]);
        }
        self.valid_end += frames;
    }

    /// Input samples carried but not yet passed by the read position,
    /// as the fraction `(numerator, den)`.
    pub fn pending_input(&self) -> (i128, i128) {
        let whole = self.valid_end as i128 - self.center as i128 - self.index as i128;
        (whole * self.den as i128 - self.rem as i128, self.den as i128)
    }

    fn advance(&mut self) {
        self.rem += self.incr;
        self.index += (self.rem / self.den) as usize;
        self.rem %= self.den;
        if let Some(comp) = self.compensation.as_mut() {
            comp.remaining -= 1;
            if comp.remaining == 0 {
                self.end_compensation();
            }
        }
    }

    fn compute(&self, ch: usize) -> T {
        let window = &self.buffers[ch][self.index..self.index + self.taps];
        let scaled = self.rem as i128 * self.phase_count as i128;
        let phase = (scaled / self.den as i128) as usize;
        let acc = T::dot(window, &self.bank[phase]);
        if self.options.linear_interp {
            let frac = (scaled % self.den as i128) as i64;
            if frac != 0 {
                let next = T::dot(window, &self.bank[phase + 1]);
                return T::finish(T::lerp(acc, next, frac, self.den));
            }
        }
        T::finish(acc)
    }

    fn emit(&mut self, out: &mut [Vec<T>]) {
        for (ch, dst) in out.iter_mut().enumerate() {
            let v = self.compute(ch);
            dst.push(v);
        }
        self.advance();
    }

    /// Produce every output whose window is fully covered by carried input.
    pub fn process(&mut self, out: &mut [Vec<T>]) -> usize {
        let mut produced = 0;
        while self.index + self.taps <= self.valid_end {
            self.emit(out);
            produced += 1;
        }
        self.discard_consumed();
        produced
    }

    /// Produce the remaining outputs of the stream, padding with silence,
    /// then return to the start-of-stream state.
    pub fn flush(&mut self, out: &mut [Vec<T>]) -> usize {
        let mut produced = self.process(out);
        while self.index + self.center < self.valid_end {
            let need = self.index + self.taps;
            for buf in &mut self.buffers {
                if buf.len() < need {
                    buf.resize(need, T::default());
                }
            }
            self.emit(out);
            produced += 1;
        }
        self.reset();
        produced
    }

    fn discard_consumed(&mut self) {
        if self.index == 0 {
            return;
        }
        let drop = self.index.min(self.valid_end);
        for buf in &mut self.buffers {
            buf.drain(..drop.min(buf.len()));
        }
        self.index -= drop;
        self.valid_end -= drop;
    }

    /// Upper bound of outputs producible from the carried input plus `frames` more.
    pub fn outputs_for(&self, frames: usize) -> usize {
        let (pending, den) = self.pending_input();
        let total = pending + frames as i128 * den;
        if total <= 0 {
            return 0;
        }
        let per = self.incr as i128;
        ((total + per - 1) / per) as usize + 1
    }
}
