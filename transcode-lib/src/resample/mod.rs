//! Audio resampling, rematrixing and dithering
//!
//! A [`Resampler`] converts between two [`AudioSpec`]s. Conversion runs in a
//! planar working format chosen from both ends:
//!
//! - `s16p` when both ends are 8 or 16 bit integers,
//! - `dblp` when either end is 32 bit integer or double,
//! - `fltp` otherwise.
//!
//! Rate conversion only runs when the rates differ or timestamp compensation
//! has been requested. Dither is applied when the output is an integer format
//! with fewer bits than the input carries.

pub mod dither;
mod engine;
pub mod filter;
pub mod options;
pub mod rematrix;

pub use dither::Ditherer;
pub use options::{DitherMethod, FilterType, MatrixEncoding, ResamplerOptions};
pub use rematrix::{Matrix, MixStrategy};

use tracing::{debug, warn};

use crate::audio::{AudioSpec, ChannelLayout, SampleBuffer, SampleFormat, SampleType};
use crate::error::{Result, TranscodeError};

use engine::{Engine, Pipeline};
use filter::{phase_count_for, RateStage};
use rematrix::Mixer;

/// Stateful sample rate, format and channel layout converter
pub struct Resampler {
    input: AudioSpec,
    output: AudioSpec,
    options: ResamplerOptions,
    channel_map: Option<Vec<Option<usize>>>,
    custom_matrix: Option<Matrix>,
    matrix: Matrix,
    working: SampleType,
    resample_first: bool,
    engine: Engine,
    ditherer: Option<Ditherer>,
    scratch: Vec<Vec<f64>>,
    pending_drop: usize,
    pending_silence: usize,
    /// Next output timestamp in `1 / (in_rate * out_rate)` units
    out_pts: i64,
    first_pts: Option<i64>,
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("working", &self.working)
            .field("resample_first", &self.resample_first)
            .finish()
    }
}

fn working_type(input: SampleType, output: SampleType) -> SampleType {
    let wide = |t: SampleType| matches!(t, SampleType::S32 | SampleType::F64);
    let narrow_int = |t: SampleType| matches!(t, SampleType::U8 | SampleType::S16);
    if wide(input) || wide(output) {
        SampleType::F64
    } else if narrow_int(input) && narrow_int(output) {
        SampleType::S16
    } else {
        SampleType::F32
    }
}

impl Resampler {
    /// Create a configured resampler.
    pub fn new(input: AudioSpec, output: AudioSpec, options: ResamplerOptions) -> Result<Self> {
        let mut resampler = Resampler {
            input,
            output,
            options: options.clone(),
            channel_map: None,
            custom_matrix: None,
            matrix: Vec::new(),
            working: SampleType::F32,
            resample_first: false,
            engine: Engine::F32(Pipeline::new(None, 0, 0, None, None, false)),
            ditherer: None,
            scratch: Vec::new(),
            pending_drop: 0,
            pending_silence: 0,
            out_pts: 0,
            first_pts: None,
        };
        resampler.configure(input, output, options)?;
        Ok(resampler)
    }

    /// Validate the specs and rebuild matrix, filter bank and dither state.
    /// Any carried input is discarded.
    pub fn configure(
        &mut self,
        input: AudioSpec,
        output: AudioSpec,
        options: ResamplerOptions,
    ) -> Result<()> {
        input.validate("input")?;
        output.validate("output")?;
        options.validate()?;
        let options = options.effective(input.rate);

        let used_channels = match &self.channel_map {
            Some(map) => {
                if let Some(bad) = map.iter().flatten().find(|&&ch| ch >= input.channels()) {
                    return Err(TranscodeError::config(format!(
                        "channel map refers to input channel {} of {}",
                        bad,
                        input.channels()
                    )));
                }
                map.len()
            }
            None => input.channels(),
        };
        if used_channels == 0 {
            return Err(TranscodeError::config("channel map selects no channels"));
        }

        let matrix = match &self.custom_matrix {
            Some(m) => {
                check_matrix_shape(m, output.channels(), used_channels)?;
                m.clone()
            }
            None => {
                let used_layout = if used_channels == input.channels() {
                    input.layout
                } else {
                    ChannelLayout::unspecified(used_channels as u16)
                };
                let mut m = rematrix::build_matrix(&used_layout, &output.layout, &options)?;
                let maxval = if options.rematrix_maxval > 0.0 {
                    options.rematrix_maxval
                } else if output.format.sample.is_float() {
                    f64::MAX
                } else {
                    1.0
                };
                rematrix::normalize(&mut m, options.rematrix_volume, maxval);
                m
            }
        };

        let working = working_type(input.format.sample, output.format.sample);
        let resample_first = (output.channels() as f64 / used_channels as f64 - 1.0)
            < (output.rate as f64 / input.rate as f64 - 1.0);
        let rate_channels = if resample_first {
            used_channels
        } else {
            output.channels()
        };
        let needs_rate = input.rate != output.rate;
        let phases = phase_count_for(input.rate, output.rate, &options);
        let mix = !rematrix::is_identity(&matrix) || used_channels != output.channels();

        macro_rules! pipeline {
            ($t:ty) => {
                Pipeline::<$t>::new(
                    self.channel_map.clone(),
                    used_channels,
                    output.channels(),
                    mix.then(|| Mixer::new(&matrix)),
                    needs_rate.then(|| {
                        RateStage::new(rate_channels, input.rate, output.rate, phases, &options)
                    }),
                    resample_first,
                )
            };
        }
        let engine = match working {
            SampleType::S16 => Engine::S16(pipeline!(i16)),
            SampleType::F64 => Engine::F64(pipeline!(f64)),
            _ => Engine::F32(pipeline!(f32)),
        };

        let ditherer = match (output.format.sample.integer_bits(), options.dither_method) {
            (_, DitherMethod::None) | (None, _) => None,
            (Some(out_bits), method) => {
                let precision = input.format.sample.integer_bits().unwrap_or(64);
                (out_bits < precision).then(|| {
                    Ditherer::new(
                        method,
                        output.channels(),
                        output.rate,
                        options.dither_seed,
                        options.dither_scale,
                    )
                })
            }
        };

        debug!(
            input = %input,
            output = %output,
            working = ?working,
            resample_first,
            rate_conversion = needs_rate,
            rematrix = mix,
            dither = ditherer.is_some(),
            "configured resampler"
        );

        self.input = input;
        self.output = output;
        self.options = options;
        self.matrix = matrix;
        self.working = working;
        self.resample_first = resample_first;
        self.engine = engine;
        self.ditherer = ditherer;
        self.pending_drop = 0;
        self.pending_silence = 0;
        self.out_pts = 0;
        self.first_pts = None;
        Ok(())
    }

    pub fn input_spec(&self) -> &AudioSpec {
        &self.input
    }

    pub fn output_spec(&self) -> &AudioSpec {
        &self.output
    }

    pub fn options(&self) -> &ResamplerOptions {
        &self.options
    }

    /// The planar format conversion runs in.
    pub fn working_format(&self) -> SampleFormat {
        SampleFormat::planar(self.working)
    }

    /// Whether rate conversion runs before channel mixing.
    pub fn resample_first(&self) -> bool {
        self.resample_first
    }

    /// The effective `out × used_in` mixing matrix.
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// The dither method in effect, if dithering applies to this conversion.
    pub fn dither_method(&self) -> Option<DitherMethod> {
        self.ditherer.as_ref().map(Ditherer::method)
    }

    /// Select (or with `None` mute) an input channel for every used channel.
    /// Rebuilds the conversion state.
    pub fn set_channel_map(&mut self, map: Option<Vec<Option<usize>>>) -> Result<()> {
        let previous = std::mem::replace(&mut self.channel_map, map);
        let result = self.configure(self.input, self.output, self.options.clone());
        if result.is_err() {
            self.channel_map = previous;
        }
        result
    }

    /// Replace the automatic matrix with `matrix` (`out × used_in`).
    pub fn set_matrix(&mut self, matrix: Matrix) -> Result<()> {
        let used = self
            .channel_map
            .as_ref()
            .map(Vec::len)
            .unwrap_or(self.input.channels());
        check_matrix_shape(&matrix, self.output.channels(), used)?;
        self.engine.set_matrix(Some(&matrix));
        self.matrix = matrix.clone();
        self.custom_matrix = Some(matrix);
        Ok(())
    }

    /// True when the conversion is a plain copy.
    pub fn is_passthrough(&self) -> bool {
        self.input == self.output
            && self.channel_map.is_none()
            && self.custom_matrix.is_none()
            && !self.engine.has_rate_stage()
            && self.pending_drop == 0
            && self.pending_silence == 0
            && self.engine.ready_frames() == 0
    }

    /// Upper bound of frames the next `convert` call can return for `input_frames` more input.
    pub fn output_frames_for(&self, input_frames: usize) -> usize {
        self.engine.outputs_for(input_frames) + self.pending_silence
    }

    /// Convert `input_frames` frames of `input` into `output`.
    ///
    /// `None` (or zero frames) flushes carried samples; once everything has
    /// been returned a flush yields 0. Frames that do not fit into
    /// `output_capacity` are kept for the next call.
    pub fn convert(
        &mut self,
        input: Option<&SampleBuffer>,
        input_frames: usize,
        output: &mut SampleBuffer,
        output_capacity: usize,
    ) -> Result<usize> {
        if output.format() != self.output.format || output.channels() != self.output.channels() {
            return Err(TranscodeError::config(format!(
                "output buffer is {} x{}, expected {}",
                output.format(),
                output.channels(),
                self.output
            )));
        }
        let input = match input {
            Some(buf) if input_frames > 0 => {
                if buf.format() != self.input.format || buf.channels() != self.input.channels() {
                    return Err(TranscodeError::config(format!(
                        "input buffer is {} x{}, expected {}",
                        buf.format(),
                        buf.channels(),
                        self.input
                    )));
                }
                if input_frames > buf.frames() {
                    return Err(TranscodeError::config(format!(
                        "{} input frames requested from a buffer of {}",
                        input_frames,
                        buf.frames()
                    )));
                }
                Some(buf)
            }
            _ => None,
        };

        if output_capacity == 0 {
            let (carried, _) = self.engine.pending_input();
            if input.is_some()
                || carried > 0
                || self.engine.ready_frames() > 0
                || self.pending_silence > 0
            {
                return Err(TranscodeError::BufferOverflow(
                    "output capacity of zero frames with samples pending".to_string(),
                ));
            }
            output.set_frames(0)?;
            return Ok(0);
        }
        output.reserve(output_capacity);

        let produced = match input {
            Some(buf) if self.is_passthrough() && output_capacity >= input_frames => {
                output.copy_frames_from(buf, 0, 0, input_frames)?;
                output.set_frames(input_frames)?;
                input_frames
            }
            Some(buf) => {
                self.engine.ingest(buf, input_frames);
                self.deliver(output, output_capacity)?
            }
            None => {
                self.engine.flush();
                self.deliver(output, output_capacity)?
            }
        };

        self.out_pts += produced as i64 * self.input.rate as i64;
        Ok(produced)
    }

    /// Flush carried samples into `output`.
    pub fn flush(&mut self, output: &mut SampleBuffer, output_capacity: usize) -> Result<usize> {
        self.convert(None, 0, output, output_capacity)
    }

    fn deliver(&mut self, output: &mut SampleBuffer, capacity: usize) -> Result<usize> {
        if self.pending_drop > 0 {
            let dropped = self.engine.drop_ready(self.pending_drop);
            self.pending_drop -= dropped;
        }
        let silence = self.pending_silence.min(capacity);
        let converted = self.engine.ready_frames().min(capacity - silence);
        let total = silence + converted;

        let channels = self.output.channels();
        self.scratch.resize_with(channels, Vec::new);
        for plane in &mut self.scratch {
            plane.clear();
            plane.resize(total, 0.0);
        }
        self.engine.take(converted, &mut self.scratch, silence);
        if let (Some(ditherer), Some(bits)) =
            (self.ditherer.as_mut(), self.output.format.sample.integer_bits())
        {
            ditherer.apply(&mut self.scratch, total, bits);
        }
        for (ch, plane) in self.scratch.iter().enumerate() {
            for (i, &v) in plane.iter().enumerate() {
                output.set_sample(ch, i, v);
            }
        }
        output.set_frames(total)?;
        self.pending_silence -= silence;
        Ok(total)
    }

    /// Buffered plus filter delay in `1 / base` seconds, rounded to nearest.
    pub fn delay(&self, base: i64) -> i64 {
        let (num, den) = self.engine.pending_input();
        let waiting = (self.engine.ready_frames() + self.pending_silence) as i128;
        let in_rate = self.input.rate as i128;
        let out_rate = self.output.rate as i128;
        let n = base as i128 * (num * out_rate + waiting * den * in_rate);
        let d = den * in_rate * out_rate;
        let rounded = if n >= 0 { (n + d / 2) / d } else { (n - d / 2) / d };
        rounded as i64
    }

    /// Spread `sample_delta` extra output frames over the next `distance` output frames.
    pub fn set_compensation(&mut self, sample_delta: i64, distance: i64) -> Result<()> {
        if sample_delta != 0 && distance <= 0 {
            return Err(TranscodeError::config(format!(
                "compensation of {} frames needs a positive distance",
                sample_delta
            )));
        }
        self.engine.set_compensation(
            sample_delta,
            distance,
            self.input.rate,
            self.output.rate,
            &self.options,
        )
    }

    pub fn is_compensating(&self) -> bool {
        self.engine.is_compensating()
    }

    /// Discard the next `frames` output frames.
    pub fn drop_output(&mut self, frames: usize) {
        self.pending_drop += frames;
    }

    /// Emit `frames` frames of silence before the next converted output.
    pub fn inject_silence(&mut self, frames: usize) {
        self.pending_silence += frames;
    }

    /// Output timestamp (in `1 / (in_rate * out_rate)` units) of the next
    /// output frame, given the timestamp of the next input frame in the same
    /// units. With compensation enabled, drift between the two is corrected.
    /// `None` returns the current output timestamp.
    pub fn next_output_timestamp(&mut self, input_pts: Option<i64>) -> i64 {
        let Some(pts) = input_pts else {
            return self.out_pts;
        };
        let in_rate = self.input.rate as i64;
        let base = in_rate * self.output.rate as i64;
        if self.first_pts.is_none() {
            self.out_pts = pts;
            self.first_pts = Some(pts);
        }
        let delay = self.delay(base);

        if !self.options.compensation_enabled() {
            self.out_pts = pts - delay;
            return self.out_pts;
        }

        let delta = pts - delay - self.out_pts + self.pending_drop as i64 * in_rate;
        let fdelta = delta as f64 / base as f64;
        if fdelta.abs() > self.options.min_compensation {
            let at_start = Some(self.out_pts) == self.first_pts;
            if at_start || fdelta.abs() > self.options.min_hard_compensation {
                if delta > 0 {
                    let frames = (delta / in_rate) as usize;
                    debug!(frames, drift = fdelta, "injecting silence");
                    self.inject_silence(frames);
                } else {
                    let frames = (-delta / in_rate) as usize;
                    debug!(frames, drift = fdelta, "dropping output");
                    self.drop_output(frames);
                }
            } else if self.options.soft_compensation_duration > 0.0
                && self.options.max_soft_compensation != 0.0
            {
                let duration =
                    (self.output.rate as f64 * self.options.soft_compensation_duration) as i64;
                let max_soft = if self.options.max_soft_compensation < 0.0 {
                    -self.options.max_soft_compensation / self.input.rate as f64
                } else {
                    self.options.max_soft_compensation
                };
                let comp = (fdelta.clamp(-max_soft, max_soft) * duration as f64) as i64;
                debug!(drift = fdelta, comp, duration, "compensating timestamp drift");
                if let Err(e) = self.set_compensation(comp, duration) {
                    warn!(error = %e, "failed to set drift compensation");
                }
            }
        }
        self.out_pts
    }
}

fn check_matrix_shape(matrix: &Matrix, rows: usize, cols: usize) -> Result<()> {
    if matrix.len() != rows || matrix.iter().any(|row| row.len() != cols) {
        return Err(TranscodeError::config(format!(
            "mixing matrix must be {} x {}",
            rows, cols
        )));
    }
    Ok(())
}
