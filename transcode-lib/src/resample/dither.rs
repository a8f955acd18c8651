//! Dithering and noise shaping
//!
//! Samples are normalized floats; one LSB of a `bits`-wide output is
//! `2^-(bits-1)`. Noise comes from a per-channel table generated once from the
//! seed and read at a position that persists across calls, so the output only
//! depends on the seed and the samples fed so far, not on how they were split.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use super::options::DitherMethod;

/// Noise table length per channel
pub const NOISE_TABLE_LEN: usize = 1 << 13;

/// Shaping filter and the output rate it was designed for
struct ShapingFilter {
    rate: u32,
    coeffs: &'static [f64],
}

const LIPSHITZ_44: ShapingFilter = ShapingFilter {
    rate: 44100,
    coeffs: &[2.033, -2.165, 1.959, -1.590, 0.6149],
};

const F_WEIGHTED_44: ShapingFilter = ShapingFilter {
    rate: 46000,
    coeffs: &[
        2.412, -3.370, 3.937, -4.174, 3.353, -2.205, 1.281, -0.569, 0.0847,
    ],
};

const MODIFIED_E_WEIGHTED_44: ShapingFilter = ShapingFilter {
    rate: 46000,
    coeffs: &[
        1.662, -1.263, 0.4827, -0.2913, 0.1268, -0.1124, 0.03252, -0.01265, -0.03524,
    ],
};

const IMPROVED_E_WEIGHTED_44: ShapingFilter = ShapingFilter {
    rate: 46000,
    coeffs: &[
        2.847, -4.685, 6.214, -7.184, 6.639, -5.032, 3.263, -1.632, 0.4191,
    ],
};

fn shaping_filter(method: DitherMethod) -> Option<&'static ShapingFilter> {
    match method {
        DitherMethod::NsLipshitz => Some(&LIPSHITZ_44),
        DitherMethod::NsFWeighted => Some(&F_WEIGHTED_44),
        DitherMethod::NsModifiedEWeighted => Some(&MODIFIED_E_WEIGHTED_44),
        DitherMethod::NsImprovedEWeighted => Some(&IMPROVED_E_WEIGHTED_44),
        _ => None,
    }
}

struct NoiseShaper {
    coeffs: &'static [f64],
    /// Per channel: the last `taps` errors, stored twice so a window never wraps
    errors: Vec<Vec<f64>>,
    pos: usize,
}

pub struct Ditherer {
    method: DitherMethod,
    noise: Vec<Vec<f64>>,
    noise_pos: usize,
    shaper: Option<NoiseShaper>,
}

impl std::fmt::Debug for Ditherer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ditherer")
            .field("method", &self.method)
            .field("noise_pos", &self.noise_pos)
            .finish()
    }
}

fn uniform(rng: &mut StdRng) -> f64 {
    rng.gen::<f64>() - 0.5
}

fn noise_table(method: DitherMethod, seed: u64, scale: f64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut table: Vec<f64> = match method {
        DitherMethod::None => vec![0.0; NOISE_TABLE_LEN],
        DitherMethod::Rectangular => (0..NOISE_TABLE_LEN).map(|_| uniform(&mut rng)).collect(),
        DitherMethod::TriangularHighpass => {
            let u: Vec<f64> = (0..NOISE_TABLE_LEN).map(|_| uniform(&mut rng)).collect();
            (0..NOISE_TABLE_LEN)
                .map(|i| u[i] - u[(i + NOISE_TABLE_LEN - 1) % NOISE_TABLE_LEN])
                .collect()
        }
        // triangular, also used under the noise shapers
        _ => (0..NOISE_TABLE_LEN)
            .map(|_| uniform(&mut rng) + uniform(&mut rng))
            .collect(),
    };
    table.iter_mut().for_each(|v| *v *= scale);
    table
}

impl Ditherer {
    /// Create a ditherer for `channels` channels at `rate`.
    pub fn new(
        method: DitherMethod,
        channels: usize,
        rate: u32,
        seed: u64,
        scale: f64,
    ) -> Self {
        let mut method = method;
        let mut shaper = None;
        if let Some(filter) = shaping_filter(method) {
            let mismatch = (rate as f64 - filter.rate as f64).abs() / filter.rate as f64;
            if mismatch > 0.05 {
                warn!(
                    ?method,
                    rate,
                    nominal_rate = filter.rate,
                    "noise shaping filter does not fit the output rate, using triangular highpass dither"
                );
                method = DitherMethod::TriangularHighpass;
            } else {
                shaper = Some(NoiseShaper {
                    coeffs: filter.coeffs,
                    errors: vec![vec![0.0; 2 * filter.coeffs.len()]; channels],
                    pos: 0,
                });
            }
        }

        let noise = (0..channels)
            .map(|ch| noise_table(method, seed ^ ch as u64, scale))
            .collect();

        Self {
            method,
            noise,
            noise_pos: 0,
            shaper,
        }
    }

    /// The method in effect after any rate fallback.
    pub fn method(&self) -> DitherMethod {
        self.method
    }

    pub fn noise_pos(&self) -> usize {
        self.noise_pos
    }

    /// Dither `frames` samples of every plane in place for quantization to
    /// `output_bit_depth` bits.
    pub fn apply(&mut self, planes: &mut [Vec<f64>], frames: usize, output_bit_depth: u32) {
        if self.method == DitherMethod::None || frames == 0 {
            return;
        }
        let lsb = 1.0 / (1u64 << (output_bit_depth.clamp(1, 64) - 1)) as f64;
        let start = self.noise_pos;
        match self.shaper.as_mut() {
            None => {
                for (plane, noise) in planes.iter_mut().zip(&self.noise) {
                    for (i, sample) in plane[..frames].iter_mut().enumerate() {
                        *sample += noise[(start + i) % NOISE_TABLE_LEN] * lsb;
                    }
                }
            }
            Some(shaper) => {
                let taps = shaper.coeffs.len();
                let mut end_pos = shaper.pos;
                for ((plane, noise), errors) in planes
                    .iter_mut()
                    .zip(&self.noise)
                    .zip(shaper.errors.iter_mut())
                {
                    let mut pos = shaper.pos;
                    for (i, sample) in plane[..frames].iter_mut().enumerate() {
                        let mut d = *sample / lsb;
                        for (j, c) in shaper.coeffs.iter().enumerate() {
                            d -= c * errors[pos + j];
                        }
                        pos = if pos == 0 { taps - 1 } else { pos - 1 };
                        let q = (d + noise[(start + i) % NOISE_TABLE_LEN]).round();
                        errors[pos] = q - d;
                        errors[pos + taps] = q - d;
                        *sample = q * lsb;
                    }
                    end_pos = pos;
                }
                shaper.pos = end_pos;
            }
        }
        self.noise_pos = (start + frames) % NOISE_TABLE_LEN;
    }
}
