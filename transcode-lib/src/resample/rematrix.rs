//! Channel rematrixing
//!
//! The mixing matrix is `out × in` gains. Automatic matrices fold the input
//! layout onto the output layout with the usual surround downmix rules; the
//! resulting rows are compiled into per-output-channel [`MixStrategy`] values
//! over the non-zero gains only.

use std::f64::consts::{FRAC_1_SQRT_2, SQRT_2};

use crate::audio::{Channel, ChannelLayout, Element};
use crate::error::{Result, TranscodeError};

use super::options::{MatrixEncoding, ResamplerOptions};

const SQRT3_2: f64 = 0.866_025_403_784_438_6;

const FL: usize = Channel::FrontLeft.index();
const FR: usize = Channel::FrontRight.index();
const FC: usize = Channel::FrontCenter.index();
const LFE: usize = Channel::LowFrequency.index();
const BL: usize = Channel::BackLeft.index();
const BR: usize = Channel::BackRight.index();
const FLC: usize = Channel::FrontLeftOfCenter.index();
const FRC: usize = Channel::FrontRightOfCenter.index();
const BC: usize = Channel::BackCenter.index();
const SL: usize = Channel::SideLeft.index();
const SR: usize = Channel::SideRight.index();

const BITS: usize = 64;

pub type Matrix = Vec<Vec<f64>>;

/// Map downmix positions onto the front pair.
fn normalize_position(ch: Channel) -> Channel {
    match ch {
        Channel::StereoLeft => Channel::FrontLeft,
        Channel::StereoRight => Channel::FrontRight,
        other => other,
    }
}

fn normalized_positions(layout: &ChannelLayout) -> Vec<usize> {
    layout
        .positions()
        .into_iter()
        .map(|ch| normalize_position(ch).index())
        .collect()
}

fn mask_of(positions: &[usize]) -> u64 {
    positions.iter().fold(0u64, |m, &p| m | (1u64 << p))
}

fn has(mask: u64, pos: usize) -> bool {
    mask & (1u64 << pos) != 0
}

fn has_pair(mask: u64, a: usize, b: usize) -> bool {
    has(mask, a) && has(mask, b)
}

fn identity(n: usize) -> Matrix {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

pub fn is_identity(matrix: &Matrix) -> bool {
    matrix.iter().enumerate().all(|(i, row)| {
        row.len() == matrix.len()
            && row
                .iter()
                .enumerate()
                .all(|(j, &g)| g == if i == j { 1.0 } else { 0.0 })
    })
}

fn unmixable(input: &ChannelLayout, output: &ChannelLayout, what: &str) -> TranscodeError {
    TranscodeError::config(format!(
        "cannot mix {} into {} automatically: no destination for {}",
        input, output, what
    ))
}

/// Build the automatic `out × in` matrix for a layout pair.
pub fn build_matrix(
    input: &ChannelLayout,
    output: &ChannelLayout,
    options: &ResamplerOptions,
) -> Result<Matrix> {
    if !input.is_specified() || !output.is_specified() {
        if input.channels() == output.channels() {
            return Ok(identity(input.channels()));
        }
        return Err(TranscodeError::config(format!(
            "cannot mix {} channels into {} without a channel layout",
            input.channels(),
            output.channels()
        )));
    }

    for layout in [input, output] {
        if layout.unknown_positions() != 0 {
            return Err(unmixable(input, output, "unknown channel positions"));
        }
    }

    let in_pos = normalized_positions(input);
    let out_pos = normalized_positions(output);
    let in_mask = mask_of(&in_pos);
    let out_mask = mask_of(&out_pos);

    let mut m = vec![[0.0f64; BITS]; BITS];
    for (i, row) in m.iter_mut().enumerate() {
        if has(in_mask, i) && has(out_mask, i) {
            row[i] = 1.0;
        }
    }

    let unaccounted = in_mask & !out_mask;
    let (clev, slev, lfe) = (options.clev, options.slev, options.lfe_mix_level);
    let encoding = options.matrix_encoding;

    if has(unaccounted, FC) {
        if has_pair(out_mask, FL, FR) {
            let gain = if has_pair(in_mask, FL, FR) {
                clev
            } else if in_mask == 1u64 << FC {
                // mono is duplicated at full level
                1.0
            } else {
                FRAC_1_SQRT_2
            };
            m[FL][FC] += gain;
            m[FR][FC] += gain;
        } else {
            return Err(unmixable(input, output, "front center"));
        }
    }

    if has(unaccounted, FL) || has(unaccounted, FR) {
        if has(out_mask, FC) {
            m[FC][FL] += FRAC_1_SQRT_2;
            m[FC][FR] += FRAC_1_SQRT_2;
            if has(in_mask, FC) {
                m[FC][FC] = clev * SQRT_2;
            }
        } else {
            return Err(unmixable(input, output, "front left/right"));
        }
    }

    if has(unaccounted, BC) {
        if has_pair(out_mask, BL, BR) {
            m[BL][BC] += FRAC_1_SQRT_2;
            m[BR][BC] += FRAC_1_SQRT_2;
        } else if has_pair(out_mask, SL, SR) {
            m[SL][BC] += FRAC_1_SQRT_2;
            m[SR][BC] += FRAC_1_SQRT_2;
        } else if has_pair(out_mask, FL, FR) {
            match encoding {
                MatrixEncoding::Dolby | MatrixEncoding::DplII => {
                    if has(unaccounted, BL) || has(unaccounted, SL) {
                        m[FL][BC] -= slev * FRAC_1_SQRT_2;
                        m[FR][BC] += slev * FRAC_1_SQRT_2;
                    } else {
                        m[FL][BC] -= slev;
                        m[FR][BC] += slev;
                    }
                }
                MatrixEncoding::None => {
                    m[FL][BC] += slev * FRAC_1_SQRT_2;
                    m[FR][BC] += slev * FRAC_1_SQRT_2;
                }
            }
        } else if has(out_mask, FC) {
            m[FC][BC] += slev * FRAC_1_SQRT_2;
        } else {
            return Err(unmixable(input, output, "back center"));
        }
    }

    for (left, right, name) in [(BL, BR, "back left/right"), (SL, SR, "side left/right")] {
        if !(has(unaccounted, left) || has(unaccounted, right)) {
            continue;
        }
        // the other surround pair, if the output carries it
        let (alt_l, alt_r) = if left == BL { (SL, SR) } else { (BL, BR) };
        // back channels prefer the back center, side channels the back pair
        if left == BL && has(out_mask, BC) {
            m[BC][left] += FRAC_1_SQRT_2;
            m[BC][right] += FRAC_1_SQRT_2;
        } else if has_pair(out_mask, alt_l, alt_r) {
            let gain = if has(in_mask, alt_l) {
                FRAC_1_SQRT_2
            } else {
                1.0
            };
            m[alt_l][left] += gain;
            m[alt_r][right] += gain;
        } else if has(out_mask, BC) {
            m[BC][left] += FRAC_1_SQRT_2;
            m[BC][right] += FRAC_1_SQRT_2;
        } else if has_pair(out_mask, FL, FR) {
            match encoding {
                MatrixEncoding::Dolby => {
                    m[FL][left] -= slev * FRAC_1_SQRT_2;
                    m[FL][right] -= slev * FRAC_1_SQRT_2;
                    m[FR][left] += slev * FRAC_1_SQRT_2;
                    m[FR][right] += slev * FRAC_1_SQRT_2;
                }
                MatrixEncoding::DplII => {
                    m[FL][left] -= slev * SQRT3_2;
                    m[FL][right] -= slev * FRAC_1_SQRT_2;
                    m[FR][left] += slev * FRAC_1_SQRT_2;
                    m[FR][right] += slev * SQRT3_2;
                }
                MatrixEncoding::None => {
                    m[FL][left] += slev;
                    m[FR][right] += slev;
                }
            }
        } else if has(out_mask, FC) {
            m[FC][left] += slev * FRAC_1_SQRT_2;
            m[FC][right] += slev * FRAC_1_SQRT_2;
        } else {
            return Err(unmixable(input, output, name));
        }
    }

    if has(unaccounted, FLC) || has(unaccounted, FRC) {
        if has_pair(out_mask, FL, FR) {
            m[FL][FLC] += 1.0;
            m[FR][FRC] += 1.0;
        } else if has(out_mask, FC) {
            m[FC][FLC] += FRAC_1_SQRT_2;
            m[FC][FRC] += FRAC_1_SQRT_2;
        } else {
            return Err(unmixable(input, output, "front left/right of center"));
        }
    }

    if has(unaccounted, LFE) {
        if has(out_mask, FC) {
            m[FC][LFE] += lfe;
        } else if has_pair(out_mask, FL, FR) {
            m[FL][LFE] += lfe * FRAC_1_SQRT_2;
            m[FR][LFE] += lfe * FRAC_1_SQRT_2;
        }
    }

    let handled = (1u64 << FL)
        | (1u64 << FR)
        | (1u64 << FC)
        | (1u64 << LFE)
        | (1u64 << BL)
        | (1u64 << BR)
        | (1u64 << FLC)
        | (1u64 << FRC)
        | (1u64 << BC)
        | (1u64 << SL)
        | (1u64 << SR);
    if unaccounted & !handled != 0 {
        return Err(unmixable(input, output, "extra channels"));
    }

    Ok(out_pos
        .iter()
        .map(|&o| in_pos.iter().map(|&i| m[o][i]).collect())
        .collect())
}

/// Apply `rematrix_volume` and cap row sums at `maxval`.
///
/// A negative volume rescales the matrix so its largest row sum is `-volume`.
pub fn normalize(matrix: &mut Matrix, volume: f64, maxval: f64) {
    let maxcoef = matrix
        .iter()
        .map(|row| row.iter().map(|g| g.abs()).sum::<f64>())
        .fold(0.0f64, f64::max);
    let scale = if volume < 0.0 {
        if maxcoef > 0.0 {
            -volume / maxcoef
        } else {
            1.0
        }
    } else {
        let capped = if maxcoef > maxval { maxval / maxcoef } else { 1.0 };
        capped * volume
    };
    if scale != 1.0 {
        for g in matrix.iter_mut().flatten() {
            *g *= scale;
        }
    }
}

/// How one output channel is computed from the inputs
#[derive(Debug, Clone, PartialEq)]
pub enum MixStrategy<G> {
    Zero,
    OneToOne { input: usize, gain: G },
    TwoToOne { a: usize, ga: G, b: usize, gb: G },
    Many(Vec<(usize, G)>),
}

/// Compiled matrix for working type `T`
#[derive(Debug, Clone)]
pub struct Mixer<T: Element> {
    strategies: Vec<MixStrategy<T::Gain>>,
}

impl<T: Element> Mixer<T> {
    pub fn new(matrix: &Matrix) -> Self {
        let strategies = matrix
            .iter()
            .map(|row| {
                let taps: Vec<(usize, T::Gain)> = row
                    .iter()
                    .enumerate()
                    .filter(|&(_, &g)| g != 0.0)
                    .map(|(j, &g)| (j, T::gain(g)))
                    .collect();
                match taps.as_slice() {
                    [] => MixStrategy::Zero,
                    [(input, gain)] => MixStrategy::OneToOne {
                        input: *input,
                        gain: *gain,
                    },
                    [(a, ga), (b, gb)] => MixStrategy::TwoToOne {
                        a: *a,
                        ga: *ga,
                        b: *b,
                        gb: *gb,
                    },
                    _ => MixStrategy::Many(taps),
                }
            })
            .collect();
        Self { strategies }
    }

    pub fn strategies(&self) -> &[MixStrategy<T::Gain>] {
        &self.strategies
    }

    /// Mix `frames` frames of `input` and append them to `output`.
    pub fn mix(&self, input: &[Vec<T>], frames: usize, output: &mut [Vec<T>]) {
        for (strategy, dst) in self.strategies.iter().zip(output.iter_mut()) {
            match strategy {
                MixStrategy::Zero => dst.extend(std::iter::repeat(T::default()).take(frames)),
                MixStrategy::OneToOne { input: i, gain } => {
                    dst.extend(input[*i][..frames].iter().map(|&x| x.scale(*gain)))
                }
                MixStrategy::TwoToOne { a, ga, b, gb } => dst.extend(
                    input[*a][..frames]
                        .iter()
                        .zip(&input[*b][..frames])
                        .map(|(&x, &y)| T::mix2(x, *ga, y, *gb)),
                ),
                MixStrategy::Many(taps) => {
                    for n in 0..frames {
                        dst.push(T::mix_many(taps.iter().map(|&(i, g)| (input[i][n], g))));
                    }
                }
            }
        }
    }
}
