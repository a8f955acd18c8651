//! Working sample representations
//!
//! The resampler runs its filter and mixing stages in one of three planar
//! element types. `i16` uses Q15 filter taps, 17.15 mixing gains and 64-bit
//! accumulation; the float types accumulate in their own precision.

use std::fmt::Debug;

pub trait Element: Copy + Default + PartialEq + Debug + Send + 'static {
    /// Filter tap storage
    type Coeff: Copy + Default + Debug + Send;
    /// Convolution accumulator
    type Acc: Copy + Debug + Send;
    /// Rematrix gain storage
    type Gain: Copy + Debug + PartialEq + Send;

    const NAME: &'static str;

    fn from_normalized(v: f64) -> Self;
    fn to_normalized(self) -> f64;

    fn coeff(c: f64) -> Self::Coeff;
    fn gain(g: f64) -> Self::Gain;

    /// Dot product of an input window with one filter phase.
    fn dot(window: &[Self], taps: &[Self::Coeff]) -> Self::Acc;

    /// `a + (b - a) * frac / den`
    fn lerp(a: Self::Acc, b: Self::Acc, frac: i64, den: i64) -> Self::Acc;

    /// Round and clip an accumulator back to a sample.
    fn finish(acc: Self::Acc) -> Self;

    fn scale(self, gain: Self::Gain) -> Self;
    fn mix2(a: Self, ga: Self::Gain, b: Self, gb: Self::Gain) -> Self;
    fn mix_many<I: Iterator<Item = (Self, Self::Gain)>>(terms: I) -> Self;
}

const Q15_ONE: i64 = 1 << 15;
const Q15_HALF: i64 = 1 << 14;

#[inline]
fn q15_round(acc: i64) -> i16 {
    ((acc + Q15_HALF) >> 15).clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

impl Element for i16 {
    type Coeff = i16;
    type Acc = i64;
    type Gain = i32;

    const NAME: &'static str = "s16p";

    fn from_normalized(v: f64) -> Self {
        (v * 32768.0).round().clamp(-32768.0, 32767.0) as i16
    }

    fn to_normalized(self) -> f64 {
        self as f64 / 32768.0
    }

    fn coeff(c: f64) -> Self::Coeff {
        (c * Q15_ONE as f64).round().clamp(-32768.0, 32767.0) as i16
    }

    fn gain(g: f64) -> Self::Gain {
        (g * Q15_ONE as f64).round() as i32
    }

    fn dot(window: &[Self], taps: &[Self::Coeff]) -> Self::Acc {
        window
            .iter()
            .zip(taps)
            .map(|(&x, &t)| x as i64 * t as i64)
            .sum()
    }

    fn lerp(a: Self::Acc, b: Self::Acc, frac: i64, den: i64) -> Self::Acc {
        a + ((b - a) as i128 * frac as i128 / den as i128) as i64
    }

    fn finish(acc: Self::Acc) -> Self {
        q15_round(acc)
    }

    fn scale(self, gain: Self::Gain) -> Self {
        q15_round(self as i64 * gain as i64)
    }

    fn mix2(a: Self, ga: Self::Gain, b: Self, gb: Self::Gain) -> Self {
        q15_round(a as i64 * ga as i64 + b as i64 * gb as i64)
    }

    fn mix_many<I: Iterator<Item = (Self, Self::Gain)>>(terms: I) -> Self {
        q15_round(terms.map(|(x, g)| x as i64 * g as i64).sum())
    }
}

macro_rules! float_element {
    ($t:ty, $name:expr) => {
        impl Element for $t {
            type Coeff = $t;
            type Acc = $t;
            type Gain = $t;

            const NAME: &'static str = $name;

            fn from_normalized(v: f64) -> Self {
                v as $t
            }

            fn to_normalized(self) -> f64 {
                self as f64
            }

            fn coeff(c: f64) -> Self::Coeff {
                c as $t
            }

            fn gain(g: f64) -> Self::Gain {
                g as $t
            }

            fn dot(window: &[Self], taps: &[Self::Coeff]) -> Self::Acc {
                window.iter().zip(taps).map(|(&x, &t)| x * t).sum()
            }

            fn lerp(a: Self::Acc, b: Self::Acc, frac: i64, den: i64) -> Self::Acc {
                a + (b - a) * (frac as f64 / den as f64) as $t
            }

            fn finish(acc: Self::Acc) -> Self {
                acc
            }

            fn scale(self, gain: Self::Gain) -> Self {
                self * gain
            }

            fn mix2(a: Self, ga: Self::Gain, b: Self, gb: Self::Gain) -> Self {
                a * ga + b * gb
            }

            fn mix_many<I: Iterator<Item = (Self, Self::Gain)>>(terms: I) -> Self {
                terms.map(|(x, g)| x * g).sum()
            }
        }
    };
}

float_element!(f32, "fltp");
float_element!(f64, "dblp");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_q15_unity_gain_is_exact() {
        let one = i16::gain(1.0);
        for x in [i16::MIN, -12345, -1, 0, 1, 777, i16::MAX] {
            assert_eq!(x.scale(one), x);
        }
    }

    #[test]
    fn test_q15_mix_clips() {
        let one = i16::gain(1.0);
        assert_eq!(i16::mix2(30000, one, 30000, one), i16::MAX);
        assert_eq!(i16::mix2(-30000, one, -30000, one), i16::MIN);
    }

    #[test]
    fn test_lerp_midpoint() {
        assert_eq!(i16::lerp(0, 100, 1, 2), 50);
        assert_eq!(f32::lerp(0.0, 1.0, 1, 4), 0.25);
    }

    #[test]
    fn test_s16_normalized_round_trip() {
        for x in [i16::MIN, -2, 0, 3, i16::MAX] {
            assert_eq!(i16::from_normalized(x.to_normalized()), x);
        }
    }
}
