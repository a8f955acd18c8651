//! Resampler options

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;

use crate::error::{Result, TranscodeError};

/// Window applied to the sinc kernel of the rate converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Cubic,
    BlackmanNuttall,
    Kaiser,
}

/// Surround encoding used when folding back channels into stereo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixEncoding {
    None,
    Dolby,
    DplII,
}

/// Noise added (and optionally shaped) when reducing sample precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DitherMethod {
    None,
    Rectangular,
    Triangular,
    TriangularHighpass,
    NsLipshitz,
    NsFWeighted,
    NsModifiedEWeighted,
    NsImprovedEWeighted,
}

impl DitherMethod {
    pub fn is_noise_shaped(&self) -> bool {
        matches!(
            self,
            DitherMethod::NsLipshitz
                | DitherMethod::NsFWeighted
                | DitherMethod::NsModifiedEWeighted
                | DitherMethod::NsImprovedEWeighted
        )
    }
}

/// Tunables of a [`Resampler`](super::Resampler)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplerOptions {
    /// Filter length in taps at unity rate ratio
    pub filter_size: u32,
    /// log2 of the number of polyphase entries
    pub phase_shift: u32,
    /// Use the exact rational phase count when it fits in `1 << phase_shift`
    pub exact_rational: bool,
    /// Interpolate linearly between adjacent phases
    pub linear_interp: bool,
    /// Cutoff as a fraction of the output Nyquist frequency
    pub cutoff: f64,
    pub filter_type: FilterType,
    pub kaiser_beta: f64,

    /// Center mix level
    pub clev: f64,
    /// Surround mix level
    pub slev: f64,
    pub lfe_mix_level: f64,
    /// Matrix scale; a negative value forces normalization to `|rematrix_volume|`
    pub rematrix_volume: f64,
    /// Largest allowed row sum; 0 selects 1.0 for integer output and unlimited for float
    pub rematrix_maxval: f64,
    pub matrix_encoding: MatrixEncoding,

    pub dither_method: DitherMethod,
    pub dither_scale: f64,
    pub dither_seed: u64,

    /// Drift in seconds below which timestamps are not corrected; infinite disables
    pub min_compensation: f64,
    /// Drift in seconds above which correction is done by dropping or inserting frames
    pub min_hard_compensation: f64,
    /// Seconds over which soft compensation is spread
    pub soft_compensation_duration: f64,
    /// Largest soft compensation as a fraction of the duration
    pub max_soft_compensation: f64,
    /// Shortcut enabling drift compensation; values above 1 also set the soft rate limit
    pub async_rate: f64,
}

impl Default for ResamplerOptions {
    fn default() -> Self {
        Self {
            filter_size: 32,
            phase_shift: 10,
            exact_rational: true,
            linear_interp: true,
            cutoff: 0.97,
            filter_type: FilterType::Kaiser,
            kaiser_beta: 9.0,
            clev: FRAC_1_SQRT_2,
            slev: FRAC_1_SQRT_2,
            lfe_mix_level: 0.0,
            rematrix_volume: 1.0,
            rematrix_maxval: 0.0,
            matrix_encoding: MatrixEncoding::None,
            dither_method: DitherMethod::None,
            dither_scale: 1.0,
            dither_seed: 0,
            min_compensation: f64::INFINITY,
            min_hard_compensation: 0.1,
            soft_compensation_duration: 1.0,
            max_soft_compensation: 0.0,
            async_rate: 0.0,
        }
    }
}

impl ResamplerOptions {
    pub fn validate(&self) -> Result<()> {
        if self.filter_size == 0 {
            return Err(TranscodeError::config("filter_size must be positive"));
        }
        if self.phase_shift > 16 {
            return Err(TranscodeError::config(format!(
                "phase_shift {} is above the maximum of 16",
                self.phase_shift
            )));
        }
        if !(self.cutoff > 0.0 && self.cutoff <= 1.0) {
            return Err(TranscodeError::config(format!(
                "cutoff {} is outside (0, 1]",
                self.cutoff
            )));
        }
        if self.kaiser_beta < 0.0 || !self.kaiser_beta.is_finite() {
            return Err(TranscodeError::config("kaiser_beta must be a finite non-negative value"));
        }
        if self.rematrix_maxval < 0.0 {
            return Err(TranscodeError::config("rematrix_maxval must not be negative"));
        }
        if self.dither_scale < 0.0 {
            return Err(TranscodeError::config("dither_scale must not be negative"));
        }
        if self.min_compensation < 0.0 || self.min_hard_compensation < 0.0 {
            return Err(TranscodeError::config("compensation thresholds must not be negative"));
        }
        Ok(())
    }

    /// Options with the `async_rate` shortcut folded into the compensation fields.
    pub(crate) fn effective(&self, in_rate: u32) -> Self {
        let mut opts = self.clone();
        if opts.async_rate > 0.0 {
            if !opts.min_compensation.is_finite() {
                opts.min_compensation = 0.001;
            }
            if opts.async_rate > 1.0001 {
                opts.max_soft_compensation = opts.async_rate / in_rate as f64;
            }
        }
        opts
    }

    pub fn compensation_enabled(&self) -> bool {
        self.min_compensation.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let opts = ResamplerOptions::default();
        assert!(opts.validate().is_ok());
        assert!(!opts.compensation_enabled());
    }

    #[test]
    fn test_async_shortcut() {
        let opts = ResamplerOptions {
            async_rate: 1000.0,
            ..Default::default()
        };
        let eff = opts.effective(48000);
        assert_eq!(eff.min_compensation, 0.001);
        assert!((eff.max_soft_compensation - 1000.0 / 48000.0).abs() < 1e-12);
        assert!(eff.compensation_enabled());
    }

    #[test]
    fn test_invalid_cutoff() {
        let opts = ResamplerOptions {
            cutoff: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(TranscodeError::Configuration(_))
        ));
    }

    #[test]
    fn test_options_from_partial_toml_table() {
        let opts: ResamplerOptions = toml::from_str(
            r#"
            dither_method = "triangular"
            filter_type = "blackman_nuttall"
            min_compensation = 0.01
            "#,
        )
        .unwrap();
        assert_eq!(opts.filter_size, 32);
        assert_eq!(opts.dither_method, DitherMethod::Triangular);
        assert_eq!(opts.filter_type, FilterType::BlackmanNuttall);
        assert!(opts.compensation_enabled());
    }
}
