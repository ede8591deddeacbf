//! Per-request processing configuration.
use log::debug;
use serde::{Deserialize, Serialize};

use crate::deconvolution::{AveragineModel, DeconvolutionParams};

/// The request parameter naming the MS1 averaging window
pub const MS1_AVERAGING_PARAM: &str = "ms1-averaging";
/// The request parameter naming the MS1 averagine
pub const MS1_AVERAGINE_PARAM: &str = "ms1-averagine";
/// The request parameter naming the MSn averagine
pub const MSN_AVERAGINE_PARAM: &str = "msn-averagine";

/// The most MS1 scans on either side of a scan a request may average with.
/// Neighbors are read under the file's lock, so this bounds how long one
/// request can hold it.
pub const MAX_AVERAGING_WINDOW: usize = 20;

/// The averagine used when a request names one that isn't recognized
pub const FALLBACK_AVERAGINE: AveragineModel = AveragineModel::Glycopeptide;

/// How a single scan should be processed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// The number of MS1 scans on either side to average with. Zero disables
    /// averaging.
    pub ms1_averaging: usize,
    pub ms1: DeconvolutionParams,
    pub msn: DeconvolutionParams,
    pub signal_to_noise_threshold: f32,
    /// The m/z grid spacing used when averaging spectra
    pub averaging_dx: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            ms1_averaging: 0,
            ms1: DeconvolutionParams::ms1(),
            msn: DeconvolutionParams::msn(),
            signal_to_noise_threshold: 1.0,
            averaging_dx: 0.002,
        }
    }
}

fn parse_averagine(value: &str) -> AveragineModel {
    value.parse().unwrap_or_else(|e| {
        debug!("{e}, using {FALLBACK_AVERAGINE}");
        FALLBACK_AVERAGINE
    })
}

fn parse_window(value: &str) -> usize {
    let window: usize = value.trim().parse().unwrap_or_else(|e| {
        debug!("Invalid averaging window {value:?}: {e}, averaging disabled");
        0
    });
    if window > MAX_AVERAGING_WINDOW {
        debug!("Averaging window {window} clamped to {MAX_AVERAGING_WINDOW}");
    }
    window.min(MAX_AVERAGING_WINDOW)
}

impl ProcessingConfig {
    /// Build a configuration from request parameters. This never fails:
    /// absent parameters take their defaults and malformed ones take their
    /// fallbacks. Unrecognized parameters are ignored.
    pub fn from_params<K, V, I>(params: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut config = Self::default();
        for (key, value) in params {
            let value = value.as_ref();
            match key.as_ref() {
                MS1_AVERAGING_PARAM => config.ms1_averaging = parse_window(value),
                MS1_AVERAGINE_PARAM => config.ms1.averagine = parse_averagine(value),
                MSN_AVERAGINE_PARAM => config.msn.averagine = parse_averagine(value),
                _ => {}
            }
        }
        config
    }

    /// The deconvolution parameters for a scan of `ms_level`
    pub fn deconvolution_params(&self, ms_level: u8) -> &DeconvolutionParams {
        if ms_level > 1 {
            &self.msn
        } else {
            &self.ms1
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProcessingConfig::from_params(HashMap::<String, String>::new());
        assert_eq!(config, ProcessingConfig::default());
        assert_eq!(config.ms1_averaging, 0);
        assert_eq!(config.ms1.averagine, AveragineModel::Peptide);
        assert_eq!(config.msn.averagine, AveragineModel::Peptide);
        assert_eq!(config.ms1.minimum_score, 20.0);
        assert_eq!(config.msn.minimum_score, 10.0);
        assert_eq!(config.ms1.incremental_truncation, 0.95);
        assert_eq!(config.msn.incremental_truncation, 0.8);
    }

    #[test]
    fn test_parse() {
        let config = ProcessingConfig::from_params([
            ("ms1-averaging", "2"),
            ("ms1-averagine", "glycan"),
            ("msn-averagine", "glycopeptide"),
            ("unrelated", "value"),
        ]);
        assert_eq!(config.ms1_averaging, 2);
        assert_eq!(config.ms1.averagine, AveragineModel::Glycan);
        assert_eq!(config.msn.averagine, AveragineModel::Glycopeptide);
        assert_eq!(config.deconvolution_params(1).averagine, AveragineModel::Glycan);
        assert_eq!(
            config.deconvolution_params(3).averagine,
            AveragineModel::Glycopeptide
        );
    }

    #[test]
    fn test_fallbacks() {
        let config = ProcessingConfig::from_params([
            ("ms1-averaging", "three"),
            ("ms1-averagine", "unobtainium"),
            ("msn-averagine", ""),
        ]);
        assert_eq!(config.ms1_averaging, 0);
        assert_eq!(config.ms1.averagine, FALLBACK_AVERAGINE);
        assert_eq!(config.msn.averagine, FALLBACK_AVERAGINE);

        let config = ProcessingConfig::from_params([("ms1-averaging", "-1")]);
        assert_eq!(config.ms1_averaging, 0);
    }

    #[test]
    fn test_oversized_window_is_clamped() {
        let config = ProcessingConfig::from_params([("ms1-averaging", "18446744073709551615")]);
        assert_eq!(config.ms1_averaging, MAX_AVERAGING_WINDOW);
        let config = ProcessingConfig::from_params([("ms1-averaging", "7")]);
        assert_eq!(config.ms1_averaging, 7);
    }
}
