/*!
Charge state deconvolution and deisotoping of centroided peak lists.

A [`Deconvoluter`] groups the peaks of a [`PickedPeak`] list into isotopic
envelopes and reports each envelope as a single [`DeconvolutedPeak`]. The
provided implementation, [`AveragineDeconvoluter`], fits averagine isotopic
patterns with [`mzdeisotope`], scoring them with [`MSDeconvScorer`] and
keeping the fits that pass a [`MaximizingFitFilter`].
*/
use std::fmt::Display;
use std::str::FromStr;

use log::trace;
use mzdeisotope::deconv_traits::DeconvolutionError as EngineError;
use mzdeisotope::isotopic_model::{
    CachingIsotopicModel, IsotopicModels, IsotopicPatternParams, PROTON,
};
use mzdeisotope::scorer::{MSDeconvScorer, MaximizingFitFilter, ScoreType};
use mzpeaks::prelude::*;
use mzpeaks::{CentroidPeak, PeakSet, Tolerance};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::peaks::{DeconvolutedPeak, EnvelopePeak, PickedPeak};

/// Theoretical isotopic peaks below this fraction of the pattern are not generated
const IGNORE_BELOW: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeconvolutionError {
    #[error("Cannot deconvolute an empty peak list")]
    EmptyPeakList,
    #[error("Invalid charge range {0}")]
    InvalidChargeRange(ChargeRange),
    #[error("Isotopic pattern fitting failed: {0}")]
    FittingFailed(String),
}

/// The averagine compositions the service knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AveragineModel {
    #[default]
    Peptide,
    Glycan,
    Glycopeptide,
}

impl AveragineModel {
    pub const fn name(&self) -> &'static str {
        match self {
            AveragineModel::Peptide => "peptide",
            AveragineModel::Glycan => "glycan",
            AveragineModel::Glycopeptide => "glycopeptide",
        }
    }
}

impl From<AveragineModel> for IsotopicModels {
    fn from(value: AveragineModel) -> Self {
        match value {
            AveragineModel::Peptide => IsotopicModels::Peptide,
            AveragineModel::Glycan => IsotopicModels::Glycan,
            AveragineModel::Glycopeptide => IsotopicModels::Glycopeptide,
        }
    }
}

impl Display for AveragineModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown averagine {0:?}")]
pub struct UnknownAveragine(pub String);

impl FromStr for AveragineModel {
    type Err = UnknownAveragine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "peptide" => Ok(Self::Peptide),
            "glycan" => Ok(Self::Glycan),
            "glycopeptide" => Ok(Self::Glycopeptide),
            _ => Err(UnknownAveragine(s.to_string())),
        }
    }
}

/// An inclusive range of charge state magnitudes to consider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeRange(pub i32, pub i32);

impl ChargeRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self(min, max)
    }

    pub fn is_valid(&self) -> bool {
        self.0 >= 1 && self.1 >= self.0
    }
}

impl Default for ChargeRange {
    fn default() -> Self {
        Self(1, 8)
    }
}

impl Display for ChargeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.0, self.1)
    }
}

/// The parameters controlling one deconvolution call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeconvolutionParams {
    pub averagine: AveragineModel,
    /// The fraction of the total isotopic abundance a theoretical pattern
    /// must cover before trailing peaks are dropped
    pub isotopic_fit_threshold: f64,
    /// Shorter patterns that still cover this fraction of the full pattern
    /// are also tried
    pub incremental_truncation: f64,
    pub minimum_score: ScoreType,
    pub max_charge: i32,
    /// The mass error tolerance in parts-per-million
    pub error_tolerance: f64,
    /// How many theoretical peaks an envelope may be missing
    pub max_missed_peaks: u16,
}

impl DeconvolutionParams {
    pub fn ms1() -> Self {
        Self {
            averagine: AveragineModel::Peptide,
            isotopic_fit_threshold: 0.999,
            incremental_truncation: 0.95,
            minimum_score: 20.0,
            max_charge: 8,
            error_tolerance: 20.0,
            max_missed_peaks: 1,
        }
    }

    pub fn msn() -> Self {
        Self {
            incremental_truncation: 0.8,
            minimum_score: 10.0,
            ..Self::ms1()
        }
    }

    pub fn with_averagine(mut self, averagine: AveragineModel) -> Self {
        self.averagine = averagine;
        self
    }

    /// The charge range to search, bounded by a known precursor charge
    pub fn charge_range(&self, precursor_charge: Option<i32>) -> ChargeRange {
        let max = match precursor_charge {
            Some(z) if z != 0 => z.abs().min(self.max_charge),
            _ => self.max_charge,
        };
        ChargeRange::new(1, max.max(1))
    }

    fn isotopic_params(&self) -> IsotopicPatternParams {
        IsotopicPatternParams::new(
            self.isotopic_fit_threshold,
            IGNORE_BELOW,
            Some(self.incremental_truncation),
            PROTON,
        )
    }
}

impl Default for DeconvolutionParams {
    fn default() -> Self {
        Self::ms1()
    }
}

pub trait Deconvoluter {
    /// Deconvolute `peaks`, which need not be sorted, trying every charge in
    /// `charge_range`. The output is ordered by neutral mass.
    fn deconvolute(
        &self,
        peaks: &[PickedPeak],
        params: &DeconvolutionParams,
        charge_range: ChargeRange,
    ) -> Result<Vec<DeconvolutedPeak>, DeconvolutionError>;
}

impl<T: Deconvoluter + ?Sized> Deconvoluter for Box<T> {
    fn deconvolute(
        &self,
        peaks: &[PickedPeak],
        params: &DeconvolutionParams,
        charge_range: ChargeRange,
    ) -> Result<Vec<DeconvolutedPeak>, DeconvolutionError> {
        (**self).deconvolute(peaks, params, charge_range)
    }
}

#[inline]
fn mass_charge_ratio(neutral_mass: f64, charge: i32) -> f64 {
    (neutral_mass + charge as f64 * PROTON) / charge.abs() as f64
}

/// Averagine-based deconvolution with [`mzdeisotope::deconvolute_peaks`].
///
/// The isotopic model cache is built per call, so one instance can serve
/// concurrent callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct AveragineDeconvoluter;

impl AveragineDeconvoluter {
    pub fn new() -> Self {
        Self
    }
}

impl Deconvoluter for AveragineDeconvoluter {
    fn deconvolute(
        &self,
        peaks: &[PickedPeak],
        params: &DeconvolutionParams,
        charge_range: ChargeRange,
    ) -> Result<Vec<DeconvolutedPeak>, DeconvolutionError> {
        if !charge_range.is_valid() {
            return Err(DeconvolutionError::InvalidChargeRange(charge_range));
        }
        let peaks: Vec<CentroidPeak> = peaks
            .iter()
            .filter(|p| p.mz.is_finite() && p.intensity > 0.0)
            .map(|p| CentroidPeak::new(p.mz, p.intensity, 0))
            .collect();
        if peaks.is_empty() {
            return Err(DeconvolutionError::EmptyPeakList);
        }

        let isotopic_model = CachingIsotopicModel::from(IsotopicModels::from(params.averagine));
        let solutions = mzdeisotope::deconvolute_peaks(
            PeakSet::new(peaks),
            isotopic_model,
            Tolerance::PPM(params.error_tolerance),
            (charge_range.0, charge_range.1),
            MSDeconvScorer::default(),
            MaximizingFitFilter::new(params.minimum_score),
            params.max_missed_peaks,
            params.isotopic_params(),
            false,
        )
        .map_err(|e: EngineError| DeconvolutionError::FittingFailed(e.to_string()))?;

        let mut deconvoluted: Vec<DeconvolutedPeak> = solutions
            .iter()
            .map(|solution| {
                let charge = solution.charge();
                let neutral_mass = solution.neutral_mass();
                trace!(
                    "Fit envelope at {neutral_mass:.4} with charge {charge} and score {:.2}",
                    solution.score
                );
                DeconvolutedPeak {
                    neutral_mass,
                    mz: mass_charge_ratio(neutral_mass, charge),
                    charge,
                    intensity: solution.intensity(),
                    score: solution.score as f64,
                    envelope: solution
                        .envelope
                        .iter()
                        .map(|p| EnvelopePeak::new(p.mz, p.intensity))
                        .collect(),
                }
            })
            .collect();

        deconvoluted.sort_by(|a, b| {
            a.neutral_mass
                .total_cmp(&b.neutral_mass)
                .then_with(|| a.charge.cmp(&b.charge))
        });
        Ok(deconvoluted)
    }
}
