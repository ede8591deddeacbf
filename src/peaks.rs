//! Peak types produced by the processing pipeline.
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A centroided peak picked from a continuous signal, or read directly from
/// a centroid scan.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PickedPeak {
    pub mz: f64,
    pub intensity: f32,
    pub full_width_at_half_max: f32,
    pub signal_to_noise: f32,
}

impl PickedPeak {
    pub fn new(mz: f64, intensity: f32, full_width_at_half_max: f32, signal_to_noise: f32) -> Self {
        Self {
            mz,
            intensity,
            full_width_at_half_max,
            signal_to_noise,
        }
    }

    /// Order peaks by m/z, falling back to intensity so the order is total
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.mz
            .total_cmp(&other.mz)
            .then_with(|| self.intensity.total_cmp(&other.intensity))
    }
}

/// A single member of an isotopic envelope. Theoretical positions
/// that went unobserved carry an intensity of zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvelopePeak {
    pub mz: f64,
    pub intensity: f32,
}

impl EnvelopePeak {
    pub fn new(mz: f64, intensity: f32) -> Self {
        Self { mz, intensity }
    }
}

/// An isotopic envelope collapsed to its monoisotopic peak with a fitted
/// charge state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeconvolutedPeak {
    pub neutral_mass: f64,
    /// The m/z of the monoisotopic peak
    pub mz: f64,
    pub charge: i32,
    /// The summed observed intensity of the envelope
    pub intensity: f32,
    /// The goodness-of-fit score of the envelope, higher is better
    pub score: f64,
    pub envelope: Vec<EnvelopePeak>,
}

/// Sort `peaks` by m/z in place
pub fn sort_peaks(peaks: &mut [PickedPeak]) {
    peaks.sort_by(|a, b| a.total_cmp(b));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sort_peaks() {
        let mut peaks = vec![
            PickedPeak::new(300.0, 5.0, 0.01, 10.0),
            PickedPeak::new(100.0, 1.0, 0.01, 10.0),
            PickedPeak::new(200.0, 3.0, 0.01, 10.0),
            PickedPeak::new(200.0, 2.0, 0.01, 10.0),
        ];
        sort_peaks(&mut peaks);
        let mzs: Vec<f64> = peaks.iter().map(|p| p.mz).collect();
        assert_eq!(mzs, [100.0, 200.0, 200.0, 300.0]);
        assert_eq!(peaks[1].intensity, 2.0);
    }
}
