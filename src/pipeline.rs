/*!
Turns a [`RawScan`] into a [`ProcessedScan`].

Processing runs in four steps:
1. MS1 scans may be averaged with their neighboring MS1 scans.
2. Peaks are picked from profile signal, or taken as-is from centroid scans.
3. Peaks are deconvoluted with the averagine configured for the scan's MS level.
4. Precursor metadata is attached. MSn scans describe the ion they were
   selected from, MS1 scans list the ions selected from them.

[`ScanProcessor::process`] is a pure function of the scan, the configuration
and the pre-fetched [`ScanContext`]. [`ScanProcessor::process_entry`] does
the fetching through the entry's reader handle first.
*/
use log::{debug, warn};
use mzsignal::average::average_signal;
use mzsignal::peak_picker::{PeakFitType, PeakPicker, PeakPickerError};
use mzsignal::reprofile::reprofile;
use mzsignal::{ArrayPair, FittedPeak};
use serde::{Deserialize, Serialize};

use crate::config::ProcessingConfig;
use crate::deconvolution::{AveragineDeconvoluter, Deconvoluter};
use crate::handle::DEFAULT_BRACKET_LIMIT;
use crate::peaks::{sort_peaks, DeconvolutedPeak, PickedPeak};
use crate::registry::FileRegistryEntry;
use crate::source::{
    IsolationWindow, RawScan, ScanAccessError, ScanCriterion, ScanDescription, ScanSource,
};

/// The full width at half max assumed when reprofiling centroid peaks
const CENTROID_FWHM: f32 = 0.01;

/// The other scans a scan's processing depends upon, fetched ahead of time
#[derive(Debug, Default, Clone)]
pub struct ScanContext {
    /// MS1 scans to average an MS1 scan with
    pub neighbors: Vec<RawScan>,
    /// The MSn scans that follow an MS1 scan
    pub products: Vec<ScanDescription>,
}

/// A precursor ion and the window it was isolated in
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrecursorInformation {
    pub mz: f64,
    pub charge: Option<i32>,
    pub intensity: f32,
    /// The scan the ion was selected from
    pub precursor_scan_id: Option<String>,
    /// The scan the ion was fragmented in
    pub product_scan_id: Option<String>,
    pub isolation_window: Option<IsolationWindow>,
}

impl PrecursorInformation {
    /// Summarize `description`'s precursor, if it has one
    pub fn of_product(description: &ScanDescription) -> Option<Self> {
        let link = description.precursor.as_ref()?;
        let (mz, charge, intensity) = match (link.ion, link.isolation_window) {
            (Some(ion), _) => (ion.mz, ion.charge, ion.intensity),
            (None, Some(window)) => (window.target, None, 0.0),
            (None, None) => return None,
        };
        Some(Self {
            mz,
            charge,
            intensity,
            precursor_scan_id: link.precursor_scan_id.clone(),
            product_scan_id: Some(description.id.clone()),
            isolation_window: link.isolation_window,
        })
    }
}

/// Precursor metadata, which differs in kind by MS level
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PrecursorDetails {
    #[default]
    None,
    /// An MSn scan's own precursor
    Precursor(PrecursorInformation),
    /// The precursors selected from an MS1 scan, in acquisition order
    Products(Vec<PrecursorInformation>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessedScan {
    /// The scan's metadata. `is_profile` describes the arrays below, which
    /// averaging produces in profile mode.
    pub description: ScanDescription,
    pub mz_array: Vec<f64>,
    pub intensity_array: Vec<f32>,
    /// Ordered by m/z
    pub peaks: Vec<PickedPeak>,
    /// Ordered by neutral mass
    pub deconvoluted_peaks: Vec<DeconvolutedPeak>,
    pub precursor: PrecursorDetails,
    /// How many neighboring scans were averaged in
    pub averaged_scans: usize,
    /// Set when deconvolution failed and `deconvoluted_peaks` was left empty
    pub deconvolution_degraded: bool,
}

/// Average `scans` onto a shared m/z grid with spacing `dx`, reprofiling
/// centroid scans first. Returns empty arrays when every scan is empty.
pub fn average_scans<'a>(scans: impl IntoIterator<Item = &'a RawScan>, dx: f64) -> (Vec<f64>, Vec<f32>) {
    let pairs: Vec<ArrayPair> = scans
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.is_profile() {
                ArrayPair::from((s.mz_array.clone(), s.intensity_array.clone()))
            } else {
                let peaks: Vec<FittedPeak> = s
                    .mz_array
                    .iter()
                    .zip(s.intensity_array.iter())
                    .map(|(mz, intensity)| FittedPeak {
                        mz: *mz,
                        intensity: *intensity,
                        full_width_at_half_max: CENTROID_FWHM,
                        ..Default::default()
                    })
                    .collect();
                reprofile(peaks.iter(), dx)
            }
        })
        .collect();
    if pairs.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let averaged = average_signal(&pairs, dx);
    (
        averaged.mz_array.to_vec(),
        averaged.intensity_array.to_vec(),
    )
}

/// Pick peaks from a signal. Centroid signals are converted point for point,
/// dropping non-positive intensities.
pub fn pick_peaks(
    mz_array: &[f64],
    intensity_array: &[f32],
    is_profile: bool,
    signal_to_noise_threshold: f32,
) -> Result<Vec<PickedPeak>, PeakPickerError> {
    let mut peaks: Vec<PickedPeak> = if !is_profile {
        mz_array
            .iter()
            .zip(intensity_array.iter())
            .filter(|(_, i)| **i > 0.0)
            .map(|(mz, i)| PickedPeak::new(*mz, *i, 0.0, 0.0))
            .collect()
    } else if mz_array.len() < 3 {
        Vec::new()
    } else {
        let picker = PeakPicker {
            fit_type: PeakFitType::Quadratic,
            signal_to_noise_threshold,
            ..Default::default()
        };
        let mut acc = Vec::new();
        picker.discover_peaks(mz_array, intensity_array, &mut acc)?;
        acc.into_iter()
            .map(|p| {
                PickedPeak::new(
                    p.mz,
                    p.intensity,
                    p.full_width_at_half_max,
                    p.signal_to_noise,
                )
            })
            .collect()
    };
    sort_peaks(&mut peaks);
    Ok(peaks)
}

/// Runs the processing steps with a particular [`Deconvoluter`]
#[derive(Debug, Clone)]
pub struct ScanProcessor<D: Deconvoluter = AveragineDeconvoluter> {
    deconvoluter: D,
    bracket_limit: usize,
}

impl Default for ScanProcessor<AveragineDeconvoluter> {
    fn default() -> Self {
        Self::new(AveragineDeconvoluter)
    }
}

impl<D: Deconvoluter> ScanProcessor<D> {
    pub fn new(deconvoluter: D) -> Self {
        Self {
            deconvoluter,
            bracket_limit: DEFAULT_BRACKET_LIMIT,
        }
    }

    /// Set the most scans inspected after an MS1 scan when looking for its
    /// products
    pub fn with_bracket_limit(mut self, bracket_limit: usize) -> Self {
        self.bracket_limit = bracket_limit;
        self
    }

    pub fn bracket_limit(&self) -> usize {
        self.bracket_limit
    }

    /// Process `scan` with the pre-fetched `context`. Deterministic: the same
    /// inputs always produce the same output.
    pub fn process(&self, scan: RawScan, config: &ProcessingConfig, context: ScanContext) -> ProcessedScan {
        let RawScan {
            mut description,
            mz_array,
            intensity_array,
        } = scan;

        let ScanContext {
            neighbors,
            products,
        } = context;

        let is_ms1 = description.ms_level <= 1;
        let (mz_array, intensity_array, averaged_scans) =
            if is_ms1 && config.ms1_averaging > 0 && !neighbors.is_empty() {
                let this = RawScan::new(description.clone(), mz_array, intensity_array);
                let (mzs, intensities) =
                    average_scans(std::iter::once(&this).chain(neighbors.iter()), config.averaging_dx);
                debug!(
                    "Averaged {} with {} neighboring scans",
                    description.id,
                    neighbors.len()
                );
                description.is_profile = true;
                (mzs, intensities, neighbors.len())
            } else {
                (mz_array, intensity_array, 0)
            };

        let peaks = match pick_peaks(
            &mz_array,
            &intensity_array,
            description.is_profile,
            config.signal_to_noise_threshold,
        ) {
            Ok(peaks) => peaks,
            Err(e) => {
                warn!("Failed to pick peaks for {}: {e:?}", description.id);
                Vec::new()
            }
        };

        let params = config.deconvolution_params(description.ms_level);
        let precursor_charge = description
            .precursor
            .as_ref()
            .and_then(|p| p.ion)
            .and_then(|ion| ion.charge);
        let (deconvoluted_peaks, deconvolution_degraded) = match self.deconvoluter.deconvolute(
            &peaks,
            params,
            params.charge_range(precursor_charge),
        ) {
            Ok(peaks) => (peaks, false),
            Err(e) => {
                warn!("Failed to deconvolute {}: {e}", description.id);
                (Vec::new(), true)
            }
        };

        let precursor = if is_ms1 {
            PrecursorDetails::Products(
                products
                    .iter()
                    .filter_map(PrecursorInformation::of_product)
                    .collect(),
            )
        } else {
            match PrecursorInformation::of_product(&description) {
                Some(mut info) => {
                    info.product_scan_id = None;
                    PrecursorDetails::Precursor(info)
                }
                None => PrecursorDetails::None,
            }
        };

        ProcessedScan {
            description,
            mz_array,
            intensity_array,
            peaks,
            deconvoluted_peaks,
            precursor,
            averaged_scans,
            deconvolution_degraded,
        }
    }

    /// Fetch the scan matching `criterion` from `entry`, along with whatever
    /// context it needs, and process it. Each fetch holds the entry's reader
    /// lock only for as long as the read itself.
    pub fn process_entry<R: ScanSource>(
        &self,
        entry: &FileRegistryEntry<R>,
        criterion: &ScanCriterion,
        config: &ProcessingConfig,
    ) -> Result<ProcessedScan, ScanAccessError> {
        let handle = entry.handle();
        let scan = handle.with_scan(criterion)?;
        let mut context = ScanContext::default();
        if scan.ms_level() <= 1 {
            if config.ms1_averaging > 0 {
                let positions = entry.index().ms1_neighbors(scan.index(), config.ms1_averaging);
                context.neighbors = handle.with_scans(&positions)?;
            }
            context.products = handle.bracket_products(scan.index(), self.bracket_limit);
        }
        Ok(self.process(scan, config, context))
    }
}
