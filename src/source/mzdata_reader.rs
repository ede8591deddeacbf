use std::fmt::{Debug, Display};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use mzdata::io::MZReader;
use mzdata::prelude::*;
use mzdata::spectrum::{MultiLayerSpectrum, SignalContinuity};
use mzpeaks::{CentroidPeak, DeconvolutedPeak};

use super::{
    IsolationWindow, PrecursorIon, PrecursorLink, RawScan, ScanAccessError, ScanDescription,
    ScanSource, SourceScan,
};

/// The spectrum type produced by [`MzDataScanSource`]
pub type MzDataSpectrum = MultiLayerSpectrum<CentroidPeak, DeconvolutedPeak>;

/// A [`ScanSource`] backed by [`mzdata`]'s format-inferring reader, supporting
/// mzML and MGF files on disk.
pub struct MzDataScanSource {
    path: PathBuf,
    reader: MZReader<fs::File>,
}

impl Debug for MzDataScanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MzDataScanSource")
            .field("path", &self.path)
            .finish()
    }
}

impl MzDataScanSource {
    /// Open the file at `path`, inferring its format from its name and content.
    pub fn open_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening {} with mzdata", path.display());
        let reader = MZReader::open_path(path.clone())?;
        Ok(Self { path, reader })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScanSource for MzDataScanSource {
    type Scan = MzDataSpectrum;

    fn get_scan_by_id(&mut self, id: &str) -> Option<Self::Scan> {
        self.reader.get_spectrum_by_id(id)
    }

    fn get_scan_by_index(&mut self, index: usize) -> Option<Self::Scan> {
        self.reader.get_spectrum_by_index(index)
    }

    fn reset(&mut self) {
        SpectrumSource::reset(&mut self.reader);
    }

    fn len(&self) -> usize {
        SpectrumSource::len(&self.reader)
    }
}

fn retrieval_error<E: Display>(id: &str, err: E) -> ScanAccessError {
    ScanAccessError::ArrayRetrieval {
        id: id.to_string(),
        message: err.to_string(),
    }
}

fn precursor_link_of(spectrum: &MzDataSpectrum) -> Option<PrecursorLink> {
    let precursor = spectrum.precursor()?;
    let ion = precursor
        .ions
        .first()
        .map(|ion| PrecursorIon::new(ion.mz, ion.charge, ion.intensity));

    let window = &precursor.isolation_window;
    // Readers leave the bounds zeroed when the file does not describe a window
    let isolation_window = if window.lower_bound != 0.0 || window.upper_bound != 0.0 {
        Some(IsolationWindow::new(
            window.target as f64,
            window.lower_bound as f64,
            window.upper_bound as f64,
        ))
    } else {
        None
    };

    Some(PrecursorLink {
        ion,
        precursor_scan_id: precursor.precursor_id.clone(),
        isolation_window,
        activation: precursor
            .activation
            .method()
            .map(|method| method.name().to_string()),
    })
}

impl SourceScan for MzDataSpectrum {
    fn scan_description(&self) -> ScanDescription {
        ScanDescription {
            id: self.id().to_string(),
            index: self.index(),
            ms_level: self.ms_level(),
            scan_time: self.start_time(),
            is_profile: matches!(self.signal_continuity(), SignalContinuity::Profile),
            precursor: if self.ms_level() > 1 {
                precursor_link_of(self)
            } else {
                None
            },
        }
    }

    fn into_raw_scan(self) -> Result<RawScan, ScanAccessError> {
        let description = self.scan_description();
        let (mz_array, intensity_array) = if let Some(arrays) = self.arrays.as_ref() {
            let mzs = arrays
                .mzs()
                .map_err(|e| retrieval_error(&description.id, e))?
                .to_vec();
            let intensities = arrays
                .intensities()
                .map_err(|e| retrieval_error(&description.id, e))?
                .to_vec();
            (mzs, intensities)
        } else if let Some(peaks) = self.peaks.as_ref() {
            peaks.iter().map(|p| (p.mz(), p.intensity())).unzip()
        } else {
            (Vec::new(), Vec::new())
        };

        if mz_array.len() != intensity_array.len() {
            return Err(ScanAccessError::ArrayRetrieval {
                id: description.id,
                message: format!(
                    "m/z array has {} points but intensity array has {}",
                    mz_array.len(),
                    intensity_array.len()
                ),
            });
        }

        Ok(RawScan::new(description, mz_array, intensity_array))
    }
}
