//! The boundary between the service and the instrument file readers it draws
//! scans from.
//!
//! A [`ScanSource`] is a random access reader over one file. It hands out
//! scans in whatever representation is native to it, and those scans are
//! turned into an owned [`RawScan`] by [`SourceScan::into_raw_scan`]. That
//! conversion is where any lazily decoded signal gets realized, so callers
//! that must bound how long they hold a source should perform it before
//! letting go.
use std::fmt::Display;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod memory;
mod mzdata_reader;

pub use memory::MemoryScanSource;
pub use mzdata_reader::MzDataScanSource;

/// How a single scan is addressed within a file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScanCriterion {
    /// The scan's native ID
    Id(String),
    /// The scan's zero-based position in the file
    Index(usize),
}

impl Display for ScanCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanCriterion::Id(id) => write!(f, "id {id}"),
            ScanCriterion::Index(index) => write!(f, "index {index}"),
        }
    }
}

impl From<&str> for ScanCriterion {
    fn from(value: &str) -> Self {
        Self::Id(value.to_string())
    }
}

impl From<usize> for ScanCriterion {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

/// The m/z range selected for fragmentation around a precursor ion
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IsolationWindow {
    pub target: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl IsolationWindow {
    pub fn new(target: f64, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            target,
            lower_bound,
            upper_bound,
        }
    }

    pub fn contains(&self, mz: f64) -> bool {
        self.lower_bound <= mz && mz <= self.upper_bound
    }
}

/// The ion selected for fragmentation, as reported by the instrument
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PrecursorIon {
    pub mz: f64,
    pub charge: Option<i32>,
    pub intensity: f32,
}

impl PrecursorIon {
    pub fn new(mz: f64, charge: Option<i32>, intensity: f32) -> Self {
        Self {
            mz,
            charge,
            intensity,
        }
    }
}

/// Everything an MSn scan says about where it came from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrecursorLink {
    pub ion: Option<PrecursorIon>,
    /// The native ID of the scan the precursor ion was selected from, if known
    pub precursor_scan_id: Option<String>,
    pub isolation_window: Option<IsolationWindow>,
    /// The name of the dissociation method the ion was fragmented with
    pub activation: Option<String>,
}

/// Scan level metadata, available without touching the signal arrays
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanDescription {
    pub id: String,
    pub index: usize,
    pub ms_level: u8,
    /// Scan start time, in minutes
    pub scan_time: f64,
    pub is_profile: bool,
    pub precursor: Option<PrecursorLink>,
}

/// A scan whose signal has been fully materialized into owned arrays.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawScan {
    pub description: ScanDescription,
    pub mz_array: Vec<f64>,
    pub intensity_array: Vec<f32>,
}

impl RawScan {
    pub fn new(description: ScanDescription, mz_array: Vec<f64>, intensity_array: Vec<f32>) -> Self {
        Self {
            description,
            mz_array,
            intensity_array,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.description.id
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.description.index
    }

    #[inline]
    pub fn ms_level(&self) -> u8 {
        self.description.ms_level
    }

    #[inline]
    pub fn scan_time(&self) -> f64 {
        self.description.scan_time
    }

    #[inline]
    pub fn is_profile(&self) -> bool {
        self.description.is_profile
    }

    #[inline]
    pub fn precursor(&self) -> Option<&PrecursorLink> {
        self.description.precursor.as_ref()
    }

    pub fn len(&self) -> usize {
        self.mz_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz_array.is_empty()
    }
}

/// An error that arises while locating or reading a scan
#[derive(Debug, Error)]
pub enum ScanAccessError {
    #[error("The requested scan with ID {0:?} was not found")]
    IdNotFound(String),
    #[error("The requested scan at index {0} was not found")]
    IndexNotFound(usize),
    #[error("Failed to retrieve the signal arrays of {id}: {message}")]
    ArrayRetrieval { id: String, message: String },
    #[error("I/O error occurred while reading: {0}")]
    IOError(#[from] io::Error),
}

impl ScanAccessError {
    pub fn not_found(criterion: &ScanCriterion) -> Self {
        match criterion {
            ScanCriterion::Id(id) => Self::IdNotFound(id.clone()),
            ScanCriterion::Index(index) => Self::IndexNotFound(*index),
        }
    }

    /// Whether this error means the scan does not exist, as opposed to
    /// existing but failing to load
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::IdNotFound(_) | Self::IndexNotFound(_))
    }
}

/// A scan in a reader's native representation.
pub trait SourceScan {
    /// Extract the scan level metadata
    fn scan_description(&self) -> ScanDescription;

    /// Decode the signal arrays, producing an owned scan that no longer
    /// depends upon the reader.
    fn into_raw_scan(self) -> Result<RawScan, ScanAccessError>;
}

impl SourceScan for RawScan {
    fn scan_description(&self) -> ScanDescription {
        self.description.clone()
    }

    fn into_raw_scan(self) -> Result<RawScan, ScanAccessError> {
        Ok(self)
    }
}

/// A random access reader over a single instrument data file.
///
/// Implementations may keep an internal cursor that advances as scans are
/// read. Nothing built on top of a [`ScanSource`] may rely on that cursor,
/// every read is explicitly addressed.
pub trait ScanSource: Send {
    type Scan: SourceScan;

    /// Retrieve a scan by its native ID
    fn get_scan_by_id(&mut self, id: &str) -> Option<Self::Scan>;

    /// Retrieve a scan by its zero-based position in the file
    fn get_scan_by_index(&mut self, index: usize) -> Option<Self::Scan>;

    /// Rewind the source to the beginning of the file
    fn reset(&mut self);

    /// The number of scans in the file
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_scan(&mut self, criterion: &ScanCriterion) -> Option<Self::Scan> {
        match criterion {
            ScanCriterion::Id(id) => self.get_scan_by_id(id),
            ScanCriterion::Index(index) => self.get_scan_by_index(*index),
        }
    }
}

impl<T: ScanSource + ?Sized> ScanSource for Box<T> {
    type Scan = T::Scan;

    fn get_scan_by_id(&mut self, id: &str) -> Option<Self::Scan> {
        (**self).get_scan_by_id(id)
    }

    fn get_scan_by_index(&mut self, index: usize) -> Option<Self::Scan> {
        (**self).get_scan_by_index(index)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}
