/*!
A lightweight summary of every scan in a file, partitioned by MS level.

The index is built once by walking a whole file and is then persisted next to
it as JSON so that later startups can skip the walk. See [`index_file_name`]
for how the file name is derived.
*/
use std::cmp::Ordering;
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::ScanDescription;

/// The suffix appended to a data file's name to form its index file's name
pub const INDEX_FILE_SUFFIX: &str = "-idx.json";

/// What an MSn scan's index record remembers about its precursor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrecursorSummary {
    pub mz: f64,
    pub charge: Option<i32>,
    #[serde(default)]
    pub precursor_scan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanIndexRecord {
    pub scan_id: String,
    /// The position of the scan in the source file
    pub index: usize,
    pub scan_time: f64,
    pub ms_level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precursor: Option<PrecursorSummary>,
}

impl ScanIndexRecord {
    /// Order by scan time, breaking ties by scan ID
    pub fn time_order(&self, other: &Self) -> Ordering {
        self.scan_time
            .total_cmp(&other.scan_time)
            .then_with(|| self.scan_id.cmp(&other.scan_id))
    }
}

impl From<&ScanDescription> for ScanIndexRecord {
    fn from(value: &ScanDescription) -> Self {
        let precursor = value.precursor.as_ref().and_then(|link| {
            let mz = link
                .ion
                .map(|ion| ion.mz)
                .or_else(|| link.isolation_window.map(|w| w.target))?;
            Some(PrecursorSummary {
                mz,
                charge: link.ion.and_then(|ion| ion.charge),
                precursor_scan_id: link.precursor_scan_id.clone(),
                activation: link.activation.clone(),
            })
        });
        Self {
            scan_id: value.id.clone(),
            index: value.index,
            scan_time: value.scan_time,
            ms_level: value.ms_level,
            precursor,
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("An I/O error occurred while accessing the scan index: {0}")]
    IOError(#[from] io::Error),
    #[error("Failed to (de)serialize the scan index: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/**
An ordered mapping from scan ID to [`ScanIndexRecord`], with MS1 and MSn scans
held in separate partitions. Each partition preserves file order.

A wrapper around a pair of [`indexmap::IndexMap`].
*/
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanIndex {
    /// The name of the file the index describes
    pub name: String,
    #[serde(with = "indexmap::map::serde_seq")]
    pub ms1_ids: IndexMap<Box<str>, ScanIndexRecord>,
    #[serde(with = "indexmap::map::serde_seq")]
    pub msn_ids: IndexMap<Box<str>, ScanIndexRecord>,
}

impl ScanIndex {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Add `record` to the appropriate partition. Scan IDs are expected to be
    /// unique, a repeated ID replaces the earlier record.
    pub fn insert(&mut self, record: ScanIndexRecord) -> Option<ScanIndexRecord> {
        let key: Box<str> = record.scan_id.as_str().into();
        let (target, other) = if record.ms_level > 1 {
            (&mut self.msn_ids, &mut self.ms1_ids)
        } else {
            (&mut self.ms1_ids, &mut self.msn_ids)
        };
        let moved = other.shift_remove(&key);
        let previous = target.insert(key, record).or(moved);
        if let Some(prev) = previous.as_ref() {
            warn!("Duplicate scan ID {} in index {}", prev.scan_id, self.name);
        }
        previous
    }

    pub fn get(&self, scan_id: &str) -> Option<&ScanIndexRecord> {
        self.ms1_ids
            .get(scan_id)
            .or_else(|| self.msn_ids.get(scan_id))
    }

    #[inline]
    pub fn contains(&self, scan_id: &str) -> bool {
        self.get(scan_id).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ms1_ids.len() + self.msn_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ms1_ids.is_empty() && self.msn_ids.is_empty()
    }

    pub fn ms1_records(&self) -> impl Iterator<Item = &ScanIndexRecord> {
        self.ms1_ids.values()
    }

    pub fn msn_records(&self) -> impl Iterator<Item = &ScanIndexRecord> {
        self.msn_ids.values()
    }

    /// All records ordered by ascending scan time, ties broken by scan ID
    pub fn records_by_time(&self) -> Vec<&ScanIndexRecord> {
        let mut records: Vec<_> = self.ms1_records().chain(self.msn_records()).collect();
        records.sort_by(|a, b| a.time_order(b));
        records
    }

    /// Find the file positions of up to `window` MS1 scans on either side of
    /// the MS1 scan at file position `index`, nearest first on each side. The
    /// scan itself is not included.
    pub fn ms1_neighbors(&self, index: usize, window: usize) -> Vec<usize> {
        if window == 0 {
            return Vec::new();
        }
        let positions: Vec<usize> = self.ms1_ids.values().map(|r| r.index).collect();
        let center = match positions.binary_search(&index) {
            Ok(i) => i,
            Err(_) => return Vec::new(),
        };
        let before = positions[center.saturating_sub(window)..center]
            .iter()
            .rev()
            .copied();
        let end = center
            .saturating_add(1)
            .saturating_add(window)
            .min(positions.len());
        let after = positions[(center + 1)..end].iter().copied();
        before.chain(after).collect()
    }

    /// Write the index out in JSON format to `writer`
    pub fn to_writer<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, self)
    }

    /// Read an index in JSON format from `reader`
    pub fn from_reader<R: Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let handle = fs::File::open(path)?;
        Ok(Self::from_reader(io::BufReader::new(handle))?)
    }

    pub fn dump<P: AsRef<Path>>(&self, path: P) -> Result<(), IndexError> {
        let handle = fs::File::create(path)?;
        let mut writer = io::BufWriter::new(handle);
        self.to_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl FromIterator<ScanDescription> for ScanIndex {
    fn from_iter<T: IntoIterator<Item = ScanDescription>>(iter: T) -> Self {
        let mut index = ScanIndex::default();
        for description in iter {
            index.insert(ScanIndexRecord::from(&description));
        }
        index
    }
}

/// The co-located index file name for the data file at `path`: the data file's
/// full name with [`INDEX_FILE_SUFFIX`] appended.
pub fn index_file_name<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    let path = path.as_ref();
    let file_name = path.file_name()?;
    let mut name = file_name.to_os_string();
    name.push(INDEX_FILE_SUFFIX);
    Some(path.with_file_name(name))
}
