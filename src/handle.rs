//! Serialized access to a single [`ScanSource`].
//!
//! File readers keep a cursor, so every read made through a
//! [`ScanReaderHandle`] happens under its lock, and the scan's signal arrays
//! are decoded before the lock is released.
use std::fmt::Debug;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::index::ScanIndex;
use crate::source::{
    RawScan, ScanAccessError, ScanCriterion, ScanDescription, ScanSource, SourceScan,
};

/// The default number of scans inspected after an MS1 scan while looking
/// for its product scans
pub const DEFAULT_BRACKET_LIMIT: usize = 50;

/// Owns a [`ScanSource`] behind a mutex so it can be shared across request
/// handlers. The lock is held for the duration of a single logical fetch
/// and never across processing.
pub struct ScanReaderHandle<R: ScanSource> {
    name: String,
    source: Mutex<R>,
}

impl<R: ScanSource> Debug for ScanReaderHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanReaderHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<R: ScanSource> ScanReaderHandle<R> {
    pub fn new(name: impl Into<String>, source: R) -> Self {
        Self {
            name: name.into(),
            source: Mutex::new(source),
        }
    }

    /// A label for the file this handle reads, used in log messages
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.source.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the scan matching `criterion`, decoding its arrays while the
    /// lock is held.
    pub fn with_scan(&self, criterion: &ScanCriterion) -> Result<RawScan, ScanAccessError> {
        trace!("{}: fetching scan by {criterion}", self.name);
        let mut source = self.source.lock();
        source
            .get_scan(criterion)
            .ok_or_else(|| ScanAccessError::not_found(criterion))?
            .into_raw_scan()
    }

    /// Fetch several scans by position under a single acquisition of the lock.
    /// Positions that do not exist are skipped.
    pub fn with_scans(&self, indices: &[usize]) -> Result<Vec<RawScan>, ScanAccessError> {
        let mut source = self.source.lock();
        let mut scans = Vec::with_capacity(indices.len());
        for index in indices.iter().copied() {
            match source.get_scan_by_index(index) {
                Some(scan) => scans.push(scan.into_raw_scan()?),
                None => debug!("{}: no scan at index {index}", self.name),
            }
        }
        Ok(scans)
    }

    /// Walk forward from the scan at `index`, collecting the descriptions of
    /// consecutive MSn scans. The walk stops at the next MS1 scan, at the end of
    /// the file, or after `limit` scans. The source is rewound before and after.
    pub fn bracket_products(&self, index: usize, limit: usize) -> Vec<ScanDescription> {
        let mut source = self.source.lock();
        source.reset();
        let mut products = Vec::new();
        for i in (index + 1)..=(index.saturating_add(limit)) {
            let Some(scan) = source.get_scan_by_index(i) else {
                break;
            };
            let description = scan.scan_description();
            if description.ms_level <= 1 {
                break;
            }
            products.push(description);
        }
        source.reset();
        products
    }

    /// Visit every scan in the file once, building a [`ScanIndex`] from their
    /// descriptions. The source is rewound before and after. A scan that
    /// cannot be read fails the whole index.
    pub fn build_index(&self) -> Result<ScanIndex, ScanAccessError> {
        let mut source = self.source.lock();
        source.reset();
        let n = source.len();
        debug!("{}: building scan index over {n} scans", self.name);
        let mut index = ScanIndex::new(self.name.clone());
        for i in 0..n {
            let Some(scan) = source.get_scan_by_index(i) else {
                source.reset();
                return Err(ScanAccessError::IndexNotFound(i));
            };
            index.insert((&scan.scan_description()).into());
        }
        source.reset();
        Ok(index)
    }

    #[cfg(test)]
    pub(crate) fn with_source<T, F: FnOnce(&mut R) -> T>(&self, f: F) -> T {
        let mut source = self.source.lock();
        f(&mut source)
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::source::{MemoryScanSource, PrecursorLink};

    fn scan(id: &str, ms_level: u8, scan_time: f64) -> RawScan {
        RawScan::new(
            ScanDescription {
                id: id.to_string(),
                ms_level,
                scan_time,
                precursor: if ms_level > 1 {
                    Some(PrecursorLink::default())
                } else {
                    None
                },
                ..Default::default()
            },
            vec![100.0, 200.0, 300.0],
            vec![10.0, 20.0, 30.0],
        )
    }

    fn run() -> MemoryScanSource {
        MemoryScanSource::new(vec![
            scan("s0", 1, 0.1),
            scan("s1", 2, 0.2),
            scan("s2", 2, 0.3),
            scan("s3", 1, 0.4),
            scan("s4", 2, 0.5),
        ])
    }

    /// Tracks how many callers are inside the source at the same time
    struct InstrumentedSource {
        inner: MemoryScanSource,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl InstrumentedSource {
        fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_micros(200));
        }

        fn exit(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ScanSource for InstrumentedSource {
        type Scan = RawScan;

        fn get_scan_by_id(&mut self, id: &str) -> Option<RawScan> {
            self.enter();
            let value = self.inner.get_scan_by_id(id);
            self.exit();
            value
        }

        fn get_scan_by_index(&mut self, index: usize) -> Option<RawScan> {
            self.enter();
            let value = self.inner.get_scan_by_index(index);
            self.exit();
            value
        }

        fn reset(&mut self) {
            self.enter();
            self.inner.reset();
            self.exit();
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    #[test]
    fn test_with_scan() {
        let handle = ScanReaderHandle::new("test", run());
        let s = handle.with_scan(&ScanCriterion::from("s3")).unwrap();
        assert_eq!(s.index(), 3);
        assert_eq!(s.mz_array, [100.0, 200.0, 300.0]);

        let err = handle.with_scan(&ScanCriterion::from("s9")).unwrap_err();
        assert!(err.is_not_found());
        let err = handle.with_scan(&ScanCriterion::from(9)).unwrap_err();
        assert!(matches!(err, ScanAccessError::IndexNotFound(9)));
    }

    #[test]
    fn test_with_scans_skips_missing() {
        let handle = ScanReaderHandle::new("test", run());
        let scans = handle.with_scans(&[3, 0, 12]).unwrap();
        let ids: Vec<_> = scans.iter().map(|s| s.id()).collect();
        assert_eq!(ids, ["s3", "s0"]);
    }

    #[test]
    fn test_bracket_products() {
        let handle = ScanReaderHandle::new("test", run());
        let ids: Vec<_> = handle
            .bracket_products(0, 50)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["s1", "s2"]);

        let ids: Vec<_> = handle
            .bracket_products(0, 1)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["s1"]);

        // Runs off the end of the file
        let ids: Vec<_> = handle
            .bracket_products(3, 50)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["s4"]);

        handle.with_source(|source| assert_eq!(source.cursor(), 0));
    }

    #[test]
    fn test_build_index() {
        let handle = ScanReaderHandle::new("test", run());
        let index = handle.build_index().unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index.ms1_ids.len(), 2);
        assert_eq!(index.msn_ids.len(), 3);
        assert_eq!(index.name, "test");
        handle.with_source(|source| assert_eq!(source.cursor(), 0));
    }

    #[test]
    fn test_build_index_requires_every_scan() {
        struct Unreadable(MemoryScanSource);

        impl ScanSource for Unreadable {
            type Scan = RawScan;

            fn get_scan_by_id(&mut self, id: &str) -> Option<RawScan> {
                self.0.get_scan_by_id(id)
            }

            fn get_scan_by_index(&mut self, index: usize) -> Option<RawScan> {
                if index == 3 {
                    return None;
                }
                self.0.get_scan_by_index(index)
            }

            fn reset(&mut self) {
                self.0.reset()
            }

            fn len(&self) -> usize {
                self.0.len()
            }
        }

        let handle = ScanReaderHandle::new("test", Unreadable(run()));
        let err = handle.build_index().unwrap_err();
        assert!(matches!(err, ScanAccessError::IndexNotFound(3)));
        handle.with_source(|source| assert_eq!(source.0.cursor(), 0));
    }

    #[test]
    fn test_reads_never_overlap() {
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let handle = ScanReaderHandle::new(
            "instrumented",
            InstrumentedSource {
                inner: run(),
                active: active.clone(),
                max_active: max_active.clone(),
            },
        );

        thread::scope(|scope| {
            for t in 0..8usize {
                let handle = &handle;
                scope.spawn(move || {
                    for i in 0..20usize {
                        match (t + i) % 3 {
                            0 => {
                                handle.with_scan(&ScanCriterion::from((t + i) % 5)).unwrap();
                            }
                            1 => {
                                handle.with_scans(&[0, 3]).unwrap();
                            }
                            _ => {
                                handle.bracket_products(0, 50);
                            }
                        }
                    }
                });
            }
        });

        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }
}
