use std::collections::VecDeque;

use indexmap::IndexMap;

use super::{RawScan, ScanSource};

/// A collection of scans held in memory but providing an interface
/// identical to a data file. This structure owns its data, so in order
/// to yield ownership for [`ScanSource`], scans are cloned.
#[derive(Debug, Default, Clone)]
pub struct MemoryScanSource {
    scans: VecDeque<RawScan>,
    position: usize,
    offsets: IndexMap<Box<str>, usize>,
}

impl MemoryScanSource {
    /// Build a source over `scans`, re-numbering each scan's `index` to match its
    /// position.
    pub fn new(scans: impl IntoIterator<Item = RawScan>) -> Self {
        let mut scans: VecDeque<RawScan> = scans.into_iter().collect();
        let mut offsets = IndexMap::with_capacity(scans.len());
        scans.iter_mut().enumerate().for_each(|(i, s)| {
            s.description.index = i;
            offsets.insert(s.id().into(), i);
        });

        Self {
            scans,
            position: 0,
            offsets,
        }
    }

    /// The cursor position, only meaningful to iteration
    pub fn cursor(&self) -> usize {
        self.position
    }
}

impl Iterator for MemoryScanSource {
    type Item = RawScan;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.scans.get(self.position).cloned();
        if value.is_some() {
            self.position += 1;
        }
        value
    }
}

impl ScanSource for MemoryScanSource {
    type Scan = RawScan;

    fn get_scan_by_id(&mut self, id: &str) -> Option<RawScan> {
        let i = *self.offsets.get(id)?;
        self.position = i + 1;
        self.scans.get(i).cloned()
    }

    fn get_scan_by_index(&mut self, index: usize) -> Option<RawScan> {
        let value = self.scans.get(index).cloned();
        if value.is_some() {
            self.position = index + 1;
        }
        value
    }

    fn reset(&mut self) {
        self.position = 0;
    }

    fn len(&self) -> usize {
        self.scans.len()
    }
}

impl From<Vec<RawScan>> for MemoryScanSource {
    fn from(value: Vec<RawScan>) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::{ScanCriterion, ScanDescription};

    fn scan(id: &str, ms_level: u8) -> RawScan {
        RawScan::new(
            ScanDescription {
                id: id.to_string(),
                ms_level,
                ..Default::default()
            },
            vec![100.0, 200.0],
            vec![1.0, 2.0],
        )
    }

    #[test]
    fn test_addressed_access() {
        let mut source = MemoryScanSource::new(vec![scan("a", 1), scan("b", 2), scan("c", 2)]);
        assert_eq!(source.len(), 3);

        let b = source.get_scan_by_id("b").unwrap();
        assert_eq!(b.index(), 1);
        assert_eq!(source.cursor(), 2);

        let c = source.get_scan(&ScanCriterion::Index(2)).unwrap();
        assert_eq!(c.id(), "c");
        assert!(source.get_scan_by_index(3).is_none());
        assert!(source.get_scan_by_id("d").is_none());

        source.reset();
        let ids: Vec<String> = source.map(|s| s.id().to_string()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
