//! The set of files the service can answer questions about.
//!
//! Files are registered once at startup and addressed afterwards by a short
//! string key assigned in registration order. Each [`FileRegistryEntry`]
//! owns its reader handle and its scan index, which is populated once.
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info, warn};
use thiserror::Error;

use crate::handle::ScanReaderHandle;
use crate::index::{index_file_name, IndexError, ScanIndex};
use crate::source::{MzDataScanSource, ScanAccessError, ScanSource};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No file is registered under the key {0:?}")]
    UnknownKey(String),
    #[error("Failed to open {}: {source}", path.display())]
    Configuration {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to index {}: {source}", path.display())]
    Indexing {
        path: PathBuf,
        #[source]
        source: ScanAccessError,
    },
}

impl RegistryError {
    pub fn is_unknown_key(&self) -> bool {
        matches!(self, Self::UnknownKey(_))
    }
}

/// One registered file: its key, its location, the handle that serializes
/// reads from it, and its scan index. The index is populated when the entry
/// is created and never changes afterwards.
#[derive(Debug)]
pub struct FileRegistryEntry<R: ScanSource> {
    key: String,
    path: PathBuf,
    handle: ScanReaderHandle<R>,
    index: ScanIndex,
}

impl<R: ScanSource> FileRegistryEntry<R> {
    fn handle_for(key: &str, path: &Path, source: R) -> ScanReaderHandle<R> {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.to_string());
        ScanReaderHandle::new(name, source)
    }

    /// Wrap `source`, building its scan index in memory by walking the file
    pub fn new(key: String, path: PathBuf, source: R) -> Result<Self, RegistryError> {
        let handle = Self::handle_for(&key, &path, source);
        let index = handle
            .build_index()
            .map_err(|source| RegistryError::Indexing {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            key,
            path,
            handle,
            index,
        })
    }

    /// Wrap `source`, loading its scan index from the co-located index file.
    /// If that file is missing, stale or unreadable, the index is built by
    /// walking the file and written out for next time.
    pub fn open(key: String, path: PathBuf, source: R) -> Result<Self, RegistryError> {
        let handle = Self::handle_for(&key, &path, source);
        let index_path = index_file_name(&path);
        let loaded = index_path
            .as_deref()
            .and_then(|p| Self::load_index(&handle, &path, p));

        let index = match loaded {
            Some(index) => index,
            None => {
                let index = handle
                    .build_index()
                    .map_err(|source| RegistryError::Indexing {
                        path: path.clone(),
                        source,
                    })?;
                if let Some(p) = index_path.as_deref() {
                    if let Err(e) = Self::persist(&index, p) {
                        warn!("Failed to write scan index {}: {e}", p.display());
                    }
                }
                index
            }
        };
        Ok(Self {
            key,
            path,
            handle,
            index,
        })
    }

    fn load_index(handle: &ScanReaderHandle<R>, path: &Path, index_path: &Path) -> Option<ScanIndex> {
        if !index_path.exists() {
            return None;
        }
        match ScanIndex::load(index_path) {
            Ok(index) if index.len() == handle.len() => {
                debug!("Loaded scan index from {}", index_path.display());
                Some(index)
            }
            Ok(index) => {
                warn!(
                    "Scan index {} describes {} scans but {} has {}, rebuilding",
                    index_path.display(),
                    index.len(),
                    path.display(),
                    handle.len()
                );
                None
            }
            Err(e) => {
                warn!(
                    "Failed to read scan index {}, rebuilding: {e}",
                    index_path.display()
                );
                None
            }
        }
    }

    fn persist(index: &ScanIndex, path: &Path) -> Result<(), IndexError> {
        index.dump(path)?;
        debug!("Wrote scan index to {}", path.display());
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handle(&self) -> &ScanReaderHandle<R> {
        &self.handle
    }

    pub fn index(&self) -> &ScanIndex {
        &self.index
    }
}

/// Maps file keys to shared [`FileRegistryEntry`] instances. Resolving the same
/// key twice yields the same entry.
#[derive(Debug)]
pub struct FileRegistry<R: ScanSource> {
    entries: IndexMap<String, Arc<FileRegistryEntry<R>>>,
}

impl<R: ScanSource> Default for FileRegistry<R> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<R: ScanSource> FileRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_key(&self) -> String {
        self.entries.len().to_string()
    }

    fn insert(&mut self, entry: FileRegistryEntry<R>) -> Arc<FileRegistryEntry<R>> {
        let entry = Arc::new(entry);
        self.entries.insert(entry.key.clone(), entry.clone());
        entry
    }

    /// Register `source` as the file at `path`, loading or building its scan
    /// index and persisting it beside the file.
    pub fn register<P: AsRef<Path>>(
        &mut self,
        path: P,
        source: R,
    ) -> Result<Arc<FileRegistryEntry<R>>, RegistryError> {
        let entry = FileRegistryEntry::open(self.next_key(), path.as_ref().to_path_buf(), source)?;
        info!(
            "Registered {} as {} with {} scans",
            entry.path.display(),
            entry.key,
            entry.index.len()
        );
        Ok(self.insert(entry))
    }

    /// Register `source` under `name` without touching the filesystem. The scan
    /// index is built in memory.
    pub fn register_unpersisted(
        &mut self,
        name: &str,
        source: R,
    ) -> Result<Arc<FileRegistryEntry<R>>, RegistryError> {
        let entry = FileRegistryEntry::new(self.next_key(), PathBuf::from(name), source)?;
        Ok(self.insert(entry))
    }

    /// Open every path in `paths` with `opener` and register it, in order.
    /// The first file that fails to open or index aborts the whole registry.
    pub fn open_paths<P, I, F>(paths: I, mut opener: F) -> Result<Self, RegistryError>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = P>,
        F: FnMut(&Path) -> io::Result<R>,
    {
        let mut this = Self::new();
        for path in paths {
            let path = path.as_ref();
            let source = opener(path).map_err(|source| RegistryError::Configuration {
                path: path.to_path_buf(),
                source,
            })?;
            this.register(path, source)?;
        }
        Ok(this)
    }

    pub fn resolve(&self, key: &str) -> Result<Arc<FileRegistryEntry<R>>, RegistryError> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownKey(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FileRegistryEntry<R>>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FileRegistry<MzDataScanSource> {
    /// Open mzML or MGF files from disk
    pub fn open_mzdata_paths<P: AsRef<Path>>(
        paths: impl IntoIterator<Item = P>,
    ) -> Result<Self, RegistryError> {
        Self::open_paths(paths, |p| MzDataScanSource::open_path(p))
    }
}
