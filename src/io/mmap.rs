//! Memory-mapped file access for pixel data.
//!
//! Image planes are located by absolute byte offsets recorded in the
//! Micro-Manager index map, so reads bypass the TIFF page structure entirely:
//! map the file, bounds-check the range, copy out exactly the plane bytes.
//!
//! Mappings are scoped resources. The plain [`read_exact_at`] path maps,
//! reads, and releases; [`MappingCache`] keeps a bounded number of mappings
//! open per file to avoid re-mapping on every plane read. Both paths have
//! identical read semantics.

use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use lru::LruCache;
use memmap2::Mmap;

use crate::error::IoError;

/// Default number of files to keep mapped at once.
const DEFAULT_MAPPING_CAPACITY: usize = 16;

/// Map a file into memory read-only.
pub fn map_file(path: &Path) -> Result<Arc<Mmap>, IoError> {
    let file = File::open(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => IoError::NotFound(path.to_path_buf()),
        _ => IoError::Io(err),
    })?;
    // Safety: the mapping is read-only and the dataset contract is that
    // files are not mutated while a reader holds them open.
    let map = unsafe { Mmap::map(&file)? };
    Ok(Arc::new(map))
}

/// Read exactly `len` bytes at `offset` from a mapping.
///
/// Returns an error if the range falls outside the mapped file; the copy
/// detaches the result from the mapping's lifetime.
pub fn read_exact_at(map: &Mmap, offset: u64, len: usize) -> Result<Bytes, IoError> {
    let size = map.len() as u64;
    let end = offset
        .checked_add(len as u64)
        .ok_or(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        })?;
    if end > size {
        return Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        });
    }
    let start = offset as usize;
    Ok(Bytes::copy_from_slice(&map[start..start + len]))
}

// =============================================================================
// MappingCache
// =============================================================================

/// LRU cache of open memory mappings keyed by file path.
///
/// A multi-file dataset touches the same handful of files over and over while
/// a position array is materialized; keeping the mappings open avoids a
/// map/unmap cycle per plane. Evicted and dropped mappings release their file
/// handles immediately.
pub struct MappingCache {
    cache: Mutex<LruCache<PathBuf, Arc<Mmap>>>,
}

impl MappingCache {
    /// Create a cache holding up to [`DEFAULT_MAPPING_CAPACITY`] mappings.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAPPING_CAPACITY)
    }

    /// Create a cache holding up to `capacity` mappings.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("mapping cache capacity must be non-zero"),
            )),
        }
    }

    /// Get the mapping for `path`, opening it on first use.
    pub fn get(&self, path: &Path) -> Result<Arc<Mmap>, IoError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(map) = cache.get(path) {
            return Ok(map.clone());
        }
        let map = map_file(path)?;
        cache.put(path.to_path_buf(), map.clone());
        Ok(map)
    }

    /// Read exactly `len` bytes at `offset` from `path`.
    pub fn read_exact_at(&self, path: &Path, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let map = self.get(path)?;
        read_exact_at(&map, offset, len)
    }

    /// Drop every cached mapping, releasing the underlying file handles.
    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of files currently mapped.
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no files are currently mapped.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MappingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MappingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingCache")
            .field("mapped_files", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
