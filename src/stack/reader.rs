//! The indexed MMStack reader.
//!
//! Micro-Manager splits one acquisition across sibling OME-TIFF files with
//! no guarantee of completeness: acquisitions stop early, frames get
//! dropped, files go missing. [`MmStackReader`] reconstructs the dataset by
//! scanning every file's embedded page index into one coordinate index,
//! inferring the true extents from what was actually written, and exposing
//! each stage position as a lazily materialized dense array in which missing
//! frames are zero planes rather than errors.
//!
//! Structural problems (no files, missing metadata blocks) fail the open;
//! a reader that opened successfully never fails a lookup through the
//! dense-array path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::debug;

use crate::error::{FormatError, IoError, ReaderError};
use crate::format::{
    MmTiffOpener, PixelType, SchemaVersion, StagePosition, SummaryMetadata, TiffOpener, TiffSource,
};
use crate::io::MappingCache;
use crate::stack::array::{Plane, PositionArray};
use crate::stack::index::{Coordinate, CoordIndex, DuplicatePolicy, Extents, IndexEntry};

// =============================================================================
// Options
// =============================================================================

/// Tuning knobs for [`MmStackReader::open_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StackOptions {
    /// What to do when two files claim the same coordinate
    pub duplicates: DuplicatePolicy,
    /// Materialize every position array during open instead of lazily
    pub eager: bool,
}

// =============================================================================
// MmStackReader
// =============================================================================

/// Reader for a Micro-Manager multi-file OME-TIFF dataset.
///
/// The coordinate index and metadata are built once at open and immutable
/// afterwards; the only mutable state is the per-position array cache, which
/// grows monotonically and is never evicted.
pub struct MmStackReader {
    name: String,
    files: Vec<PathBuf>,
    meta: SummaryMetadata,
    summary: Value,
    comments: Option<Value>,
    index: CoordIndex,
    extents: Extents,
    dtype: PixelType,
    mappings: MappingCache,
    cache: Mutex<HashMap<usize, Arc<PositionArray>>>,
    materializations: AtomicUsize,
}

impl MmStackReader {
    /// Open a dataset with default options.
    ///
    /// `path` is either the dataset directory or the path of any `.ome.tif`
    /// file inside it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReaderError> {
        Self::open_with(path, StackOptions::default())
    }

    /// Open a dataset.
    ///
    /// # Errors
    /// - [`ReaderError::NoFilesFound`] if the directory holds no `.ome.tif`
    ///   files
    /// - [`ReaderError::NotAnOmeTiff`] if `path` is a file without the
    ///   `.ome.tif` suffix
    /// - [`ReaderError::Format`] if a file lacks the expected embedded
    ///   metadata blocks
    /// - [`ReaderError::DuplicateCoordinate`] under
    ///   [`DuplicatePolicy::Error`]
    pub fn open_with(path: impl AsRef<Path>, options: StackOptions) -> Result<Self, ReaderError> {
        let path = path.as_ref();
        let dir = resolve_dataset_dir(path)?;
        let files = list_ome_tiff_files(&dir)?;
        if files.is_empty() {
            return Err(ReaderError::NoFilesFound(dir));
        }
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(dataset = %name, files = files.len(), "opening MMStack dataset");

        let opener = MmTiffOpener;
        let sources = files
            .iter()
            .map(|file| opener.open(file))
            .collect::<Result<Vec<_>, _>>()?;

        // Acquisition-level metadata always comes from the first file.
        let first = &sources[0];
        let summary = first.summary()?.ok_or_else(|| FormatError::MissingBlock {
            block: "Summary",
            path: first.path().to_path_buf(),
        })?;
        let meta = SummaryMetadata::from_json(&summary)?;
        let dtype = first.pixel_type()?;
        let comments = first.comments()?;

        let index = CoordIndex::build(&sources, options.duplicates)?;
        // The declared counts are a best-effort seed; what was actually
        // written wins, in either direction.
        let extents = Extents {
            positions: index.positions(),
            frames: index.frames(),
            channels: index.channels(),
            slices: index.slices(),
            height: meta.height,
            width: meta.width,
        };
        debug!(
            dataset = %name,
            planes = index.len(),
            ?extents,
            dtype = dtype.name(),
            "dataset indexed"
        );

        let reader = Self {
            name,
            files,
            meta,
            summary,
            comments,
            index,
            extents,
            dtype,
            mappings: MappingCache::new(),
            cache: Mutex::new(HashMap::new()),
            materializations: AtomicUsize::new(0),
        };
        if options.eager {
            for position in 0..reader.extents.positions {
                reader.position_array(position)?;
            }
        }
        Ok(reader)
    }

    // -------------------------------------------------------------------------
    // Pixel access
    // -------------------------------------------------------------------------

    /// Read the plane at one coordinate through its memory-mapped file.
    ///
    /// Unlike the dense-array path, this fails with
    /// [`ReaderError::CoordinateNotFound`] when the coordinate has no
    /// backing page.
    pub fn get_image(
        &self,
        position: usize,
        time: usize,
        channel: usize,
        slice: usize,
    ) -> Result<Plane, ReaderError> {
        let coord = Coordinate::new(position, time, channel, slice);
        let entry = self
            .index
            .get(&coord)
            .copied()
            .ok_or(ReaderError::CoordinateNotFound(coord))?;
        self.read_plane(&entry)
    }

    fn read_plane(&self, entry: &IndexEntry) -> Result<Plane, ReaderError> {
        let len = self.extents.height * self.extents.width * self.dtype.size_of();
        let data = self
            .mappings
            .read_exact_at(&self.files[entry.file], entry.offset, len)?;
        Ok(Plane::new(
            data,
            self.dtype,
            self.extents.height,
            self.extents.width,
        ))
    }

    /// The dense array of one position, materializing it on first request.
    ///
    /// The array is sized from the coordinates observed under this position
    /// rather than the global extents, so asymmetric acquisitions do not
    /// get padded out. Missing coordinates stay zero planes. Repeated calls
    /// return the same cached array.
    pub fn position_array(&self, position: usize) -> Result<Arc<PositionArray>, ReaderError> {
        if position >= self.extents.positions {
            return Err(ReaderError::PositionOutOfRange {
                position,
                count: self.extents.positions,
            });
        }
        if let Some(array) = self.lock_cache().get(&position) {
            return Ok(array.clone());
        }
        let array = Arc::new(self.materialize_position(position)?);
        Ok(self
            .lock_cache()
            .entry(position)
            .or_insert(array)
            .clone())
    }

    fn materialize_position(&self, position: usize) -> Result<PositionArray, ReaderError> {
        let (frames, channels, slices) = self.index.position_counts(position);
        let mut array = PositionArray::zeros(
            [
                frames,
                channels,
                slices,
                self.extents.height,
                self.extents.width,
            ],
            self.dtype,
        );
        for (coord, entry) in self.index.iter() {
            if coord.position != position {
                continue;
            }
            let plane = self.read_plane(entry)?;
            array.set_plane(coord.time, coord.channel, coord.slice, &plane);
        }
        self.materializations.fetch_add(1, Ordering::Relaxed);
        debug!(
            position,
            frames, channels, slices, "materialized position array"
        );
        Ok(array)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<usize, Arc<PositionArray>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Container protocol
    // -------------------------------------------------------------------------

    /// Number of stage positions in the dataset.
    pub fn num_positions(&self) -> usize {
        self.extents.positions
    }

    /// Same as [`Self::num_positions`].
    pub fn len(&self) -> usize {
        self.num_positions()
    }

    /// Whether the dataset holds no positions at all.
    pub fn is_empty(&self) -> bool {
        self.num_positions() == 0
    }

    /// Whether `position` is within the dataset.
    pub fn contains_position(&self, position: usize) -> bool {
        position < self.num_positions()
    }

    /// Iterate over the position indices.
    pub fn positions(&self) -> std::ops::Range<usize> {
        0..self.num_positions()
    }

    /// Iterate over the dense arrays of every position, materializing as
    /// needed.
    pub fn iter_arrays(
        &self,
    ) -> impl Iterator<Item = Result<Arc<PositionArray>, ReaderError>> + '_ {
        self.positions().map(move |p| self.position_array(p))
    }

    /// Release the underlying file mappings and consume the reader.
    pub fn close(self) {
        self.mappings.clear();
    }

    // -------------------------------------------------------------------------
    // Read-only enforcement
    // -------------------------------------------------------------------------

    /// Datasets are read-only; always fails with [`ReaderError::ReadOnly`].
    pub fn set_image(
        &self,
        _position: usize,
        _time: usize,
        _channel: usize,
        _slice: usize,
        _plane: &Plane,
    ) -> Result<(), ReaderError> {
        Err(ReaderError::ReadOnly {
            operation: "set_image",
        })
    }

    /// Datasets are read-only; always fails with [`ReaderError::ReadOnly`].
    pub fn delete_image(
        &self,
        _position: usize,
        _time: usize,
        _channel: usize,
        _slice: usize,
    ) -> Result<(), ReaderError> {
        Err(ReaderError::ReadOnly {
            operation: "delete_image",
        })
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    /// Dataset name (the directory's basename).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The files backing this dataset, in scan order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Inferred dataset extents.
    pub fn extents(&self) -> Extents {
        self.extents
    }

    /// Pixel datatype, probed from the first page of the first file.
    pub fn pixel_type(&self) -> PixelType {
        self.dtype
    }

    /// Detected summary-metadata dialect.
    pub fn schema_version(&self) -> SchemaVersion {
        self.meta.version
    }

    /// One name per channel; empty strings for beta datasets without names.
    pub fn channel_names(&self) -> &[String] {
        &self.meta.channel_names
    }

    /// Spacing between z slices in micrometers, when declared.
    pub fn z_step_um(&self) -> Option<f64> {
        self.meta.z_step_um
    }

    /// Flattened stage positions of a multi-position acquisition.
    pub fn stage_positions(&self) -> &[StagePosition] {
        &self.meta.stage_positions
    }

    /// The raw summary metadata block of the first file.
    pub fn summary(&self) -> &Value {
        &self.summary
    }

    /// The acquisition comments block, when present.
    pub fn comments(&self) -> Option<&Value> {
        self.comments.as_ref()
    }

    /// Whether a coordinate has a backing page in the index.
    pub fn has_image(&self, position: usize, time: usize, channel: usize, slice: usize) -> bool {
        self.index
            .contains(&Coordinate::new(position, time, channel, slice))
    }

    /// Number of indexed planes across all files.
    pub fn num_planes(&self) -> usize {
        self.index.len()
    }

    /// How many position arrays have been built from disk so far.
    ///
    /// Cached hits do not increase this; useful for verifying that repeated
    /// array requests do not rescan.
    pub fn materializations(&self) -> usize {
        self.materializations.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for MmStackReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmStackReader")
            .field("name", &self.name)
            .field("files", &self.files.len())
            .field("extents", &self.extents)
            .field("dtype", &self.dtype.name())
            .finish()
    }
}

// =============================================================================
// Dataset discovery
// =============================================================================

/// Suffix every dataset file must carry.
const OME_TIFF_SUFFIX: &str = ".ome.tif";

pub(crate) fn resolve_dataset_dir(path: &Path) -> Result<PathBuf, ReaderError> {
    if path.is_file() {
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        if !file_name.is_some_and(|n| n.ends_with(OME_TIFF_SUFFIX)) {
            return Err(ReaderError::NotAnOmeTiff(path.to_path_buf()));
        }
        Ok(path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")))
    } else if path.is_dir() {
        Ok(path.to_path_buf())
    } else {
        Err(ReaderError::Io(IoError::NotFound(path.to_path_buf())))
    }
}

/// List the dataset's OME-TIFF files, sorted by name for a deterministic
/// scan order.
pub(crate) fn list_ome_tiff_files(dir: &Path) -> Result<Vec<PathBuf>, ReaderError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(IoError::Io)? {
        let entry = entry.map_err(IoError::Io)?;
        let path = entry.path();
        let is_match = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(OME_TIFF_SUFFIX))
            .unwrap_or(false);
        if is_match && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
