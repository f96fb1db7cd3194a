//! Single-series reader.
//!
//! Some datasets are one coherent multi-page series whose shape is fully
//! described by its own metadata; no sparse index reconstruction is needed.
//! [`SeriesStack`] parses the declared axis order, pads it to the canonical
//! (position, time, channel, slice, Y, X) order by inserting size-1 axes for
//! anything undeclared, and materializes positions lazily through page reads
//! on the collaborator.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::{FormatError, ReaderError};
use crate::format::{MmTiffFile, PixelType, TiffSource};
use crate::stack::array::{Plane, PositionArray};
use crate::stack::index::Coordinate;
use crate::stack::reader::{list_ome_tiff_files, resolve_dataset_dir};

// =============================================================================
// Axes
// =============================================================================

/// One axis of the canonical (R, T, C, Z, Y, X) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Stage position (scene)
    Position,
    /// Timepoint
    Time,
    /// Channel
    Channel,
    /// Z slice
    Slice,
    /// Image rows
    Y,
    /// Image columns
    X,
}

impl Axis {
    /// Parse an axis-order character. Both `R` and `P` denote positions.
    pub fn from_char(c: char) -> Option<Axis> {
        match c {
            'R' | 'P' => Some(Axis::Position),
            'T' => Some(Axis::Time),
            'C' => Some(Axis::Channel),
            'Z' => Some(Axis::Slice),
            'Y' => Some(Axis::Y),
            'X' => Some(Axis::X),
            _ => None,
        }
    }

    /// Canonical label character.
    pub const fn label(self) -> char {
        match self {
            Axis::Position => 'R',
            Axis::Time => 'T',
            Axis::Channel => 'C',
            Axis::Slice => 'Z',
            Axis::Y => 'Y',
            Axis::X => 'X',
        }
    }
}

// =============================================================================
// SeriesStack
// =============================================================================

/// Lazy reader over one self-describing TIFF series.
///
/// Read-only by contract: the mutating half of the container protocol fails
/// with [`ReaderError::ReadOnly`] instead of being silently ignored.
pub struct SeriesStack<S: TiffSource = MmTiffFile> {
    source: S,
    name: String,
    /// Declared non-image axes with their sizes, in declared order; pages
    /// are laid out row-major over these
    plane_axes: Vec<(Axis, usize)>,
    /// Canonical (R, T, C, Z, Y, X) sizes after padding
    dims: [usize; 6],
    dtype: PixelType,
    cache: Mutex<HashMap<usize, Arc<PositionArray>>>,
}

impl SeriesStack<MmTiffFile> {
    /// Open a series from a dataset directory or a single `.ome.tif` path.
    ///
    /// A directory resolves to its first file in name order.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReaderError> {
        let path = path.as_ref();
        let file = if path.is_dir() {
            let dir = resolve_dataset_dir(path)?;
            let files = list_ome_tiff_files(&dir)?;
            files
                .into_iter()
                .next()
                .ok_or_else(|| ReaderError::NoFilesFound(dir))?
        } else {
            resolve_dataset_dir(path)?;
            path.to_path_buf()
        };
        Self::from_source(MmTiffFile::open(file)?)
    }
}

impl<S: TiffSource> SeriesStack<S> {
    /// Wrap an already-opened source.
    pub fn from_source(source: S) -> Result<Self, ReaderError> {
        let layout = source.series_layout()?;
        if layout.axes.chars().count() != layout.shape.len() {
            return Err(ReaderError::Format(FormatError::NotMmStack {
                reason: format!(
                    "series declares {} axes but {} extents",
                    layout.axes.len(),
                    layout.shape.len()
                ),
            }));
        }

        let mut dims = [1usize, 1, 1, 1, 0, 0];
        let mut plane_axes = Vec::new();
        for (c, &size) in layout.axes.chars().zip(&layout.shape) {
            let axis = Axis::from_char(c).ok_or_else(|| {
                ReaderError::Format(FormatError::NotMmStack {
                    reason: format!("unknown series axis '{c}'"),
                })
            })?;
            match axis {
                Axis::Y => dims[4] = size,
                Axis::X => dims[5] = size,
                _ => {
                    dims[axis as usize] = size;
                    plane_axes.push((axis, size));
                }
            }
        }
        if dims[4] == 0 || dims[5] == 0 {
            return Err(ReaderError::Format(FormatError::NotMmStack {
                reason: format!("series axes '{}' lack Y/X image axes", layout.axes),
            }));
        }

        let declared_planes: usize = plane_axes.iter().map(|&(_, size)| size).product();
        if source.page_count() > 0 && source.page_count() < declared_planes {
            warn!(
                declared = declared_planes,
                pages = source.page_count(),
                "series declares more planes than the file holds"
            );
        }

        let dtype = source.pixel_type()?;
        let name = source
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .map(|n| n.strip_suffix(".ome.tif").map(str::to_owned).unwrap_or(n))
            .unwrap_or_default();
        debug!(series = %name, axes = %layout.axes, ?dims, "opened series");

        Ok(Self {
            source,
            name,
            plane_axes,
            dims,
            dtype,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Page index of a coordinate: row-major over the declared axis order.
    fn page_for(&self, coord: &Coordinate) -> usize {
        let mut page = 0;
        for &(axis, size) in &self.plane_axes {
            let i = match axis {
                Axis::Position => coord.position,
                Axis::Time => coord.time,
                Axis::Channel => coord.channel,
                Axis::Slice => coord.slice,
                Axis::Y | Axis::X => continue,
            };
            page = page * size + i;
        }
        page
    }

    // -------------------------------------------------------------------------
    // Pixel access
    // -------------------------------------------------------------------------

    /// Read the plane at one coordinate.
    pub fn get_image(
        &self,
        position: usize,
        time: usize,
        channel: usize,
        slice: usize,
    ) -> Result<Plane, ReaderError> {
        let coord = Coordinate::new(position, time, channel, slice);
        let [positions, frames, channels, slices, height, width] = self.dims;
        if position >= positions || time >= frames || channel >= channels || slice >= slices {
            return Err(ReaderError::CoordinateNotFound(coord));
        }
        let data = self.source.read_page(self.page_for(&coord))?;
        let expected = height * width * self.dtype.size_of();
        if data.len() != expected {
            return Err(ReaderError::Format(FormatError::NotMmStack {
                reason: format!(
                    "page {} holds {} bytes, expected {expected}",
                    self.page_for(&coord),
                    data.len()
                ),
            }));
        }
        Ok(Plane::new(data, self.dtype, height, width))
    }

    /// The dense array of one position, materializing on first request.
    pub fn position_array(&self, position: usize) -> Result<Arc<PositionArray>, ReaderError> {
        let [positions, frames, channels, slices, height, width] = self.dims;
        if position >= positions {
            return Err(ReaderError::PositionOutOfRange {
                position,
                count: positions,
            });
        }
        if let Some(array) = self.lock_cache().get(&position) {
            return Ok(array.clone());
        }

        let mut array =
            PositionArray::zeros([frames, channels, slices, height, width], self.dtype);
        for time in 0..frames {
            for channel in 0..channels {
                for slice in 0..slices {
                    let plane = self.get_image(position, time, channel, slice)?;
                    array.set_plane(time, channel, slice, &plane);
                }
            }
        }
        let array = Arc::new(array);
        Ok(self
            .lock_cache()
            .entry(position)
            .or_insert(array)
            .clone())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<usize, Arc<PositionArray>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Container protocol
    // -------------------------------------------------------------------------

    /// Number of stage positions.
    pub fn num_positions(&self) -> usize {
        self.dims[0]
    }

    /// Same as [`Self::num_positions`].
    pub fn len(&self) -> usize {
        self.num_positions()
    }

    /// Whether the series holds no positions.
    pub fn is_empty(&self) -> bool {
        self.num_positions() == 0
    }

    /// Whether `position` is within the series.
    pub fn contains_position(&self, position: usize) -> bool {
        position < self.num_positions()
    }

    /// Iterate over the position indices.
    pub fn positions(&self) -> std::ops::Range<usize> {
        0..self.num_positions()
    }

    /// Iterate over the dense arrays of every position.
    pub fn iter_arrays(
        &self,
    ) -> impl Iterator<Item = Result<Arc<PositionArray>, ReaderError>> + '_ {
        self.positions().map(move |p| self.position_array(p))
    }

    /// Release the underlying source and consume the reader.
    pub fn close(self) {}

    // -------------------------------------------------------------------------
    // Read-only enforcement
    // -------------------------------------------------------------------------

    /// Series are read-only; always fails with [`ReaderError::ReadOnly`].
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

    /// Series are read-only; always fails with [`ReaderError::ReadOnly`].
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

    /// Series name (file basename without the `.ome.tif` suffix).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical (R, T, C, Z, Y, X) sizes after padding.
    pub fn dims(&self) -> [usize; 6] {
        self.dims
    }

    /// Frame (timepoint) count.
    pub fn frames(&self) -> usize {
        self.dims[1]
    }

    /// Channel count.
    pub fn channels(&self) -> usize {
        self.dims[2]
    }

    /// Slice count.
    pub fn slices(&self) -> usize {
        self.dims[3]
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        self.dims[4]
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        self.dims[5]
    }

    /// Pixel datatype.
    pub fn pixel_type(&self) -> PixelType {
        self.dtype
    }
}

impl<S: TiffSource> std::fmt::Debug for SeriesStack<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesStack")
            .field("name", &self.name)
            .field("dims", &self.dims)
            .field("dtype", &self.dtype.name())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
