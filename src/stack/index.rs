//! Global coordinate index.
//!
//! Folds the per-file page index maps of a dataset into one
//! coordinate-to-location map while inferring the true dataset extents from
//! what was actually written. File headers routinely under-state dimensions
//! (acquisitions stopped early keep their declared counts) and over-state
//! them (partial writes), so the observed maxima are authoritative for the
//! four count axes.

use std::fmt;

use indexmap::map::Entry;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::{FormatError, ReaderError};
use crate::format::TiffSource;

/// One image plane's acquisition coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    /// Stage position (scene) index
    pub position: usize,
    /// Timepoint index
    pub time: usize,
    /// Channel index
    pub channel: usize,
    /// Z-slice index
    pub slice: usize,
}

impl Coordinate {
    pub const fn new(position: usize, time: usize, channel: usize, slice: usize) -> Self {
        Self {
            position,
            time,
            channel,
            slice,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(p={}, t={}, c={}, z={})",
            self.position, self.time, self.channel, self.slice
        )
    }
}

/// Where one plane's pixel data lives: a file (by index into the dataset's
/// file table), its page within that file and the corrected byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub file: usize,
    pub page: usize,
    pub offset: u64,
}

/// Inferred dataset shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extents {
    pub positions: usize,
    pub frames: usize,
    pub channels: usize,
    pub slices: usize,
    pub height: usize,
    pub width: usize,
}

/// What to do when two files claim the same coordinate.
///
/// Genuinely duplicated acquisition runs exist in the wild; which copy wins
/// is a policy decision, not an error, unless the caller says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Keep the entry from the last file scanned (logged as a warning)
    #[default]
    LastWins,
    /// Keep the entry from the first file scanned
    FirstWins,
    /// Fail the open with [`ReaderError::DuplicateCoordinate`]
    Error,
}

// =============================================================================
// CoordIndex
// =============================================================================

/// The completed coordinate index of a dataset, plus the observed maxima of
/// the four count axes.
#[derive(Debug, Clone, Default)]
pub struct CoordIndex {
    entries: IndexMap<Coordinate, IndexEntry>,
    positions: usize,
    frames: usize,
    channels: usize,
    slices: usize,
}

impl CoordIndex {
    /// Scan every source's index map into one global index.
    ///
    /// Files contribute entries in the order given; extents grow
    /// monotonically as `max(current, observed + 1)` per axis. A source
    /// without an index-map block fails the build.
    pub fn build<S: TiffSource>(
        sources: &[S],
        policy: DuplicatePolicy,
    ) -> Result<Self, ReaderError> {
        let mut index = CoordIndex::default();
        for (file, source) in sources.iter().enumerate() {
            let raw = source
                .index_map()?
                .ok_or_else(|| FormatError::MissingBlock {
                    block: "IndexMap",
                    path: source.path().to_path_buf(),
                })?;
            for location in raw.pages() {
                let coord = Coordinate::new(
                    location.position,
                    location.frame,
                    location.channel,
                    location.slice,
                );
                let entry = IndexEntry {
                    file,
                    page: location.page,
                    offset: location.offset,
                };
                match index.entries.entry(coord) {
                    Entry::Occupied(mut occupied) => match policy {
                        DuplicatePolicy::LastWins => {
                            warn!(%coord, file = %source.path().display(),
                                "duplicate coordinate, keeping the later file");
                            occupied.insert(entry);
                        }
                        DuplicatePolicy::FirstWins => {
                            debug!(%coord, file = %source.path().display(),
                                "duplicate coordinate, keeping the earlier file");
                        }
                        DuplicatePolicy::Error => {
                            return Err(ReaderError::DuplicateCoordinate {
                                coord,
                                first: sources[occupied.get().file].path().to_path_buf(),
                                second: source.path().to_path_buf(),
                            });
                        }
                    },
                    Entry::Vacant(vacant) => {
                        vacant.insert(entry);
                    }
                }
                index.positions = index.positions.max(coord.position + 1);
                index.frames = index.frames.max(coord.time + 1);
                index.channels = index.channels.max(coord.channel + 1);
                index.slices = index.slices.max(coord.slice + 1);
            }
        }
        debug!(
            files = sources.len(),
            planes = index.entries.len(),
            positions = index.positions,
            frames = index.frames,
            channels = index.channels,
            slices = index.slices,
            "assembled coordinate index"
        );
        Ok(index)
    }

    /// Look up the location of a coordinate.
    pub fn get(&self, coord: &Coordinate) -> Option<&IndexEntry> {
        self.entries.get(coord)
    }

    /// Whether a coordinate has a backing page.
    pub fn contains(&self, coord: &Coordinate) -> bool {
        self.entries.contains_key(coord)
    }

    /// Number of indexed planes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no planes at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over coordinates and locations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Coordinate, &IndexEntry)> {
        self.entries.iter()
    }

    /// Observed position count (maximum position index + 1).
    pub fn positions(&self) -> usize {
        self.positions
    }

    /// Observed frame count.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Observed channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Observed slice count.
    pub fn slices(&self) -> usize {
        self.slices
    }

    /// The (frames, channels, slices) maxima observed under one position.
    ///
    /// Asymmetric acquisitions leave some positions with fewer frames than
    /// others; sizing a position's array from its own maxima keeps it from
    /// being padded out to the global extents.
    pub fn position_counts(&self, position: usize) -> (usize, usize, usize) {
        let mut frames = 0;
        let mut channels = 0;
        let mut slices = 0;
        for coord in self.entries.keys() {
            if coord.position != position {
                continue;
            }
            frames = frames.max(coord.time + 1);
            channels = channels.max(coord.channel + 1);
            slices = slices.max(coord.slice + 1);
        }
        (frames, channels, slices)
    }
}

// =============================================================================
// Tests
// =============================================================================
