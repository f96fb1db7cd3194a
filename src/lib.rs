//! # mmstack
//!
//! A reader for Micro-Manager multi-file OME-TIFF ("MMStack") microscopy
//! datasets.
//!
//! Micro-Manager splits one acquisition across sibling OME-TIFF files, each
//! carrying a proprietary page index and a summary metadata block. Files may
//! be incomplete: acquisitions stop early, frames get dropped, declared
//! dimension counts disagree with what was written. This crate rebuilds the
//! dataset from what is actually on disk and exposes it as randomly
//! indexable, lazily loaded arrays keyed by (position, time, channel, slice)
//! coordinates, with missing frames materialized as zero planes.
//!
//! ## Features
//!
//! - **Sparse-to-dense reconstruction**: a global coordinate index maps every
//!   written plane to its file, page and byte offset; dense per-position
//!   arrays are zero-filled and scattered from it on demand
//! - **Dimension inference**: dataset extents come from the observed
//!   coordinate maxima, not the (routinely wrong) declared counts
//! - **Memory-mapped reads**: planes are read directly at their corrected
//!   byte offsets, with an LRU cache of open mappings
//! - **Versioned metadata**: the three Micro-Manager summary dialects
//!   (2.0-beta, 1.4.22, stable) normalize to one typed structure
//!
//! ## Architecture
//!
//! - [`io`] - memory-mapped plane reads and the mapping cache
//! - [`mod@format`] - TIFF probe, Micro-Manager embedded blocks, versioned
//!   summary schemas and the [`format::TiffSource`] collaborator seam
//! - [`stack`] - coordinate index, dense arrays and the two readers
//! - [`error`] - the error taxonomy
//!
//! ## Example
//!
//! ```rust,no_run
//! use mmstack::MmStackReader;
//!
//! # fn main() -> Result<(), mmstack::ReaderError> {
//! let reader = MmStackReader::open("/data/acquisition_1")?;
//! println!(
//!     "{}: {} positions, channels {:?}",
//!     reader.name(),
//!     reader.num_positions(),
//!     reader.channel_names(),
//! );
//!
//! // Dense array of position 0; frames the acquisition never wrote
//! // come back as zero planes.
//! let array = reader.position_array(0)?;
//! let plane = array.plane(0, 0, 0).unwrap();
//! println!("first plane is {}x{}", plane.height(), plane.width());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod format;
pub mod io;
pub mod stack;

// Re-export commonly used types
pub use error::{FormatError, IoError, ReaderError, TiffError};
pub use format::{
    MmTiffFile, MmTiffOpener, PixelType, RawIndexMap, SchemaVersion, SeriesLayout, StagePosition,
    SummaryMetadata, TiffOpener, TiffSource,
};
pub use stack::{
    Axis, Coordinate, CoordIndex, DuplicatePolicy, Extents, IndexEntry, MmStackReader, Plane,
    PositionArray, SeriesStack, StackOptions,
};
