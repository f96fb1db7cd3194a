//! Byte-level format layer for Micro-Manager OME-TIFF files.
//!
//! [`tiff`] probes the generic TIFF structure (header, pixel type); [`mm`]
//! extracts the proprietary Micro-Manager blocks and defines the
//! [`mm::TiffSource`] seam the readers consume; [`index_map`] and
//! [`summary`]/[`stage`] parse the two embedded metadata blocks into typed
//! structures.

pub mod index_map;
pub mod mm;
pub mod stage;
pub mod summary;
pub mod tiff;

pub use index_map::{
    corrected_offsets, PageLocation, RawIndexMap, FIRST_PAGE_OFFSET_ADJUSTMENT,
    PAGE_OFFSET_ADJUSTMENT,
};
pub use mm::{MmTiffFile, MmTiffOpener, SeriesLayout, TiffOpener, TiffSource};
pub use stage::StagePosition;
pub use summary::{SchemaVersion, SummaryMetadata};
pub use tiff::{probe_pixel_type, ByteOrder, PixelType, TiffHeader};
