//! Micro-Manager embedded metadata blocks and the TIFF collaborator seam.
//!
//! Micro-Manager OME-TIFF files carry their acquisition metadata outside the
//! TIFF tag structure, in proprietary blocks located through a fixed offset
//! header that starts at byte 8:
//!
//! ```text
//! Bytes  8-11: index-map offset magic      Bytes 12-15: index-map offset
//! Bytes 16-19: display-settings magic      Bytes 20-23: display-settings offset
//! Bytes 24-27: comments offset magic       Bytes 28-31: comments offset
//! Bytes 32-35: summary magic               Bytes 36-39: summary JSON length
//! Bytes 40-..: summary JSON
//! ```
//!
//! The index-map block holds `count` entries of five u32 words each, in
//! (channel, slice, frame, position, offset) order. The summary and comments
//! blocks are JSON.
//!
//! [`TiffSource`]/[`TiffOpener`] is the narrow seam the readers consume; the
//! production implementation [`MmTiffFile`] reads only these proprietary
//! blocks plus the pixel-type probe from [`super::tiff`]. Pixel data is
//! located exclusively through corrected index-map offsets, never through
//! TIFF strip walks.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use memmap2::Mmap;
use serde_json::Value;
use tracing::debug;

use crate::error::{FormatError, IoError, TiffError};
use crate::format::index_map::{PageLocation, RawIndexMap};
use crate::format::tiff::{probe_pixel_type, ByteOrder, PixelType, TiffHeader};
use crate::io;

// =============================================================================
// Block magics
// =============================================================================

/// Index-map offset magic at byte 8 (decimal 54773648)
const INDEX_MAP_OFFSET_MAGIC: u32 = 0x0343_C790;

/// Index-map block magic (decimal 3453623)
const INDEX_MAP_BLOCK_MAGIC: u32 = 0x0034_B2B7;

/// Display-settings offset magic at byte 16 (decimal 483765892); the block
/// itself is not consumed by this reader
#[allow(dead_code)]
const DISPLAY_SETTINGS_OFFSET_MAGIC: u32 = 0x1CD5_AE84;

/// Comments offset magic at byte 24 (decimal 99384722)
const COMMENTS_OFFSET_MAGIC: u32 = 0x05EC_7D92;

/// Comments block magic (decimal 84720485)
const COMMENTS_BLOCK_MAGIC: u32 = 0x050C_BB65;

/// Summary-metadata magic at byte 32 (decimal 2355492)
const SUMMARY_MAGIC: u32 = 0x0023_F124;

/// First byte of the Micro-Manager offset header
const OFFSET_HEADER_START: usize = 8;

/// First byte of the summary JSON block
const SUMMARY_START: usize = 40;

/// Size of one index-map entry: five u32 words
const INDEX_ENTRY_SIZE: usize = 20;

// =============================================================================
// Collaborator traits
// =============================================================================

/// Declared axis order and shape of a file's image series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesLayout {
    /// Axis-order string using the characters R (position), T, C, Z, Y, X
    pub axes: String,
    /// Extent of each axis, aligned with `axes`
    pub shape: Vec<usize>,
}

/// One opened TIFF file of a dataset, seen through the narrow contract the
/// readers need: embedded Micro-Manager blocks, the pixel datatype of the
/// first page, and direct page reads.
pub trait TiffSource {
    /// Path of the backing file.
    fn path(&self) -> &Path;

    /// Number of retained pages.
    fn page_count(&self) -> usize;

    /// Pixel datatype, determined from the first page's raw structure.
    fn pixel_type(&self) -> Result<PixelType, FormatError>;

    /// The embedded summary metadata block, if present.
    fn summary(&self) -> Result<Option<Value>, FormatError>;

    /// The embedded page index map, if present.
    fn index_map(&self) -> Result<Option<RawIndexMap>, FormatError>;

    /// The embedded acquisition comments block, if present.
    fn comments(&self) -> Result<Option<Value>, FormatError>;

    /// Declared axis order and shape of the file's series.
    fn series_layout(&self) -> Result<SeriesLayout, FormatError>;

    /// Read one page's pixel data.
    fn read_page(&self, page: usize) -> Result<Bytes, FormatError>;
}

/// Factory for [`TiffSource`] implementations.
pub trait TiffOpener {
    type Source: TiffSource;

    /// Open the file at `path`.
    fn open(&self, path: &Path) -> Result<Self::Source, FormatError>;
}

// =============================================================================
// MmTiffFile
// =============================================================================

/// A memory-mapped Micro-Manager OME-TIFF file.
///
/// All embedded blocks are extracted once at open; the pixel-type probe runs
/// lazily on first use so that scanning a directory for index maps does not
/// require every file to carry a well-formed first IFD.
pub struct MmTiffFile {
    path: PathBuf,
    map: Arc<Mmap>,
    summary: Option<Value>,
    index_map: Option<RawIndexMap>,
    comments: Option<Value>,
    /// Retained pages with corrected offsets, in index-map order
    pages: Vec<PageLocation>,
    pixel_probe: OnceLock<Result<PixelType, TiffError>>,
}

impl MmTiffFile {
    /// Open and extract the embedded blocks of a Micro-Manager OME-TIFF.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let path = path.as_ref();
        let map = io::map_file(path)?;
        let header = TiffHeader::parse(&map, map.len() as u64)?;
        let bo = header.byte_order;

        if map.len() < SUMMARY_START {
            return Err(FormatError::NotMmStack {
                reason: format!(
                    "{} is too small to carry a Micro-Manager offset header",
                    path.display()
                ),
            });
        }
        let mut words = [0u32; 8];
        for (i, word) in words.iter_mut().enumerate() {
            let at = OFFSET_HEADER_START + i * 4;
            *word = bo.read_u32(&map[at..at + 4]);
        }
        let [index_magic, index_offset, _display_magic, _display_offset, comments_magic, comments_offset, summary_magic, summary_len] =
            words;

        let summary = if summary_magic == SUMMARY_MAGIC && summary_len > 0 {
            let raw = slice_at(&map, SUMMARY_START, summary_len as usize)?;
            Some(parse_json_block(raw)?)
        } else {
            None
        };

        let index_map = if index_magic == INDEX_MAP_OFFSET_MAGIC && index_offset > 0 {
            Some(parse_index_map(&map, bo, index_offset as usize, path)?)
        } else {
            None
        };
        let pages = index_map.as_ref().map(RawIndexMap::pages).unwrap_or_default();

        // Comments are incidental; a corrupt block degrades to absence.
        let comments = if comments_magic == COMMENTS_OFFSET_MAGIC && comments_offset > 0 {
            parse_comments(&map, bo, comments_offset as usize).unwrap_or(None)
        } else {
            None
        };

        debug!(
            path = %path.display(),
            pages = pages.len(),
            has_summary = summary.is_some(),
            "opened Micro-Manager OME-TIFF"
        );

        Ok(Self {
            path: path.to_path_buf(),
            map,
            summary,
            index_map,
            comments,
            pages,
            pixel_probe: OnceLock::new(),
        })
    }

    fn summary_u64(&self, key: &'static str) -> Result<u64, FormatError> {
        self.summary
            .as_ref()
            .and_then(|s| s.get(key))
            .and_then(Value::as_u64)
            .ok_or(FormatError::MissingKey { key })
    }

    /// Declared plane dimensions from the summary block.
    fn plane_dims(&self) -> Result<(usize, usize), FormatError> {
        let height = self.summary_u64("Height")? as usize;
        let width = self.summary_u64("Width")? as usize;
        Ok((height, width))
    }
}

impl TiffSource for MmTiffFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn pixel_type(&self) -> Result<PixelType, FormatError> {
        self.pixel_probe
            .get_or_init(|| probe_pixel_type(&self.map))
            .clone()
            .map_err(FormatError::Tiff)
    }

    fn summary(&self) -> Result<Option<Value>, FormatError> {
        Ok(self.summary.clone())
    }

    fn index_map(&self) -> Result<Option<RawIndexMap>, FormatError> {
        Ok(self.index_map.clone())
    }

    fn comments(&self) -> Result<Option<Value>, FormatError> {
        Ok(self.comments.clone())
    }

    fn series_layout(&self) -> Result<SeriesLayout, FormatError> {
        if self.summary.is_none() {
            return Err(FormatError::MissingBlock {
                block: "Summary",
                path: self.path.clone(),
            });
        }
        let (height, width) = self.plane_dims()?;
        let positions = self.summary_u64("Positions").unwrap_or(1) as usize;
        let frames = self.summary_u64("Frames").unwrap_or(1) as usize;
        let channels = self.summary_u64("Channels").unwrap_or(1) as usize;
        let slices = self.summary_u64("Slices").unwrap_or(1) as usize;

        // Singleton axes are left undeclared; the series reader pads them
        // back in canonical order.
        let mut axes = String::new();
        let mut shape = Vec::new();
        for (label, size) in [
            ('R', positions),
            ('T', frames),
            ('C', channels),
            ('Z', slices),
        ] {
            if size > 1 {
                axes.push(label);
                shape.push(size);
            }
        }
        axes.push('Y');
        shape.push(height);
        axes.push('X');
        shape.push(width);
        Ok(SeriesLayout { axes, shape })
    }

    fn read_page(&self, page: usize) -> Result<Bytes, FormatError> {
        let location = self
            .pages
            .get(page)
            .ok_or(FormatError::PageOutOfRange {
                page,
                count: self.pages.len(),
            })?;
        let (height, width) = self.plane_dims()?;
        let len = height * width * self.pixel_type()?.size_of();
        io::read_exact_at(&self.map, location.offset, len).map_err(FormatError::Io)
    }
}

impl std::fmt::Debug for MmTiffFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmTiffFile")
            .field("path", &self.path)
            .field("pages", &self.pages.len())
            .field("has_summary", &self.summary.is_some())
            .finish()
    }
}

/// Opens [`MmTiffFile`] sources; the default production opener.
#[derive(Debug, Clone, Copy, Default)]
pub struct MmTiffOpener;

impl TiffOpener for MmTiffOpener {
    type Source = MmTiffFile;

    fn open(&self, path: &Path) -> Result<Self::Source, FormatError> {
        MmTiffFile::open(path)
    }
}

// =============================================================================
// Block parsing
// =============================================================================

fn slice_at(map: &Mmap, offset: usize, len: usize) -> Result<&[u8], FormatError> {
    let end = offset.checked_add(len).filter(|&end| end <= map.len());
    match end {
        Some(end) => Ok(&map[offset..end]),
        None => Err(FormatError::Io(IoError::RangeOutOfBounds {
            offset: offset as u64,
            requested: len as u64,
            size: map.len() as u64,
        })),
    }
}

/// Parse a JSON block, tolerating trailing NUL padding.
fn parse_json_block(raw: &[u8]) -> Result<Value, FormatError> {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    Ok(serde_json::from_slice(&raw[..end])?)
}

fn parse_index_map(
    map: &Mmap,
    bo: ByteOrder,
    offset: usize,
    path: &Path,
) -> Result<RawIndexMap, FormatError> {
    let head = slice_at(map, offset, 8)?;
    let magic = bo.read_u32(&head[0..4]);
    if magic != INDEX_MAP_BLOCK_MAGIC {
        return Err(FormatError::MissingBlock {
            block: "IndexMap",
            path: path.to_path_buf(),
        });
    }
    let count = bo.read_u32(&head[4..8]) as usize;
    let entries_len = count.checked_mul(INDEX_ENTRY_SIZE).unwrap_or(usize::MAX);
    let entries = slice_at(map, offset + 8, entries_len)?;

    let mut raw = RawIndexMap {
        positions: Vec::with_capacity(count),
        frames: Vec::with_capacity(count),
        channels: Vec::with_capacity(count),
        slices: Vec::with_capacity(count),
        offsets: Vec::with_capacity(count),
    };
    for entry in entries.chunks_exact(INDEX_ENTRY_SIZE) {
        raw.channels.push(bo.read_u32(&entry[0..4]));
        raw.slices.push(bo.read_u32(&entry[4..8]));
        raw.frames.push(bo.read_u32(&entry[8..12]));
        raw.positions.push(bo.read_u32(&entry[12..16]));
        raw.offsets.push(bo.read_u32(&entry[16..20]) as i64);
    }
    Ok(raw)
}

fn parse_comments(map: &Mmap, bo: ByteOrder, offset: usize) -> Result<Option<Value>, FormatError> {
    let head = slice_at(map, offset, 8)?;
    if bo.read_u32(&head[0..4]) != COMMENTS_BLOCK_MAGIC {
        return Ok(None);
    }
    let len = bo.read_u32(&head[4..8]) as usize;
    let raw = slice_at(map, offset + 8, len)?;
    Ok(Some(parse_json_block(raw)?))
}

// =============================================================================
// Tests
// =============================================================================
