//! Per-file page index map.
//!
//! Every Micro-Manager OME-TIFF carries an embedded block listing, for each
//! page, its acquisition coordinate and a raw byte offset. The raw offsets
//! point at the page's TIFF structures, not its pixel data; fixed adjustments
//! skip the per-page header overhead.

/// Adjustment applied to the first retained offset of a file.
///
/// Magic constant of the Micro-Manager OME-TIFF page layout: the first page
/// carries a larger embedded array header than the rest. Must not be derived
/// at runtime.
pub const FIRST_PAGE_OFFSET_ADJUSTMENT: u64 = 210;

/// Adjustment applied to every retained offset after the first.
///
/// Magic constant of the per-page array header in the same layout.
pub const PAGE_OFFSET_ADJUSTMENT: u64 = 162;

/// Raw index-map block of one file: five parallel arrays aligned by page.
///
/// Offsets are kept signed so that sentinel values at or below zero can mark
/// absent pages (truncated acquisitions leave zeroed tail entries).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawIndexMap {
    pub positions: Vec<u32>,
    pub frames: Vec<u32>,
    pub channels: Vec<u32>,
    pub slices: Vec<u32>,
    pub offsets: Vec<i64>,
}

/// One retained page: its renumbered page index, acquisition coordinate and
/// corrected pixel-data offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLocation {
    pub page: usize,
    pub position: usize,
    pub frame: usize,
    pub channel: usize,
    pub slice: usize,
    pub offset: u64,
}

impl RawIndexMap {
    /// Number of recorded entries, including absent pages.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether the block records no entries at all.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Retained pages with corrected offsets.
    ///
    /// Pages whose raw offset is at or below zero are dropped; the remaining
    /// pages are renumbered 0..k and the coordinate arrays are read at the
    /// renumbered index.
    ///
    /// # Panics
    /// Panics if the coordinate arrays are shorter than the retained offset
    /// count; the arrays are parallel by construction.
    pub fn pages(&self) -> Vec<PageLocation> {
        corrected_offsets(&self.offsets)
            .into_iter()
            .enumerate()
            .map(|(page, offset)| PageLocation {
                page,
                position: self.positions[page] as usize,
                frame: self.frames[page] as usize,
                channel: self.channels[page] as usize,
                slice: self.slices[page] as usize,
                offset,
            })
            .collect()
    }
}

/// Apply the byte-offset correction rule to a raw offset array.
///
/// Entries at or below zero are excluded entirely; the first retained offset
/// is increased by [`FIRST_PAGE_OFFSET_ADJUSTMENT`], every later one by
/// [`PAGE_OFFSET_ADJUSTMENT`].
pub fn corrected_offsets(raw: &[i64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(raw.len());
    for &offset in raw.iter().filter(|&&offset| offset > 0) {
        let adjustment = if out.is_empty() {
            FIRST_PAGE_OFFSET_ADJUSTMENT
        } else {
            PAGE_OFFSET_ADJUSTMENT
        };
        out.push(offset as u64 + adjustment);
    }
    out
}
