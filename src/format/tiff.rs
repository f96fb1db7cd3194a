//! Minimal TIFF structure probe.
//!
//! Micro-Manager locates pixel data through its own embedded index map
//! (see [`super::mm`]), so this module deliberately stops far short of a
//! general TIFF parser: it validates the file header and walks the first
//! IFD just far enough to learn the pixel datatype, which the summary
//! metadata block does not reliably carry.
//!
//! # TIFF Header Structure
//!
//! ## Classic TIFF (8 bytes)
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (42 = 0x002A)
//! Bytes 4-7: Offset to first IFD (4 bytes)
//! ```
//!
//! ## BigTIFF (16 bytes)
//! ```text
//! Bytes 0-1: Byte order
//! Bytes 2-3: Version (43 = 0x002B)
//! Bytes 4-5: Offset byte size (must be 8)
//! Bytes 6-7: Reserved
//! Bytes 8-15: Offset to first IFD (8 bytes)
//! ```

use crate::error::TiffError;

// =============================================================================
// Constants
// =============================================================================

/// Magic bytes indicating little-endian byte order ("II" for Intel)
const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;

/// Magic bytes indicating big-endian byte order ("MM" for Motorola)
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;

/// Version number for classic TIFF
const VERSION_TIFF: u16 = 42;

/// Version number for BigTIFF
const VERSION_BIGTIFF: u16 = 43;

/// Size of classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of BigTIFF header in bytes
pub const BIGTIFF_HEADER_SIZE: usize = 16;

/// BitsPerSample tag
const TAG_BITS_PER_SAMPLE: u16 = 258;

/// SampleFormat tag (1 = unsigned int, 2 = signed int, 3 = IEEE float)
const TAG_SAMPLE_FORMAT: u16 = 339;

/// Field type SHORT (u16)
const TYPE_SHORT: u16 = 3;

/// Field type LONG (u32)
const TYPE_LONG: u16 = 4;

/// Field type LONG8 (u64, BigTIFF only)
const TYPE_LONG8: u16 = 16;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of a TIFF file.
///
/// Declared in the first two bytes of the header; every multi-byte value in
/// the file, including the Micro-Manager blocks, must be read with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian ("II" = Intel)
    LittleEndian,
    /// Big-endian ("MM" = Motorola)
    BigEndian,
}

impl ByteOrder {
    /// Read a u16 from a byte slice using this byte order.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 2 bytes.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes([bytes[0], bytes[1]]),
            ByteOrder::BigEndian => u16::from_be_bytes([bytes[0], bytes[1]]),
        }
    }

    /// Read a u32 from a byte slice using this byte order.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 4 bytes.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
            ByteOrder::BigEndian => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Read a u64 from a byte slice using this byte order.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 8 bytes.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
            ByteOrder::BigEndian => u64::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Whether this is a BigTIFF file (64-bit offsets)
    pub is_bigtiff: bool,

    /// Offset to the first IFD in the file
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a TIFF header from raw bytes.
    ///
    /// # Errors
    /// - `InvalidMagic` if byte order bytes are not II or MM
    /// - `InvalidVersion` if version is not 42 or 43
    /// - `InvalidBigTiffOffsetSize` if BigTIFF offset size is not 8
    /// - `FileTooSmall` if there aren't enough bytes for the header
    /// - `InvalidIfdOffset` if the first IFD offset is outside the file
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        // The byte-order mark itself is order-independent
        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        match version {
            VERSION_TIFF => {
                let first_ifd_offset = byte_order.read_u32(&bytes[4..8]) as u64;
                if first_ifd_offset >= file_size {
                    return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
                }
                Ok(TiffHeader {
                    byte_order,
                    is_bigtiff: false,
                    first_ifd_offset,
                })
            }
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                let first_ifd_offset = byte_order.read_u64(&bytes[8..16]);
                if first_ifd_offset >= file_size {
                    return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
                }
                Ok(TiffHeader {
                    byte_order,
                    is_bigtiff: true,
                    first_ifd_offset,
                })
            }
            _ => Err(TiffError::InvalidVersion(version)),
        }
    }
}

// =============================================================================
// PixelType
// =============================================================================

/// Pixel datatype of an image plane.
///
/// Derived from the first page's BitsPerSample/SampleFormat tags rather than
/// the summary metadata block, which carries no reliable dtype field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    U32,
    /// 32-bit IEEE float
    F32,
}

impl PixelType {
    /// Size of one pixel in bytes.
    #[inline]
    pub const fn size_of(self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 => 2,
            PixelType::U32 | PixelType::F32 => 4,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            PixelType::U8 => "u8",
            PixelType::U16 => "u16",
            PixelType::U32 => "u32",
            PixelType::F32 => "f32",
        }
    }

    /// Map BitsPerSample/SampleFormat tag values to a pixel type.
    pub fn from_tags(bits: u16, sample_format: u16) -> Result<Self, TiffError> {
        match (bits, sample_format) {
            (8, 1) => Ok(PixelType::U8),
            (16, 1) => Ok(PixelType::U16),
            (32, 1) => Ok(PixelType::U32),
            (32, 3) => Ok(PixelType::F32),
            _ => Err(TiffError::UnsupportedPixelType {
                bits,
                sample_format,
            }),
        }
    }
}

// =============================================================================
// First-IFD pixel type probe
// =============================================================================

/// Determine the pixel datatype from the first page of a file.
///
/// Walks the entries of the first IFD looking for BitsPerSample and
/// SampleFormat. SampleFormat defaults to unsigned integer when absent, per
/// the TIFF specification.
pub fn probe_pixel_type(data: &[u8]) -> Result<PixelType, TiffError> {
    let header = TiffHeader::parse(data, data.len() as u64)?;
    let bo = header.byte_order;

    let entry_size = if header.is_bigtiff { 20 } else { 12 };
    let count_size = if header.is_bigtiff { 8 } else { 2 };

    let ifd = header.first_ifd_offset as usize;
    if ifd + count_size > data.len() {
        return Err(TiffError::InvalidIfdOffset(header.first_ifd_offset));
    }
    let entry_count = if header.is_bigtiff {
        bo.read_u64(&data[ifd..ifd + 8]) as usize
    } else {
        bo.read_u16(&data[ifd..ifd + 2]) as usize
    };

    let entries_start = ifd + count_size;
    let entries_end = entry_count
        .checked_mul(entry_size)
        .and_then(|len| entries_start.checked_add(len))
        .filter(|&end| end <= data.len())
        .ok_or(TiffError::InvalidIfdOffset(header.first_ifd_offset))?;
    let value_size = if header.is_bigtiff { 8 } else { 4 };

    let mut bits: Option<u16> = None;
    let mut sample_format: u16 = 1;
    for entry in data[entries_start..entries_end].chunks_exact(entry_size) {
        let tag = bo.read_u16(&entry[0..2]);
        let field_type = bo.read_u16(&entry[2..4]);
        let value = &entry[entry_size - value_size..];
        // Only inline single values are needed; grayscale Micro-Manager pages
        // store BitsPerSample and SampleFormat with count 1.
        let value = match field_type {
            TYPE_SHORT => Some(bo.read_u16(&value[0..2]) as u64),
            TYPE_LONG => Some(bo.read_u32(&value[0..4]) as u64),
            TYPE_LONG8 if header.is_bigtiff => Some(bo.read_u64(&value[0..8])),
            _ => None,
        };
        match (tag, value) {
            (TAG_BITS_PER_SAMPLE, Some(v)) => bits = Some(v as u16),
            (TAG_SAMPLE_FORMAT, Some(v)) => sample_format = v as u16,
            _ => {}
        }
    }

    let bits = bits.ok_or(TiffError::MissingTag("BitsPerSample"))?;
    PixelType::from_tags(bits, sample_format)
}

// =============================================================================
// Tests
// =============================================================================
