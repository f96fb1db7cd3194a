use std::path::PathBuf;

use thiserror::Error;

use crate::stack::Coordinate;

/// I/O errors that can occur when reading from dataset files
#[derive(Debug, Error)]
pub enum IoError {
    /// Error from the operating system while opening or mapping a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested range exceeds file bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, file size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(PathBuf),
}

/// Errors that can occur when probing TIFF file structure
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside the file)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from the first IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// BitsPerSample/SampleFormat combination has no supported pixel type
    #[error("Unsupported pixel type: {bits} bits per sample, sample format {sample_format}")]
    UnsupportedPixelType { bits: u16, sample_format: u16 },
}

/// Errors related to the Micro-Manager metadata layer
#[derive(Debug, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF structure error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// An expected embedded metadata block is absent or carries a bad magic
    #[error("Missing Micro-Manager block {block} in {path}")]
    MissingBlock { block: &'static str, path: PathBuf },

    /// An embedded JSON block failed to parse
    #[error("Malformed metadata JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required summary-metadata key is absent
    #[error("Missing summary metadata key: {key}")]
    MissingKey { key: &'static str },

    /// A page index beyond the file's retained page count was requested
    #[error("Page {page} out of range: file has {count} pages")]
    PageOutOfRange { page: usize, count: usize },

    /// File exists but does not look like a Micro-Manager OME-TIFF
    #[error("Not a Micro-Manager OME-TIFF: {reason}")]
    NotMmStack { reason: String },
}

/// Errors surfaced by the dataset readers
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Metadata-layer failure while opening the dataset
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// I/O failure while reading pixel data
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The dataset path matched no OME-TIFF files
    #[error("Path {0} contains no .ome.tif files")]
    NoFilesFound(PathBuf),

    /// A file path was given that is not an OME-TIFF
    #[error("{0} is not an OME-TIFF file")]
    NotAnOmeTiff(PathBuf),

    /// A position index outside the inferred extents was requested
    #[error("Position {position} out of range: dataset has {count} positions")]
    PositionOutOfRange { position: usize, count: usize },

    /// A coordinate with no backing page was looked up through the index
    #[error("No image indexed at {0}")]
    CoordinateNotFound(Coordinate),

    /// Two files claimed the same coordinate under `DuplicatePolicy::Error`
    #[error("Coordinate {coord} indexed by both {first} and {second}")]
    DuplicateCoordinate {
        coord: Coordinate,
        first: PathBuf,
        second: PathBuf,
    },

    /// Any attempted mutation of a read-only dataset
    #[error("MMStack datasets are read-only: {operation} is not permitted")]
    ReadOnly { operation: &'static str },
}
