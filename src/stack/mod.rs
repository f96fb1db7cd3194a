//! Dataset readers and the structures they are built from.
//!
//! [`index`] assembles the global coordinate index with dimension inference,
//! [`array`] holds the dense pixel buffers, [`reader`] reconstructs
//! multi-file MMStack datasets and [`series`] reads single self-describing
//! series.

pub mod array;
pub mod index;
pub mod reader;
pub mod series;

pub use array::{Plane, PositionArray};
pub use index::{Coordinate, CoordIndex, DuplicatePolicy, Extents, IndexEntry};
pub use reader::{MmStackReader, StackOptions};
pub use series::{Axis, SeriesStack};
