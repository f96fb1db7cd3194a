//! Dense pixel buffers.
//!
//! Pixel datatypes are only known at runtime, so planes and position arrays
//! hold raw bytes tagged with a [`PixelType`] and hand out typed
//! [`ndarray`] views on demand. A position array is the dense rendering of a
//! sparse acquisition: allocated zero-filled over the position's extents,
//! then every indexed coordinate is scattered into it, leaving missing
//! frames as zero planes.

use bytes::Bytes;
use ndarray::{ArrayView, ArrayView2, Ix5};

use crate::format::PixelType;

// =============================================================================
// Plane
// =============================================================================

/// One 2-D image plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    data: Bytes,
    dtype: PixelType,
    height: usize,
    width: usize,
}

impl Plane {
    /// Wrap raw pixel bytes.
    ///
    /// # Panics
    /// Panics if `data` is not exactly `height * width` pixels of `dtype`.
    pub fn new(data: Bytes, dtype: PixelType, height: usize, width: usize) -> Self {
        assert_eq!(
            data.len(),
            height * width * dtype.size_of(),
            "plane byte length does not match its shape"
        );
        Self {
            data,
            dtype,
            height,
            width,
        }
    }

    /// An all-zero plane.
    pub fn zeros(dtype: PixelType, height: usize, width: usize) -> Self {
        Self {
            data: Bytes::from(vec![0u8; height * width * dtype.size_of()]),
            dtype,
            height,
            width,
        }
    }

    pub fn dtype(&self) -> PixelType {
        self.dtype
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Raw little-endian pixel bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Whether every pixel is zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// A typed `(height, width)` view of the pixels.
    ///
    /// Returns `None` if `T`'s size does not match the plane's datatype or
    /// the buffer is not suitably aligned for `T`.
    pub fn view<T: bytemuck::Pod>(&self) -> Option<ArrayView2<'_, T>> {
        if std::mem::size_of::<T>() != self.dtype.size_of() {
            return None;
        }
        let pixels = bytemuck::try_cast_slice(&self.data).ok()?;
        ArrayView2::from_shape((self.height, self.width), pixels).ok()
    }
}

// =============================================================================
// PositionArray
// =============================================================================

/// The dense `(frames, channels, slices, height, width)` array of one stage
/// position.
///
/// Always fully materialized in memory; coordinates the acquisition never
/// wrote stay as zero planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionArray {
    data: Vec<u8>,
    dtype: PixelType,
    shape: [usize; 5],
}

impl PositionArray {
    /// Allocate a zero-filled array of the given shape.
    pub fn zeros(shape: [usize; 5], dtype: PixelType) -> Self {
        let len: usize = shape.iter().product::<usize>() * dtype.size_of();
        Self {
            data: vec![0u8; len],
            dtype,
            shape,
        }
    }

    /// Array shape as `(frames, channels, slices, height, width)`.
    pub fn shape(&self) -> [usize; 5] {
        self.shape
    }

    pub fn dtype(&self) -> PixelType {
        self.dtype
    }

    /// Total size in bytes.
    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    /// Raw little-endian pixel bytes, planes in (t, c, z) row-major order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn plane_bytes(&self) -> usize {
        self.shape[3] * self.shape[4] * self.dtype.size_of()
    }

    fn plane_range(&self, time: usize, channel: usize, slice: usize) -> Option<std::ops::Range<usize>> {
        let [frames, channels, slices, ..] = self.shape;
        if time >= frames || channel >= channels || slice >= slices {
            return None;
        }
        let plane = (time * channels + channel) * slices + slice;
        let start = plane * self.plane_bytes();
        Some(start..start + self.plane_bytes())
    }

    /// Overwrite one plane.
    ///
    /// # Panics
    /// Panics if the coordinate is outside the array's shape or the plane's
    /// shape or datatype differ from the array's.
    pub fn set_plane(&mut self, time: usize, channel: usize, slice: usize, plane: &Plane) {
        assert_eq!(plane.dtype(), self.dtype, "plane datatype mismatch");
        assert_eq!(
            (plane.height(), plane.width()),
            (self.shape[3], self.shape[4]),
            "plane shape mismatch"
        );
        let range = self
            .plane_range(time, channel, slice)
            .expect("plane coordinate outside array shape");
        self.data[range].copy_from_slice(plane.as_bytes());
    }

    /// Copy one plane out of the array.
    ///
    /// Returns `None` if the coordinate is outside the array's shape. A
    /// coordinate the acquisition never wrote yields an all-zero plane.
    pub fn plane(&self, time: usize, channel: usize, slice: usize) -> Option<Plane> {
        let range = self.plane_range(time, channel, slice)?;
        Some(Plane::new(
            Bytes::copy_from_slice(&self.data[range]),
            self.dtype,
            self.shape[3],
            self.shape[4],
        ))
    }

    /// A typed 5-D view of the whole array.
    ///
    /// Returns `None` if `T`'s size does not match the array's datatype or
    /// the buffer is not suitably aligned for `T`.
    pub fn view<T: bytemuck::Pod>(&self) -> Option<ArrayView<'_, T, Ix5>> {
        if std::mem::size_of::<T>() != self.dtype.size_of() {
            return None;
        }
        let pixels = bytemuck::try_cast_slice(&self.data).ok()?;
        let [t, c, z, h, w] = self.shape;
        ArrayView::from_shape((t, c, z, h, w), pixels).ok()
    }
}

// =============================================================================
// Tests
// =============================================================================
