//! End-to-end tests for the indexed MMStack reader.
//!
//! Every test builds a synthetic dataset directory with the byte-level
//! layout a Micro-Manager acquisition leaves behind, then drives the reader
//! through its public surface.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use mmstack::{
    DuplicatePolicy, IoError, MmStackReader, PixelType, Plane, ReaderError, SchemaVersion,
    StackOptions,
};

use super::test_utils::{summary, MmStackFileBuilder, HEIGHT, WIDTH};

fn assert_const_plane(plane: &Plane, value: u16) {
    assert_eq!(plane.height(), HEIGHT);
    assert_eq!(plane.width(), WIDTH);
    let view = plane.view::<u16>().unwrap();
    assert!(
        view.iter().all(|&v| v == value),
        "expected a constant {value} plane"
    );
}

// =============================================================================
// Round trip
// =============================================================================

#[test]
fn test_two_file_round_trip() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 2, 1, 2))
        .page(0, 0, 0, 0, 100)
        .page(0, 1, 0, 0, 101)
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));
    MmStackFileBuilder::new(summary("2.0.1", 1, 2, 1, 2))
        .page(1, 0, 0, 0, 110)
        .page(1, 1, 0, 0, 111)
        .write(&dir.path().join("acq_MMStack_Pos1.ome.tif"));

    let reader = MmStackReader::open(dir.path()).unwrap();

    assert_eq!(reader.num_positions(), 2);
    assert_eq!(reader.len(), 2);
    assert_eq!(reader.num_planes(), 4);
    assert_eq!(reader.pixel_type(), PixelType::U16);

    let plane = reader.get_image(1, 1, 0, 0).unwrap();
    assert_const_plane(&plane, 111);

    let plane = reader.get_image(0, 0, 0, 0).unwrap();
    assert_const_plane(&plane, 100);
}

#[test]
fn test_open_via_file_path() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("acq_MMStack_Pos0.ome.tif");
    MmStackFileBuilder::new(summary("2.0.1", 1, 1, 1, 1))
        .page(0, 0, 0, 0, 42)
        .write(&file);

    let reader = MmStackReader::open(&file).unwrap();
    assert_eq!(reader.num_positions(), 1);
    assert_const_plane(&reader.get_image(0, 0, 0, 0).unwrap(), 42);
}

// =============================================================================
// Dimension inference
// =============================================================================

#[test]
fn test_extents_corrected_from_observations() {
    let dir = TempDir::new().unwrap();
    // Declares 1 frame and 5 slices, but actually wrote 3 frames of 1 slice.
    MmStackFileBuilder::new(summary("2.0.1", 1, 1, 5, 1))
        .page(0, 0, 0, 0, 1)
        .page(0, 1, 0, 0, 2)
        .page(0, 2, 0, 0, 3)
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));

    let reader = MmStackReader::open(dir.path()).unwrap();
    let extents = reader.extents();

    // Understated frames grow, overstated slices shrink.
    assert_eq!(extents.frames, 3);
    assert_eq!(extents.slices, 1);
    assert_eq!(extents.positions, 1);
    assert_eq!(extents.height, HEIGHT);
    assert_eq!(extents.width, WIDTH);
}

#[test]
fn test_absent_tail_entries_are_ignored() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 4, 1, 1))
        .page(0, 0, 0, 0, 7)
        .page(0, 1, 0, 0, 8)
        .absent_entries(2)
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));

    let reader = MmStackReader::open(dir.path()).unwrap();
    assert_eq!(reader.num_planes(), 2);
    assert_eq!(reader.extents().frames, 2);
}

#[test]
fn test_asymmetric_positions_are_not_padded() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 2, 1, 2))
        .page(0, 0, 0, 0, 1)
        .page(0, 1, 0, 0, 2)
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));
    // Position 1 stopped after one frame.
    MmStackFileBuilder::new(summary("2.0.1", 1, 2, 1, 2))
        .page(1, 0, 0, 0, 3)
        .write(&dir.path().join("acq_MMStack_Pos1.ome.tif"));

    let reader = MmStackReader::open(dir.path()).unwrap();
    assert_eq!(reader.extents().frames, 2);
    assert_eq!(reader.position_array(0).unwrap().shape()[0], 2);
    assert_eq!(reader.position_array(1).unwrap().shape()[0], 1);
}

// =============================================================================
// Missing frames
// =============================================================================

#[test]
fn test_missing_coordinates_become_zero_planes() {
    let dir = TempDir::new().unwrap();
    // Slices 0 and 1 exist at t=0; slice 2 exists only at t=1.
    MmStackFileBuilder::new(summary("2.0.1", 1, 2, 3, 1))
        .page(0, 0, 0, 0, 5)
        .page(0, 0, 0, 1, 6)
        .page(0, 1, 0, 2, 7)
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));

    let reader = MmStackReader::open(dir.path()).unwrap();
    let array = reader.position_array(0).unwrap();
    assert_eq!(array.shape(), [2, 1, 3, HEIGHT, WIDTH]);

    // Present coordinates carry their pixel values.
    assert_const_plane(&array.plane(0, 0, 0).unwrap(), 5);
    assert_const_plane(&array.plane(0, 0, 1).unwrap(), 6);
    assert_const_plane(&array.plane(1, 0, 2).unwrap(), 7);

    // The hole at (t=0, z=2) is a zero plane of the right shape and dtype.
    let hole = array.plane(0, 0, 2).unwrap();
    assert!(hole.is_zero());
    assert_eq!(hole.height(), HEIGHT);
    assert_eq!(hole.width(), WIDTH);
    assert_eq!(hole.dtype(), PixelType::U16);

    // The index path, by contrast, refuses the missing coordinate.
    assert!(matches!(
        reader.get_image(0, 0, 0, 2),
        Err(ReaderError::CoordinateNotFound(_))
    ));
    assert!(!reader.has_image(0, 0, 0, 2));
    assert!(reader.has_image(0, 0, 0, 1));
}

// =============================================================================
// Caching
// =============================================================================

#[test]
fn test_position_arrays_are_cached() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 2, 1, 1))
        .page(0, 0, 0, 0, 1)
        .page(0, 1, 0, 0, 2)
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));

    let reader = MmStackReader::open(dir.path()).unwrap();
    assert_eq!(reader.materializations(), 0);

    let first = reader.position_array(0).unwrap();
    let second = reader.position_array(0).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(reader.materializations(), 1);
}

#[test]
fn test_eager_open_materializes_everything() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 1, 1, 2))
        .page(0, 0, 0, 0, 1)
        .page(1, 0, 0, 0, 2)
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));

    let options = StackOptions {
        eager: true,
        ..Default::default()
    };
    let reader = MmStackReader::open_with(dir.path(), options).unwrap();
    assert_eq!(reader.materializations(), 2);

    // Later requests only hit the cache.
    reader.position_array(0).unwrap();
    reader.position_array(1).unwrap();
    assert_eq!(reader.materializations(), 2);
}

#[test]
fn test_iter_arrays_covers_every_position() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 1, 1, 3))
        .page(0, 0, 0, 0, 1)
        .page(1, 0, 0, 0, 2)
        .page(2, 0, 0, 0, 3)
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));

    let reader = MmStackReader::open(dir.path()).unwrap();
    let arrays: Vec<_> = reader.iter_arrays().collect::<Result<_, _>>().unwrap();
    assert_eq!(arrays.len(), 3);
    assert_const_plane(&arrays[2].plane(0, 0, 0).unwrap(), 3);
}

// =============================================================================
// Structural failures
// =============================================================================

#[test]
fn test_empty_directory_fails() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        MmStackReader::open(dir.path()),
        Err(ReaderError::NoFilesFound(_))
    ));
}

#[test]
fn test_directory_without_ome_tiffs_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not a dataset").unwrap();
    assert!(matches!(
        MmStackReader::open(dir.path()),
        Err(ReaderError::NoFilesFound(_))
    ));
}

#[test]
fn test_non_ome_tiff_file_path_fails() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, b"not a dataset").unwrap();
    assert!(matches!(
        MmStackReader::open(&file),
        Err(ReaderError::NotAnOmeTiff(_))
    ));
}

#[test]
fn test_nonexistent_path_fails() {
    assert!(matches!(
        MmStackReader::open("/no/such/dataset"),
        Err(ReaderError::Io(IoError::NotFound(_)))
    ));
}

// =============================================================================
// Duplicate coordinates
// =============================================================================

fn duplicate_dataset() -> TempDir {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 1, 1, 1))
        .page(0, 0, 0, 0, 1)
        .write(&dir.path().join("a_MMStack.ome.tif"));
    MmStackFileBuilder::new(summary("2.0.1", 1, 1, 1, 1))
        .page(0, 0, 0, 0, 2)
        .write(&dir.path().join("b_MMStack.ome.tif"));
    dir
}

#[test]
fn test_duplicate_last_wins_by_default() {
    let dir = duplicate_dataset();
    let reader = MmStackReader::open(dir.path()).unwrap();
    assert_const_plane(&reader.get_image(0, 0, 0, 0).unwrap(), 2);
}

#[test]
fn test_duplicate_first_wins() {
    let dir = duplicate_dataset();
    let options = StackOptions {
        duplicates: DuplicatePolicy::FirstWins,
        ..Default::default()
    };
    let reader = MmStackReader::open_with(dir.path(), options).unwrap();
    assert_const_plane(&reader.get_image(0, 0, 0, 0).unwrap(), 1);
}

#[test]
fn test_duplicate_error_policy() {
    let dir = duplicate_dataset();
    let options = StackOptions {
        duplicates: DuplicatePolicy::Error,
        ..Default::default()
    };
    assert!(matches!(
        MmStackReader::open_with(dir.path(), options),
        Err(ReaderError::DuplicateCoordinate { .. })
    ));
}

// =============================================================================
// Read-only enforcement
// =============================================================================

#[test]
fn test_writes_are_refused_and_state_untouched() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 1, 1, 1))
        .page(0, 0, 0, 0, 9)
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));

    let reader = MmStackReader::open(dir.path()).unwrap();
    let before = reader.position_array(0).unwrap();

    let plane = Plane::zeros(PixelType::U16, HEIGHT, WIDTH);
    assert!(matches!(
        reader.set_image(0, 0, 0, 0, &plane),
        Err(ReaderError::ReadOnly { .. })
    ));
    assert!(matches!(
        reader.delete_image(0, 0, 0, 0),
        Err(ReaderError::ReadOnly { .. })
    ));

    // Index and cache are unchanged by the refused calls.
    let after = reader.position_array(0).unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_const_plane(&reader.get_image(0, 0, 0, 0).unwrap(), 9);
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_metadata_accessors() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 2, 1, 1, 1))
        .page(0, 0, 0, 0, 1)
        .page(0, 0, 1, 0, 2)
        .comments(json!({"Summary": "test acquisition"}))
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));

    let reader = MmStackReader::open(dir.path()).unwrap();

    let dir_name = dir.path().file_name().unwrap().to_string_lossy();
    assert_eq!(reader.name(), dir_name);
    assert_eq!(reader.files().len(), 1);
    assert_eq!(reader.schema_version(), SchemaVersion::Modern);
    assert_eq!(reader.channel_names(), ["Ch0", "Ch1"]);
    assert_eq!(reader.z_step_um(), Some(0.5));
    assert_eq!(reader.summary()["Width"], WIDTH);
    assert_eq!(
        reader.comments().unwrap()["Summary"],
        "test acquisition"
    );
}

#[test]
fn test_beta_dataset_without_channel_names() {
    let dir = TempDir::new().unwrap();
    let mut beta_summary = summary("2.0.0-beta3", 2, 1, 1, 1);
    beta_summary.as_object_mut().unwrap().remove("ChNames");
    MmStackFileBuilder::new(beta_summary)
        .page(0, 0, 0, 0, 1)
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));

    let reader = MmStackReader::open(dir.path()).unwrap();
    assert_eq!(reader.schema_version(), SchemaVersion::Beta);
    // Declared channel count is honored even though only channel 0 was
    // ever written.
    assert_eq!(reader.channel_names(), ["", ""]);
    assert_eq!(reader.extents().channels, 1);
}

#[test]
fn test_position_out_of_range() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 1, 1, 1))
        .page(0, 0, 0, 0, 1)
        .write(&dir.path().join("acq_MMStack_Pos0.ome.tif"));

    let reader = MmStackReader::open(dir.path()).unwrap();
    assert!(reader.contains_position(0));
    assert!(!reader.contains_position(1));
    assert!(matches!(
        reader.position_array(5),
        Err(ReaderError::PositionOutOfRange {
            position: 5,
            count: 1
        })
    ));
}
