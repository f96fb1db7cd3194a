//! End-to-end tests for the single-series reader over real files.
//!
//! The synthetic files here are written page-by-page in row-major order over
//! their declared axes, which is how a coherent single-series acquisition
//! lays out its planes.

use serde_json::json;
use tempfile::TempDir;

use mmstack::{ReaderError, SeriesStack};

use super::test_utils::{summary, MmStackFileBuilder, HEIGHT, WIDTH};

#[test]
fn test_time_series() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 3, 1, 1))
        .page(0, 0, 0, 0, 0)
        .page(0, 1, 0, 0, 1)
        .page(0, 2, 0, 0, 2)
        .write(&dir.path().join("series_MMStack.ome.tif"));

    let stack = SeriesStack::open(dir.path()).unwrap();

    // Singleton axes are padded back in: (R, T, C, Z, Y, X).
    assert_eq!(stack.dims(), [1, 3, 1, 1, HEIGHT, WIDTH]);
    assert_eq!(stack.len(), 1);
    assert_eq!(stack.name(), "series_MMStack");

    let array = stack.position_array(0).unwrap();
    assert_eq!(array.shape(), [3, 1, 1, HEIGHT, WIDTH]);
    for t in 0..3 {
        let plane = array.plane(t, 0, 0).unwrap();
        assert!(plane.view::<u16>().unwrap().iter().all(|&v| v == t as u16));
    }
}

#[test]
fn test_multi_position_series() {
    let dir = TempDir::new().unwrap();
    // Axes RTYX: page = r * frames + t.
    MmStackFileBuilder::new(summary("2.0.1", 1, 2, 1, 2))
        .page(0, 0, 0, 0, 10)
        .page(0, 1, 0, 0, 11)
        .page(1, 0, 0, 0, 20)
        .page(1, 1, 0, 0, 21)
        .write(&dir.path().join("series_MMStack.ome.tif"));

    let stack = SeriesStack::open(dir.path()).unwrap();
    assert_eq!(stack.dims(), [2, 2, 1, 1, HEIGHT, WIDTH]);
    assert_eq!(stack.num_positions(), 2);

    let plane = stack.get_image(1, 1, 0, 0).unwrap();
    assert!(plane.view::<u16>().unwrap().iter().all(|&v| v == 21));

    let first = stack.position_array(0).unwrap();
    assert!(first
        .plane(1, 0, 0)
        .unwrap()
        .view::<u16>()
        .unwrap()
        .iter()
        .all(|&v| v == 11));
}

#[test]
fn test_open_on_file_path() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("series_MMStack.ome.tif");
    MmStackFileBuilder::new(summary("2.0.1", 1, 1, 1, 1))
        .page(0, 0, 0, 0, 42)
        .write(&file);

    let stack = SeriesStack::open(&file).unwrap();
    assert_eq!(stack.dims(), [1, 1, 1, 1, HEIGHT, WIDTH]);
    let plane = stack.get_image(0, 0, 0, 0).unwrap();
    assert!(plane.view::<u16>().unwrap().iter().all(|&v| v == 42));
}

#[test]
fn test_series_is_read_only() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 1, 1, 1))
        .page(0, 0, 0, 0, 1)
        .write(&dir.path().join("series_MMStack.ome.tif"));

    let stack = SeriesStack::open(dir.path()).unwrap();
    let plane = mmstack::Plane::zeros(stack.pixel_type(), HEIGHT, WIDTH);
    assert!(matches!(
        stack.set_image(0, 0, 0, 0, &plane),
        Err(ReaderError::ReadOnly { .. })
    ));
    assert!(matches!(
        stack.delete_image(0, 0, 0, 0),
        Err(ReaderError::ReadOnly { .. })
    ));
}

#[test]
fn test_series_iteration() {
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 1, 1, 2))
        .page(0, 0, 0, 0, 1)
        .page(1, 0, 0, 0, 2)
        .write(&dir.path().join("series_MMStack.ome.tif"));

    let stack = SeriesStack::open(dir.path()).unwrap();
    let arrays: Vec<_> = stack.iter_arrays().collect::<Result<_, _>>().unwrap();
    assert_eq!(arrays.len(), 2);
    assert!(arrays[1]
        .plane(0, 0, 0)
        .unwrap()
        .view::<u16>()
        .unwrap()
        .iter()
        .all(|&v| v == 2));
}

#[test]
fn test_series_comments_are_incidental() {
    // A comments block does not perturb series reading.
    let dir = TempDir::new().unwrap();
    MmStackFileBuilder::new(summary("2.0.1", 1, 2, 1, 1))
        .page(0, 0, 0, 0, 3)
        .page(0, 1, 0, 0, 4)
        .comments(json!({"Summary": "series with comments"}))
        .write(&dir.path().join("series_MMStack.ome.tif"));

    let stack = SeriesStack::open(dir.path()).unwrap();
    let plane = stack.get_image(0, 1, 0, 0).unwrap();
    assert!(plane.view::<u16>().unwrap().iter().all(|&v| v == 4));
}
