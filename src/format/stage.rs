//! Stage-position records.
//!
//! Multi-position acquisitions describe each imaged location as a nested
//! per-device structure whose shape changed between the Micro-Manager 2.0
//! beta releases and the later stable schema. Both variants normalize to the
//! same flat device-name to spatial-offset record.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FormatError;

/// A flattened stage position: one imaged location and the spatial offset of
/// every stage device that contributed to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagePosition {
    pub label: Option<String>,
    pub grid_row: Option<i64>,
    pub grid_col: Option<i64>,
    /// Device name to spatial offset in micrometers. Single-axis stages carry
    /// one element, XY stages two.
    pub device_offsets: IndexMap<String, Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct ModernStagePosition {
    #[serde(rename = "Label")]
    label: Option<String>,
    #[serde(rename = "GridRow")]
    grid_row: Option<i64>,
    #[serde(rename = "GridCol")]
    grid_col: Option<i64>,
    #[serde(rename = "DevicePositions")]
    device_positions: Vec<ModernDevicePosition>,
}

#[derive(Debug, Deserialize)]
struct ModernDevicePosition {
    #[serde(rename = "Device")]
    device: String,
    #[serde(rename = "Position_um")]
    position_um: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct BetaStagePosition {
    label: String,
    #[serde(rename = "gridRow")]
    grid_row: i64,
    #[serde(rename = "gridCol")]
    grid_col: i64,
    subpositions: Vec<BetaSubPosition>,
}

#[derive(Debug, Deserialize)]
struct BetaSubPosition {
    #[serde(rename = "stageName")]
    stage_name: String,
    x: f64,
    y: f64,
    z: f64,
}

/// Flatten a stable-schema stage position record.
pub fn flatten_modern(value: &Value) -> Result<StagePosition, FormatError> {
    let raw: ModernStagePosition = serde_json::from_value(value.clone())?;
    let mut out = StagePosition {
        label: raw.label,
        grid_row: raw.grid_row,
        grid_col: raw.grid_col,
        device_offsets: IndexMap::new(),
    };
    for device in raw.device_positions {
        out.device_offsets.insert(device.device, device.position_um);
    }
    Ok(out)
}

/// Flatten a 2.0-beta stage position record.
///
/// Beta subpositions always carry x, y and z fields; axes a device does not
/// drive are written as zero, so only the non-zero components are kept.
pub fn flatten_beta(value: &Value) -> Result<StagePosition, FormatError> {
    let raw: BetaStagePosition = serde_json::from_value(value.clone())?;
    let mut out = StagePosition {
        label: Some(raw.label),
        grid_row: Some(raw.grid_row),
        grid_col: Some(raw.grid_col),
        device_offsets: IndexMap::new(),
    };
    for sub in raw.subpositions {
        let values: Vec<f64> = [sub.x, sub.y, sub.z]
            .into_iter()
            .filter(|&v| v != 0.0)
            .collect();
        out.device_offsets.insert(sub.stage_name, values);
    }
    Ok(out)
}
