//! Summary metadata block.
//!
//! The first file of an acquisition embeds a JSON block describing the whole
//! dataset: declared dimension counts, channel names, z-step, stage
//! positions and the Micro-Manager version that wrote it. Three metadata
//! dialects are in the wild and differ in how stage positions are nested and
//! in which keys are reliably present, so parsing dispatches on an explicit
//! schema version instead of probing keys ad hoc.
//!
//! The declared counts are a starting point only; scanning the page index
//! maps may revise them in either direction (see [`crate::stack::CoordIndex`]).

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::FormatError;
use crate::format::stage::{flatten_beta, flatten_modern, StagePosition};

// =============================================================================
// Schema version
// =============================================================================

/// Known Micro-Manager summary-metadata dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Micro-Manager 2.0 beta builds ("2.0.0-beta3" and friends)
    Beta,
    /// The 1.4.22 stable release
    V1_4_22,
    /// Any later stable release
    Modern,
}

impl SchemaVersion {
    /// Detect the dialect from the `MicroManagerVersion` string.
    pub fn detect(version: &str) -> Self {
        if version.contains("beta") {
            SchemaVersion::Beta
        } else if version == "1.4.22" {
            SchemaVersion::V1_4_22
        } else {
            SchemaVersion::Modern
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            SchemaVersion::Beta => "2.0-beta",
            SchemaVersion::V1_4_22 => "1.4.22",
            SchemaVersion::Modern => "stable",
        }
    }
}

// =============================================================================
// Raw block
// =============================================================================

/// The summary block as written, before version normalization.
#[derive(Debug, Clone, Deserialize)]
struct RawSummary {
    #[serde(rename = "MicroManagerVersion")]
    micro_manager_version: Option<String>,
    #[serde(rename = "ChNames")]
    ch_names: Option<Vec<String>>,
    #[serde(rename = "Channels")]
    channels: Option<u64>,
    #[serde(rename = "Frames")]
    frames: Option<u64>,
    #[serde(rename = "Slices")]
    slices: Option<u64>,
    #[serde(rename = "Positions")]
    positions: Option<u64>,
    #[serde(rename = "Height")]
    height: Option<u64>,
    #[serde(rename = "Width")]
    width: Option<u64>,
    #[serde(rename = "z-step_um")]
    z_step_um: Option<f64>,
    #[serde(rename = "StagePositions")]
    stage_positions: Option<Vec<Value>>,
}

impl RawSummary {
    fn require(field: Option<u64>, key: &'static str) -> Result<usize, FormatError> {
        field
            .map(|v| v as usize)
            .ok_or(FormatError::MissingKey { key })
    }
}

// =============================================================================
// Normalized metadata
// =============================================================================

/// Acquisition-level metadata normalized across schema versions.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryMetadata {
    /// Detected metadata dialect
    pub version: SchemaVersion,
    /// The raw `MicroManagerVersion` string
    pub version_string: String,
    /// One name per channel; may be empty strings for beta datasets
    pub channel_names: Vec<String>,
    /// Spacing between z slices in micrometers, when declared
    pub z_step_um: Option<f64>,
    /// Declared image height in pixels
    pub height: usize,
    /// Declared image width in pixels
    pub width: usize,
    /// Declared frame (timepoint) count
    pub frames: usize,
    /// Declared slice count
    pub slices: usize,
    /// Declared channel count
    pub channels: usize,
    /// Declared position count; zero when the block does not carry one
    pub positions: usize,
    /// Flattened stage positions; populated only for multi-position
    /// acquisitions under the beta and modern schemas
    pub stage_positions: Vec<StagePosition>,
}

impl SummaryMetadata {
    /// Normalize a summary block, dispatching on the detected version.
    pub fn from_json(summary: &Value) -> Result<Self, FormatError> {
        let raw: RawSummary = serde_json::from_value(summary.clone())?;
        let version_string = raw
            .micro_manager_version
            .clone()
            .ok_or(FormatError::MissingKey {
                key: "MicroManagerVersion",
            })?;
        let version = SchemaVersion::detect(&version_string);
        debug!(version = version.name(), "normalizing summary metadata");

        let channels = RawSummary::require(raw.channels, "Channels")?;
        let frames = RawSummary::require(raw.frames, "Frames")?;
        let slices = RawSummary::require(raw.slices, "Slices")?;
        let height = RawSummary::require(raw.height, "Height")?;
        let width = RawSummary::require(raw.width, "Width")?;
        let positions = raw.positions.unwrap_or(0) as usize;

        let channel_names = match version {
            // Beta builds sometimes omit ChNames entirely; substitute one
            // empty name per declared channel instead of failing.
            SchemaVersion::Beta => raw
                .ch_names
                .clone()
                .unwrap_or_else(|| vec![String::new(); channels]),
            SchemaVersion::V1_4_22 | SchemaVersion::Modern => raw
                .ch_names
                .clone()
                .ok_or(FormatError::MissingKey { key: "ChNames" })?,
        };

        let stage_positions = match version {
            SchemaVersion::Beta => Self::flatten_all(&raw, positions, flatten_beta)?,
            // 1.4.22 stage records have no schema this reader understands
            SchemaVersion::V1_4_22 => Vec::new(),
            SchemaVersion::Modern => Self::flatten_all(&raw, positions, flatten_modern)?,
        };

        Ok(SummaryMetadata {
            version,
            version_string,
            channel_names,
            z_step_um: raw.z_step_um,
            height,
            width,
            frames,
            slices,
            channels,
            positions,
            stage_positions,
        })
    }

    fn flatten_all(
        raw: &RawSummary,
        positions: usize,
        flatten: fn(&Value) -> Result<StagePosition, FormatError>,
    ) -> Result<Vec<StagePosition>, FormatError> {
        if positions <= 1 {
            return Ok(Vec::new());
        }
        raw.stage_positions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(flatten)
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
