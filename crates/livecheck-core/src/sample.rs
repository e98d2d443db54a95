//! Per-frame facial metrics as delivered by the face-tracking provider.

use serde::{Deserialize, Serialize};

/// Head translation in the tracking provider's world space (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl HeadPosition {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position.
    pub fn distance(&self, other: &HeadPosition) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Blend-shape coefficients for one frame, each normalised to `[0, 1]`.
///
/// A coefficient is `None` when the provider did not report it for the frame
/// (sensor dropout). Checks that depend on a missing coefficient are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendShapes {
    pub left_eye_blink: Option<f32>,
    pub right_eye_blink: Option<f32>,
    pub mouth_smile: Option<f32>,
    pub jaw_open: Option<f32>,
    pub cheek_puff: Option<f32>,
}

impl BlendShapes {
    /// Set `mouth_smile` from separate left/right smile coefficients.
    ///
    /// Providers report the two mouth corners independently; the smile
    /// intensity is their mean. If only one side is present it is used as is.
    pub fn with_smile_pair(mut self, left: Option<f32>, right: Option<f32>) -> Self {
        self.mouth_smile = match (left, right) {
            (Some(l), Some(r)) => Some((l + r) / 2.0),
            (Some(v), None) | (None, Some(v)) => Some(v),
            (None, None) => None,
        };
        self
    }
}

/// A single tracked frame: blend shapes, head pose and capture timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FacialMetricsSample {
    /// Capture time in seconds on the provider's monotonic clock.
    pub timestamp: f64,
    #[serde(default)]
    pub blend_shapes: BlendShapes,
    pub head_position: HeadPosition,
}

impl FacialMetricsSample {
    pub fn new(timestamp: f64, blend_shapes: BlendShapes, head_position: HeadPosition) -> Self {
        Self {
            timestamp,
            blend_shapes,
            head_position,
        }
    }
}
