//! Occlusion heuristics over blend-shape coefficients.
//!
//! A face partially covered by a hand, a printed cut-out, or a rigid mask
//! leaves the tracker reporting implausibly flat or deformed coefficients.
//! Each heuristic is independent; the first one that fires names the cause.

use serde::Serialize;

use crate::config::OcclusionThresholds;
use crate::sample::FacialMetricsSample;

/// Why a frame was flagged as occluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OcclusionCause {
    /// Both eyes report near-zero blink: the tracker cannot resolve the eyes.
    EyesStatic,
    /// Jaw reports near-zero opening: the mouth region is flat.
    MouthFlat,
    /// Cheek puff beyond anything a relaxed face produces.
    CheekDeformed,
}

impl OcclusionCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EyesStatic => "eyes_static",
            Self::MouthFlat => "mouth_flat",
            Self::CheekDeformed => "cheek_deformed",
        }
    }
}

/// First occlusion heuristic that fires for `sample`, if any.
///
/// A heuristic whose coefficients are missing from the frame is skipped.
pub fn occlusion_cause(
    sample: &FacialMetricsSample,
    thresholds: &OcclusionThresholds,
) -> Option<OcclusionCause> {
    let shapes = &sample.blend_shapes;

    if let (Some(left), Some(right)) = (shapes.left_eye_blink, shapes.right_eye_blink) {
        if left < thresholds.eye_static_below && right < thresholds.eye_static_below {
            return Some(OcclusionCause::EyesStatic);
        }
    }

    if shapes
        .jaw_open
        .is_some_and(|jaw| jaw < thresholds.jaw_flat_below)
    {
        return Some(OcclusionCause::MouthFlat);
    }

    if shapes
        .cheek_puff
        .is_some_and(|puff| puff > thresholds.cheek_puff_above)
    {
        return Some(OcclusionCause::CheekDeformed);
    }

    None
}

pub fn is_occluded(sample: &FacialMetricsSample, thresholds: &OcclusionThresholds) -> bool {
    occlusion_cause(sample, thresholds).is_some()
}
