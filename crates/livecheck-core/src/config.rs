//! Evaluator thresholds and challenge settings.
//!
//! Every field has a default matching the tuned values used on device, so an
//! empty TOML document deserializes into a working configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::LivenessAction;
use crate::challenge::{ChallengeMode, TimeoutPolicy};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("{field} must lie within [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f32 },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("challenge time budget must be positive, got {0}s")]
    NonPositiveTimeBudget(f64),

    #[error("motion window must hold at least one sample")]
    EmptyMotionWindow,

    #[error("challenge requires at least one action")]
    NoRequiredActions,
}

/// Thresholds for the occlusion heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionThresholds {
    /// Both eye-blink coefficients below this value flag the eyes as static.
    pub eye_static_below: f32,
    /// A jaw-open coefficient below this value flags the mouth as flat.
    pub jaw_flat_below: f32,
    /// A cheek-puff coefficient above this value flags mask-like deformation.
    pub cheek_puff_above: f32,
}

impl Default for OcclusionThresholds {
    fn default() -> Self {
        Self {
            eye_static_below: 0.1,
            jaw_flat_below: 0.1,
            cheek_puff_above: 0.5,
        }
    }
}

/// Thresholds for the per-action detection predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionThresholds {
    /// Both eyes must exceed this blink coefficient.
    pub blink_above: f32,
    /// Smile coefficient must exceed this value.
    pub smile_above: f32,
    /// Head x offset beyond which a turn is detected, in either direction.
    pub head_turn_beyond: f32,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            blink_above: 0.7,
            smile_above: 0.5,
            head_turn_beyond: 0.2,
        }
    }
}

/// Motion-variance check parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    /// Number of recent displacement samples averaged.
    pub window: usize,
    /// Mean displacement below which the head is considered static.
    pub min_mean_displacement: f32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            window: crate::motion::DEFAULT_MOTION_WINDOW,
            min_mean_displacement: crate::motion::DEFAULT_MIN_MEAN_DISPLACEMENT,
        }
    }
}

/// Challenge composition and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeSettings {
    /// Seconds allowed between challenge start and completion.
    pub time_budget_secs: f64,
    pub timeout_policy: TimeoutPolicy,
    pub mode: ChallengeMode,
    /// Actions required in multi-action mode.
    pub required: Vec<LivenessAction>,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            time_budget_secs: 5.0,
            timeout_policy: TimeoutPolicy::default(),
            mode: ChallengeMode::default(),
            required: vec![LivenessAction::Blink, LivenessAction::Smile],
        }
    }
}

/// Complete evaluator configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorSettings {
    pub occlusion: OcclusionThresholds,
    pub detection: DetectionThresholds,
    pub motion: MotionSettings,
    pub challenge: ChallengeSettings,
}

impl EvaluatorSettings {
    /// Reject settings the evaluator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        unit("occlusion.eye_static_below", self.occlusion.eye_static_below)?;
        unit("occlusion.jaw_flat_below", self.occlusion.jaw_flat_below)?;
        unit("occlusion.cheek_puff_above", self.occlusion.cheek_puff_above)?;
        unit("detection.blink_above", self.detection.blink_above)?;
        unit("detection.smile_above", self.detection.smile_above)?;

        // Head offset is in world units, not a blend-shape coefficient.
        finite("detection.head_turn_beyond", self.detection.head_turn_beyond as f64)?;
        if self.detection.head_turn_beyond < 0.0 {
            return Err(ConfigError::Negative {
                field: "detection.head_turn_beyond",
                value: self.detection.head_turn_beyond as f64,
            });
        }

        if self.motion.window == 0 {
            return Err(ConfigError::EmptyMotionWindow);
        }
        finite(
            "motion.min_mean_displacement",
            self.motion.min_mean_displacement as f64,
        )?;
        if self.motion.min_mean_displacement < 0.0 {
            return Err(ConfigError::Negative {
                field: "motion.min_mean_displacement",
                value: self.motion.min_mean_displacement as f64,
            });
        }

        finite("challenge.time_budget_secs", self.challenge.time_budget_secs)?;
        if self.challenge.time_budget_secs <= 0.0 {
            return Err(ConfigError::NonPositiveTimeBudget(
                self.challenge.time_budget_secs,
            ));
        }
        if self.challenge.mode == ChallengeMode::Multi && self.challenge.required.is_empty() {
            return Err(ConfigError::NoRequiredActions);
        }

        Ok(())
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field, value })
    }
}

fn unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
    finite(field, value as f64)?;
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { field, value })
    }
}
