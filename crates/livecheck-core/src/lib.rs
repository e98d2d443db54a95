//! livecheck-core: active face-liveness evaluation over per-frame facial metrics.
//!
//! The face-tracking provider delivers one [`FacialMetricsSample`] per tracked
//! frame. A [`LivenessEvaluator`] runs a challenge (blink, smile, head turns)
//! against that stream, rejecting frames that look occluded and streams whose
//! head motion is too static to be a live face.

pub mod action;
pub mod challenge;
pub mod config;
pub mod evaluator;
pub mod motion;
pub mod occlusion;
pub mod sample;

pub use action::{detect_actions, ActionRegistry, ActionSet, LivenessAction, UnknownAction};
pub use challenge::{
    advance_challenge, ChallengeMode, ChallengeResult, ChallengeState, TimeoutPolicy,
    UnknownSetting,
};
pub use config::{
    ChallengeSettings, ConfigError, DetectionThresholds, EvaluatorSettings, MotionSettings,
    OcclusionThresholds,
};
pub use evaluator::{is_moving_naturally, FrameVerdict, LivenessEvaluator};
pub use motion::{check_motion, MotionCheck, MotionHistory};
pub use occlusion::{is_occluded, occlusion_cause, OcclusionCause};
pub use sample::{BlendShapes, FacialMetricsSample, HeadPosition};
