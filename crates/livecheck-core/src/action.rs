//! Liveness actions and their detection predicates.
//!
//! Each action is detected independently from a single frame. Dispatch goes
//! through [`ActionRegistry`], a table from action to predicate, so a host
//! can swap a predicate (e.g. a tuned blink detector) without touching the
//! evaluator.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DetectionThresholds;
use crate::sample::FacialMetricsSample;

/// A facial action the user can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessAction {
    Blink,
    HeadTurnLeft,
    HeadTurnRight,
    Smile,
}

/// Set of actions, ordered for stable log and report output.
pub type ActionSet = BTreeSet<LivenessAction>;

impl LivenessAction {
    pub const ALL: [LivenessAction; 4] = [
        LivenessAction::Blink,
        LivenessAction::HeadTurnLeft,
        LivenessAction::HeadTurnRight,
        LivenessAction::Smile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blink => "blink",
            Self::HeadTurnLeft => "head_turn_left",
            Self::HeadTurnRight => "head_turn_right",
            Self::Smile => "smile",
        }
    }

    /// Prompt shown to the user.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Blink => "Please blink your eyes",
            Self::HeadTurnLeft => "Please turn your head left",
            Self::HeadTurnRight => "Please turn your head right",
            Self::Smile => "Please smile",
        }
    }
}

impl fmt::Display for LivenessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown liveness action: {0} (expected blink, head_turn_left, head_turn_right or smile)")]
pub struct UnknownAction(pub String);

impl FromStr for LivenessAction {
    type Err = UnknownAction;

    /// Accepts snake_case and kebab-case names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        LivenessAction::ALL
            .into_iter()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Both eyes closed beyond `threshold`. Missing coefficients never match.
pub fn is_blinking(sample: &FacialMetricsSample, threshold: f32) -> bool {
    match (
        sample.blend_shapes.left_eye_blink,
        sample.blend_shapes.right_eye_blink,
    ) {
        (Some(left), Some(right)) => left > threshold && right > threshold,
        _ => false,
    }
}

pub fn is_smiling(sample: &FacialMetricsSample, threshold: f32) -> bool {
    sample
        .blend_shapes
        .mouth_smile
        .is_some_and(|smile| smile > threshold)
}

pub fn is_turned_left(sample: &FacialMetricsSample, threshold: f32) -> bool {
    sample.head_position.x < -threshold
}

pub fn is_turned_right(sample: &FacialMetricsSample, threshold: f32) -> bool {
    sample.head_position.x > threshold
}

/// Boxed detection predicate.
pub type Predicate = Box<dyn Fn(&FacialMetricsSample) -> bool + Send + Sync>;

/// Table of action predicates evaluated against every frame.
pub struct ActionRegistry {
    predicates: Vec<(LivenessAction, Predicate)>,
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Registry with the built-in predicate for every [`LivenessAction`].
    pub fn standard(thresholds: &DetectionThresholds) -> Self {
        let blink = thresholds.blink_above;
        let smile = thresholds.smile_above;
        let turn = thresholds.head_turn_beyond;

        let mut registry = Self::empty();
        registry.register(LivenessAction::Blink, move |s| is_blinking(s, blink));
        registry.register(LivenessAction::HeadTurnLeft, move |s| is_turned_left(s, turn));
        registry.register(LivenessAction::HeadTurnRight, move |s| is_turned_right(s, turn));
        registry.register(LivenessAction::Smile, move |s| is_smiling(s, smile));
        registry
    }

    /// Install `predicate` for `action`, replacing any existing one.
    pub fn register<F>(&mut self, action: LivenessAction, predicate: F)
    where
        F: Fn(&FacialMetricsSample) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate = Box::new(predicate);
        match self.predicates.iter_mut().find(|(a, _)| *a == action) {
            Some(entry) => entry.1 = predicate,
            None => self.predicates.push((action, predicate)),
        }
    }

    /// Evaluate every registered predicate against `sample`.
    pub fn detect(&self, sample: &FacialMetricsSample) -> ActionSet {
        self.predicates
            .iter()
            .filter(|(_, predicate)| predicate(sample))
            .map(|(action, _)| *action)
            .collect()
    }

    pub fn actions(&self) -> impl Iterator<Item = LivenessAction> + '_ {
        self.predicates.iter().map(|(action, _)| *action)
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.actions()).finish()
    }
}

/// Detect actions using the default thresholds.
pub fn detect_actions(sample: &FacialMetricsSample) -> ActionSet {
    ActionRegistry::standard(&DetectionThresholds::default()).detect(sample)
}
