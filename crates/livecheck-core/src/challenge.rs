//! Challenge state and the per-frame state transition.
//!
//! ```text
//! WAITING ──frame──▶ WAITING | ACTION_COMPLETED ──▶ VERIFIED
//!                                      │
//!                                      └─ budget exceeded ─▶ TIMED_OUT (─▶ WAITING on reset)
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::action::{ActionSet, LivenessAction};
use crate::config::ChallengeSettings;
use crate::motion::MotionHistory;
use crate::sample::HeadPosition;

/// What happens when a challenge runs past its time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeoutPolicy {
    /// Discard progress and restart the challenge from the timing-out frame.
    #[default]
    Reset,
    /// Log a warning and keep the challenge running with its progress intact.
    WarnOnly,
}

/// How the required actions of a new challenge are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeMode {
    /// One action drawn at random.
    Single,
    /// The configured list of actions.
    #[default]
    Multi,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value} (expected {expected})")]
pub struct UnknownSetting {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

impl FromStr for TimeoutPolicy {
    type Err = UnknownSetting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "reset" => Ok(Self::Reset),
            "warn-only" | "warn" => Ok(Self::WarnOnly),
            _ => Err(UnknownSetting {
                kind: "timeout policy",
                value: s.to_string(),
                expected: "reset or warn-only",
            }),
        }
    }
}

impl FromStr for ChallengeMode {
    type Err = UnknownSetting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multi" => Ok(Self::Multi),
            _ => Err(UnknownSetting {
                kind: "challenge mode",
                value: s.to_string(),
                expected: "single or multi",
            }),
        }
    }
}

/// Mutable state of one liveness challenge.
#[derive(Debug, Clone)]
pub struct ChallengeState {
    /// Correlates log lines for a single challenge attempt.
    pub id: Uuid,
    pub required: ActionSet,
    /// Every action seen since the challenge started, required or not.
    pub completed: ActionSet,
    pub motion_history: MotionHistory,
    /// Sample timestamp at which the challenge started (seconds).
    pub started_at: f64,
    pub previous_head_position: Option<HeadPosition>,
    pub verified: bool,
}

impl ChallengeState {
    pub fn new(required: ActionSet, started_at: f64, motion_window: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            required,
            completed: ActionSet::new(),
            motion_history: MotionHistory::new(motion_window),
            started_at,
            previous_head_position: None,
            verified: false,
        }
    }

    /// Seconds since the challenge started. Clock skew backwards reads as zero.
    pub fn elapsed(&self, now: f64) -> f64 {
        (now - self.started_at).max(0.0)
    }

    /// Required actions not yet performed.
    pub fn remaining(&self) -> ActionSet {
        self.required.difference(&self.completed).copied().collect()
    }

    /// All required actions performed. An empty requirement is never satisfied.
    pub fn is_satisfied(&self) -> bool {
        !self.required.is_empty() && self.required.is_subset(&self.completed)
    }

    /// Start over with the same required actions, clearing all transient state.
    pub fn restart(&mut self, now: f64) {
        self.id = Uuid::new_v4();
        self.completed.clear();
        self.motion_history.clear();
        self.started_at = now;
        self.previous_head_position = None;
        self.verified = false;
    }

    /// Human-readable prompt, e.g. "Please blink your eyes, then please smile".
    pub fn description(&self) -> String {
        describe(self.required.iter().copied())
    }
}

pub(crate) fn describe(actions: impl IntoIterator<Item = LivenessAction>) -> String {
    let mut out = String::new();
    for (i, action) in actions.into_iter().enumerate() {
        if i == 0 {
            out.push_str(action.instruction());
        } else {
            out.push_str(", then ");
            out.push_str(&action.instruction().to_ascii_lowercase());
        }
    }
    out
}

/// Outcome of advancing a challenge by one accepted frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeResult {
    /// Nothing new this frame.
    Waiting,
    /// Required actions completed for the first time on this frame.
    ActionCompleted { actions: ActionSet },
    /// All required actions done within the budget.
    Verified,
    /// Budget exceeded. `reset` tells whether progress was discarded.
    TimedOut { elapsed_secs: f64, reset: bool },
}

/// Fold `detected` into `state` and decide the challenge outcome at `now`.
///
/// A verified challenge is terminal: later frames report `Verified` and leave
/// the state untouched. Otherwise the detected actions are merged into the
/// completed set before the time budget is checked, so a frame arriving after
/// the budget reports `TimedOut` even if it completes the challenge. Under
/// [`TimeoutPolicy::WarnOnly`] the progress is kept but an overdue challenge
/// never becomes verified.
pub fn advance_challenge(
    state: &mut ChallengeState,
    detected: &ActionSet,
    now: f64,
    settings: &ChallengeSettings,
) -> ChallengeResult {
    if state.verified {
        return ChallengeResult::Verified;
    }

    let newly_required: ActionSet = detected
        .iter()
        .filter(|a| state.required.contains(*a) && !state.completed.contains(*a))
        .copied()
        .collect();
    state.completed.extend(detected.iter().copied());

    for action in &newly_required {
        tracing::info!(challenge = %state.id, %action, "action completed");
    }

    let elapsed = state.elapsed(now);
    if elapsed > settings.time_budget_secs {
        let reset = settings.timeout_policy == TimeoutPolicy::Reset;
        tracing::warn!(
            challenge = %state.id,
            elapsed_secs = elapsed,
            budget_secs = settings.time_budget_secs,
            reset,
            remaining = ?state.remaining(),
            "challenge timed out, possible spoof"
        );
        if reset {
            state.restart(now);
            tracing::info!(
                challenge = %state.id,
                "challenge restarted: {}",
                state.description()
            );
        }
        return ChallengeResult::TimedOut {
            elapsed_secs: elapsed,
            reset,
        };
    }

    if state.is_satisfied() {
        state.verified = true;
        tracing::info!(challenge = %state.id, elapsed_secs = elapsed, "challenge verified");
        return ChallengeResult::Verified;
    }

    if newly_required.is_empty() {
        ChallengeResult::Waiting
    } else {
        tracing::debug!(
            challenge = %state.id,
            remaining = ?state.remaining(),
            "challenge in progress"
        );
        ChallengeResult::ActionCompleted {
            actions: newly_required,
        }
    }
}
