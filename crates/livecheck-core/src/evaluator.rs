//! Frame-by-frame liveness evaluation.
//!
//! The evaluator owns the current [`ChallengeState`] and is driven once per
//! tracked frame from the face-tracking callback. Each frame passes through
//! the occlusion heuristics, then the motion-variance check, then action
//! detection and the challenge transition. An occluded or static frame stops
//! the pipeline and leaves the completed actions untouched.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::action::{ActionRegistry, ActionSet, LivenessAction};
use crate::challenge::{advance_challenge, ChallengeMode, ChallengeResult, ChallengeState};
use crate::config::{ConfigError, EvaluatorSettings};
use crate::motion::{check_motion, MotionCheck};
use crate::occlusion::{occlusion_cause, OcclusionCause};
use crate::sample::FacialMetricsSample;

/// Classification of one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum FrameVerdict {
    /// No challenge is running.
    NoChallenge,
    OcclusionSuspected { cause: OcclusionCause },
    MotionSuspected { mean_displacement: f32 },
    Waiting,
    ActionCompleted { actions: ActionSet },
    Verified,
    TimedOut { elapsed_secs: f64, reset: bool },
}

impl FrameVerdict {
    /// Whether the frame was accepted into the challenge.
    pub fn is_conclusive(&self) -> bool {
        !matches!(
            self,
            Self::NoChallenge | Self::OcclusionSuspected { .. } | Self::MotionSuspected { .. }
        )
    }
}

impl From<ChallengeResult> for FrameVerdict {
    fn from(result: ChallengeResult) -> Self {
        match result {
            ChallengeResult::Waiting => Self::Waiting,
            ChallengeResult::ActionCompleted { actions } => Self::ActionCompleted { actions },
            ChallengeResult::Verified => Self::Verified,
            ChallengeResult::TimedOut {
                elapsed_secs,
                reset,
            } => Self::TimedOut {
                elapsed_secs,
                reset,
            },
        }
    }
}

/// Run the motion-variance step against the challenge's own history.
pub fn is_moving_naturally(
    sample: &FacialMetricsSample,
    state: &mut ChallengeState,
    min_mean_displacement: f32,
) -> bool {
    check_motion(
        sample.head_position,
        &mut state.previous_head_position,
        &mut state.motion_history,
        min_mean_displacement,
    )
    .is_natural
}

/// Required actions for a new challenge under `mode`.
///
/// Single-action mode draws one registered action at random; multi-action
/// mode requires the configured list.
fn draw_required<R: Rng + ?Sized>(
    mode: ChallengeMode,
    configured: &[LivenessAction],
    registry: &ActionRegistry,
    rng: &mut R,
) -> ActionSet {
    match mode {
        ChallengeMode::Single => {
            let candidates: Vec<LivenessAction> = registry.actions().collect();
            candidates.choose(rng).copied().into_iter().collect()
        }
        ChallengeMode::Multi => configured.iter().copied().collect(),
    }
}

pub struct LivenessEvaluator {
    settings: EvaluatorSettings,
    registry: ActionRegistry,
    state: Option<ChallengeState>,
    rng: StdRng,
}

impl LivenessEvaluator {
    /// Build an evaluator with the standard action predicates.
    pub fn new(settings: EvaluatorSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let registry = ActionRegistry::standard(&settings.detection);
        Ok(Self {
            settings,
            registry,
            state: None,
            rng: StdRng::from_entropy(),
        })
    }

    /// Seed the random challenge choice, for reproducible sessions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    /// Predicate table, for replacing or adding detectors.
    pub fn registry_mut(&mut self) -> &mut ActionRegistry {
        &mut self.registry
    }

    pub fn state(&self) -> Option<&ChallengeState> {
        self.state.as_ref()
    }

    /// Begin a challenge requiring `required`, discarding any previous one.
    ///
    /// An empty requirement is rejected with [`ConfigError::NoRequiredActions`]
    /// and leaves the current challenge in place.
    pub fn start_challenge(
        &mut self,
        required: impl IntoIterator<Item = LivenessAction>,
        now: f64,
    ) -> Result<&ChallengeState, ConfigError> {
        let required: ActionSet = required.into_iter().collect();
        if required.is_empty() {
            return Err(ConfigError::NoRequiredActions);
        }
        let state = ChallengeState::new(required, now, self.settings.motion.window);
        tracing::info!(
            challenge = %state.id,
            required = ?state.required,
            budget_secs = self.settings.challenge.time_budget_secs,
            "challenge started: {}",
            state.description()
        );
        Ok(self.state.insert(state))
    }

    /// Begin a challenge chosen according to the configured mode.
    pub fn start_configured_challenge(&mut self, now: f64) -> Result<&ChallengeState, ConfigError> {
        let required = draw_required(
            self.settings.challenge.mode,
            &self.settings.challenge.required,
            &self.registry,
            &mut self.rng,
        );
        self.start_challenge(required, now)
    }

    /// Drop the current challenge.
    pub fn cancel(&mut self) {
        if let Some(state) = self.state.take() {
            tracing::debug!(challenge = %state.id, "challenge cancelled");
        }
    }

    pub fn is_occluded(&self, sample: &FacialMetricsSample) -> bool {
        occlusion_cause(sample, &self.settings.occlusion).is_some()
    }

    pub fn detect_actions(&self, sample: &FacialMetricsSample) -> ActionSet {
        self.registry.detect(sample)
    }

    /// Classify one frame and advance the current challenge.
    pub fn process_frame(&mut self, sample: &FacialMetricsSample) -> FrameVerdict {
        let Some(state) = self.state.as_mut() else {
            return FrameVerdict::NoChallenge;
        };

        if state.verified {
            return FrameVerdict::Verified;
        }

        if let Some(cause) = occlusion_cause(sample, &self.settings.occlusion) {
            tracing::warn!(
                challenge = %state.id,
                timestamp = sample.timestamp,
                cause = cause.as_str(),
                "face occlusion suspected"
            );
            return FrameVerdict::OcclusionSuspected { cause };
        }

        let motion: MotionCheck = check_motion(
            sample.head_position,
            &mut state.previous_head_position,
            &mut state.motion_history,
            self.settings.motion.min_mean_displacement,
        );
        if !motion.is_natural {
            tracing::warn!(
                challenge = %state.id,
                timestamp = sample.timestamp,
                mean_displacement = motion.mean_displacement,
                samples = motion.samples,
                "unnatural head motion, possible photo spoof"
            );
            return FrameVerdict::MotionSuspected {
                mean_displacement: motion.mean_displacement,
            };
        }

        let detected = self.registry.detect(sample);
        tracing::debug!(
            challenge = %state.id,
            timestamp = sample.timestamp,
            detected = ?detected,
            displacement = ?motion.displacement,
            "frame accepted"
        );

        let result = advance_challenge(state, &detected, sample.timestamp, &self.settings.challenge);

        // A reset in single-action mode asks for a freshly drawn action
        if matches!(result, ChallengeResult::TimedOut { reset: true, .. })
            && self.settings.challenge.mode == ChallengeMode::Single
        {
            let required = draw_required(
                ChallengeMode::Single,
                &self.settings.challenge.required,
                &self.registry,
                &mut self.rng,
            );
            if !required.is_empty() {
                state.required = required;
                tracing::info!(
                    challenge = %state.id,
                    required = ?state.required,
                    "challenge redrawn: {}",
                    state.description()
                );
            }
        }

        result.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::TimeoutPolicy;
    use crate::sample::{BlendShapes, HeadPosition};

    /// Neutral, unoccluded face at the given time and head x offset.
    fn neutral(t: f64, x: f32) -> FacialMetricsSample {
        FacialMetricsSample::new(
            t,
            BlendShapes {
                left_eye_blink: Some(0.3),
                right_eye_blink: Some(0.3),
                mouth_smile: Some(0.1),
                jaw_open: Some(0.2),
                cheek_puff: Some(0.0),
            },
            HeadPosition::new(x, 0.0, -0.5),
        )
    }

    fn blinking(t: f64, x: f32) -> FacialMetricsSample {
        let mut s = neutral(t, x);
        s.blend_shapes.left_eye_blink = Some(0.9);
        s.blend_shapes.right_eye_blink = Some(0.85);
        s
    }

    fn evaluator() -> LivenessEvaluator {
        LivenessEvaluator::new(EvaluatorSettings::default()).unwrap()
    }

    #[test]
    fn test_no_challenge() {
        let mut ev = evaluator();
        assert_eq!(ev.process_frame(&neutral(0.0, 0.0)), FrameVerdict::NoChallenge);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let mut settings = EvaluatorSettings::default();
        settings.motion.window = 0;
        assert!(LivenessEvaluator::new(settings).is_err());
    }

    #[test]
    fn test_occluded_frame_short_circuits() {
        let mut ev = evaluator();
        ev.start_challenge([LivenessAction::Blink], 0.0).unwrap();

        // Blink predicate would fire, but the jaw is flat
        let mut s = blinking(0.1, 0.0);
        s.blend_shapes.jaw_open = Some(0.0);
        assert_eq!(
            ev.process_frame(&s),
            FrameVerdict::OcclusionSuspected {
                cause: OcclusionCause::MouthFlat
            }
        );
        let state = ev.state().unwrap();
        assert!(state.completed.is_empty());
        // Motion history untouched
        assert_eq!(state.previous_head_position, None);
    }

    #[test]
    fn test_static_head_flags_motion() {
        let mut ev = evaluator();
        ev.start_challenge([LivenessAction::Smile], 0.0).unwrap();
        assert_eq!(ev.process_frame(&neutral(0.0, 0.0)), FrameVerdict::Waiting);
        let verdict = ev.process_frame(&blinking(0.033, 0.0));
        assert_eq!(
            verdict,
            FrameVerdict::MotionSuspected {
                mean_displacement: 0.0
            }
        );
        assert!(ev.state().unwrap().completed.is_empty());
    }

    #[test]
    fn test_single_action_verifies() {
        let mut ev = evaluator();
        ev.start_challenge([LivenessAction::Blink], 0.0).unwrap();
        assert_eq!(ev.process_frame(&neutral(0.0, 0.0)), FrameVerdict::Waiting);
        assert_eq!(ev.process_frame(&blinking(0.5, 0.01)), FrameVerdict::Verified);
        // Terminal until a new challenge starts
        assert_eq!(ev.process_frame(&neutral(9.0, 0.0)), FrameVerdict::Verified);
    }

    #[test]
    fn test_head_turn_progress() {
        let mut ev = evaluator();
        ev.start_challenge([LivenessAction::HeadTurnLeft, LivenessAction::HeadTurnRight], 0.0).unwrap();
        ev.process_frame(&neutral(0.0, 0.0));
        let verdict = ev.process_frame(&neutral(0.5, -0.3));
        assert_eq!(
            verdict,
            FrameVerdict::ActionCompleted {
                actions: [LivenessAction::HeadTurnLeft].into_iter().collect()
            }
        );
        assert_eq!(ev.process_frame(&neutral(1.0, 0.3)), FrameVerdict::Verified);
    }

    #[test]
    fn test_timeout_resets_and_restarts_clock() {
        let mut ev = evaluator();
        ev.start_challenge([LivenessAction::Blink], 0.0).unwrap();
        ev.process_frame(&neutral(0.0, 0.0));
        let verdict = ev.process_frame(&neutral(6.0, 0.01));
        assert_eq!(
            verdict,
            FrameVerdict::TimedOut {
                elapsed_secs: 6.0,
                reset: true
            }
        );
        // New attempt runs from the timing-out frame
        ev.process_frame(&neutral(6.1, 0.0));
        assert_eq!(ev.process_frame(&blinking(7.0, 0.01)), FrameVerdict::Verified);
    }

    #[test]
    fn test_timeout_warn_only() {
        let mut settings = EvaluatorSettings::default();
        settings.challenge.timeout_policy = TimeoutPolicy::WarnOnly;
        let mut ev = LivenessEvaluator::new(settings).unwrap();
        ev.start_challenge([LivenessAction::Blink], 0.0).unwrap();
        ev.process_frame(&neutral(0.0, 0.0));
        assert_eq!(
            ev.process_frame(&neutral(6.0, 0.01)),
            FrameVerdict::TimedOut {
                elapsed_secs: 6.0,
                reset: false
            }
        );
        assert_eq!(ev.state().unwrap().started_at, 0.0);
    }

    #[test]
    fn test_single_mode_draws_registered_action() {
        let mut settings = EvaluatorSettings::default();
        settings.challenge.mode = ChallengeMode::Single;
        let mut ev = LivenessEvaluator::new(settings).unwrap().with_seed(7);
        for i in 0..20 {
            let state = ev.start_configured_challenge(i as f64).unwrap();
            assert_eq!(state.required.len(), 1);
            let action = *state.required.iter().next().unwrap();
            assert!(LivenessAction::ALL.contains(&action));
        }
    }

    #[test]
    fn test_multi_mode_uses_configured_actions() {
        let mut ev = evaluator().with_seed(1);
        let state = ev.start_configured_challenge(0.0).unwrap();
        let expected: ActionSet = [LivenessAction::Blink, LivenessAction::Smile]
            .into_iter()
            .collect();
        assert_eq!(state.required, expected);
    }

    #[test]
    fn test_custom_predicate_is_used() {
        let mut ev = evaluator();
        ev.registry_mut()
            .register(LivenessAction::Smile, |s| s.blend_shapes.mouth_smile.is_some_and(|v| v > 0.05));
        ev.start_challenge([LivenessAction::Smile], 0.0).unwrap();
        // Neutral smile of 0.1 clears the lowered threshold
        assert_eq!(ev.process_frame(&neutral(0.0, 0.0)), FrameVerdict::Verified);
    }

    #[test]
    fn test_cancel_clears_state() {
        let mut ev = evaluator();
        ev.start_challenge([LivenessAction::Blink], 0.0).unwrap();
        ev.cancel();
        assert!(ev.state().is_none());
        assert_eq!(ev.process_frame(&neutral(0.1, 0.0)), FrameVerdict::NoChallenge);
    }

    #[test]
    fn test_empty_challenge_rejected() {
        let mut ev = evaluator();
        let err = ev.start_challenge(Vec::<LivenessAction>::new(), 0.0).unwrap_err();
        assert_eq!(err, ConfigError::NoRequiredActions);
        assert!(ev.state().is_none());
        assert_eq!(ev.process_frame(&neutral(0.0, 0.0)), FrameVerdict::NoChallenge);

        // A running challenge survives a rejected restart
        ev.start_challenge([LivenessAction::Blink], 0.0).unwrap();
        assert!(ev.start_challenge(Vec::new(), 1.0).is_err());
        assert_eq!(
            ev.state().unwrap().required,
            ActionSet::from([LivenessAction::Blink])
        );
        assert_eq!(ev.process_frame(&neutral(1.0, 0.0)), FrameVerdict::Waiting);
    }

    #[test]
    fn test_single_mode_without_predicates_is_rejected() {
        let mut settings = EvaluatorSettings::default();
        settings.challenge.mode = ChallengeMode::Single;
        let mut ev = LivenessEvaluator::new(settings).unwrap();
        *ev.registry_mut() = ActionRegistry::empty();
        assert_eq!(
            ev.start_configured_challenge(0.0).unwrap_err(),
            ConfigError::NoRequiredActions
        );
    }

    #[test]
    fn test_single_mode_reset_redraws_action() {
        let mut settings = EvaluatorSettings::default();
        settings.challenge.mode = ChallengeMode::Single;
        let mut ev = LivenessEvaluator::new(settings).unwrap().with_seed(3);
        ev.start_configured_challenge(0.0).unwrap();

        let mut drawn = ActionSet::new();
        let mut t = 0.0;
        for i in 0..24 {
            drawn.extend(ev.state().unwrap().required.iter().copied());
            // Alternate between two neutral positions so motion stays natural
            let x = if i % 2 == 0 { 0.0 } else { 0.01 };
            ev.process_frame(&neutral(t, x));
            t += 6.0;
            let verdict = ev.process_frame(&neutral(t, x + 0.005));
            assert!(matches!(verdict, FrameVerdict::TimedOut { reset: true, .. }));
            let state = ev.state().unwrap();
            assert_eq!(state.required.len(), 1);
            assert_eq!(state.started_at, t);
        }
        // Four actions over 24 independent draws: more than one must show up
        assert!(drawn.len() > 1, "drew only {drawn:?}");
    }

    #[test]
    fn test_multi_mode_reset_keeps_actions() {
        let mut ev = evaluator();
        ev.start_configured_challenge(0.0).unwrap();
        ev.process_frame(&neutral(0.0, 0.0));
        ev.process_frame(&neutral(6.0, 0.01));
        assert_eq!(
            ev.state().unwrap().required,
            ActionSet::from([LivenessAction::Blink, LivenessAction::Smile])
        );
    }

    #[test]
    fn test_direct_checks_use_configured_thresholds() {
        let mut settings = EvaluatorSettings::default();
        settings.occlusion.cheek_puff_above = 0.8;
        settings.detection.smile_above = 0.3;
        let ev = LivenessEvaluator::new(settings).unwrap();

        let mut puffed = neutral(0.0, 0.0);
        puffed.blend_shapes.cheek_puff = Some(0.6);
        assert!(!ev.is_occluded(&puffed));
        puffed.blend_shapes.cheek_puff = Some(0.9);
        assert!(ev.is_occluded(&puffed));
        assert!(!ev.is_occluded(&neutral(0.0, 0.0)));

        let mut s = blinking(0.0, -0.3);
        s.blend_shapes.mouth_smile = Some(0.4);
        assert_eq!(
            ev.detect_actions(&s),
            ActionSet::from([
                LivenessAction::Blink,
                LivenessAction::HeadTurnLeft,
                LivenessAction::Smile
            ])
        );
        assert_eq!(ev.detect_actions(&s), ev.detect_actions(&s));
    }

    #[test]
    fn test_conclusive_verdicts() {
        assert!(!FrameVerdict::NoChallenge.is_conclusive());
        assert!(!FrameVerdict::OcclusionSuspected {
            cause: OcclusionCause::EyesStatic
        }
        .is_conclusive());
        assert!(!FrameVerdict::MotionSuspected {
            mean_displacement: 0.0
        }
        .is_conclusive());
        assert!(FrameVerdict::Waiting.is_conclusive());
        assert!(FrameVerdict::Verified.is_conclusive());
        assert!(FrameVerdict::TimedOut {
            elapsed_secs: 6.0,
            reset: true
        }
        .is_conclusive());
    }

    #[test]
    fn test_verdict_serializes_with_tag() {
        let json = serde_json::to_value(FrameVerdict::OcclusionSuspected {
            cause: OcclusionCause::CheekDeformed,
        })
        .unwrap();
        assert_eq!(json["verdict"], "occlusion_suspected");
        assert_eq!(json["cause"], "cheek_deformed");
    }
}
