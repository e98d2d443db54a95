//! Replay a recorded face-tracking session through the evaluator.
//!
//! Input is JSON lines, one [`FacialMetricsSample`] per line, in capture order.
//! The challenge starts at the first sample's timestamp and replay stops once
//! it is verified.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use livecheck_core::{ActionSet, FacialMetricsSample, FrameVerdict, LivenessEvaluator};

/// Counts collected over one replay.
#[derive(Debug, Default, PartialEq)]
pub struct ReplaySummary {
    pub frames: usize,
    /// Frames that passed the occlusion and motion checks.
    pub accepted: usize,
    pub occluded: usize,
    pub motion_suspected: usize,
    pub timeouts: usize,
    /// Timestamp of the verifying frame.
    pub verified_at: Option<f64>,
    pub required: ActionSet,
    pub completed: ActionSet,
}

/// Drive `evaluator` with every sample read from `input`.
///
/// With `json` set, each verdict is written to `out` as one JSON object per
/// line, tagged with the frame timestamp.
pub fn replay<R, W>(
    evaluator: &mut LivenessEvaluator,
    input: R,
    out: &mut W,
    json: bool,
) -> Result<ReplaySummary>
where
    R: BufRead,
    W: Write,
{
    let mut summary = ReplaySummary::default();

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: FacialMetricsSample = serde_json::from_str(&line)
            .with_context(|| format!("invalid sample on line {line_no}"))?;

        if evaluator.state().is_none() {
            evaluator
                .start_configured_challenge(sample.timestamp)
                .context("failed to start challenge")?;
        }

        let verdict = evaluator.process_frame(&sample);
        summary.frames += 1;
        if verdict.is_conclusive() {
            summary.accepted += 1;
        }

        if json {
            let mut record = serde_json::to_value(&verdict)?;
            record["timestamp"] = serde_json::json!(sample.timestamp);
            writeln!(out, "{record}")?;
        }

        match verdict {
            FrameVerdict::OcclusionSuspected { .. } => summary.occluded += 1,
            FrameVerdict::MotionSuspected { .. } => summary.motion_suspected += 1,
            FrameVerdict::TimedOut { .. } => summary.timeouts += 1,
            FrameVerdict::Verified => {
                summary.verified_at = Some(sample.timestamp);
                break;
            }
            _ => {}
        }
    }

    if let Some(state) = evaluator.state() {
        summary.required = state.required.clone();
        summary.completed = state.completed.clone();
    }

    Ok(summary)
}
