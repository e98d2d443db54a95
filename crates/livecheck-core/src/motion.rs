//! Passive liveness check via head-motion variance.
//!
//! A photograph held in front of the camera yields a head pose that barely
//! changes from frame to frame. A live person, even when trying to hold still,
//! produces continuous small translations of the head. This module keeps a
//! short history of frame-to-frame head displacement and flags the stream as
//! static when the moving average collapses to near zero.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Printed photographs and still images on a screen held steady.
//! - **Does not block:** Video replay (the head moves in the video), photos
//!   waved by hand, or 3D masks worn by a live attacker.

use std::collections::VecDeque;

use crate::sample::HeadPosition;

/// Number of displacement samples averaged by default.
pub const DEFAULT_MOTION_WINDOW: usize = 10;

/// Default mean displacement below which the head is considered static.
/// Tracking noise on a live face stays well above this between frames; a
/// photo on a tripod sits at or below it.
pub const DEFAULT_MIN_MEAN_DISPLACEMENT: f32 = 0.0001;

/// Fixed-capacity FIFO of recent displacement magnitudes.
///
/// Pushing into a full history evicts the oldest sample. Both operations are
/// O(1); storage is allocated once.
#[derive(Debug, Clone)]
pub struct MotionHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl MotionHistory {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, displacement: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(displacement);
    }

    /// Arithmetic mean of the stored samples, 0.0 when empty.
    pub fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Oldest sample first.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }
}

impl Default for MotionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MOTION_WINDOW)
    }
}

/// Result of one motion-variance step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionCheck {
    /// Whether recent head motion looks like a live subject.
    pub is_natural: bool,
    /// Displacement from the previous frame, `None` on the first frame.
    pub displacement: Option<f32>,
    /// Mean displacement over the history after this step.
    pub mean_displacement: f32,
    /// Number of samples the mean was computed over.
    pub samples: usize,
}

/// Record `position` and judge whether recent head motion is natural.
///
/// The displacement from `previous` is pushed into `history`, then the mean of
/// the history is compared against `min_mean`. `previous` is always replaced
/// by `position`. With no previous position there is nothing to compare, so
/// the frame passes and the history is left untouched.
pub fn check_motion(
    position: HeadPosition,
    previous: &mut Option<HeadPosition>,
    history: &mut MotionHistory,
    min_mean: f32,
) -> MotionCheck {
    let Some(prev) = previous.replace(position) else {
        return MotionCheck {
            is_natural: true,
            displacement: None,
            mean_displacement: history.mean(),
            samples: history.len(),
        };
    };

    let displacement = prev.distance(&position);
    history.push(displacement);
    let mean = history.mean();

    MotionCheck {
        is_natural: mean >= min_mean,
        displacement: Some(displacement),
        mean_displacement: mean,
        samples: history.len(),
    }
}
