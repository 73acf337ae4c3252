//! The boundary to the hand landmark network.
//!
//! Running the network is not this crate's business. A [`HandDetector`] receives the frame view
//! and returns whatever the network found, in the network's normalized coordinates; conversion to
//! pixel space happens in the tracker.

use crate::frame::Frame;

use super::landmark::{Handedness, Position, NUM_LANDMARKS};

/// One hand reported by a [`HandDetector`].
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    handedness: Handedness,
    score: f32,
    landmarks: [Position; NUM_LANDMARKS],
}

impl Detection {
    /// Creates a detection from normalized landmarks (`x` and `y` in range 0.0 to 1.0 relative to
    /// the frame, `z` relative to the frame width).
    pub fn new(handedness: Handedness, score: f32, landmarks: [Position; NUM_LANDMARKS]) -> Self {
        Self {
            handedness,
            score,
            landmarks,
        }
    }

    /// Returns the handedness the network assigned to this hand.
    ///
    /// This is only a classification, and networks regularly report both hands in a frame as the
    /// same one.
    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    /// Returns the confidence of the handedness classification.
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Returns the normalized landmark positions.
    pub fn landmarks(&self) -> &[Position; NUM_LANDMARKS] {
        &self.landmarks
    }
}

/// Trait for hand landmark estimators driven by the frame loop.
///
/// `timestamp_ms` increases monotonically between calls, as streaming-mode networks require.
///
/// Errors are fatal: the frame loop terminates when `detect` fails.
pub trait HandDetector {
    fn detect(&mut self, frame: &Frame<'_>, timestamp_ms: u64) -> anyhow::Result<Vec<Detection>>;
}

impl<F> HandDetector for F
where
    F: FnMut(&Frame<'_>, u64) -> anyhow::Result<Vec<Detection>>,
{
    fn detect(&mut self, frame: &Frame<'_>, timestamp_ms: u64) -> anyhow::Result<Vec<Detection>> {
        self(frame, timestamp_ms)
    }
}

/// A [`HandDetector`] that never finds any hands.
///
/// Useful for exercising the exchange with a producer without a network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHands;

impl HandDetector for NoHands {
    fn detect(&mut self, _frame: &Frame<'_>, _timestamp_ms: u64) -> anyhow::Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}
