//! Hand landmarks and hand identity tracking.

pub mod detection;
pub mod landmark;
pub mod slot;
pub mod tracking;

pub use detection::{Detection, HandDetector, NoHands};
pub use landmark::{HandPose, Handedness, Provenance, TrackedHand};
pub use tracking::{TrackerConfig, TrackerState};
