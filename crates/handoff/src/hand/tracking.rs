//! Hand identity tracking.
//!
//! The network reports hands with a handedness label, but the label is not reliable: hands are
//! missed for a frame or two, and both hands are sometimes reported as the same one. The
//! [`TrackerState`] turns each frame's detections into exactly one pose per slot (left and right),
//! resolving duplicate labels by proximity to where each slot's hand is expected to be, and
//! bridging short detection gaps with extrapolated poses.

use crate::frame::Resolution;
use crate::result::FrameResult;

use super::{
    detection::Detection,
    landmark::{Axes, HandPose, Handedness, Provenance, TrackedHand},
    slot::Slot,
};

/// Tracking policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Whether undetected slots fall back to their projected pose.
    pub projection: bool,
    /// Number of consecutive missed frames for which a projected pose is output.
    pub tolerance: u32,
    /// Mapping from the network's normalized coordinates into output coordinates.
    pub axes: Axes,
    /// Swaps the reported handedness of every detection (for mirrored camera images).
    pub flip_handedness: bool,
}

impl TrackerConfig {
    pub const DEFAULT_TOLERANCE: u32 = 2;
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            projection: true,
            tolerance: Self::DEFAULT_TOLERANCE,
            axes: Axes::DepthUp,
            flip_handedness: false,
        }
    }
}

/// Detections assigned to slots for one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Assignment {
    left: Option<HandPose>,
    right: Option<HandPose>,
}

impl Assignment {
    fn get_mut(&mut self, hand: Handedness) -> &mut Option<HandPose> {
        match hand {
            Handedness::Left => &mut self.left,
            Handedness::Right => &mut self.right,
        }
    }
}

/// Left and right hand slots, updated once per frame by [`TrackerState::track`].
pub struct TrackerState {
    config: TrackerConfig,
    resolution: Resolution,
    left: Slot,
    right: Slot,
}

impl TrackerState {
    /// Creates a tracker for frames of the given resolution. Both slots start out empty.
    pub fn new(config: TrackerConfig, resolution: Resolution) -> Self {
        Self {
            config,
            resolution,
            left: Slot::new(),
            right: Slot::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn slot(&self, hand: Handedness) -> &Slot {
        match hand {
            Handedness::Left => &self.left,
            Handedness::Right => &self.right,
        }
    }

    fn slot_mut(&mut self, hand: Handedness) -> &mut Slot {
        match hand {
            Handedness::Left => &mut self.left,
            Handedness::Right => &mut self.right,
        }
    }

    /// Assigns this frame's detections to the slots and returns the pose of each slot.
    pub fn track(&mut self, detections: &[Detection]) -> FrameResult {
        let hands = detections
            .iter()
            .map(|det| {
                let label = if self.config.flip_handedness {
                    det.handedness().other()
                } else {
                    det.handedness()
                };
                let pose = HandPose::new(*det.landmarks())
                    .map_positions(|pos| self.config.axes.to_pixels(pos, self.resolution));
                (label, pose)
            })
            .collect::<Vec<_>>();

        let assignment = self.assign(&hands);

        FrameResult {
            left: self.settle(Handedness::Left, assignment.left),
            right: self.settle(Handedness::Right, assignment.right),
        }
    }

    fn assign(&self, hands: &[(Handedness, HandPose)]) -> Assignment {
        let mut assignment = Assignment::default();
        match *hands {
            [] => {}
            [(label, pose)] => *assignment.get_mut(label) = Some(pose),
            [(a_label, a), (b_label, b)] if a_label != b_label => {
                *assignment.get_mut(a_label) = Some(a);
                *assignment.get_mut(b_label) = Some(b);
            }
            [(label, a), (_, b)] => {
                let (a_slot, b_slot) = self.disambiguate(&a);
                log::trace!("both hands reported as {label:?}, assigned {a_slot:?}/{b_slot:?}");
                *assignment.get_mut(a_slot) = Some(a);
                *assignment.get_mut(b_slot) = Some(b);
            }
            _ => {
                log::warn!(
                    "{} hands detected, keeping the first left and right hand",
                    hands.len()
                );
                for &(label, pose) in hands {
                    assignment.get_mut(label).get_or_insert(pose);
                }
            }
        }
        assignment
    }

    /// Picks distinct slots for two detections that were given the same label.
    ///
    /// The detections are placed in order. The first one goes to the left slot if its projected
    /// wrist is strictly nearer than the right one's, and to the right slot otherwise; the second
    /// one takes the slot that is still free. A slot without a projection counts as infinitely far
    /// away.
    fn disambiguate(&self, first: &HandPose) -> (Handedness, Handedness) {
        let dist = |slot: Handedness| {
            self.slot(slot)
                .projected()
                .map_or(f32::INFINITY, |proj| proj.wrist_distance(first.wrist()))
        };
        let slot = if dist(Handedness::Left) < dist(Handedness::Right) {
            Handedness::Left
        } else {
            Handedness::Right
        };
        (slot, slot.other())
    }

    /// Decides what a slot outputs this frame and records it in the slot's history.
    fn settle(&mut self, hand: Handedness, detected: Option<HandPose>) -> Option<TrackedHand> {
        let TrackerConfig {
            projection,
            tolerance,
            ..
        } = self.config;
        let slot = self.slot_mut(hand);
        slot.mark(detected.is_some());

        let output = match detected {
            Some(pose) => Some(TrackedHand {
                pose,
                provenance: Provenance::Detected,
            }),
            None if projection && slot.absence() <= tolerance => {
                slot.projected().map(|&pose| TrackedHand {
                    pose,
                    provenance: Provenance::Projected,
                })
            }
            None => None,
        };

        slot.push(output.map(|hand| hand.pose));
        output
    }
}
