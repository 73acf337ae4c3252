//! Hand landmarks and poses.

use std::{fmt, str::FromStr};

use nalgebra::Point3;

use crate::frame::Resolution;

/// Number of landmarks making up a hand pose.
pub const NUM_LANDMARKS: usize = 21;

/// A landmark position.
pub type Position = [f32; 3];

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Returns the opposite hand.
    pub fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// A hand skeleton made of exactly [`NUM_LANDMARKS`] landmarks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandPose {
    positions: [Position; NUM_LANDMARKS],
}

impl HandPose {
    pub fn new(positions: [Position; NUM_LANDMARKS]) -> Self {
        Self { positions }
    }

    /// Creates a pose with every landmark at `pos`.
    pub fn splat(pos: Position) -> Self {
        Self::new([pos; NUM_LANDMARKS])
    }

    pub fn positions(&self) -> &[Position; NUM_LANDMARKS] {
        &self.positions
    }

    pub fn landmark(&self, idx: LandmarkIdx) -> Position {
        self.positions[idx as usize]
    }

    pub fn wrist(&self) -> Position {
        self.landmark(LandmarkIdx::Wrist)
    }

    /// Returns the distance between this pose's wrist and `pos`.
    pub fn wrist_distance(&self, pos: Position) -> f32 {
        nalgebra::distance(&Point3::from(self.wrist()), &Point3::from(pos))
    }

    /// Returns whether every coordinate is exactly `0.0`.
    pub fn is_zero(&self) -> bool {
        self.positions.iter().flatten().all(|&c| c == 0.0)
    }

    pub fn map_positions(mut self, mut f: impl FnMut(Position) -> Position) -> Self {
        for pos in &mut self.positions {
            *pos = f(*pos);
        }
        self
    }

    /// Extrapolates the next pose assuming every landmark keeps moving at the velocity it had
    /// between `previous` and `self`.
    ///
    /// This is one Euler step of a constant-velocity model: `self + (self - previous)`.
    pub fn extrapolate_from(&self, previous: &HandPose) -> HandPose {
        let mut next = *self;
        for (out, prev) in next.positions.iter_mut().zip(&previous.positions) {
            for (c, p) in out.iter_mut().zip(prev) {
                *c += *c - p;
            }
        }
        next
    }
}

/// Mapping of a network's normalized `(x, y, z)` landmarks into the coordinates handed to the
/// host.
///
/// `W` and `H` are the frame width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axes {
    /// `(x·W, -z·W, y·H)`: depth is mapped onto the vertical axis of the host's scene, and the
    /// image's vertical axis onto the scene's depth. This is a display convention of the host, not
    /// a physical property of the estimated depth.
    DepthUp,
    /// `(x·W, y·H, z·W)`: plain image coordinates, Y pointing down.
    ImagePlane,
}

impl Axes {
    pub fn to_pixels(self, [x, y, z]: Position, res: Resolution) -> Position {
        let w = res.width() as f32;
        let h = res.height() as f32;
        match self {
            Self::DepthUp => [x * w, -z * w, y * h],
            Self::ImagePlane => [x * w, y * h, z * w],
        }
    }
}

impl Default for Axes {
    fn default() -> Self {
        Self::DepthUp
    }
}

impl FromStr for Axes {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "depth-up" => Ok(Self::DepthUp),
            "image-plane" => Ok(Self::ImagePlane),
            _ => Err(format!(
                "unknown axis convention '{s}' (expected 'depth-up' or 'image-plane')"
            )),
        }
    }
}

impl fmt::Display for Axes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DepthUp => "depth-up",
            Self::ImagePlane => "image-plane",
        })
    }
}

/// Where a pose handed to the host came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Estimated by the network in the current frame.
    Detected,
    /// Extrapolated from recent history because the hand was not detected.
    Projected,
}

/// A pose assigned to a hand slot for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedHand {
    pub pose: HandPose,
    pub provenance: Provenance,
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn extrapolation_is_constant_velocity() {
        let prev = HandPose::splat([0.0, 0.0, 0.0]);
        let last = HandPose::splat([1.0, 1.0, 1.0]);
        assert_eq!(last.extrapolate_from(&prev), HandPose::splat([2.0, 2.0, 2.0]));

        let prev = HandPose::splat([5.0, -1.0, 2.0]);
        let last = HandPose::splat([4.0, 1.0, 2.0]);
        assert_eq!(last.extrapolate_from(&prev), HandPose::splat([3.0, 3.0, 2.0]));
    }

    #[test]
    fn wrist_distance() {
        let mut positions = [[9.0; 3]; NUM_LANDMARKS];
        positions[LandmarkIdx::Wrist as usize] = [1.0, 2.0, 2.0];
        let pose = HandPose::new(positions);
        assert_eq!(pose.wrist(), [1.0, 2.0, 2.0]);
        assert_relative_eq!(pose.wrist_distance([0.0, 0.0, 0.0]), 3.0);
    }

    #[test]
    fn zero_pose() {
        assert!(HandPose::splat([0.0; 3]).is_zero());
        let mut positions = [[0.0; 3]; NUM_LANDMARKS];
        positions[20][2] = 0.5;
        assert!(!HandPose::new(positions).is_zero());
    }

    #[test]
    fn axis_conventions() {
        let res = Resolution::new(100, 50);
        assert_eq!(Axes::DepthUp.to_pixels([0.5, 0.2, 0.1], res), [50.0, -10.0, 10.0]);
        assert_eq!(Axes::ImagePlane.to_pixels([0.5, 0.2, 0.1], res), [50.0, 10.0, 10.0]);
        assert_eq!(Axes::default(), Axes::DepthUp);
        assert_eq!("image-plane".parse::<Axes>(), Ok(Axes::ImagePlane));
        assert!("sideways".parse::<Axes>().is_err());
    }

    #[test]
    fn handedness_other() {
        assert_eq!(Handedness::Left.other(), Handedness::Right);
        assert_eq!(Handedness::Right.other(), Handedness::Left);
    }
}
