//! The fixed-layout result record written to the result buffer.
//!
//! The record holds the Left hand block followed by the Right hand block. Each block is
//! [`NUM_LANDMARKS`] landmarks of three little-endian `f32` coordinates, in landmark order. A slot
//! without a pose is written as an all-zero block.

use handoff_ipc::IpcError;

use crate::hand::landmark::{HandPose, Handedness, Position, TrackedHand, NUM_LANDMARKS};

/// Size of one hand block in bytes.
pub const HAND_BLOCK_LEN: usize = NUM_LANDMARKS * 3 * 4;

/// Size of the whole result record in bytes.
pub const RESULT_LEN: usize = 2 * HAND_BLOCK_LEN;

/// Poses chosen for both hand slots in one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrameResult {
    pub left: Option<TrackedHand>,
    pub right: Option<TrackedHand>,
}

impl FrameResult {
    pub fn hand(&self, hand: Handedness) -> Option<&TrackedHand> {
        match hand {
            Handedness::Left => self.left.as_ref(),
            Handedness::Right => self.right.as_ref(),
        }
    }

    /// Serializes the result into the record layout.
    pub fn encode(&self) -> [u8; RESULT_LEN] {
        let mut out = [0; RESULT_LEN];
        let (left, right) = out.split_at_mut(HAND_BLOCK_LEN);
        encode_block(self.left.as_ref().map(|h| &h.pose), left);
        encode_block(self.right.as_ref().map(|h| &h.pose), right);
        out
    }
}

fn encode_block(pose: Option<&HandPose>, block: &mut [u8]) {
    let Some(pose) = pose else { return };
    let coords = pose.positions().iter().flatten();
    for (c, bytes) in coords.zip(block.chunks_exact_mut(4)) {
        bytes.copy_from_slice(&c.to_le_bytes());
    }
}

/// Hand poses as the host reads them back from the result buffer.
///
/// Provenance is not part of the record, so detected and projected poses look the same here.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct HandLandmarks {
    pub left: Option<HandPose>,
    pub right: Option<HandPose>,
}

impl HandLandmarks {
    /// Parses a result record.
    ///
    /// An all-zero hand block is decoded as "no hand". This includes a genuine pose whose
    /// coordinates are all `0.0` or `-0.0`, since the record cannot tell the two apart.
    pub fn decode(record: &[u8]) -> Result<Self, IpcError> {
        if record.len() != RESULT_LEN {
            return Err(IpcError::SizeMismatch {
                what: "result record",
                expected: RESULT_LEN,
                actual: record.len(),
            });
        }
        let (left, right) = record.split_at(HAND_BLOCK_LEN);
        Ok(Self {
            left: decode_block(left),
            right: decode_block(right),
        })
    }

    pub fn hand(&self, hand: Handedness) -> Option<&HandPose> {
        match hand {
            Handedness::Left => self.left.as_ref(),
            Handedness::Right => self.right.as_ref(),
        }
    }
}

fn decode_block(block: &[u8]) -> Option<HandPose> {
    let mut positions = [Position::default(); NUM_LANDMARKS];
    let coords = positions.iter_mut().flatten();
    for (c, bytes) in coords.zip(block.chunks_exact(4)) {
        *c = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    let pose = HandPose::new(positions);
    (!pose.is_zero()).then_some(pose)
}

impl From<FrameResult> for HandLandmarks {
    fn from(result: FrameResult) -> Self {
        Self {
            left: result.left.map(|h| h.pose),
            right: result.right.map(|h| h.pose),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::hand::landmark::Provenance;

    use super::*;

    fn detected(pose: HandPose) -> Option<TrackedHand> {
        Some(TrackedHand {
            pose,
            provenance: Provenance::Detected,
        })
    }

    #[test]
    fn layout() {
        assert_eq!(HAND_BLOCK_LEN, 252);
        assert_eq!(RESULT_LEN, 504);
    }

    #[test]
    fn empty_result_is_all_zero() {
        let record = FrameResult::default().encode();
        assert!(record.iter().all(|&b| b == 0));
        assert_eq!(HandLandmarks::decode(&record).unwrap(), HandLandmarks::default());
    }

    #[test]
    fn right_hand_lands_in_second_block() {
        let result = FrameResult {
            left: None,
            right: detected(HandPose::splat([1.0, 2.0, 3.0])),
        };
        let record = result.encode();
        assert!(record[..HAND_BLOCK_LEN].iter().all(|&b| b == 0));
        assert_eq!(&record[HAND_BLOCK_LEN..HAND_BLOCK_LEN + 4], &1.0f32.to_le_bytes());
        assert_eq!(&record[HAND_BLOCK_LEN + 8..HAND_BLOCK_LEN + 12], &3.0f32.to_le_bytes());
        assert_eq!(&record[RESULT_LEN - 4..], &3.0f32.to_le_bytes());
    }

    #[test]
    fn decodes_bit_identical_values() {
        let mut rng = fastrand::Rng::with_seed(504);
        let mut positions = [[0.0; 3]; NUM_LANDMARKS];
        for c in positions.iter_mut().flatten() {
            *c = (rng.f32() - 0.5) * 4000.0;
        }
        // Includes values with no short decimal representation.
        positions[3] = [f32::MIN_POSITIVE, -0.0, 1.0 / 3.0];

        let result = FrameResult {
            left: detected(HandPose::new(positions)),
            right: Some(TrackedHand {
                pose: HandPose::splat([-7.25, 0.0, 1e-7]),
                provenance: Provenance::Projected,
            }),
        };
        let decoded = HandLandmarks::decode(&result.encode()).unwrap();
        let left = decoded.left.unwrap();
        for (a, b) in left.positions().iter().flatten().zip(positions.iter().flatten()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(decoded, HandLandmarks::from(result));
    }

    #[test]
    fn pose_at_origin_reads_as_absent() {
        let result = FrameResult {
            left: detected(HandPose::splat([0.0, -0.0, 0.0])),
            right: detected(HandPose::splat([0.0, 0.0, 1.0])),
        };
        let decoded = HandLandmarks::decode(&result.encode()).unwrap();
        assert_eq!(decoded.left, None);
        assert_eq!(decoded.right, Some(HandPose::splat([0.0, 0.0, 1.0])));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(HandLandmarks::decode(&[0; RESULT_LEN - 1]).is_err());
        assert!(HandLandmarks::decode(&[0; RESULT_LEN + 4]).is_err());
    }
}
