//! Per-hand history and motion extrapolation.

use std::collections::VecDeque;

use super::landmark::HandPose;

/// Number of poses kept per slot. Two are enough for a constant-velocity estimate.
pub const HISTORY_LEN: usize = 2;

/// State of one logical hand (left or right) across frames.
///
/// History entries are [`None`] for frames in which the slot output nothing. Such an "empty"
/// entry is distinct from a genuine pose at the origin, and never takes part in extrapolation.
#[derive(Debug, Clone, Default)]
pub struct Slot {
    history: VecDeque<Option<HandPose>>,
    absence: u32,
    projected: Option<HandPose>,
}

impl Slot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of consecutive frames without a detection.
    pub fn absence(&self) -> u32 {
        self.absence
    }

    /// The pose expected in the next frame, if the slot has any history to go on.
    pub fn projected(&self) -> Option<&HandPose> {
        self.projected.as_ref()
    }

    pub fn history(&self) -> impl Iterator<Item = Option<&HandPose>> + '_ {
        self.history.iter().map(Option::as_ref)
    }

    /// Updates the absence counter: resets it on a detection, otherwise counts one more missed
    /// frame.
    pub fn mark(&mut self, detected: bool) {
        if detected {
            self.absence = 0;
        } else {
            self.absence = self.absence.saturating_add(1);
        }
    }

    /// Records the pose output for this frame and recomputes the projection.
    pub fn push(&mut self, pose: Option<HandPose>) {
        self.history.push_back(pose);
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
        self.projected = project(&self.history);
    }
}

fn project(history: &VecDeque<Option<HandPose>>) -> Option<HandPose> {
    let mut recent = history.iter().rev();
    let last = (*recent.next()?)?;
    match recent.next() {
        Some(Some(previous)) => Some(last.extrapolate_from(previous)),
        _ => Some(last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_entry_projects_itself() {
        let pose = HandPose::splat([3.0, -4.0, 5.5]);
        let mut slot = Slot::new();
        assert!(slot.projected().is_none());
        slot.push(Some(pose));
        assert_eq!(slot.projected(), Some(&pose));
    }

    #[test]
    fn two_entries_extrapolate() {
        let mut slot = Slot::new();
        slot.push(Some(HandPose::splat([0.0, 0.0, 0.0])));
        slot.push(Some(HandPose::splat([1.0, 1.0, 1.0])));
        assert_eq!(slot.projected(), Some(&HandPose::splat([2.0, 2.0, 2.0])));
    }

    #[test]
    fn history_is_bounded() {
        let mut slot = Slot::new();
        for i in 0..5 {
            slot.push(Some(HandPose::splat([i as f32; 3])));
            assert!(slot.history().count() <= HISTORY_LEN);
        }
        assert_eq!(slot.projected(), Some(&HandPose::splat([5.0; 3])));
    }

    #[test]
    fn empty_entries_do_not_extrapolate() {
        let pose = HandPose::splat([10.0, 10.0, 10.0]);
        let mut slot = Slot::new();
        slot.push(Some(pose));
        slot.push(None);
        assert!(slot.projected().is_none());

        // The first pose after a gap has no usable velocity yet.
        slot.push(Some(pose));
        assert_eq!(slot.projected(), Some(&pose));
    }

    #[test]
    fn absence_counter() {
        let mut slot = Slot::new();
        slot.mark(false);
        slot.mark(false);
        assert_eq!(slot.absence(), 2);
        slot.mark(true);
        assert_eq!(slot.absence(), 0);
    }
}
