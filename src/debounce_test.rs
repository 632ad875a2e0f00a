use super::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::timer::{ManualScheduler, TimerSlot};

struct RecordingArm {
    sched: ManualScheduler,
    fired: Arc<Mutex<Vec<(TimerKind, u64)>>>,
}

impl RecordingArm {
    fn new() -> Self {
        Self { sched: ManualScheduler::new(0), fired: Arc::default() }
    }

    /// Drain the firings recorded so far.
    fn take(&self) -> Vec<(TimerKind, u64)> {
        std::mem::take(&mut *self.fired.lock().unwrap())
    }
}

impl Arm for RecordingArm {
    fn arm(&self, slot: &mut TimerSlot, kind: TimerKind, delay: Duration) {
        let fired = Arc::clone(&self.fired);
        slot.start(&self.sched, delay, move |generation| fired.lock().unwrap().push((kind, generation)));
    }
}

fn timeouts() -> Timeouts {
    Timeouts { debounce: Duration::from_millis(300), save: Duration::from_millis(500), ..Timeouts::default() }
}

fn data(pairs: &[(&str, &str)]) -> FormData {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
}

/// Deliver recorded firings to the tracker the way the form runtime does.
fn pump(tracker: &mut ChangeTracker, arm: &RecordingArm) -> Vec<FormData> {
    let mut written = Vec::new();
    for (kind, generation) in arm.take() {
        match kind {
            TimerKind::Debounce => {
                tracker.on_debounce(generation, &timeouts(), arm);
            }
            TimerKind::Save => {
                if let Some(snapshot) = tracker.take_due(generation) {
                    tracker.mark_saved(snapshot.clone());
                    written.push(snapshot);
                }
            }
            _ => {}
        }
    }
    written
}

// =============================================================================
// observe
// =============================================================================

#[test]
fn blank_form_without_draft_is_unchanged() {
    let arm = RecordingArm::new();
    let mut tracker = ChangeTracker::default();
    assert!(!tracker.observe(data(&[("name", "")]), &timeouts(), &arm));
    assert!(!tracker.has_pending_timers());
}

#[test]
fn snapshot_equal_to_stored_draft_is_unchanged() {
    let arm = RecordingArm::new();
    let mut tracker = ChangeTracker::new(Some(data(&[("name", "Ada")])));
    assert!(!tracker.observe(data(&[("name", "Ada")]), &timeouts(), &arm));
    assert_eq!(arm.sched.pending(), 0);
}

#[test]
fn real_change_arms_debounce() {
    let arm = RecordingArm::new();
    let mut tracker = ChangeTracker::default();
    assert!(tracker.observe(data(&[("name", "A")]), &timeouts(), &arm));
    assert!(tracker.has_pending_timers());
    assert_eq!(arm.sched.pending(), 1);
}

#[test]
fn repeated_identical_pending_snapshot_does_not_restart_debounce() {
    let arm = RecordingArm::new();
    let mut tracker = ChangeTracker::default();
    tracker.observe(data(&[("name", "A")]), &timeouts(), &arm);
    arm.sched.advance(Duration::from_millis(200));
    assert!(!tracker.observe(data(&[("name", "A")]), &timeouts(), &arm));

    arm.sched.advance(Duration::from_millis(100));
    assert_eq!(arm.take().len(), 1);
}

#[test]
fn reverting_to_stored_draft_drops_pending_save() {
    let arm = RecordingArm::new();
    let mut tracker = ChangeTracker::new(Some(data(&[("name", "Ada")])));
    tracker.observe(data(&[("name", "Adam")]), &timeouts(), &arm);
    assert!(!tracker.observe(data(&[("name", "Ada")]), &timeouts(), &arm));

    assert!(!tracker.has_pending_timers());
    arm.sched.advance(Duration::from_secs(2));
    assert!(pump(&mut tracker, &arm).is_empty());
}

// =============================================================================
// debounce → save chain
// =============================================================================

#[test]
fn burst_collapses_into_one_write_of_latest_snapshot() {
    let arm = RecordingArm::new();
    let mut tracker = ChangeTracker::default();

    for value in ["A", "Ad", "Ada"] {
        tracker.observe(data(&[("name", value)]), &timeouts(), &arm);
        arm.sched.advance(Duration::from_millis(100));
    }
    // Last change at t=200; debounce settles at t=500, save due at t=1000.
    arm.sched.advance(Duration::from_millis(199));
    assert!(arm.take().is_empty());
    arm.sched.advance(Duration::from_millis(1));
    assert!(pump(&mut tracker, &arm).is_empty());
    arm.sched.advance(Duration::from_millis(499));
    assert!(pump(&mut tracker, &arm).is_empty());
    arm.sched.advance(Duration::from_millis(1));
    assert_eq!(pump(&mut tracker, &arm), vec![data(&[("name", "Ada")])]);
    assert!(!tracker.has_pending_timers());
}

#[test]
fn change_during_save_delay_cancels_save_and_restarts_debounce() {
    let arm = RecordingArm::new();
    let mut tracker = ChangeTracker::default();
    tracker.observe(data(&[("name", "A")]), &timeouts(), &arm);
    arm.sched.advance(Duration::from_millis(300));
    pump(&mut tracker, &arm);

    // Save timer is now armed; a new change must supersede it.
    arm.sched.advance(Duration::from_millis(200));
    tracker.observe(data(&[("name", "Ab")]), &timeouts(), &arm);
    arm.sched.advance(Duration::from_millis(300));
    assert!(pump(&mut tracker, &arm).is_empty());
    arm.sched.advance(Duration::from_millis(500));
    assert_eq!(pump(&mut tracker, &arm), vec![data(&[("name", "Ab")])]);
}

#[test]
fn stale_generations_are_ignored() {
    let arm = RecordingArm::new();
    let mut tracker = ChangeTracker::default();
    tracker.observe(data(&[("name", "A")]), &timeouts(), &arm);
    assert!(!tracker.on_debounce(99, &timeouts(), &arm));
    assert_eq!(tracker.take_due(99), None);
}

#[test]
fn saved_snapshot_becomes_baseline() {
    let arm = RecordingArm::new();
    let mut tracker = ChangeTracker::default();
    tracker.observe(data(&[("name", "A")]), &timeouts(), &arm);
    arm.sched.advance(Duration::from_millis(300));
    pump(&mut tracker, &arm);
    arm.sched.advance(Duration::from_millis(500));
    assert_eq!(pump(&mut tracker, &arm).len(), 1);

    assert!(!tracker.observe(data(&[("name", "A")]), &timeouts(), &arm));
}

#[test]
fn reset_forgets_baseline() {
    let arm = RecordingArm::new();
    let mut tracker = ChangeTracker::new(Some(data(&[("name", "A")])));
    tracker.reset();
    assert!(tracker.observe(data(&[("name", "A")]), &timeouts(), &arm));
}
