//! Change detection and the debounce → save timer chain.
//!
//! DESIGN
//! ======
//! Each observed snapshot (already filtered to tracked fields) is compared to
//! the last successfully saved one. A real change becomes the pending
//! snapshot and restarts the debounce timer, cancelling any save timer; when
//! the debounce settles the save timer starts; when that fires the pending
//! snapshot is handed out for writing. Last write wins: only the newest
//! pending snapshot is ever written.
//!
//! `BTreeMap` equality is the comparison, so field order never matters.

use tracing::debug;

use crate::config::Timeouts;
use crate::draft::{FormData, is_blank};
use crate::timer::{Arm, TimerKind, TimerSlot};

#[derive(Debug, Default)]
pub(crate) struct ChangeTracker {
    last_saved: Option<FormData>,
    pending: Option<FormData>,
    debounce: TimerSlot,
    save: TimerSlot,
}

impl ChangeTracker {
    /// Start from the snapshot already in storage, if any.
    pub(crate) fn new(last_saved: Option<FormData>) -> Self {
        Self { last_saved, ..Self::default() }
    }

    pub(crate) fn has_pending_timers(&self) -> bool {
        self.debounce.is_armed() || self.save.is_armed()
    }

    /// Record a snapshot. Returns true when it differs from what is stored.
    pub(crate) fn observe(&mut self, snapshot: FormData, timeouts: &Timeouts, arm: &dyn Arm) -> bool {
        let unchanged = match &self.last_saved {
            Some(saved) => *saved == snapshot,
            // EDGE: an untouched form is not a draft.
            None => is_blank(&snapshot),
        };
        if unchanged {
            if self.pending.is_some() {
                debug!("change reverted to stored draft; pending save dropped");
                self.discard();
            }
            return false;
        }
        if self.pending.as_ref() == Some(&snapshot) {
            return false;
        }
        self.pending = Some(snapshot);
        self.save.cancel();
        arm.arm(&mut self.debounce, TimerKind::Debounce, timeouts.debounce);
        true
    }

    /// Debounce settled: start the save timer. False for a stale firing.
    pub(crate) fn on_debounce(&mut self, generation: u64, timeouts: &Timeouts, arm: &dyn Arm) -> bool {
        if !self.debounce.claim(generation) || self.pending.is_none() {
            return false;
        }
        arm.arm(&mut self.save, TimerKind::Save, timeouts.save);
        true
    }

    /// Save timer fired: hand out the pending snapshot for writing.
    pub(crate) fn take_due(&mut self, generation: u64) -> Option<FormData> {
        if !self.save.claim(generation) {
            return None;
        }
        self.pending.take()
    }

    pub(crate) fn mark_saved(&mut self, snapshot: FormData) {
        self.last_saved = Some(snapshot);
    }

    /// Cancel timers and forget the pending snapshot.
    pub(crate) fn discard(&mut self) {
        self.debounce.cancel();
        self.save.cancel();
        self.pending = None;
    }

    /// [`discard`](Self::discard), and forget the stored snapshot too.
    pub(crate) fn reset(&mut self) {
        self.discard();
        self.last_saved = None;
    }
}

#[cfg(test)]
#[path = "debounce_test.rs"]
mod tests;
