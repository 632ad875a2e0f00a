//! Editing-session membership and its inactivity timeout.
//!
//! A session opens on the first detected change and stays open while
//! changes keep arriving within `session_timeout`. Only membership lives
//! here; the visible status is owned by the form runtime.

use tracing::debug;

use crate::config::{SessionBehavior, Timeouts};
use crate::timer::{Arm, TimerKind, TimerSlot};

#[derive(Debug, Default)]
pub(crate) struct SessionTracker {
    active: bool,
    inactivity: TimerSlot,
    immediate: TimerSlot,
}

impl SessionTracker {
    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn has_pending_timers(&self) -> bool {
        self.inactivity.is_armed() || self.immediate.is_armed()
    }

    /// Note a detected change. Returns true if it opened a new session.
    pub(crate) fn record_activity(&mut self, behavior: SessionBehavior, timeouts: &Timeouts, arm: &dyn Arm) -> bool {
        if !behavior.enabled {
            return false;
        }
        let opened = !self.active;
        if opened {
            self.active = true;
            if behavior.immediate_start {
                arm.arm(&mut self.immediate, TimerKind::ImmediateResponse, timeouts.immediate_response);
            }
            debug!("editing session started");
        }
        arm.arm(&mut self.inactivity, TimerKind::Inactivity, timeouts.session_timeout);
        opened
    }

    /// Accept a session timer firing; false for stale or foreign timers.
    pub(crate) fn claim(&mut self, kind: TimerKind, generation: u64) -> bool {
        match kind {
            TimerKind::Inactivity => self.inactivity.claim(generation),
            TimerKind::ImmediateResponse => self.immediate.claim(generation),
            TimerKind::Debounce | TimerKind::Save | TimerKind::StatusReset => false,
        }
    }

    /// Close the session and cancel its timers. Returns whether one was open.
    pub(crate) fn end(&mut self) -> bool {
        self.inactivity.cancel();
        self.immediate.cancel();
        let was_active = std::mem::replace(&mut self.active, false);
        if was_active {
            debug!("editing session ended");
        }
        was_active
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
