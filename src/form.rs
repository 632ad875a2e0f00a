//! Per-form runtime: status state machine over change tracking and session.
//!
//! ARCHITECTURE
//! ============
//! A `FormRuntime` is the single owner of one mounted form's in-memory state:
//!
//! ```text
//!   observe ──► ChangeTracker ──debounce──► save timer ──► persist
//!      │                                                   │
//!      └──► SessionTracker (inactivity, immediate)         ▼
//!                                          Saving ─► Saved | Error
//!                                                    │ show_status
//!                                                    ▼
//!                                  SessionActive (session open) | Idle
//! ```
//!
//! Every method runs under the service lock. Timer expiries arrive through
//! [`FormRuntime::fire`] with the slot generation they were armed with.
//! Storage failures are returned to the caller, which reports them after
//! the lock is released.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::ResolvedForm;
use crate::debounce::ChangeTracker;
use crate::draft::{FormData, FormId, filter_tracked};
use crate::error::StorageError;
use crate::session::SessionTracker;
use crate::status::{SaveStatus, StatusView};
use crate::storage::DraftStorage;
use crate::timer::{Arm, TimerKind, TimerSlot};

/// Result of a write attempt.
#[derive(Debug)]
pub(crate) enum Persisted {
    /// Nothing written (form disabled).
    Skipped,
    Saved,
    Failed(StorageError),
}

#[derive(Debug)]
pub(crate) struct FormRuntime {
    mount_id: u64,
    id: FormId,
    settings: ResolvedForm,
    enabled: bool,
    status: SaveStatus,
    changes: ChangeTracker,
    session: SessionTracker,
    status_reset: TimerSlot,
    tx: watch::Sender<StatusView>,
}

impl FormRuntime {
    pub(crate) fn new(mount_id: u64, id: FormId, settings: ResolvedForm, last_saved: Option<FormData>) -> Self {
        let enabled = settings.enabled;
        let view = StatusView { status: SaveStatus::Idle, in_session: false, enabled };
        Self {
            mount_id,
            id,
            settings,
            enabled,
            status: SaveStatus::Idle,
            changes: ChangeTracker::new(last_saved),
            session: SessionTracker::default(),
            status_reset: TimerSlot::default(),
            tx: watch::channel(view).0,
        }
    }

    pub(crate) fn mount_id(&self) -> u64 {
        self.mount_id
    }

    pub(crate) fn id(&self) -> &FormId {
        &self.id
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn view(&self) -> StatusView {
        StatusView { status: self.status, in_session: self.session.is_active(), enabled: self.enabled }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<StatusView> {
        self.tx.subscribe()
    }

    pub(crate) fn has_pending_timers(&self) -> bool {
        self.changes.has_pending_timers() || self.session.has_pending_timers() || self.status_reset.is_armed()
    }

    fn publish(&self) {
        let view = self.view();
        self.tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }

    fn set_status(&mut self, status: SaveStatus) {
        if self.status != status {
            debug!(form = %self.id.form_type, from = %self.status, to = %status, "status changed");
            self.status = status;
        }
        self.publish();
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Automatic change path. Returns true when the change was accepted.
    pub(crate) fn observe(&mut self, data: &FormData, arm: &dyn Arm) -> bool {
        if !self.enabled {
            return false;
        }
        let snapshot = filter_tracked(data, self.settings.tracked_fields.as_ref());
        if !self.changes.observe(snapshot, &self.settings.timeouts, arm) {
            return false;
        }
        let behavior = self.settings.session_behavior;
        let opened = self.session.record_activity(behavior, &self.settings.timeouts, arm);
        if opened && !behavior.immediate_start && self.status == SaveStatus::Idle {
            self.set_status(SaveStatus::SessionActive);
        } else {
            self.publish();
        }
        true
    }

    /// The stored draft, narrowed to the fields this form tracks now.
    pub(crate) fn load(&self, storage: &DraftStorage) -> Option<FormData> {
        if !self.enabled {
            return None;
        }
        let data = storage.load(&self.id)?;
        Some(filter_tracked(&data, self.settings.tracked_fields.as_ref()))
    }

    /// Write `data` now, superseding any pending automatic save.
    pub(crate) fn save_now(&mut self, data: &FormData, storage: &DraftStorage, arm: &dyn Arm) -> Persisted {
        if !self.enabled {
            debug!(form = %self.id.form_type, "manual save refused; auto-save disabled");
            return Persisted::Skipped;
        }
        self.changes.discard();
        let snapshot = filter_tracked(data, self.settings.tracked_fields.as_ref());
        self.persist(snapshot, storage, arm)
    }

    fn persist(&mut self, snapshot: FormData, storage: &DraftStorage, arm: &dyn Arm) -> Persisted {
        self.set_status(SaveStatus::Saving);
        let outcome = match storage.save(&self.id, &snapshot) {
            Ok(_) => {
                self.changes.mark_saved(snapshot);
                self.set_status(SaveStatus::Saved);
                Persisted::Saved
            }
            Err(e) => {
                self.set_status(SaveStatus::Error);
                Persisted::Failed(e)
            }
        };
        arm.arm(&mut self.status_reset, TimerKind::StatusReset, self.settings.timeouts.show_status);
        outcome
    }

    /// Erase the draft and return to a fresh, idle state.
    pub(crate) fn clear(&mut self, storage: &DraftStorage) {
        storage.clear(&self.id);
        self.changes.reset();
        self.end_session();
    }

    /// Forget the stored baseline after the draft was removed externally.
    pub(crate) fn forget_saved(&mut self) {
        self.changes.reset();
    }

    /// Cancel every timer and force `idle`.
    pub(crate) fn end_session(&mut self) {
        self.changes.discard();
        self.status_reset.cancel();
        self.session.end();
        self.set_status(SaveStatus::Idle);
    }

    /// Runtime toggle. Disabling clears the draft and ends the session.
    pub(crate) fn set_enabled(&mut self, enabled: bool, storage: &DraftStorage) {
        if enabled == self.enabled {
            return;
        }
        if !enabled {
            self.clear(storage);
        }
        self.enabled = enabled;
        info!(form = %self.id.form_type, enabled, "auto-save toggled");
        self.publish();
    }

    // =========================================================================
    // TIMERS
    // =========================================================================

    /// Handle a timer expiry. Returns the storage error of a failed save.
    pub(crate) fn fire(
        &mut self,
        kind: TimerKind,
        generation: u64,
        storage: &DraftStorage,
        arm: &dyn Arm,
    ) -> Option<StorageError> {
        match kind {
            TimerKind::Debounce => {
                self.changes.on_debounce(generation, &self.settings.timeouts, arm);
            }
            TimerKind::Save => {
                let snapshot = self.changes.take_due(generation)?;
                if let Persisted::Failed(e) = self.persist(snapshot, storage, arm) {
                    return Some(e);
                }
            }
            TimerKind::StatusReset => {
                if self.status_reset.claim(generation) {
                    let next = match self.status {
                        SaveStatus::Saved if self.session.is_active() => SaveStatus::SessionActive,
                        SaveStatus::Saved | SaveStatus::Error => SaveStatus::Idle,
                        other => other,
                    };
                    self.set_status(next);
                }
            }
            TimerKind::Inactivity => {
                if self.session.claim(kind, generation) {
                    self.session.end();
                    info!(form = %self.id.form_type, "editing session timed out");
                    if self.status == SaveStatus::SessionActive {
                        self.set_status(SaveStatus::Idle);
                    } else {
                        self.publish();
                    }
                }
            }
            TimerKind::ImmediateResponse => {
                if self.session.claim(kind, generation)
                    && self.session.is_active()
                    && self.status == SaveStatus::Idle
                {
                    self.set_status(SaveStatus::SessionActive);
                }
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "form_test.rs"]
mod tests;
