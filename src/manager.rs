//! Auto-save service and per-form handles.
//!
//! DESIGN
//! ======
//! [`AutoSave`] is constructed once per page (or host) and cloned freely; all
//! clones share one draft store, one scheduler and one lock over the mounted
//! forms. [`AutoSave::form`] / [`AutoSave::mount`] return a [`FormAutoSave`]
//! handle that owns one mounted form; dropping it unmounts the form and
//! cancels its timers.
//!
//! Timer callbacks hold only a weak reference to the service plus the form's
//! key and mount id, so they can never keep a dropped service alive, and a
//! callback from a replaced mount is ignored.
//!
//! ERROR HANDLING
//! ==============
//! Storage failures become the `error` status. The optional error callback
//! runs after the lock is released, so it may call back into the service.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use submission::SubmitResponse;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::{AutoSaveConfig, FormOverrides};
use crate::draft::{FormData, FormId, filter_tracked};
use crate::error::{ConfigError, StorageError};
use crate::form::{FormRuntime, Persisted};
use crate::lock;
use crate::status::{SaveStatus, StatusView};
use crate::storage::DraftStorage;
use crate::store::{KeyValueStore, MemoryStore};
use crate::timer::{Arm, Scheduler, TimerKind, TimerSlot};

/// Receives storage failures: the form that failed and the error.
pub type ErrorCallback = Arc<dyn Fn(&FormId, &StorageError) + Send + Sync>;

// =============================================================================
// SERVICE
// =============================================================================

/// Shared auto-save service.
#[derive(Clone)]
pub struct AutoSave {
    inner: Arc<Inner>,
}

struct Inner {
    config: AutoSaveConfig,
    storage: DraftStorage,
    scheduler: Arc<dyn Scheduler>,
    forms: Mutex<HashMap<String, FormRuntime>>,
    next_mount: AtomicU64,
    on_error: Option<ErrorCallback>,
}

impl fmt::Debug for AutoSave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoSave")
            .field("storage", &self.inner.storage)
            .field("forms", &lock(&self.inner.forms).len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AutoSave`]. Store and clock default to an in-memory store
/// and the system clock.
pub struct AutoSaveBuilder {
    config: AutoSaveConfig,
    scheduler: Arc<dyn Scheduler>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    on_error: Option<ErrorCallback>,
}

impl AutoSaveBuilder {
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&FormId, &StorageError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Validate the configuration, probe the store and sweep expired drafts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configuration fails validation.
    pub fn build(self) -> Result<AutoSave, ConfigError> {
        self.config.validate()?;
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let storage = DraftStorage::open(
            store,
            clock,
            self.config.storage.prefix.clone(),
            self.config.storage.expiration,
        );
        let swept = storage.sweep_expired();
        info!(
            prefix = %storage.prefix(),
            degraded = storage.is_degraded(),
            forms = self.config.forms.len(),
            swept,
            "auto-save initialized"
        );
        Ok(AutoSave {
            inner: Arc::new(Inner {
                config: self.config,
                storage,
                scheduler: self.scheduler,
                forms: Mutex::new(HashMap::new()),
                next_mount: AtomicU64::new(1),
                on_error: self.on_error,
            }),
        })
    }
}

/// What to mount: the form type, an optional user scope, and per-handle
/// configuration overrides.
#[derive(Clone, Debug, Default)]
pub struct FormOptions {
    pub form_type: String,
    pub user_id: Option<String>,
    pub overrides: Option<FormOverrides>,
}

impl FormOptions {
    #[must_use]
    pub fn new(form_type: impl Into<String>) -> Self {
        Self { form_type: form_type.into(), ..Self::default() }
    }

    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn overrides(mut self, overrides: FormOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

impl AutoSave {
    #[must_use]
    pub fn builder(config: AutoSaveConfig, scheduler: Arc<dyn Scheduler>) -> AutoSaveBuilder {
        AutoSaveBuilder { config, scheduler, store: None, clock: None, on_error: None }
    }

    #[must_use]
    pub fn config(&self) -> &AutoSaveConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn storage(&self) -> &DraftStorage {
        &self.inner.storage
    }

    /// Mount `form_type` with no user scope and no overrides.
    ///
    /// # Errors
    ///
    /// See [`mount`](Self::mount).
    pub fn form(&self, form_type: &str) -> Result<FormAutoSave, ConfigError> {
        self.mount(FormOptions::new(form_type))
    }

    /// Mount a form. Mounting the same form type and user again replaces the
    /// previous mount; the old handle becomes inert.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the overrides are invalid.
    pub fn mount(&self, options: FormOptions) -> Result<FormAutoSave, ConfigError> {
        let settings = self.inner.config.resolve_form(&options.form_type, options.overrides.as_ref())?;
        let id = FormId { form_type: options.form_type, user_id: options.user_id };
        let key = id.key(self.inner.storage.prefix());
        let last_saved = if settings.enabled {
            self.inner.storage.load(&id).map(|data| filter_tracked(&data, settings.tracked_fields.as_ref()))
        } else {
            None
        };
        let mount_id = self.inner.next_mount.fetch_add(1, Ordering::Relaxed);
        debug!(%key, mount_id, enabled = settings.enabled, "form mounted");

        let runtime = FormRuntime::new(mount_id, id.clone(), settings, last_saved);
        if let Some(mut previous) = lock(&self.inner.forms).insert(key.clone(), runtime) {
            debug!(%key, previous = previous.mount_id(), "replacing mounted form");
            previous.end_session();
        }
        Ok(FormAutoSave { inner: Arc::clone(&self.inner), key, id, mount_id })
    }

    /// Remove every draft under the prefix. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let mut forms = lock(&self.inner.forms);
        for runtime in forms.values_mut() {
            runtime.forget_saved();
        }
        self.inner.storage.clear_all()
    }
}

impl Inner {
    fn fire(self: &Arc<Self>, key: &str, mount_id: u64, kind: TimerKind, generation: u64) {
        let failure = {
            let mut forms = lock(&self.forms);
            let Some(runtime) = forms.get_mut(key) else {
                debug!(%key, ?kind, "timer for unmounted form ignored");
                return;
            };
            if runtime.mount_id() != mount_id {
                debug!(%key, ?kind, mount_id, "timer for replaced mount ignored");
                return;
            }
            let arm = FormArm { inner: self, key, mount_id };
            runtime.fire(kind, generation, &self.storage, &arm).map(|e| (runtime.id().clone(), e))
        };
        if let Some((id, e)) = failure {
            self.report(&id, &e);
        }
    }

    fn report(&self, id: &FormId, error: &StorageError) {
        if let Some(callback) = &self.on_error {
            callback(id, error);
        }
    }
}

/// Routes a slot's expiry back to its form through a weak service reference.
struct FormArm<'a> {
    inner: &'a Arc<Inner>,
    key: &'a str,
    mount_id: u64,
}

impl Arm for FormArm<'_> {
    fn arm(&self, slot: &mut TimerSlot, kind: TimerKind, delay: Duration) {
        let weak = Arc::downgrade(self.inner);
        let key = self.key.to_owned();
        let mount_id = self.mount_id;
        slot.start(self.inner.scheduler.as_ref(), delay, move |generation| {
            if let Some(inner) = weak.upgrade() {
                inner.fire(&key, mount_id, kind, generation);
            }
        });
    }
}

// =============================================================================
// FORM HANDLE
// =============================================================================

/// Handle to one mounted form. Dropping it unmounts the form.
pub struct FormAutoSave {
    inner: Arc<Inner>,
    key: String,
    id: FormId,
    mount_id: u64,
}

impl fmt::Debug for FormAutoSave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormAutoSave")
            .field("key", &self.key)
            .field("mount_id", &self.mount_id)
            .finish_non_exhaustive()
    }
}

impl FormAutoSave {
    /// Run `f` on this handle's runtime; `None` once the mount was replaced.
    fn with_runtime<R>(&self, f: impl FnOnce(&mut FormRuntime, &FormArm<'_>) -> R) -> Option<R> {
        let mut forms = lock(&self.inner.forms);
        match forms.get_mut(&self.key) {
            Some(runtime) if runtime.mount_id() == self.mount_id => {
                let arm = FormArm { inner: &self.inner, key: &self.key, mount_id: self.mount_id };
                Some(f(runtime, &arm))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &FormId {
        &self.id
    }

    /// Storage key of this form's draft.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Feed the current form data. Returns true when it was a real change
    /// and a save is now scheduled.
    pub fn observe(&self, data: &FormData) -> bool {
        self.with_runtime(|runtime, arm| runtime.observe(data, arm)).unwrap_or(false)
    }

    /// Save immediately, bypassing the debounce. Returns true when written;
    /// false when disabled or the write failed.
    pub fn save(&self, data: &FormData) -> bool {
        let storage = &self.inner.storage;
        let outcome = self.with_runtime(|runtime, arm| runtime.save_now(data, storage, arm));
        match outcome {
            Some(Persisted::Saved) => true,
            Some(Persisted::Failed(e)) => {
                self.inner.report(&self.id, &e);
                false
            }
            Some(Persisted::Skipped) | None => false,
        }
    }

    /// The persisted draft, limited to tracked fields, or `None` when
    /// absent, expired, or disabled.
    #[must_use]
    pub fn load(&self) -> Option<FormData> {
        let storage = &self.inner.storage;
        self.with_runtime(|runtime, _| runtime.load(storage)).flatten()
    }

    /// Erase the draft and end any session.
    pub fn clear(&self) {
        let storage = &self.inner.storage;
        self.with_runtime(|runtime, _| runtime.clear(storage));
    }

    pub fn enable_auto_save(&self) {
        let storage = &self.inner.storage;
        self.with_runtime(|runtime, _| runtime.set_enabled(true, storage));
    }

    /// Turn auto-save off; clears the draft and ends the session.
    pub fn disable_auto_save(&self) {
        let storage = &self.inner.storage;
        self.with_runtime(|runtime, _| runtime.set_enabled(false, storage));
    }

    /// Cancel all pending timers and return to `idle`. Idempotent.
    pub fn end_session(&self) {
        self.with_runtime(|runtime, _| runtime.end_session());
    }

    /// React to the submission endpoint's answer: a successful submission
    /// clears the draft and ends the session. Returns whether it did.
    pub fn on_submit_response(&self, response: &SubmitResponse) -> bool {
        if !response.success {
            debug!(key = %self.key, "submission failed; draft kept");
            return false;
        }
        info!(key = %self.key, reference = ?response.reference_id, "submission accepted; draft cleared");
        self.clear();
        true
    }

    #[must_use]
    pub fn view(&self) -> StatusView {
        self.with_runtime(|runtime, _| runtime.view()).unwrap_or_default()
    }

    #[must_use]
    pub fn status(&self) -> SaveStatus {
        self.view().status
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.view().is_loading()
    }

    #[must_use]
    pub fn is_in_session(&self) -> bool {
        self.view().in_session
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.with_runtime(|runtime, _| runtime.is_enabled()).unwrap_or(false)
    }

    /// Watch status snapshots. A replaced handle gets a closed channel
    /// holding the default view.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StatusView> {
        match self.with_runtime(|runtime, _| runtime.subscribe()) {
            Some(rx) => rx,
            None => watch::channel(StatusView::default()).1,
        }
    }

    /// Any debounce, save, status or session timer still armed.
    #[must_use]
    pub fn has_pending_timers(&self) -> bool {
        self.with_runtime(|runtime, _| runtime.has_pending_timers()).unwrap_or(false)
    }
}

impl Drop for FormAutoSave {
    fn drop(&mut self) {
        let mut forms = lock(&self.inner.forms);
        if forms.get(&self.key).is_some_and(|runtime| runtime.mount_id() == self.mount_id) {
            if let Some(mut runtime) = forms.remove(&self.key) {
                runtime.end_session();
                debug!(key = %self.key, mount_id = self.mount_id, "form unmounted");
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
