//! Draft storage adapter: keyed draft records with expiration.
//!
//! DESIGN
//! ======
//! `DraftStorage` maps `(formType, userId)` to one JSON record under a
//! prefixed key in a shared [`KeyValueStore`]. Writes overwrite. Reads evict
//! expired or corrupt records lazily; `sweep_expired` evicts them eagerly at
//! startup.
//!
//! ERROR HANDLING
//! ==============
//! Only `save` reports failure to its caller, which surfaces it as a
//! transient status. Every other failure is logged and degrades to
//! "no draft": a broken draft must never block the form.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::draft::{DraftRecord, FormData, FormId};
use crate::error::StorageError;
use crate::store::{KeyValueStore, MemoryStore};

/// Suffix of the availability probe key. `%` followed by anything other
/// than `25`/`3A` never comes out of key derivation, so it cannot collide
/// with a draft.
const PROBE_SUFFIX: &str = "%probe";

#[derive(Clone)]
pub struct DraftStorage {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
    expiration: Duration,
    degraded: bool,
}

impl std::fmt::Debug for DraftStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftStorage")
            .field("prefix", &self.prefix)
            .field("expiration", &self.expiration)
            .field("degraded", &self.degraded)
            .finish_non_exhaustive()
    }
}

impl DraftStorage {
    /// Wrap `store` without probing it.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        prefix: impl Into<String>,
        expiration: Duration,
    ) -> Self {
        Self { store, clock, prefix: prefix.into(), expiration, degraded: false }
    }

    /// Probe `store` with a write/remove round trip; if it is unusable, fall
    /// back to an in-memory store so drafts still work for this page view.
    #[must_use]
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        prefix: impl Into<String>,
        expiration: Duration,
    ) -> Self {
        let prefix = prefix.into();
        let probe_key = format!("{prefix}{PROBE_SUFFIX}");
        let probe = store.set(&probe_key, "1").and_then(|()| store.remove(&probe_key));
        match probe {
            Ok(()) => Self::new(store, clock, prefix, expiration),
            Err(e) => {
                warn!(error = %e, %prefix, "draft storage unavailable; keeping drafts in memory only");
                let mut storage = Self::new(Arc::new(MemoryStore::new()), clock, prefix, expiration);
                storage.degraded = true;
                storage
            }
        }
    }

    /// True when [`open`](Self::open) fell back to memory.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Write `data` for `form`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns the backend's error (e.g. [`StorageError::QuotaExceeded`]);
    /// it has already been logged.
    pub fn save(&self, form: &FormId, data: &FormData) -> Result<DraftRecord, StorageError> {
        let key = form.key(&self.prefix);
        let record = DraftRecord { data: data.clone(), timestamp: self.clock.now_ms(), form_type: form.form_type.clone() };
        let write = serde_json::to_string(&record)
            .map_err(StorageError::from)
            .and_then(|raw| self.store.set(&key, &raw));
        match write {
            Ok(()) => {
                debug!(%key, fields = record.data.len(), "draft saved");
                Ok(record)
            }
            Err(e) => {
                warn!(error = %e, %key, "draft save failed");
                Err(e)
            }
        }
    }

    /// Read the live draft for `form`.
    ///
    /// Returns `None` when absent, unreadable, corrupt, or expired; corrupt
    /// and expired records are removed.
    #[must_use]
    pub fn load(&self, form: &FormId) -> Option<FormData> {
        self.load_record(form).map(|record| record.data)
    }

    /// Like [`load`](Self::load) but returns the whole record.
    #[must_use]
    pub fn load_record(&self, form: &FormId) -> Option<DraftRecord> {
        let key = form.key(&self.prefix);
        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, %key, "draft read failed");
                return None;
            }
        };
        let record = match serde_json::from_str::<DraftRecord>(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, %key, "corrupt draft evicted");
                self.remove_key(&key);
                return None;
            }
        };
        if record.is_expired(self.clock.now_ms(), self.expiration) {
            debug!(%key, timestamp = record.timestamp, "expired draft evicted");
            self.remove_key(&key);
            return None;
        }
        Some(record)
    }

    /// Remove the draft for `form`. Clearing an absent draft is a no-op.
    pub fn clear(&self, form: &FormId) {
        self.remove_key(&form.key(&self.prefix));
    }

    /// Remove every key under the prefix. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let keys = self.prefixed_keys();
        let removed = keys.iter().filter(|key| self.remove_key(key)).count();
        info!(prefix = %self.prefix, removed, "all drafts cleared");
        removed
    }

    /// Evict every expired or unparseable record under the prefix. Returns
    /// how many were evicted.
    pub fn sweep_expired(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let mut evicted = 0;
        for key in self.prefixed_keys() {
            let stale = match self.store.get(&key) {
                Ok(Some(raw)) => match serde_json::from_str::<DraftRecord>(&raw) {
                    Ok(record) => record.is_expired(now_ms, self.expiration),
                    Err(_) => true,
                },
                Ok(None) => false,
                Err(e) => {
                    warn!(error = %e, %key, "draft read failed during sweep");
                    false
                }
            };
            if stale && self.remove_key(&key) {
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(prefix = %self.prefix, evicted, "stale drafts swept");
        }
        evicted
    }

    fn prefixed_keys(&self) -> Vec<String> {
        match self.store.keys() {
            Ok(keys) => keys.into_iter().filter(|k| k.starts_with(&self.prefix)).collect(),
            Err(e) => {
                warn!(error = %e, prefix = %self.prefix, "draft key listing failed");
                Vec::new()
            }
        }
    }

    fn remove_key(&self, key: &str) -> bool {
        match self.store.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, %key, "draft removal failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
