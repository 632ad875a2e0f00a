//! Client-side auto-save for contact forms.
//!
//! ARCHITECTURE
//! ============
//! ```text
//!   FormAutoSave (per mounted form)
//!        │ observe / save / clear / end_session
//!        ▼
//!   AutoSave ── Mutex<forms> ──► FormRuntime
//!        │                        ├─ ChangeTracker  (debounce → save)
//!        │                        ├─ SessionTracker (inactivity)
//!        │                        └─ status + watch channel
//!        ├─ DraftStorage ──► dyn KeyValueStore   (memory | localStorage)
//!        ├─ dyn Scheduler                        (tokio | browser | manual)
//!        └─ dyn Clock
//! ```
//!
//! Drafts are JSON records `{data, timestamp, formType}` under
//! `{prefix}{formType}[:{userId}]`. They expire after the configured window
//! and are evicted lazily on load and eagerly at startup.
//!
//! TRADE-OFFS
//! ==========
//! All state changes happen under one lock, which serializes forms against
//! each other. Forms change at typing speed, so contention is not a concern;
//! in exchange, timer callbacks never race the methods that supersede them.

pub mod clock;
pub mod config;
mod debounce;
pub mod draft;
pub mod error;
mod form;
pub mod manager;
mod session;
pub mod status;
pub mod storage;
pub mod store;
pub mod timer;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use clock::{Clock, SystemClock};
pub use config::{AutoSaveConfig, FormConfig, FormOverrides, PartialConfig, SessionBehavior, Timeouts};
pub use draft::{DraftRecord, FormData, FormId};
pub use error::{ConfigError, SchedulerError, StorageError};
pub use manager::{AutoSave, AutoSaveBuilder, FormAutoSave, FormOptions};
pub use status::{SaveStatus, StatusView};
pub use storage::DraftStorage;
pub use store::{KeyValueStore, MemoryStore};
pub use timer::{ManualScheduler, Scheduler, TaskHandle, TokioScheduler};

#[cfg(feature = "hydrate")]
pub use clock::BrowserClock;
#[cfg(feature = "hydrate")]
pub use store::WebStorage;
#[cfg(feature = "hydrate")]
pub use timer::BrowserScheduler;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
