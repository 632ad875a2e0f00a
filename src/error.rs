//! Error types for the auto-save subsystem.
//!
//! ERROR HANDLING
//! ==============
//! None of these escape to the host UI as panics. Storage errors become a
//! transient `error` status plus an optional callback; configuration errors
//! are reported once, at construction.

/// Failure reported by a [`KeyValueStore`](crate::store::KeyValueStore).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing store is absent or refuses access (e.g. privacy mode).
    #[error("storage unavailable")]
    Unavailable,
    /// The backing store is out of space for this write.
    #[error("storage quota exceeded writing {key}")]
    QuotaExceeded { key: String },
    /// A draft payload could not be encoded or decoded.
    #[error("draft serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Any other backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Invalid auto-save configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse auto-save config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid auto-save config: {0}")]
    Invalid(String),
}

/// Failure constructing a [`Scheduler`](crate::timer::Scheduler).
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("no tokio runtime available on this thread")]
    NoRuntime,
}
