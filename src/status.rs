//! User-visible save status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What the form's status indicator shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    SessionActive,
    Error,
}

impl SaveStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::SessionActive => "session-active",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published to status subscribers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub status: SaveStatus,
    pub in_session: bool,
    pub enabled: bool,
}

impl StatusView {
    /// A write is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == SaveStatus::Saving
    }
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
