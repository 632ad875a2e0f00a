//! Draft records and storage key derivation.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Field name → value. Files never appear here; only string fields persist.
pub type FormData = BTreeMap<String, String>;

/// The persisted snapshot of one form's tracked fields.
///
/// Serialized as `{"data": {...}, "timestamp": <ms>, "formType": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRecord {
    pub data: FormData,
    /// Milliseconds since the Unix epoch of the last successful write.
    pub timestamp: i64,
    pub form_type: String,
}

impl DraftRecord {
    /// Whether the record is older than `window` at `now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64, window: Duration) -> bool {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.timestamp) > window_ms
    }
}

/// Identity of one form instance: its type plus the optional user scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormId {
    pub form_type: String,
    pub user_id: Option<String>,
}

impl FormId {
    #[must_use]
    pub fn new(form_type: impl Into<String>) -> Self {
        Self { form_type: form_type.into(), user_id: None }
    }

    #[must_use]
    pub fn for_user(form_type: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self { form_type: form_type.into(), user_id: Some(user_id.into()) }
    }

    /// Storage key under `prefix`. See [`draft_key`].
    #[must_use]
    pub fn key(&self, prefix: &str) -> String {
        draft_key(prefix, &self.form_type, self.user_id.as_deref())
    }
}

/// Derive the storage key for a form: `{prefix}{formType}` or
/// `{prefix}{formType}:{userId}`.
///
/// `%` and `:` inside either identifier are percent-escaped so that no two
/// distinct `(formType, userId)` pairs share a key.
#[must_use]
pub fn draft_key(prefix: &str, form_type: &str, user_id: Option<&str>) -> String {
    let form_type = escape_segment(form_type);
    match user_id {
        Some(user) => format!("{prefix}{form_type}:{}", escape_segment(user)),
        None => format!("{prefix}{form_type}"),
    }
}

fn escape_segment(raw: &str) -> Cow<'_, str> {
    if raw.contains(['%', ':']) {
        Cow::Owned(raw.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Keep only the allow-listed fields; without an allow-list, keep everything.
#[must_use]
pub fn filter_tracked(data: &FormData, tracked: Option<&BTreeSet<String>>) -> FormData {
    match tracked {
        Some(fields) => data
            .iter()
            .filter(|(name, _)| fields.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
        None => data.clone(),
    }
}

/// True when every value is empty or whitespace (an untouched form).
#[must_use]
pub fn is_blank(data: &FormData) -> bool {
    data.values().all(|v| v.trim().is_empty())
}

#[cfg(test)]
#[path = "draft_test.rs"]
mod tests;
