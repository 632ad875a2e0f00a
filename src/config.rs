//! Auto-save configuration: defaults, partial overlays, validation.
//!
//! DESIGN
//! ======
//! [`AutoSaveConfig`] is a fully-populated value. Callers never build one
//! field by field from scratch; they start from [`Default`] and overlay
//! [`PartialConfig`] documents (JSON, camelCase, every field optional) and
//! environment variables, then validate once. Per-form handles overlay a
//! [`FormOverrides`] on top when they mount.
//!
//! Forms are opt-in: a form type with no entry under `forms` resolves as
//! disabled unless its handle's overrides enable it.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

pub const DEFAULT_PREFIX: &str = "contact_autosave_";
pub const DEFAULT_EXPIRATION_MS: u64 = 7 * 24 * 60 * 60 * 1000;
pub const DEFAULT_SAVE_MS: u64 = 1_000;
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_SHOW_STATUS_MS: u64 = 2_000;
pub const DEFAULT_IMMEDIATE_RESPONSE_MS: u64 = 150;

// =============================================================================
// RESOLVED CONFIG
// =============================================================================

/// Timer durations for one form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Delay between the debounce settling and the write.
    pub save: Duration,
    /// Quiet period after the last change before the save timer starts.
    pub debounce: Duration,
    /// Inactivity window after which the editing session ends.
    pub session_timeout: Duration,
    /// How long `saved` / `error` stay visible.
    pub show_status: Duration,
    /// Anti-flicker delay before `session-active` is shown.
    pub immediate_response: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            save: Duration::from_millis(DEFAULT_SAVE_MS),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            session_timeout: Duration::from_millis(DEFAULT_SESSION_TIMEOUT_MS),
            show_status: Duration::from_millis(DEFAULT_SHOW_STATUS_MS),
            immediate_response: Duration::from_millis(DEFAULT_IMMEDIATE_RESPONSE_MS),
        }
    }
}

impl Timeouts {
    /// Overlay every duration `partial` sets.
    #[must_use]
    pub fn merged(mut self, partial: &PartialTimeouts) -> Self {
        let set = |slot: &mut Duration, ms: Option<u64>| {
            if let Some(ms) = ms {
                *slot = Duration::from_millis(ms);
            }
        };
        set(&mut self.save, partial.save);
        set(&mut self.debounce, partial.debounce);
        set(&mut self.session_timeout, partial.session_timeout);
        set(&mut self.show_status, partial.show_status);
        set(&mut self.immediate_response, partial.immediate_response);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    /// Namespace prepended to every draft key.
    pub prefix: String,
    /// Drafts older than this are evicted.
    pub expiration: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { prefix: DEFAULT_PREFIX.to_owned(), expiration: Duration::from_millis(DEFAULT_EXPIRATION_MS) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionBehavior {
    /// Track an editing session at all.
    pub enabled: bool,
    /// Surface `session-active` after `immediate_response` instead of on the
    /// first change itself.
    pub immediate_start: bool,
}

impl Default for SessionBehavior {
    fn default() -> Self {
        Self { enabled: true, immediate_start: true }
    }
}

/// Per-form-type settings. `timeouts` only lists the durations that differ
/// from the global ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormConfig {
    pub enabled: bool,
    /// Allow-list of persisted fields; `None` persists every field.
    pub tracked_fields: Option<BTreeSet<String>>,
    pub session_behavior: SessionBehavior,
    pub timeouts: PartialTimeouts,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tracked_fields: None,
            session_behavior: SessionBehavior::default(),
            timeouts: PartialTimeouts::default(),
        }
    }
}

impl FormConfig {
    /// Allow-list the given fields.
    #[must_use]
    pub fn tracking<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    fn apply(&mut self, partial: &PartialFormConfig) {
        if let Some(enabled) = partial.enabled {
            self.enabled = enabled;
        }
        if let Some(fields) = &partial.tracked_fields {
            self.tracked_fields = Some(fields.iter().cloned().collect());
        }
        if let Some(behavior) = &partial.session_behavior {
            if let Some(enabled) = behavior.enabled {
                self.session_behavior.enabled = enabled;
            }
            if let Some(immediate_start) = behavior.immediate_start {
                self.session_behavior.immediate_start = immediate_start;
            }
        }
        if let Some(timeouts) = &partial.timeouts {
            self.timeouts = self.timeouts.overlaid(timeouts);
        }
    }
}

/// Complete auto-save configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutoSaveConfig {
    pub storage: StorageConfig,
    pub timeouts: Timeouts,
    pub forms: BTreeMap<String, FormConfig>,
}

/// Settings one mounted form actually runs with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedForm {
    pub enabled: bool,
    pub tracked_fields: Option<BTreeSet<String>>,
    pub session_behavior: SessionBehavior,
    pub timeouts: Timeouts,
}

impl AutoSaveConfig {
    /// Register (or replace) the settings for `form_type`.
    #[must_use]
    pub fn with_form(mut self, form_type: impl Into<String>, form: FormConfig) -> Self {
        self.forms.insert(form_type.into(), form);
        self
    }

    /// Defaults, overlaid with `json` (if any) and then `AUTOSAVE_*`
    /// environment variables, validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] when the merged result fails validation.
    pub fn load(json: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(json) = json {
            config.merge(&serde_json::from_str(json)?);
        }
        config.apply_vars(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(_) => None,
        });
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `json`, validated. Ignores the environment.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge(&serde_json::from_str(json)?);
        config.validate()?;
        Ok(config)
    }

    /// Overlay every field `partial` sets. Forms merge per form type.
    pub fn merge(&mut self, partial: &PartialConfig) {
        if let Some(storage) = &partial.storage {
            if let Some(prefix) = &storage.prefix {
                self.storage.prefix.clone_from(prefix);
            }
            if let Some(ms) = storage.expiration {
                self.storage.expiration = Duration::from_millis(ms);
            }
        }
        if let Some(timeouts) = &partial.timeouts {
            self.timeouts = self.timeouts.merged(timeouts);
        }
        for (form_type, form) in &partial.forms {
            self.forms.entry(form_type.clone()).or_default().apply(form);
        }
    }

    /// Overlay the `AUTOSAVE_*` variables `lookup` returns. Unparsable
    /// values are logged and ignored.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(prefix) = lookup("AUTOSAVE_PREFIX") {
            self.storage.prefix = prefix;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "AUTOSAVE_EXPIRATION_MS") {
            self.storage.expiration = Duration::from_millis(ms);
        }
        let timeouts = PartialTimeouts {
            save: parse_var(&lookup, "AUTOSAVE_SAVE_MS"),
            debounce: parse_var(&lookup, "AUTOSAVE_DEBOUNCE_MS"),
            session_timeout: parse_var(&lookup, "AUTOSAVE_SESSION_TIMEOUT_MS"),
            show_status: parse_var(&lookup, "AUTOSAVE_SHOW_STATUS_MS"),
            immediate_response: parse_var(&lookup, "AUTOSAVE_IMMEDIATE_RESPONSE_MS"),
        };
        self.timeouts = self.timeouts.merged(&timeouts);
    }

    /// Check the invariants the runtime relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.prefix.is_empty() {
            return Err(invalid("storage.prefix must not be empty"));
        }
        if self.storage.expiration.is_zero() {
            return Err(invalid("storage.expiration must be greater than zero"));
        }
        if self.timeouts.session_timeout.is_zero() {
            return Err(invalid("timeouts.sessionTimeout must be greater than zero"));
        }
        for (form_type, form) in &self.forms {
            if form_type.trim().is_empty() {
                return Err(invalid("form type must not be empty"));
            }
            check_form(form_type, form.tracked_fields.as_ref(), &form.timeouts)?;
        }
        Ok(())
    }

    /// Settings for `form_type`, with the handle's `overrides` applied last.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the overrides break a form
    /// invariant (empty allow-list, zero session timeout).
    pub fn resolve_form(
        &self,
        form_type: &str,
        overrides: Option<&FormOverrides>,
    ) -> Result<ResolvedForm, ConfigError> {
        let mut form = match self.forms.get(form_type) {
            Some(form) => form.clone(),
            None => FormConfig { enabled: false, ..FormConfig::default() },
        };
        if let Some(overrides) = overrides {
            form.apply(overrides);
            check_form(form_type, form.tracked_fields.as_ref(), &form.timeouts)?;
        }
        Ok(ResolvedForm {
            enabled: form.enabled,
            tracked_fields: form.tracked_fields,
            session_behavior: form.session_behavior,
            timeouts: self.timeouts.merged(&form.timeouts),
        })
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn check_form(
    form_type: &str,
    tracked: Option<&BTreeSet<String>>,
    timeouts: &PartialTimeouts,
) -> Result<(), ConfigError> {
    if tracked.is_some_and(BTreeSet::is_empty) {
        return Err(invalid(format!("forms.{form_type}.trackedFields must not be empty")));
    }
    if timeouts.session_timeout == Some(0) {
        return Err(invalid(format!("forms.{form_type}.timeouts.sessionTimeout must be greater than zero")));
    }
    Ok(())
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(%key, value = %raw, "ignoring unparsable auto-save setting");
            None
        }
    }
}

// =============================================================================
// PARTIALS
// =============================================================================

/// Sparse overlay for [`AutoSaveConfig`]. Durations are milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialConfig {
    pub storage: Option<PartialStorage>,
    pub timeouts: Option<PartialTimeouts>,
    pub forms: BTreeMap<String, PartialFormConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialStorage {
    pub prefix: Option<String>,
    /// Milliseconds.
    pub expiration: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialTimeouts {
    pub save: Option<u64>,
    pub debounce: Option<u64>,
    pub session_timeout: Option<u64>,
    pub show_status: Option<u64>,
    pub immediate_response: Option<u64>,
}

impl PartialTimeouts {
    /// `self` with every value `top` sets replaced.
    #[must_use]
    pub fn overlaid(self, top: &PartialTimeouts) -> Self {
        Self {
            save: top.save.or(self.save),
            debounce: top.debounce.or(self.debounce),
            session_timeout: top.session_timeout.or(self.session_timeout),
            show_status: top.show_status.or(self.show_status),
            immediate_response: top.immediate_response.or(self.immediate_response),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialSessionBehavior {
    pub enabled: Option<bool>,
    pub immediate_start: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialFormConfig {
    pub enabled: Option<bool>,
    pub tracked_fields: Option<Vec<String>>,
    pub session_behavior: Option<PartialSessionBehavior>,
    pub timeouts: Option<PartialTimeouts>,
}

/// Per-handle overrides, applied on top of the form type's settings.
pub type FormOverrides = PartialFormConfig;

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
