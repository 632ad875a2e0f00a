//! Wire model for the contact-sales submission endpoint.
//!
//! This crate owns the JSON shapes the contact form posts to the backend and
//! the response it reads back. Attachment bytes travel through the separate
//! multipart upload endpoint; only file metadata is carried here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const UNKNOWN: &str = "Unknown";

const DEFAULT_MAX_FILES: usize = 5;
const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_ALLOWED_TYPES: [&str; 7] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
    "image/png",
    "image/jpeg",
    "image/gif",
];

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned by [`SubmitResponse::into_result`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The backend answered `success: false`.
    #[error("submission rejected: {error}")]
    Rejected {
        /// Short machine-facing error from the backend.
        error: String,
        /// Optional human-facing explanation.
        message: Option<String>,
    },
    /// The backend answered `success: true` but returned no reference id.
    #[error("submission accepted without a reference id")]
    MissingReference,
}

/// Error returned by [`validate_attachments`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentError {
    /// More files than the policy allows.
    #[error("too many attachments: {count} (max {max})")]
    TooMany { count: usize, max: usize },
    /// A single file exceeds the per-file size limit.
    #[error("attachment {name} is {size} bytes (max {max})")]
    TooLarge { name: String, size: u64, max: u64 },
    /// The file's MIME type is not on the allow-list.
    #[error("attachment {name} has unsupported type {mime}")]
    UnsupportedType { name: String, mime: String },
    /// The file has a blank name.
    #[error("attachment name is empty")]
    EmptyName,
}

// =============================================================================
// REQUEST
// =============================================================================

/// Metadata for one attached file. Content is uploaded separately.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Original file name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type as reported by the browser.
    #[serde(rename = "type")]
    pub mime: String,
}

/// Client environment metadata attached to every submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAgentInfo {
    /// Raw `User-Agent` string.
    pub user_agent: String,
    /// Client IPv4 address, when the page could determine it.
    pub ipv4_address: Option<String>,
    /// Browser family derived from `user_agent`.
    pub browser_name: String,
    /// Operating system derived from `user_agent`.
    pub operating_system: String,
    /// Milliseconds since the Unix epoch when the form was submitted.
    pub timestamp: i64,
}

impl UserAgentInfo {
    /// Build metadata from a raw user-agent string, deriving browser and OS.
    #[must_use]
    pub fn from_user_agent(user_agent: &str, ipv4_address: Option<String>, timestamp: i64) -> Self {
        Self {
            user_agent: user_agent.to_owned(),
            ipv4_address,
            browser_name: detect_browser(user_agent).to_owned(),
            operating_system: detect_operating_system(user_agent).to_owned(),
            timestamp,
        }
    }
}

/// JSON body posted to the form-submission endpoint.
///
/// Form fields are flattened into the top-level object next to
/// `userAgentInfo` and `files`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSubmission {
    /// Form field values keyed by field name.
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
    /// Client environment metadata.
    pub user_agent_info: UserAgentInfo,
    /// Attachment metadata, in upload order.
    #[serde(default)]
    pub files: Vec<FileMeta>,
}

impl ContactSubmission {
    #[must_use]
    pub fn new(fields: BTreeMap<String, String>, user_agent_info: UserAgentInfo) -> Self {
        Self { fields, user_agent_info, files: Vec::new() }
    }

    #[must_use]
    pub fn with_files(mut self, files: Vec<FileMeta>) -> Self {
        self.files = files;
        self
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// Response body of the form-submission endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SubmitResponse {
    /// Interpret the response, yielding the reference id on success.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Rejected`] when `success` is false and
    /// [`SubmitError::MissingReference`] when a success carries no id.
    pub fn into_result(self) -> Result<String, SubmitError> {
        if !self.success {
            return Err(SubmitError::Rejected {
                error: self.error.unwrap_or_else(|| "unknown error".to_owned()),
                message: self.message,
            });
        }
        self.reference_id.ok_or(SubmitError::MissingReference)
    }
}

// =============================================================================
// ATTACHMENTS
// =============================================================================

/// Client-side attachment limits, mirroring the upload endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentPolicy {
    pub max_files: usize,
    pub max_file_bytes: u64,
    /// Accepted MIME types. Empty accepts any type.
    pub allowed_types: Vec<String>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| (*t).to_owned()).collect(),
        }
    }
}

impl AttachmentPolicy {
    fn allows_type(&self, mime: &str) -> bool {
        self.allowed_types.is_empty() || self.allowed_types.iter().any(|t| t.eq_ignore_ascii_case(mime))
    }
}

/// Check attachment metadata against `policy` before uploading.
///
/// # Errors
///
/// Returns the first violation found, checking the file count before
/// individual files.
pub fn validate_attachments(files: &[FileMeta], policy: &AttachmentPolicy) -> Result<(), AttachmentError> {
    if files.len() > policy.max_files {
        return Err(AttachmentError::TooMany { count: files.len(), max: policy.max_files });
    }
    for file in files {
        if file.name.trim().is_empty() {
            return Err(AttachmentError::EmptyName);
        }
        if file.size > policy.max_file_bytes {
            return Err(AttachmentError::TooLarge {
                name: file.name.clone(),
                size: file.size,
                max: policy.max_file_bytes,
            });
        }
        if !policy.allows_type(&file.mime) {
            return Err(AttachmentError::UnsupportedType { name: file.name.clone(), mime: file.mime.clone() });
        }
    }
    Ok(())
}

// =============================================================================
// USER-AGENT DETECTION
// =============================================================================

/// Derive a browser family name from a user-agent string.
#[must_use]
pub fn detect_browser(user_agent: &str) -> &'static str {
    // Edge and Opera also advertise Chrome; Chrome also advertises Safari.
    if user_agent.contains("Edg/") || user_agent.contains("Edge/") {
        "Edge"
    } else if user_agent.contains("OPR/") || user_agent.contains("Opera") {
        "Opera"
    } else if user_agent.contains("Firefox/") || user_agent.contains("FxiOS/") {
        "Firefox"
    } else if user_agent.contains("Chrome/") || user_agent.contains("CriOS/") {
        "Chrome"
    } else if user_agent.contains("Safari/") {
        "Safari"
    } else if user_agent.contains("MSIE ") || user_agent.contains("Trident/") {
        "Internet Explorer"
    } else {
        UNKNOWN
    }
}

/// Derive an operating system name from a user-agent string.
#[must_use]
pub fn detect_operating_system(user_agent: &str) -> &'static str {
    // iOS agents say "like Mac OS X"; Android agents say "Linux".
    if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("iPhone") || user_agent.contains("iPad") || user_agent.contains("iPod") {
        "iOS"
    } else if user_agent.contains("Mac OS X") || user_agent.contains("Macintosh") {
        "macOS"
    } else if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("CrOS") {
        "ChromeOS"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else {
        UNKNOWN
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
