//! Error types for the telemetry link
//!
//! Each component owns a focused error enum; [`DeviceError`] aggregates them
//! for the binary and for callers that want a single type. All of these are
//! recoverable: the device degrades to "retry next interval" and keeps ticking.

use crate::config::ConfigError;
use crate::credential::CredentialError;
use crate::session::{DispatchError, PublishError, SessionError};
use crate::transport::mqtt::MqttError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] MqttError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Error text safe to log: signatures, keys and passwords removed
    pub fn sanitized(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

const MAX_MESSAGE_LEN: usize = 500;
const TRUNCATE_SUFFIX: &str = "...[truncated]";

#[allow(clippy::expect_used)] // literal pattern
static SAS_TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"SharedAccessSignature\s+\S+").expect("SAS token pattern is valid")
});

#[allow(clippy::expect_used)] // literal pattern
static SECRET_FIELD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(password|token|key|secret|sig)[=:]\s*[^&\s]+")
        .expect("secret field pattern is valid")
});

/// Redact credential material from an error message and bound its length
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SAS_TOKEN_PATTERN.replace_all(message, "SharedAccessSignature ***");
    let sanitized = SECRET_FIELD_PATTERN
        .replace_all(&sanitized, "${1}=***")
        .into_owned();

    if sanitized.len() <= MAX_MESSAGE_LEN {
        return sanitized;
    }

    let max_content_len = MAX_MESSAGE_LEN - TRUNCATE_SUFFIX.len();
    let mut cut = max_content_len;
    while !sanitized.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &sanitized[..cut], TRUNCATE_SUFFIX)
}
