//! Producer errors.
//!
//! Classified from HTTP status plus the vendor error code the Metadata
//! Service embeds in 4xx response bodies.

use crate::settings::{VENDOR_CODE_SERIAL_REQUIRED, VENDOR_CODE_TYPE_MISMATCH};
use serde::{Deserialize, Serialize};

/// Errors surfaced by the producer runtime.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum ProducerError {
    /// `BITSKY_BASE_URL` or `GLOBAL_ID` is not configured.
    #[error("BITSKY_BASE_URL or GLOBAL_ID is not configured")]
    ConfigMissing,

    /// The control plane does not know this producer (404).
    #[error("cannot find producer by {global_id}")]
    NotRegistered { global_id: String },

    /// The security key was rejected (401).
    #[error("invalid security key")]
    BadCredentials,

    /// Another instance already holds this producer registration (403).
    #[error("producer already connected by another instance")]
    AlreadyBound,

    /// The control plane requires a serial id (vendor code 00144000002).
    #[error("PRODUCER_SERIAL_ID is required; set PRODUCER_SERIAL_ID and restart")]
    SerialRequired,

    /// The registered producer type differs (vendor code 00144000004).
    #[error("producer type mismatch; expected {expected}")]
    TypeMismatch { expected: String },

    /// Any other 4xx.
    #[error("bad request ({status}); check GLOBAL_ID / SERIAL_ID / SECURITY_KEY")]
    BadRequest { status: u16, message: String },

    /// 5xx or a response shape we cannot interpret.
    #[error("internal server error ({status})")]
    ServerError { status: u16, message: String },

    /// Request never produced a classifiable response (connect, timeout).
    #[error("request failed: {message}")]
    Transport { message: String },

    /// A facade setter rejected its argument.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Filesystem failure, e.g. while persisting the serial id.
    #[error("io error: {message}")]
    Io { message: String },

    /// Payload (de)serialization failure.
    #[error("serialization error: {message}")]
    Serde { message: String },
}

impl ProducerError {
    /// HTTP status this error is equivalent to, for surfacing via the
    /// `producer_error` accessor.
    pub fn status(&self) -> u16 {
        match self {
            Self::ConfigMissing
            | Self::SerialRequired
            | Self::InvalidInput { .. }
            | Self::Serde { .. } => 400,
            Self::BadCredentials => 401,
            Self::AlreadyBound => 403,
            Self::NotRegistered { .. } => 404,
            Self::TypeMismatch { .. } => 400,
            Self::BadRequest { status, .. } => *status,
            Self::ServerError { status, .. } => *status,
            Self::Transport { .. } | Self::Io { .. } => 500,
        }
    }

    /// Whether a retry at the next poll tick can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServerError { .. } | Self::Transport { .. } | Self::AlreadyBound
        )
    }

    /// Classify a control-plane response.
    ///
    /// `vendor_code` is the `code` field from the response body, when the
    /// body could be parsed. `global_id` and `expected_kind` feed the
    /// messages of the identity-specific variants.
    pub fn from_response(
        status: u16,
        vendor_code: Option<&str>,
        global_id: &str,
        expected_kind: &str,
    ) -> Self {
        if (400..500).contains(&status) {
            match vendor_code {
                Some(VENDOR_CODE_SERIAL_REQUIRED) => return Self::SerialRequired,
                Some(VENDOR_CODE_TYPE_MISMATCH) => {
                    return Self::TypeMismatch {
                        expected: expected_kind.to_string(),
                    };
                }
                _ => {}
            }
        }

        match status {
            401 => Self::BadCredentials,
            403 => Self::AlreadyBound,
            404 => Self::NotRegistered {
                global_id: global_id.to_string(),
            },
            s if (400..500).contains(&s) => Self::BadRequest {
                status: s,
                message: String::new(),
            },
            s => Self::ServerError {
                status: s,
                message: String::new(),
            },
        }
    }

    /// Classify a response from a target system, where the vendor-code and
    /// identity context do not apply.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if (400..500).contains(&status) {
            Self::BadRequest { status, message }
        } else {
            Self::ServerError { status, message }
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ProducerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ProducerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}
