//! Error types for fieldscope-core

use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// One field-level entry from a 422 validation response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldError {
    /// Name of the offending request field
    pub field: String,
    /// Human-readable message for that field
    pub message: String,
}

/// Main error type for the fieldscope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure: no response was received from the gateway
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The gateway rejected the credentials or the session expired (401/403)
    #[error("not authorized")]
    Unauthorized,

    /// Structured per-field validation failure (HTTP 422)
    #[error("validation failed: {}", summarize_fields(.0))]
    Validation(Vec<FieldError>),

    /// Any other unsuccessful gateway response
    #[error("{message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message extracted from the response body
        message: String,
    },

    /// Realtime channel error
    #[error("realtime error: {0}")]
    Realtime(String),

    /// Parse error for client-side formats (geolocation strings, rule conditions)
    #[error("parse error: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build the user-facing rendering of this error.
    ///
    /// Network failures collapse to a generic retry prompt because there is
    /// no structured response to quote.
    pub fn user_message(&self) -> String {
        match self {
            Error::Network(_) => "Connection error, please retry later.".to_string(),
            Error::Unauthorized => "Session expired, please log in again.".to_string(),
            Error::Validation(errors) => {
                format!("Please correct: {}", summarize_fields(errors))
            }
            other => other.to_string(),
        }
    }

    /// Field→message map for inline form display, when this is a
    /// validation failure.
    pub fn field_errors(&self) -> Option<HashMap<String, String>> {
        match self {
            Error::Validation(errors) => Some(
                errors
                    .iter()
                    .map(|e| (e.field.clone(), e.message.clone()))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// True for the authorization class that tears the session down.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized)
    }
}

fn summarize_fields(errors: &[FieldError]) -> String {
    if errors.is_empty() {
        return "invalid request".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for fieldscope-core
pub type Result<T> = std::result::Result<T, Error>;
