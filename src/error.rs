use http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

pub const CONFIGURATION_MISSING: &str = "Server configuration is missing";

/// Every failure a relay handler can report to its caller.
///
/// Handlers never let these escape: they are rendered into a JSON
/// `{"error": ...}` body at the handler boundary.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or malformed required input.
    #[error("{0}")]
    Validation(String),

    /// Wrong or unparseable request encoding.
    #[error("{0}")]
    InvalidContentType(String),

    /// Provider credentials were absent at process start.
    #[error("Server configuration is missing")]
    Configuration,

    /// The provider answered with a non-success status.
    #[error("{message}")]
    Provider { status: u16, message: String },

    /// Anything else, surfaced as-is.
    #[error("{0}")]
    Unexpected(String),
}

impl RelayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_content_type(msg: impl Into<String>) -> Self {
        Self::InvalidContentType(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidContentType(_) => StatusCode::BAD_REQUEST,
            Self::Configuration | Self::Provider { .. } | Self::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unexpected(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(err.to_string())
    }
}
