//! Error types for the backend client.

use thiserror::Error;

use thriftly_core::sync::{RemoteApplyError, SyncErrorKind};

/// Result type alias for backend client operations.
pub type Result<T> = std::result::Result<T, ConnectError>;

/// Errors that can occur while talking to the backend.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the backend
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ConnectError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify for the engine's retry policy. Transport failures and
    /// server-side trouble are worth retrying; everything else means the
    /// payload itself was rejected.
    pub fn retry_class(&self) -> SyncErrorKind {
        match self {
            Self::Api { status, .. } => match *status {
                408 | 409 | 423 | 425 | 429 => SyncErrorKind::Transient,
                500..=599 => SyncErrorKind::Transient,
                _ => SyncErrorKind::Rejected,
            },
            Self::Http(_) => SyncErrorKind::Transient,
            Self::Json(_) => SyncErrorKind::Rejected,
            Self::InvalidRequest(_) => SyncErrorKind::Rejected,
        }
    }
}

impl From<ConnectError> for RemoteApplyError {
    fn from(err: ConnectError) -> Self {
        match err.retry_class() {
            SyncErrorKind::Transient => RemoteApplyError::Transient(err.to_string()),
            SyncErrorKind::Rejected => RemoteApplyError::Rejected(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_side_failures_are_transient() {
        for status in [408, 429, 500, 502, 503] {
            let err = ConnectError::api(status, "unavailable");
            assert_eq!(err.retry_class(), SyncErrorKind::Transient, "status {status}");
        }
    }

    #[test]
    fn client_side_rejections_are_permanent() {
        for status in [400, 401, 403, 404, 422] {
            let err = ConnectError::api(status, "rejected");
            assert_eq!(err.retry_class(), SyncErrorKind::Rejected, "status {status}");
        }
    }

    #[test]
    fn malformed_response_body_is_rejected() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err = ConnectError::from(json_err);
        assert_eq!(err.retry_class(), SyncErrorKind::Rejected);
    }

    #[test]
    fn status_code_is_exposed_only_for_api_errors() {
        assert_eq!(ConnectError::api(503, "maintenance").status_code(), Some(503));
        assert_eq!(
            ConnectError::invalid_request("missing token").status_code(),
            None
        );

        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert_eq!(ConnectError::from(json_err).status_code(), None);
    }

    #[test]
    fn conversion_preserves_classification() {
        let transient = RemoteApplyError::from(ConnectError::api(503, "maintenance"));
        assert_eq!(transient.kind(), SyncErrorKind::Transient);

        let rejected = RemoteApplyError::from(ConnectError::api(422, "invalid amount"));
        assert_eq!(rejected.kind(), SyncErrorKind::Rejected);
    }
}
