//! Client error types.

use serde::Deserialize;
use thiserror::Error;

/// Errors returned by [`ControlPlane`](crate::ControlPlane) implementations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("resource version too old: {0}")]
    Gone(String),

    #[error("API error {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Build an error from a response code and its (possibly empty) `Status` body.
    pub fn from_status(code: u16, status: Status) -> Self {
        let reason = status.reason.unwrap_or_default();
        let message = status.message.unwrap_or_default();
        if reason == "AlreadyExists" || (code == 409 && reason != "Conflict") {
            return ClientError::AlreadyExists(message);
        }
        if reason == "Expired" || code == 410 {
            return ClientError::Gone(message);
        }
        ClientError::Api {
            code,
            reason,
            message,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClientError::AlreadyExists(_))
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, ClientError::Gone(_))
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(_) | ClientError::Io(_) => true,
            ClientError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// The `Status` object the API server returns on failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Status {
    /// Parse a response body, falling back to the raw text as the message.
    pub fn from_body(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Status {
            code: None,
            reason: None,
            message: Some(body.trim().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_status() {
        let status = Status::from_body(
            r#"{"kind":"Status","status":"Failure","message":"pods \"probe-0\" already exists","reason":"AlreadyExists","code":409}"#,
        );
        let err = ClientError::from_status(409, status);
        assert!(err.is_already_exists());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_conflict_is_not_already_exists() {
        let status = Status::from_body(r#"{"reason":"Conflict","message":"retry","code":409}"#);
        let err = ClientError::from_status(409, status);
        assert!(matches!(err, ClientError::Api { code: 409, .. }));
    }

    #[test]
    fn test_gone_status() {
        let status = Status::from_body(r#"{"reason":"Expired","message":"too old resource version","code":410}"#);
        assert!(ClientError::from_status(410, status).is_gone());
    }

    #[test]
    fn test_plain_text_body() {
        let err = ClientError::from_status(503, Status::from_body("upstream down\n"));
        match &err {
            ClientError::Api { code, message, .. } => {
                assert_eq!(*code, 503);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_not_retryable() {
        let err = ClientError::Api {
            code: 422,
            reason: "Invalid".into(),
            message: "bad spec".into(),
        };
        assert!(!err.is_retryable());
    }
}
