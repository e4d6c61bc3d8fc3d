// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the REST clients

use bso_host_api::HostError;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("server returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type RestClientResult<T> = std::result::Result<T, RestClientError>;

impl RestClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RestClientError::Status { status, .. } => Some(*status),
            RestClientError::Http(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

impl From<RestClientError> for HostError {
    fn from(err: RestClientError) -> Self {
        match err {
            RestClientError::RateLimited { reset_at } => HostError::RateLimited { reset_at },
            RestClientError::Status { status, message } => match status {
                StatusCode::NOT_FOUND => HostError::NotFound(message),
                StatusCode::CONFLICT => HostError::Conflict(message),
                StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => HostError::Forbidden(message),
                StatusCode::METHOD_NOT_ALLOWED | StatusCode::UNPROCESSABLE_ENTITY => {
                    HostError::Unprocessable(message)
                }
                other => HostError::Http {
                    status: other.as_u16(),
                    message,
                },
            },
            RestClientError::Http(e) => match e.status() {
                Some(status) => HostError::Http {
                    status: status.as_u16(),
                    message: e.to_string(),
                },
                None => HostError::Transport(e.to_string()),
            },
            RestClientError::Url(e) => HostError::Transport(e.to_string()),
            RestClientError::Auth(msg) => HostError::Forbidden(msg),
            RestClientError::Json(e) => HostError::InvalidResponse(e.to_string()),
            RestClientError::UnexpectedResponse(msg) => HostError::InvalidResponse(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> RestClientError {
        RestClientError::Status {
            status: StatusCode::from_u16(code).unwrap(),
            message: "body".to_string(),
        }
    }

    #[test]
    fn test_status_mapping_to_host_errors() {
        assert!(matches!(HostError::from(status(404)), HostError::NotFound(_)));
        assert!(matches!(HostError::from(status(409)), HostError::Conflict(_)));
        assert!(matches!(HostError::from(status(403)), HostError::Forbidden(_)));
        assert!(matches!(HostError::from(status(405)), HostError::Unprocessable(_)));
        assert!(matches!(
            HostError::from(status(503)),
            HostError::Http { status: 503, .. }
        ));
        assert!(status(404).is_not_found());
    }
}
