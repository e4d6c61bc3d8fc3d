// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Errors reported by host capability implementations

use chrono::{DateTime, Utc};

/// Error surfaced by a source-control or catalog host
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The host asked us to back off until `reset_at`
    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("not found: {0}")]
    NotFound(String),

    /// The write was rejected because the target moved underneath us
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The host understood the request but refused to act on it
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl HostError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, HostError::RateLimited { .. })
    }

    /// Failures worth retrying: server errors and transport problems
    pub fn is_transient(&self) -> bool {
        match self {
            HostError::Transport(_) => true,
            HostError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type HostResult<T> = std::result::Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(HostError::Transport("reset".into()).is_transient());
        assert!(
            HostError::Http {
                status: 502,
                message: "bad gateway".into()
            }
            .is_transient()
        );
        assert!(
            !HostError::Http {
                status: 400,
                message: "bad request".into()
            }
            .is_transient()
        );
        assert!(!HostError::Conflict("sha".into()).is_transient());
    }
}
