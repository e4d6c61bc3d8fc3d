// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error taxonomy of the onboarding engine
//!
//! Per-repository errors (`ValidationError`, `ProposeError`, `PublishError`)
//! are recorded against the repository and never abort a scan. Run-level
//! preconditions surface as `EngineError` and stop the run before any
//! mutation.

use bso_host_api::{HostError, Permission};

/// A descriptor cannot be built or does not have the shape the catalog expects
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("cannot derive an entity name from '{0}'")]
    MissingName(String),

    #[error("cannot derive an owner for {0}: no CODEOWNERS team, contributor or default owner")]
    MissingOwner(String),

    #[error("descriptor is not valid YAML: {0}")]
    Yaml(String),

    #[error("descriptor does not match the catalog schema: {0}")]
    Schema(String),

    #[error("descriptor is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProposeError {
    /// The onboarding branch moved in a way that cannot be updated cleanly
    #[error("branch {branch} of {repo} has diverged: {detail}")]
    Conflict {
        repo: String,
        branch: String,
        detail: String,
    },

    /// Creation stopped midway; the listed artifacts exist and were not rolled back
    #[error("partial proposal for {repo}: created [{}], then failed: {source}", .created.join(", "))]
    Partial {
        repo: String,
        created: Vec<String>,
        source: HostError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Host(#[from] HostError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The catalog answered with a non-retryable client error
    #[error("catalog rejected the descriptor with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("catalog unavailable after {attempts} attempts (last: {detail})")]
    Exhausted {
        attempts: u32,
        last_status: Option<u16>,
        detail: String,
    },

    #[error(transparent)]
    Host(HostError),
}

impl PublishError {
    /// Last HTTP status observed, when there was one
    pub fn last_status(&self) -> Option<u16> {
        match self {
            PublishError::Rejected { status, .. } => Some(*status),
            PublishError::Exhausted { last_status, .. } => *last_status,
            PublishError::Host(HostError::Http { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForceMergeError {
    #[error("{actor} has {actual} permission, {required} is required to force-merge")]
    Unauthorized {
        actor: String,
        required: Permission,
        actual: Permission,
    },

    #[error("issue #{issue} does not reference a pull request")]
    NoTarget { issue: u64 },

    #[error("PR #{number} is not an open onboarding pull request")]
    NotOnboardingPr { number: u64 },

    #[error("merge of PR #{number} failed: {reason}")]
    MergeFailed { number: u64, reason: String },

    #[error("branch protection of {branch} could not be restored: {source}")]
    RestoreFailed { branch: String, source: HostError },

    #[error(transparent)]
    Host(#[from] HostError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("cannot list repositories of {org}: {source}")]
    Listing { org: String, source: HostError },

    #[error("canary repository {0} not found")]
    CanaryRepoNotFound(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Run-level failure; aborts the whole run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A scheduled run found no verified canary
    #[error("scheduled run blocked by canary gate: {0}")]
    GateBlocked(String),

    #[error("missing required secret {0}")]
    MissingSecret(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Host(#[from] HostError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_lists_created_artifacts() {
        let err = ProposeError::Partial {
            repo: "acme/widgets".into(),
            created: vec!["branch backstage-integration-1".into(), "PR #4".into()],
            source: HostError::Transport("reset".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("branch backstage-integration-1, PR #4"));
        assert!(msg.contains("reset"));
    }

    #[test]
    fn test_publish_error_last_status() {
        let exhausted = PublishError::Exhausted {
            attempts: 3,
            last_status: Some(503),
            detail: "HTTP 503".into(),
        };
        assert_eq!(exhausted.last_status(), Some(503));
        assert!(exhausted.to_string().contains("after 3 attempts"));
        let rejected = PublishError::Rejected {
            status: 400,
            body: String::new(),
        };
        assert_eq!(rejected.last_status(), Some(400));
    }
}
