// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Canary Gate
//!
//! A scheduled run may only act once a canary run (single repository,
//! manual trigger) has succeeded. The marker is a small JSON record kept in
//! the automation's own state repository; a successful canary overwrites
//! it. Clearing it again is an operator action, never an automatic one.

use crate::config::EngineSettings;
use bso_host_api::{FileWrite, HostError, HostResult, RepoRef, SourceControl};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const STATUS_SCHEMA_VERSION: u32 = 1;

/// Persisted canary marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanaryStatus {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub last_successful_canary: Option<DateTime<Utc>>,
    pub canary_repo: Option<String>,
}

fn default_schema_version() -> u32 {
    STATUS_SCHEMA_VERSION
}

impl CanaryStatus {
    pub fn succeeded(canary_repo: &str, at: DateTime<Utc>) -> Self {
        Self {
            schema_version: STATUS_SCHEMA_VERSION,
            last_successful_canary: Some(at),
            canary_repo: Some(canary_repo.to_string()),
        }
    }

    /// The record an operator writes to block scheduled runs again
    pub fn cleared() -> Self {
        Self {
            schema_version: STATUS_SCHEMA_VERSION,
            last_successful_canary: None,
            canary_repo: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "gate", rename_all = "kebab-case")]
pub enum GateState {
    Clear {
        since: DateTime<Utc>,
        canary_repo: Option<String>,
    },
    Blocked {
        reason: String,
    },
}

impl GateState {
    fn blocked(reason: impl Into<String>) -> Self {
        GateState::Blocked {
            reason: reason.into(),
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, GateState::Clear { .. })
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Clear { since, canary_repo } => {
                write!(f, "clear (canary")?;
                if let Some(repo) = canary_repo {
                    write!(f, " {}", repo)?;
                }
                write!(f, " at {})", since.format("%Y-%m-%d %H:%M UTC"))
            }
            GateState::Blocked { reason } => write!(f, "blocked: {}", reason),
        }
    }
}

pub struct CanaryGate {
    scm: Arc<dyn SourceControl>,
    state_repo: RepoRef,
    path: String,
}

impl CanaryGate {
    pub fn new(scm: Arc<dyn SourceControl>, org: &str, settings: &EngineSettings) -> Self {
        Self {
            scm,
            state_repo: RepoRef::new(org, &settings.canary_state_repo),
            path: settings.canary_state_path.clone(),
        }
    }

    pub fn state_repo(&self) -> &RepoRef {
        &self.state_repo
    }

    async fn state_branch(&self) -> HostResult<String> {
        Ok(self.scm.get_repository(&self.state_repo).await?.default_branch)
    }

    /// Read the gate; read-only
    #[tracing::instrument(skip(self), fields(state_repo = %self.state_repo))]
    pub async fn check(&self) -> HostResult<GateState> {
        let branch = match self.state_branch().await {
            Ok(branch) => branch,
            Err(HostError::NotFound(_)) => {
                return Ok(GateState::blocked(format!(
                    "state repository {} not found",
                    self.state_repo
                )));
            }
            Err(e) => return Err(e),
        };

        let Some(file) = self.scm.get_file(&self.state_repo, &self.path, &branch).await? else {
            return Ok(GateState::blocked("no canary run recorded"));
        };

        let state = match serde_json::from_str::<CanaryStatus>(&file.content) {
            Ok(CanaryStatus {
                last_successful_canary: Some(since),
                canary_repo,
                ..
            }) => GateState::Clear { since, canary_repo },
            Ok(_) => GateState::blocked("canary status has been cleared"),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable canary status");
                GateState::blocked(format!("canary status is unreadable: {}", e))
            }
        };
        tracing::debug!(gate = %state, "Checked canary gate");
        Ok(state)
    }

    /// Overwrite the marker after a successful canary run
    pub async fn record_success(&self, canary_repo: &str, at: DateTime<Utc>) -> HostResult<()> {
        self.write(&CanaryStatus::succeeded(canary_repo, at), "Record successful canary run")
            .await?;
        tracing::info!(canary_repo, "Canary gate cleared for scheduled runs");
        Ok(())
    }

    /// Operator override: block scheduled runs until the next canary
    pub async fn reset(&self) -> HostResult<()> {
        self.write(&CanaryStatus::cleared(), "Reset canary status").await?;
        tracing::warn!("Canary gate reset, scheduled runs are blocked");
        Ok(())
    }

    async fn write(&self, status: &CanaryStatus, message: &str) -> HostResult<()> {
        let branch = self.state_branch().await?;
        let current = self.scm.get_file(&self.state_repo, &self.path, &branch).await?;
        let mut content = serde_json::to_string_pretty(status)
            .map_err(|e| HostError::InvalidResponse(e.to_string()))?;
        content.push('\n');
        let write = FileWrite {
            path: self.path.clone(),
            branch,
            message: message.to_string(),
            content,
            sha: current.map(|f| f.sha),
        };
        self.scm.put_file(&self.state_repo, &write).await
    }
}
