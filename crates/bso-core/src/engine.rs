// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Run orchestration
//!
//! One run scans the organization (or a single repository), takes the next
//! onboarding step for every repository in turn, and reports. Repositories
//! are handled sequentially; a failure is recorded on that repository and
//! the run moves on. Run-level preconditions (configuration, the canary gate
//! for scheduled runs) abort before anything is written.

use crate::canary::{CanaryGate, GateState};
use crate::config::EngineConfig;
use crate::error::{EngineError, ProposeError, PublishError, Result};
use crate::force_merge::ForceMergeHandler;
use crate::priority::{self, PriorityReport};
use crate::proposer::{ChangeProposer, ProposeOutcome};
use crate::publisher::{CatalogPublisher, PublishOutcome};
use crate::report::StatusReport;
use crate::scanner::{
    MAX_RATE_LIMIT_WAITS, OpenPullRequest, RegistrationStatus, RepoState, RepositoryRecord,
    RepositoryScanner, ScanFilter, wait_for_reset,
};
use bso_host_api::{CatalogHost, HostError, SourceControl};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

/// How a run was triggered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "repo", rename_all = "kebab-case")]
pub enum RunMode {
    /// Automatic, organization-wide; requires a clear canary gate
    Scheduled,
    /// Operator-triggered; ignores the gate, optionally limited to one repository
    Manual(Option<String>),
    /// Single-repository validation run; clears the gate on success
    Canary(String),
}

impl RunMode {
    fn filter(&self) -> ScanFilter {
        match self {
            RunMode::Scheduled | RunMode::Manual(None) => ScanFilter::All,
            RunMode::Manual(Some(repo)) | RunMode::Canary(repo) => ScanFilter::Only(repo.clone()),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Scheduled => write!(f, "Scheduled"),
            RunMode::Manual(_) => write!(f, "Manual"),
            RunMode::Canary(_) => write!(f, "Canary"),
        }
    }
}

/// What the run did for one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoAction {
    pub repo: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mode: RunMode,
    /// Organization, or `org/repo` for single-repository runs
    pub target: String,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dry_run: bool,
    pub gate: Option<GateState>,
    pub canary_recorded: bool,
    pub actions: Vec<RepoAction>,
}

impl RunSummary {
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("## Automation Summary\n\n");
        let _ = writeln!(out, "- Mode: {}", self.mode);
        let _ = writeln!(out, "- Target: {}", self.target);
        let _ = writeln!(out, "- Dry run: {}", if self.dry_run { "yes" } else { "no" });
        if let Some(gate) = &self.gate {
            let _ = writeln!(out, "- Canary gate: {}", gate);
        }
        let _ = writeln!(
            out,
            "- Processed: {}, skipped: {}, failed: {}",
            self.processed, self.skipped, self.failed
        );
        if self.canary_recorded {
            out.push_str("- Canary succeeded; scheduled runs are enabled\n");
        }
        if !self.actions.is_empty() {
            out.push_str("\n### Actions\n\n");
            for action in &self.actions {
                let _ = writeln!(out, "- `{}`: {}", action.repo, action.action);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub records: Vec<RepositoryRecord>,
    pub report: StatusReport,
}

pub struct Engine {
    config: EngineConfig,
    scm: Arc<dyn SourceControl>,
    catalog: Arc<dyn CatalogHost>,
}

impl Engine {
    /// Build an engine; rejects an incomplete configuration
    pub fn new(
        config: EngineConfig,
        scm: Arc<dyn SourceControl>,
        catalog: Arc<dyn CatalogHost>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            scm,
            catalog,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gate(&self) -> CanaryGate {
        CanaryGate::new(self.scm.clone(), &self.config.org, &self.config.settings)
    }

    pub fn force_merge_handler(&self) -> ForceMergeHandler {
        ForceMergeHandler::new(self.scm.clone(), self.config.settings.clone())
    }

    fn scanner(&self) -> RepositoryScanner {
        RepositoryScanner::new(
            self.scm.clone(),
            self.catalog.clone(),
            self.config.settings.clone(),
        )
    }

    fn target(&self, mode: &RunMode) -> String {
        match mode {
            RunMode::Scheduled | RunMode::Manual(None) => self.config.org.clone(),
            RunMode::Manual(Some(repo)) | RunMode::Canary(repo) => {
                format!("{}/{}", self.config.org, repo)
            }
        }
    }

    /// Execute one run
    #[tracing::instrument(skip(self), fields(org = %self.config.org, dry_run = self.config.dry_run))]
    pub async fn run(&self, mode: RunMode) -> Result<RunOutcome> {
        let gate = match mode {
            RunMode::Scheduled => {
                let state = self.gate().check().await?;
                if let GateState::Blocked { reason } = &state {
                    tracing::warn!(reason = %reason, "Scheduled run blocked by canary gate");
                    return Err(EngineError::GateBlocked(reason.clone()));
                }
                Some(state)
            }
            RunMode::Manual(_) | RunMode::Canary(_) => None,
        };

        tracing::info!(mode = %mode, "Starting run");
        let scanner = self.scanner();
        let proposer = ChangeProposer::new(self.scm.clone(), self.config.settings.clone());
        let publisher =
            CatalogPublisher::new(self.catalog.clone(), self.config.settings.publish_retry.clone());

        let mut scan = scanner.scan(&self.config.org, &mode.filter()).await?;
        let mut records = Vec::with_capacity(scan.total());
        let mut actions = Vec::new();
        while let Some(mut record) = scan.next().await {
            if let Some(action) = self.step(&proposer, &publisher, &mut record).await {
                tracing::info!(repo = %record.repo, action = %action, "Repository handled");
                actions.push(RepoAction {
                    repo: record.repo.to_string(),
                    action,
                });
            }
            records.push(record);
        }

        let failed = records
            .iter()
            .filter(|r| matches!(r.state, RepoState::Failed(_)))
            .count();
        let skipped = records
            .iter()
            .filter(|r| matches!(r.state, RepoState::Blocked(_)))
            .count();

        let mut summary = RunSummary {
            target: self.target(&mode),
            processed: records.len(),
            skipped,
            failed,
            dry_run: self.config.dry_run,
            gate,
            canary_recorded: false,
            actions,
            mode,
        };

        if let RunMode::Canary(repo) = &summary.mode {
            let succeeded = records.len() == 1 && failed == 0 && skipped == 0;
            if !succeeded {
                tracing::warn!(canary = %repo, "Canary run did not succeed, gate unchanged");
            } else if self.config.dry_run {
                tracing::info!(canary = %repo, "Dry run, canary success not recorded");
            } else {
                let gate = self.gate();
                gate.record_success(repo, Utc::now()).await?;
                summary.gate = Some(gate.check().await?);
                summary.canary_recorded = true;
            }
        }

        let report = StatusReport::build(&records, Utc::now());
        Ok(RunOutcome {
            summary,
            records,
            report,
        })
    }

    /// Take the next onboarding step for one repository and update its record
    async fn step(
        &self,
        proposer: &ChangeProposer,
        publisher: &CatalogPublisher,
        record: &mut RepositoryRecord,
    ) -> Option<String> {
        let repository = record.repository.clone()?;
        match record.state {
            RepoState::NeedsDescriptor | RepoState::PendingReview => {
                let generated = record.generated.clone()?;
                if self.config.dry_run {
                    return Some(format!("would propose descriptor for {}", generated.name()));
                }
                match propose_with_wait(proposer, &repository, &generated).await {
                    Ok(ProposeOutcome::NoOp) => None,
                    Ok(ProposeOutcome::PrCreated { pr, issue, branch }) => {
                        record.open_pr = Some(OpenPullRequest {
                            number: pr,
                            head_ref: branch,
                        });
                        record.open_issue = Some(issue);
                        record.state = RepoState::PendingReview;
                        Some(format!("opened PR #{} and issue #{}", pr, issue))
                    }
                    Ok(ProposeOutcome::PrUpdated { pr }) => {
                        Some(format!("updated descriptor on PR #{}", pr))
                    }
                    Ok(ProposeOutcome::IssueCreated { pr, issue }) => {
                        record.open_issue = Some(issue);
                        Some(format!("opened tracking issue #{} for PR #{}", issue, pr))
                    }
                    Err(ProposeError::Validation(e)) => {
                        record.state = RepoState::Blocked(e.to_string());
                        Some(format!("blocked: {}", e))
                    }
                    Err(e) => {
                        tracing::warn!(repo = %record.repo, error = %e, "Proposal failed");
                        record.state = RepoState::Failed(e.to_string());
                        Some(format!("proposal failed: {}", e))
                    }
                }
            }
            RepoState::PendingRegistration => {
                let content = record.descriptor.as_ref()?.content.clone();
                if self.config.dry_run {
                    return Some("would register merged descriptor".to_string());
                }
                match publisher.publish(&content).await {
                    Ok(outcome) => {
                        record.registration = RegistrationStatus::Registered;
                        record.state = RepoState::Onboarded;
                        Some(match outcome {
                            PublishOutcome::Registered => "registered in the catalog".to_string(),
                            PublishOutcome::AlreadyRegistered => {
                                "already registered in the catalog".to_string()
                            }
                        })
                    }
                    Err(PublishError::Validation(e)) => {
                        record.state = RepoState::Blocked(format!("merged descriptor is invalid: {}", e));
                        Some(format!("blocked: {}", e))
                    }
                    Err(e) => {
                        tracing::warn!(repo = %record.repo, error = %e, "Registration failed");
                        record.state = RepoState::Failed(format!("registration pending: {}", e));
                        Some(format!("registration failed: {}", e))
                    }
                }
            }
            RepoState::Onboarded | RepoState::Blocked(_) | RepoState::Failed(_) => None,
        }
    }

    /// Scan and report without writing anything
    pub async fn status(&self, now: DateTime<Utc>) -> Result<StatusReport> {
        let scanner = self.scanner();
        let mut scan = scanner.scan(&self.config.org, &ScanFilter::All).await?;
        let mut records = Vec::with_capacity(scan.total());
        while let Some(record) = scan.next().await {
            records.push(record);
        }
        Ok(StatusReport::build(&records, now))
    }

    pub async fn priority(&self, now: DateTime<Utc>) -> Result<PriorityReport> {
        Ok(priority::analyze(self.scm.as_ref(), &self.config.org, &self.config.settings, now).await?)
    }
}

/// A rate-limited proposal is retried after the reset; it re-reads live state
async fn propose_with_wait(
    proposer: &ChangeProposer,
    repository: &bso_host_api::Repository,
    generated: &crate::descriptor::GeneratedDescriptor,
) -> std::result::Result<ProposeOutcome, ProposeError> {
    let mut waits = 0;
    loop {
        match proposer.propose(repository, generated).await {
            Err(ProposeError::Host(HostError::RateLimited { reset_at }))
                if waits < MAX_RATE_LIMIT_WAITS =>
            {
                waits += 1;
                wait_for_reset(reset_at).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bso_host_mock::{InMemoryScm, ScriptedCatalog, sample_repository};
    use bso_host_api::RepoRef;
    use crate::config::EngineSettings;

    fn engine(dry_run: bool) -> (Arc<InMemoryScm>, Arc<ScriptedCatalog>, Engine) {
        let scm = Arc::new(InMemoryScm::new());
        let catalog = Arc::new(ScriptedCatalog::default());
        let config = EngineConfig::new("acme", "https://backstage.test")
            .with_settings(EngineSettings {
                default_owner: Some("platform".into()),
                ..EngineSettings::default()
            })
            .with_dry_run(dry_run);
        let engine = Engine::new(config, scm.clone(), catalog.clone()).unwrap();
        (scm, catalog, engine)
    }

    #[tokio::test]
    async fn test_scheduled_run_requires_canary() {
        let (scm, _catalog, engine) = engine(false);
        scm.add_repository(sample_repository("acme", "backstage-github"));
        scm.add_repository(sample_repository("acme", "widgets"));

        let err = engine.run(RunMode::Scheduled).await.unwrap_err();
        assert!(matches!(err, EngineError::GateBlocked(_)));
        assert_eq!(scm.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_writing() {
        let (scm, _catalog, engine) = engine(true);
        scm.add_repository(sample_repository("acme", "widgets"));

        let outcome = engine.run(RunMode::Manual(None)).await.unwrap();
        assert_eq!(scm.mutating_calls(), 0);
        assert_eq!(outcome.summary.actions.len(), 1);
        assert!(outcome.summary.actions[0].action.starts_with("would propose"));
        assert!(outcome.summary.to_markdown().contains("- Dry run: yes"));
    }

    #[tokio::test]
    async fn test_merged_descriptor_is_registered() {
        let (scm, catalog, engine) = engine(false);
        scm.add_repository(sample_repository("acme", "widgets"));
        let repo = RepoRef::new("acme", "widgets");
        scm.seed_file(
            &repo,
            "main",
            "catalog-info.yaml",
            "apiVersion: backstage.io/v1alpha1\nkind: Component\nmetadata:\n  name: widgets\nspec:\n  type: service\n  lifecycle: production\n  owner: platform\n",
        );

        let outcome = engine.run(RunMode::Manual(None)).await.unwrap();
        assert_eq!(outcome.records[0].state, RepoState::Onboarded);
        assert_eq!(catalog.submissions().len(), 1);
        assert_eq!(scm.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_registration_failure_stays_pending() {
        let (scm, catalog, engine) = engine(false);
        scm.add_repository(sample_repository("acme", "widgets"));
        let repo = RepoRef::new("acme", "widgets");
        scm.seed_file(
            &repo,
            "main",
            "catalog-info.yaml",
            "apiVersion: backstage.io/v1alpha1\nkind: Component\nmetadata:\n  name: widgets\nspec:\n  type: service\n  lifecycle: production\n  owner: platform\n",
        );
        catalog.script_status(400);

        let outcome = engine.run(RunMode::Manual(None)).await.unwrap();
        assert!(matches!(
            outcome.records[0].state,
            RepoState::Failed(ref reason) if reason.starts_with("registration pending")
        ));
        assert_eq!(outcome.summary.failed, 1);
    }

    #[test]
    fn test_summary_markdown() {
        let summary = RunSummary {
            mode: RunMode::Canary("widgets".into()),
            target: "acme/widgets".into(),
            processed: 1,
            skipped: 0,
            failed: 0,
            dry_run: false,
            gate: None,
            canary_recorded: true,
            actions: vec![RepoAction {
                repo: "acme/widgets".into(),
                action: "opened PR #1 and issue #2".into(),
            }],
        };
        let markdown = summary.to_markdown();
        assert!(markdown.starts_with("## Automation Summary"));
        assert!(markdown.contains("- Mode: Canary"));
        assert!(markdown.contains("- Processed: 1, skipped: 0, failed: 0"));
        assert!(markdown.contains("- `acme/widgets`: opened PR #1 and issue #2"));
    }
}
