// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Repository Scanner
//!
//! Enumerates the repositories of an organization and classifies each one by
//! onboarding state. The scan is a lazy cursor: repositories are inspected
//! one at a time as [`Scan::next`] is called, a per-repository failure is
//! recorded in that repository's record, and a rate-limited call suspends
//! until the host's reset time before the same repository is inspected
//! again. Nothing is ever written.

use crate::config::EngineSettings;
use crate::descriptor::{GeneratedDescriptor, content_hash, generate};
use crate::error::ScanError;
use crate::facts::gather;
use crate::schema::validate_descriptor_yaml;
use bso_host_api::{
    CatalogHost, EntityKey, HostError, HostResult, RepoRef, Repository, SourceControl,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Consecutive rate-limit suspensions tolerated for a single call site
pub const MAX_RATE_LIMIT_WAITS: u32 = 5;

/// Added to the reported reset time so the retry lands after it
const RESET_SLACK: Duration = Duration::from_secs(1);

/// Onboarding state of one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "kebab-case")]
pub enum RepoState {
    /// Descriptor merged and entity registered
    Onboarded,
    /// An onboarding pull request is open
    PendingReview,
    /// Descriptor merged but the entity is not registered yet
    PendingRegistration,
    /// Nothing proposed yet
    NeedsDescriptor,
    /// A descriptor cannot be generated; the repository is skipped
    Blocked(String),
    /// A host call failed while handling this repository
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationStatus {
    Registered,
    NotRegistered,
    Unknown,
}

/// Descriptor found on the default branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingDescriptor {
    pub sha: String,
    pub content_hash: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenPullRequest {
    pub number: u64,
    pub head_ref: String,
}

/// Per-run view of one repository, always re-derived from live queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryRecord {
    pub repo: RepoRef,
    pub default_branch: String,
    pub descriptor: Option<ExistingDescriptor>,
    pub open_pr: Option<OpenPullRequest>,
    pub open_issue: Option<u64>,
    pub registration: RegistrationStatus,
    /// Freshly generated descriptor, absent when generation failed
    #[serde(skip)]
    pub generated: Option<GeneratedDescriptor>,
    #[serde(skip)]
    pub repository: Option<Repository>,
    pub state: RepoState,
}

impl RepositoryRecord {
    fn failed(repository: &Repository, error: &HostError) -> Self {
        Self {
            repo: repository.repo_ref(),
            default_branch: repository.default_branch.clone(),
            descriptor: None,
            open_pr: None,
            open_issue: None,
            registration: RegistrationStatus::Unknown,
            generated: None,
            repository: Some(repository.clone()),
            state: RepoState::Failed(error.to_string()),
        }
    }

    /// Merged descriptor differs from what would be generated today
    pub fn has_drifted(&self) -> bool {
        match (&self.descriptor, &self.generated) {
            (Some(existing), Some(generated)) => existing.content_hash != generated.content_hash,
            _ => false,
        }
    }
}

/// Which repositories a scan covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFilter {
    /// Every non-archived repository of the organization
    All,
    /// A single named repository (canary mode)
    Only(String),
}

/// Suspend until a rate limit resets
pub async fn wait_for_reset(reset_at: DateTime<Utc>) {
    let delay = (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO) + RESET_SLACK;
    tracing::warn!(reset_at = %reset_at, wait_secs = delay.as_secs(), "Rate limited, waiting for reset");
    tokio::time::sleep(delay).await;
}

/// Run `op`, suspending and retrying while the host reports rate limiting
pub async fn with_rate_limit_wait<T, F, Fut>(mut op: F) -> HostResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HostResult<T>>,
{
    let mut waits = 0;
    loop {
        match op().await {
            Err(HostError::RateLimited { reset_at }) if waits < MAX_RATE_LIMIT_WAITS => {
                waits += 1;
                wait_for_reset(reset_at).await;
            }
            other => return other,
        }
    }
}

pub struct RepositoryScanner {
    scm: Arc<dyn SourceControl>,
    catalog: Arc<dyn CatalogHost>,
    settings: EngineSettings,
    as_of: DateTime<Utc>,
}

impl RepositoryScanner {
    pub fn new(
        scm: Arc<dyn SourceControl>,
        catalog: Arc<dyn CatalogHost>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            scm,
            catalog,
            settings,
            as_of: Utc::now(),
        }
    }

    /// Reference instant used for age-based classification
    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = as_of;
        self
    }

    /// Start a scan of `org`
    #[tracing::instrument(skip(self))]
    pub async fn scan(&self, org: &str, filter: &ScanFilter) -> Result<Scan<'_>, ScanError> {
        let repositories = match filter {
            ScanFilter::All => {
                let all = with_rate_limit_wait(|| self.scm.list_repositories(org))
                    .await
                    .map_err(|source| ScanError::Listing {
                        org: org.to_string(),
                        source,
                    })?;
                all.into_iter().filter(|r| !r.archived).collect()
            }
            ScanFilter::Only(name) => {
                let repo = RepoRef::new(org, name);
                match with_rate_limit_wait(|| self.scm.get_repository(&repo)).await {
                    Ok(repository) => vec![repository],
                    Err(HostError::NotFound(_)) => {
                        return Err(ScanError::CanaryRepoNotFound(repo.to_string()));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };
        tracing::info!(count = repositories.len(), "Scanning repositories");
        Ok(Scan::resume(self, repositories, 0))
    }

    /// Inspect one repository; failures are recorded in the returned record
    #[tracing::instrument(skip(self, repository), fields(repo = %repository.full_name()))]
    pub async fn inspect(&self, repository: &Repository) -> RepositoryRecord {
        let mut waits = 0;
        loop {
            match self.try_inspect(repository).await {
                Ok(record) => {
                    tracing::debug!(state = ?record.state, "Inspected repository");
                    return record;
                }
                Err(HostError::RateLimited { reset_at }) if waits < MAX_RATE_LIMIT_WAITS => {
                    waits += 1;
                    wait_for_reset(reset_at).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Repository inspection failed");
                    return RepositoryRecord::failed(repository, &e);
                }
            }
        }
    }

    async fn try_inspect(&self, repository: &Repository) -> HostResult<RepositoryRecord> {
        let repo = repository.repo_ref();
        let branch = &repository.default_branch;

        let facts = gather(self.scm.as_ref(), repository, self.as_of).await?;
        let generated = generate(&facts, &self.settings);

        let descriptor = self
            .scm
            .get_file(&repo, &self.settings.descriptor_path, branch)
            .await?
            .map(|file| ExistingDescriptor {
                sha: file.sha,
                content_hash: content_hash(&file.content),
                content: file.content,
            });

        let open_pr = self
            .scm
            .list_open_pull_requests(&repo)
            .await?
            .into_iter()
            .filter(|pr| self.settings.is_onboarding_branch(&pr.head_ref))
            .min_by_key(|pr| pr.number)
            .map(|pr| OpenPullRequest {
                number: pr.number,
                head_ref: pr.head_ref,
            });

        let open_issue = self
            .scm
            .list_open_issues(&repo, &self.settings.tracking_label)
            .await?
            .into_iter()
            .map(|issue| issue.number)
            .min();

        // The merged descriptor's identity wins over a regenerated one
        let key = descriptor
            .as_ref()
            .and_then(|d| validate_descriptor_yaml(&d.content).ok())
            .and_then(|keys| keys.into_iter().next())
            .or_else(|| {
                generated
                    .as_ref()
                    .ok()
                    .map(|g| g.descriptor.component.key())
            });
        let registration = match &key {
            Some(key) => self.registration_of(key).await,
            None => RegistrationStatus::Unknown,
        };

        let state = match (&descriptor, &open_pr, &generated) {
            (_, Some(_), _) => RepoState::PendingReview,
            (Some(_), None, _) if registration == RegistrationStatus::Registered => {
                RepoState::Onboarded
            }
            (Some(_), None, _) => RepoState::PendingRegistration,
            (None, None, Err(e)) => RepoState::Blocked(e.to_string()),
            (None, None, Ok(_)) => RepoState::NeedsDescriptor,
        };

        Ok(RepositoryRecord {
            repo,
            default_branch: branch.clone(),
            descriptor,
            open_pr,
            open_issue,
            registration,
            generated: generated.ok(),
            repository: Some(repository.clone()),
            state,
        })
    }

    async fn registration_of(&self, key: &EntityKey) -> RegistrationStatus {
        match self.catalog.entity_exists(key).await {
            Ok(true) => RegistrationStatus::Registered,
            Ok(false) => RegistrationStatus::NotRegistered,
            Err(e) => {
                tracing::warn!(entity = %key, error = %e, "Catalog lookup failed");
                RegistrationStatus::Unknown
            }
        }
    }
}

/// Lazy, restartable cursor over the repositories of a scan
pub struct Scan<'a> {
    scanner: &'a RepositoryScanner,
    repositories: Vec<Repository>,
    pending: VecDeque<usize>,
}

impl<'a> Scan<'a> {
    /// Continue a scan at `position` (the number of repositories already processed)
    pub fn resume(scanner: &'a RepositoryScanner, repositories: Vec<Repository>, position: usize) -> Self {
        let pending = (position.min(repositories.len())..repositories.len()).collect();
        Self {
            scanner,
            repositories,
            pending,
        }
    }

    /// Inspect the next repository, `None` once all are done
    pub async fn next(&mut self) -> Option<RepositoryRecord> {
        let index = self.pending.pop_front()?;
        Some(self.scanner.inspect(&self.repositories[index]).await)
    }

    /// Number of repositories already handed out
    pub fn position(&self) -> usize {
        self.repositories.len() - self.pending.len()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn total(&self) -> usize {
        self.repositories.len()
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bso_host_mock::{InMemoryScm, ScriptedCatalog, sample_repository};

    fn setup() -> (Arc<InMemoryScm>, Arc<ScriptedCatalog>, RepositoryScanner) {
        let scm = Arc::new(InMemoryScm::new());
        let catalog = Arc::new(ScriptedCatalog::default());
        let settings = EngineSettings {
            default_owner: Some("platform".into()),
            ..EngineSettings::default()
        };
        let scanner = RepositoryScanner::new(scm.clone(), catalog.clone(), settings);
        (scm, catalog, scanner)
    }

    #[tokio::test]
    async fn test_states_are_derived_from_live_queries() {
        let (scm, catalog, scanner) = setup();
        for name in ["fresh", "merged", "registered", "reviewing"] {
            scm.add_repository(sample_repository("acme", name));
        }
        let merged = RepoRef::new("acme", "merged");
        let registered = RepoRef::new("acme", "registered");
        let reviewing = RepoRef::new("acme", "reviewing");
        let descriptor = |name: &str| {
            format!(
                "apiVersion: backstage.io/v1alpha1\nkind: Component\nmetadata:\n  name: {}\nspec:\n  type: service\n  lifecycle: production\n  owner: platform\n",
                name
            )
        };
        scm.seed_file(&merged, "main", "catalog-info.yaml", &descriptor("merged"));
        scm.seed_file(&registered, "main", "catalog-info.yaml", &descriptor("registered"));
        catalog.register(EntityKey::new("Component", "default", "registered"));
        let pr = scm.seed_pull_request(&reviewing, "main", "backstage-integration-1", &[]);

        let mut scan = scanner.scan("acme", &ScanFilter::All).await.unwrap();
        let mut states = Vec::new();
        while let Some(record) = scan.next().await {
            states.push((record.repo.name.clone(), record.state.clone(), record.open_pr));
        }
        assert_eq!(
            states,
            vec![
                ("fresh".to_string(), RepoState::NeedsDescriptor, None),
                ("merged".to_string(), RepoState::PendingRegistration, None),
                ("registered".to_string(), RepoState::Onboarded, None),
                (
                    "reviewing".to_string(),
                    RepoState::PendingReview,
                    Some(OpenPullRequest {
                        number: pr,
                        head_ref: "backstage-integration-1".to_string()
                    })
                ),
            ]
        );
        assert_eq!(scm.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_archived_repositories_are_not_enumerated() {
        let (scm, _catalog, scanner) = setup();
        let mut archived = sample_repository("acme", "old");
        archived.archived = true;
        scm.add_repository(archived);
        scm.add_repository(sample_repository("acme", "live"));
        let scan = scanner.scan("acme", &ScanFilter::All).await.unwrap();
        assert_eq!(scan.total(), 1);
        assert_eq!(scan.repositories()[0].name, "live");
    }

    #[tokio::test]
    async fn test_ungeneratable_repository_is_blocked_not_fatal() {
        let scm = Arc::new(InMemoryScm::new());
        let catalog = Arc::new(ScriptedCatalog::default());
        let scanner = RepositoryScanner::new(scm.clone(), catalog, EngineSettings::default());
        scm.add_repository(sample_repository("acme", "ownerless"));
        scm.add_repository(sample_repository("acme", "owned"));
        scm.set_top_contributor(&RepoRef::new("acme", "owned"), "alice");

        let mut scan = scanner.scan("acme", &ScanFilter::All).await.unwrap();
        let first = scan.next().await.unwrap();
        assert!(matches!(first.state, RepoState::Blocked(ref reason) if reason.contains("owner")));
        let second = scan.next().await.unwrap();
        assert_eq!(second.state, RepoState::NeedsDescriptor);
        assert!(scan.next().await.is_none());
    }

    #[tokio::test]
    async fn test_host_failure_is_recorded_and_scan_continues() {
        let (scm, _catalog, scanner) = setup();
        scm.add_repository(sample_repository("acme", "a"));
        scm.add_repository(sample_repository("acme", "b"));
        scm.fail_next("list_directory", HostError::Transport("connection reset".into()));

        let mut scan = scanner.scan("acme", &ScanFilter::All).await.unwrap();
        let a = scan.next().await.unwrap();
        assert!(matches!(a.state, RepoState::Failed(ref e) if e.contains("connection reset")));
        let b = scan.next().await.unwrap();
        assert_eq!(b.state, RepoState::NeedsDescriptor);
    }

    #[tokio::test]
    async fn test_single_repository_filter() {
        let (scm, _catalog, scanner) = setup();
        scm.add_repository(sample_repository("acme", "a"));
        scm.add_repository(sample_repository("acme", "canary"));
        let scan = scanner
            .scan("acme", &ScanFilter::Only("canary".into()))
            .await
            .unwrap();
        assert_eq!(scan.total(), 1);
        assert!(matches!(
            scanner.scan("acme", &ScanFilter::Only("missing".into())).await,
            Err(ScanError::CanaryRepoNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_skips_processed_repositories() {
        let (scm, _catalog, scanner) = setup();
        for name in ["a", "b", "c"] {
            scm.add_repository(sample_repository("acme", name));
        }
        let mut scan = scanner.scan("acme", &ScanFilter::All).await.unwrap();
        scan.next().await.unwrap();
        let position = scan.position();
        let repositories = scan.repositories().to_vec();

        let mut resumed = Scan::resume(&scanner, repositories, position);
        assert_eq!(resumed.remaining(), 2);
        assert_eq!(resumed.next().await.unwrap().repo.name, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_waits_out_rate_limit() {
        let (scm, _catalog, scanner) = setup();
        scm.add_repository(sample_repository("acme", "a"));
        scm.fail_next(
            "list_repositories",
            HostError::RateLimited {
                reset_at: Utc::now() + chrono::Duration::seconds(30),
            },
        );
        let scan = scanner.scan("acme", &ScanFilter::All).await.unwrap();
        assert_eq!(scan.total(), 1);
        assert_eq!(scm.calls_for("list_repositories"), 2);
    }
}
