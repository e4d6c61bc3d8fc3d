// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Capability interfaces for the two external hosts the onboarding engine
//! talks to: the source-control host (repositories, pull requests, issues,
//! branch protection) and the catalog host (entity registration).
//!
//! The engine only ever sees these traits. Production code plugs in the
//! reqwest clients from `bso-rest-client`; tests plug in the in-memory
//! fakes from `bso-host-mock` or the mockall doubles behind the `mocks`
//! feature.

pub mod error;
pub mod types;

pub use error::{HostError, HostResult};
pub use types::*;

use async_trait::async_trait;

/// Source-control host capability
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// All repositories of an organization, archived ones included
    async fn list_repositories(&self, org: &str) -> HostResult<Vec<Repository>>;

    async fn get_repository(&self, repo: &RepoRef) -> HostResult<Repository>;

    /// File content at `git_ref`, `None` when the path does not exist
    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> HostResult<Option<FileContent>>;

    /// Directory listing at `git_ref`; empty when the directory does not exist
    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> HostResult<Vec<DirEntry>>;

    async fn list_open_pull_requests(&self, repo: &RepoRef) -> HostResult<Vec<PullRequest>>;

    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> HostResult<PullRequest>;

    /// Commit sha at the tip of `branch`
    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> HostResult<String>;

    async fn create_branch(&self, repo: &RepoRef, branch: &str, from_sha: &str) -> HostResult<()>;

    /// Create or update a file; `FileWrite::sha` must carry the current blob
    /// sha when updating, otherwise the host answers with a conflict
    async fn put_file(&self, repo: &RepoRef, write: &FileWrite) -> HostResult<()>;

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &NewPullRequest,
    ) -> HostResult<PullRequest>;

    async fn list_open_issues(&self, repo: &RepoRef, label: &str) -> HostResult<Vec<Issue>>;

    async fn get_issue(&self, repo: &RepoRef, number: u64) -> HostResult<Issue>;

    async fn create_issue(&self, repo: &RepoRef, request: &NewIssue) -> HostResult<Issue>;

    async fn comment_on_issue(&self, repo: &RepoRef, number: u64, body: &str) -> HostResult<()>;

    /// Effective permission of `login` on the repository
    async fn collaborator_permission(&self, repo: &RepoRef, login: &str)
        -> HostResult<Permission>;

    /// Current protection of `branch`, `None` when the branch is unprotected
    async fn get_branch_protection(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> HostResult<Option<BranchProtection>>;

    async fn update_branch_protection(
        &self,
        repo: &RepoRef,
        branch: &str,
        protection: &BranchProtection,
    ) -> HostResult<()>;

    async fn remove_branch_protection(&self, repo: &RepoRef, branch: &str) -> HostResult<()>;

    async fn merge_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        request: &MergeRequest,
    ) -> HostResult<MergeResult>;

    /// Number of commits reachable from `branch`
    async fn commit_count(&self, repo: &RepoRef, branch: &str) -> HostResult<u64>;

    /// Login of the contributor with the most commits
    async fn top_contributor(&self, repo: &RepoRef) -> HostResult<Option<String>>;

    /// Names of the organization teams `login` belongs to
    async fn user_teams(&self, org: &str, login: &str) -> HostResult<Vec<String>>;
}

/// Catalog host capability
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait CatalogHost: Send + Sync {
    /// Submit a serialized descriptor for registration
    ///
    /// Any HTTP answer is returned as `Ok` so the caller can interpret the
    /// status; only transport failures are errors.
    async fn submit_descriptor(&self, descriptor_yaml: &str) -> HostResult<CatalogResponse>;

    /// Whether an entity with this key is already registered
    async fn entity_exists(&self, key: &EntityKey) -> HostResult<bool>;

    /// Base URL of the catalog, for reporting
    fn endpoint(&self) -> String;
}
