// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! REST clients for the source-control host (GitHub) and the catalog host
//! (Backstage)
//!
//! Each client exposes inherent methods returning [`RestClientResult`] and
//! implements the matching capability trait from `bso-host-api`, so the
//! engine never depends on HTTP details.

pub mod auth;
pub mod backstage;
pub mod error;
pub mod github;

pub use auth::*;
pub use backstage::BackstageClient;
pub use error::*;
pub use github::{DEFAULT_API_URL, GitHubClient};

use async_trait::async_trait;
use bso_host_api::*;

#[async_trait]
impl SourceControl for GitHubClient {
    #[tracing::instrument(skip(self))]
    async fn list_repositories(&self, org: &str) -> HostResult<Vec<Repository>> {
        Ok(self.list_org_repositories(org).await?)
    }

    async fn get_repository(&self, repo: &RepoRef) -> HostResult<Repository> {
        Ok(self.repository(repo).await?)
    }

    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> HostResult<Option<FileContent>> {
        Ok(self.file(repo, path, git_ref).await?)
    }

    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> HostResult<Vec<DirEntry>> {
        Ok(self.directory(repo, path, git_ref).await?)
    }

    async fn list_open_pull_requests(&self, repo: &RepoRef) -> HostResult<Vec<PullRequest>> {
        Ok(self.open_pull_requests(repo).await?)
    }

    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> HostResult<PullRequest> {
        Ok(self.pull_request(repo, number).await?)
    }

    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> HostResult<String> {
        Ok(self.branch_sha(repo, branch).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn create_branch(&self, repo: &RepoRef, branch: &str, from_sha: &str) -> HostResult<()> {
        Ok(self.create_ref(repo, branch, from_sha).await?)
    }

    #[tracing::instrument(skip(self, write), fields(path = %write.path, branch = %write.branch))]
    async fn put_file(&self, repo: &RepoRef, write: &FileWrite) -> HostResult<()> {
        Ok(self.write_file(repo, write).await?)
    }

    #[tracing::instrument(skip(self, request))]
    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &NewPullRequest,
    ) -> HostResult<PullRequest> {
        Ok(self.open_pull_request(repo, request).await?)
    }

    async fn list_open_issues(&self, repo: &RepoRef, label: &str) -> HostResult<Vec<Issue>> {
        Ok(self.open_issues(repo, label).await?)
    }

    async fn get_issue(&self, repo: &RepoRef, number: u64) -> HostResult<Issue> {
        Ok(self.issue(repo, number).await?)
    }

    #[tracing::instrument(skip(self, request))]
    async fn create_issue(&self, repo: &RepoRef, request: &NewIssue) -> HostResult<Issue> {
        Ok(self.open_issue(repo, request).await?)
    }

    #[tracing::instrument(skip(self, body))]
    async fn comment_on_issue(&self, repo: &RepoRef, number: u64, body: &str) -> HostResult<()> {
        Ok(self.comment(repo, number, body).await?)
    }

    async fn collaborator_permission(
        &self,
        repo: &RepoRef,
        login: &str,
    ) -> HostResult<Permission> {
        Ok(self.permission(repo, login).await?)
    }

    async fn get_branch_protection(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> HostResult<Option<BranchProtection>> {
        Ok(self.protection(repo, branch).await?)
    }

    #[tracing::instrument(skip(self, protection))]
    async fn update_branch_protection(
        &self,
        repo: &RepoRef,
        branch: &str,
        protection: &BranchProtection,
    ) -> HostResult<()> {
        Ok(self.set_protection(repo, branch, protection).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_branch_protection(&self, repo: &RepoRef, branch: &str) -> HostResult<()> {
        Ok(self.delete_protection(repo, branch).await?)
    }

    #[tracing::instrument(skip(self, request))]
    async fn merge_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        request: &MergeRequest,
    ) -> HostResult<MergeResult> {
        Ok(self.merge(repo, number, request).await?)
    }

    async fn commit_count(&self, repo: &RepoRef, branch: &str) -> HostResult<u64> {
        Ok(self.count_commits(repo, branch).await?)
    }

    async fn top_contributor(&self, repo: &RepoRef) -> HostResult<Option<String>> {
        Ok(self.most_active_contributor(repo).await?)
    }

    async fn user_teams(&self, org: &str, login: &str) -> HostResult<Vec<String>> {
        Ok(self.teams_of(org, login).await?)
    }
}

#[async_trait]
impl CatalogHost for BackstageClient {
    #[tracing::instrument(skip(self, descriptor_yaml), fields(catalog = %self.base_url()))]
    async fn submit_descriptor(&self, descriptor_yaml: &str) -> HostResult<CatalogResponse> {
        Ok(self.register(descriptor_yaml).await?)
    }

    async fn entity_exists(&self, key: &EntityKey) -> HostResult<bool> {
        Ok(self.exists(key).await?)
    }

    fn endpoint(&self) -> String {
        self.base_url().to_string()
    }
}
