// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory source-control host

use async_trait::async_trait;
use bso_host_api::*;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

/// One recorded capability call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: &'static str,
    pub repo: Option<String>,
    pub mutating: bool,
}

type BranchKey = (String, String);

#[derive(Debug, Default)]
struct StoredFile {
    sha: String,
    content: String,
}

#[derive(Debug, Default)]
struct ScmState {
    repos: Vec<Repository>,
    /// (repo, branch) -> path -> file
    files: BTreeMap<BranchKey, BTreeMap<String, StoredFile>>,
    heads: BTreeMap<BranchKey, String>,
    pulls: BTreeMap<String, Vec<PullRequest>>,
    issues: BTreeMap<String, Vec<Issue>>,
    comments: BTreeMap<(String, u64), Vec<String>>,
    protections: BTreeMap<BranchKey, BranchProtection>,
    permissions: BTreeMap<(String, String), Permission>,
    commit_counts: BTreeMap<String, u64>,
    contributors: BTreeMap<String, String>,
    teams: BTreeMap<String, Vec<String>>,
    next_number: BTreeMap<String, u64>,
    sha_counter: u64,
    /// Repositories that answer their next call with a rate-limit error
    rate_limits: HashMap<String, DateTime<Utc>>,
    /// Operations that fail once with the given error
    failures: HashMap<&'static str, HostError>,
    calls: Vec<Call>,
}

impl ScmState {
    fn next_sha(&mut self) -> String {
        self.sha_counter += 1;
        format!("{:040x}", self.sha_counter)
    }

    fn next_number(&mut self, repo: &str) -> u64 {
        let n = self.next_number.entry(repo.to_string()).or_insert(0);
        *n += 1;
        *n
    }
}

/// Repository metadata with neutral defaults
pub fn sample_repository(owner: &str, name: &str) -> Repository {
    Repository {
        owner: owner.to_string(),
        name: name.to_string(),
        default_branch: "main".to_string(),
        description: None,
        language: None,
        topics: Vec::new(),
        archived: false,
        private: false,
        html_url: format!("https://github.com/{}/{}", owner, name),
        homepage: None,
        stargazers_count: 0,
        forks_count: 0,
        created_at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        pushed_at: None,
    }
}

/// Source-control fake keeping everything in memory
#[derive(Debug, Default)]
pub struct InMemoryScm {
    state: Mutex<ScmState>,
}

impl InMemoryScm {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScmState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a call and apply any fault injected for it
    fn enter(
        &self,
        operation: &'static str,
        repo: Option<&RepoRef>,
        mutating: bool,
    ) -> HostResult<MutexGuard<'_, ScmState>> {
        let mut state = self.lock();
        let repo_name = repo.map(|r| r.to_string());
        state.calls.push(Call {
            operation,
            repo: repo_name.clone(),
            mutating,
        });
        if let Some(name) = &repo_name {
            if let Some(reset_at) = state.rate_limits.remove(name) {
                return Err(HostError::RateLimited { reset_at });
            }
        }
        if let Some(err) = state.failures.remove(operation) {
            return Err(err);
        }
        Ok(state)
    }

    // Seeding

    /// Add a repository with an empty default branch
    pub fn add_repository(&self, repo: Repository) {
        let mut state = self.lock();
        let key = (repo.full_name(), repo.default_branch.clone());
        let sha = state.next_sha();
        state.heads.insert(key.clone(), sha);
        state.files.entry(key).or_default();
        state.repos.push(repo);
    }

    /// Write a file directly, bypassing calls and faults
    pub fn seed_file(&self, repo: &RepoRef, branch: &str, path: &str, content: &str) {
        let mut state = self.lock();
        let sha = state.next_sha();
        let key = (repo.to_string(), branch.to_string());
        state.heads.insert(key.clone(), sha.clone());
        state.files.entry(key).or_default().insert(
            path.to_string(),
            StoredFile {
                sha,
                content: content.to_string(),
            },
        );
    }

    /// Create a branch off `base` carrying `files`, and an open pull request for it
    pub fn seed_pull_request(
        &self,
        repo: &RepoRef,
        base: &str,
        head: &str,
        files: &[(&str, &str)],
    ) -> u64 {
        {
            let mut state = self.lock();
            let base_key = (repo.to_string(), base.to_string());
            let copied: BTreeMap<String, StoredFile> = state
                .files
                .get(&base_key)
                .map(|files| {
                    files
                        .iter()
                        .map(|(p, f)| {
                            (
                                p.clone(),
                                StoredFile {
                                    sha: f.sha.clone(),
                                    content: f.content.clone(),
                                },
                            )
                        })
                        .collect()
                })
                .unwrap_or_default();
            state.files.insert((repo.to_string(), head.to_string()), copied);
        }
        for (path, content) in files {
            self.seed_file(repo, head, path, content);
        }

        let mut state = self.lock();
        let number = state.next_number(&repo.to_string());
        let head_sha = state
            .heads
            .get(&(repo.to_string(), head.to_string()))
            .cloned()
            .unwrap_or_default();
        state.pulls.entry(repo.to_string()).or_default().push(PullRequest {
            number,
            title: "Add Backstage Integration".to_string(),
            head_ref: head.to_string(),
            head_sha,
            base_ref: base.to_string(),
            state: PullRequestState::Open,
        });
        number
    }

    pub fn seed_issue(&self, repo: &RepoRef, title: &str, body: &str, labels: &[&str]) -> u64 {
        let mut state = self.lock();
        let number = state.next_number(&repo.to_string());
        state.issues.entry(repo.to_string()).or_default().push(Issue {
            number,
            title: title.to_string(),
            body: Some(body.to_string()),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            open: true,
        });
        number
    }

    pub fn set_protection(&self, repo: &RepoRef, branch: &str, protection: BranchProtection) {
        self.lock()
            .protections
            .insert((repo.to_string(), branch.to_string()), protection);
    }

    pub fn set_permission(&self, repo: &RepoRef, login: &str, permission: Permission) {
        self.lock()
            .permissions
            .insert((repo.to_string(), login.to_string()), permission);
    }

    pub fn set_commit_count(&self, repo: &RepoRef, count: u64) {
        self.lock().commit_counts.insert(repo.to_string(), count);
    }

    pub fn set_top_contributor(&self, repo: &RepoRef, login: &str) {
        self.lock()
            .contributors
            .insert(repo.to_string(), login.to_string());
    }

    pub fn set_user_teams(&self, login: &str, teams: &[&str]) {
        self.lock().teams.insert(
            login.to_string(),
            teams.iter().map(|t| t.to_string()).collect(),
        );
    }

    // Faults

    /// The next call touching `repo` fails with a rate-limit error
    pub fn rate_limit_next_call(&self, repo: &RepoRef, reset_at: DateTime<Utc>) {
        self.lock().rate_limits.insert(repo.to_string(), reset_at);
    }

    /// The next call of `operation` (trait method name) fails with `error`
    pub fn fail_next(&self, operation: &'static str, error: HostError) {
        self.lock().failures.insert(operation, error);
    }

    // Inspection

    pub fn file(&self, repo: &RepoRef, branch: &str, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(&(repo.to_string(), branch.to_string()))
            .and_then(|files| files.get(path))
            .map(|f| f.content.clone())
    }

    pub fn branches(&self, repo: &RepoRef) -> Vec<String> {
        let repo = repo.to_string();
        self.lock()
            .heads
            .keys()
            .filter(|(r, _)| *r == repo)
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub fn pull_requests(&self, repo: &RepoRef) -> Vec<PullRequest> {
        self.lock()
            .pulls
            .get(&repo.to_string())
            .cloned()
            .unwrap_or_default()
    }

    pub fn issues(&self, repo: &RepoRef) -> Vec<Issue> {
        self.lock()
            .issues
            .get(&repo.to_string())
            .cloned()
            .unwrap_or_default()
    }

    pub fn comments(&self, repo: &RepoRef, number: u64) -> Vec<String> {
        self.lock()
            .comments
            .get(&(repo.to_string(), number))
            .cloned()
            .unwrap_or_default()
    }

    pub fn protection(&self, repo: &RepoRef, branch: &str) -> Option<BranchProtection> {
        self.lock()
            .protections
            .get(&(repo.to_string(), branch.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of write attempts made so far
    pub fn mutating_calls(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.mutating).count()
    }

    pub fn calls_for(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }
}

fn not_found(what: impl std::fmt::Display) -> HostError {
    HostError::NotFound(what.to_string())
}

#[async_trait]
impl SourceControl for InMemoryScm {
    async fn list_repositories(&self, org: &str) -> HostResult<Vec<Repository>> {
        let state = self.enter("list_repositories", None, false)?;
        Ok(state
            .repos
            .iter()
            .filter(|r| r.owner == org)
            .cloned()
            .collect())
    }

    async fn get_repository(&self, repo: &RepoRef) -> HostResult<Repository> {
        let state = self.enter("get_repository", Some(repo), false)?;
        state
            .repos
            .iter()
            .find(|r| r.repo_ref() == *repo)
            .cloned()
            .ok_or_else(|| not_found(repo))
    }

    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> HostResult<Option<FileContent>> {
        let state = self.enter("get_file", Some(repo), false)?;
        Ok(state
            .files
            .get(&(repo.to_string(), git_ref.to_string()))
            .and_then(|files| files.get(path))
            .map(|f| FileContent {
                path: path.to_string(),
                sha: f.sha.clone(),
                content: f.content.clone(),
            }))
    }

    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> HostResult<Vec<DirEntry>> {
        let state = self.enter("list_directory", Some(repo), false)?;
        let prefix = match path.trim_matches('/') {
            "" => String::new(),
            p => format!("{}/", p),
        };
        let Some(files) = state.files.get(&(repo.to_string(), git_ref.to_string())) else {
            return Ok(Vec::new());
        };

        let mut seen = BTreeSet::new();
        let mut entries = Vec::new();
        for file_path in files.keys() {
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                continue;
            };
            let (name, kind) = match rest.split_once('/') {
                Some((dir, _)) => (dir, EntryKind::Dir),
                None => (rest, EntryKind::File),
            };
            if seen.insert(name.to_string()) {
                entries.push(DirEntry {
                    name: name.to_string(),
                    path: format!("{}{}", prefix, name),
                    kind,
                });
            }
        }
        Ok(entries)
    }

    async fn list_open_pull_requests(&self, repo: &RepoRef) -> HostResult<Vec<PullRequest>> {
        let state = self.enter("list_open_pull_requests", Some(repo), false)?;
        Ok(state
            .pulls
            .get(&repo.to_string())
            .map(|prs| {
                prs.iter()
                    .filter(|p| p.state == PullRequestState::Open)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> HostResult<PullRequest> {
        let state = self.enter("get_pull_request", Some(repo), false)?;
        state
            .pulls
            .get(&repo.to_string())
            .and_then(|prs| prs.iter().find(|p| p.number == number))
            .cloned()
            .ok_or_else(|| not_found(format!("{} PR #{}", repo, number)))
    }

    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> HostResult<String> {
        let state = self.enter("branch_head", Some(repo), false)?;
        state
            .heads
            .get(&(repo.to_string(), branch.to_string()))
            .cloned()
            .ok_or_else(|| not_found(format!("{} branch {}", repo, branch)))
    }

    async fn create_branch(&self, repo: &RepoRef, branch: &str, from_sha: &str) -> HostResult<()> {
        let mut state = self.enter("create_branch", Some(repo), true)?;
        let repo_name = repo.to_string();
        let key = (repo_name.clone(), branch.to_string());
        if state.heads.contains_key(&key) {
            return Err(HostError::Unprocessable("Reference already exists".to_string()));
        }
        let source = state
            .heads
            .iter()
            .find(|((r, _), sha)| *r == repo_name && sha.as_str() == from_sha)
            .map(|(k, _)| k.clone())
            .ok_or_else(|| not_found(format!("commit {}", from_sha)))?;
        let copied: BTreeMap<String, StoredFile> = state
            .files
            .get(&source)
            .map(|files| {
                files
                    .iter()
                    .map(|(p, f)| {
                        (
                            p.clone(),
                            StoredFile {
                                sha: f.sha.clone(),
                                content: f.content.clone(),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        state.files.insert(key.clone(), copied);
        state.heads.insert(key, from_sha.to_string());
        Ok(())
    }

    async fn put_file(&self, repo: &RepoRef, write: &FileWrite) -> HostResult<()> {
        let mut state = self.enter("put_file", Some(repo), true)?;
        let key = (repo.to_string(), write.branch.clone());
        if !state.heads.contains_key(&key) {
            return Err(not_found(format!("{} branch {}", repo, write.branch)));
        }
        let current = state
            .files
            .get(&key)
            .and_then(|files| files.get(&write.path))
            .map(|f| f.sha.clone());
        if current != write.sha {
            return Err(HostError::Conflict(format!(
                "{} does not match the expected blob",
                write.path
            )));
        }
        let sha = state.next_sha();
        state.heads.insert(key.clone(), sha.clone());
        state.files.entry(key).or_default().insert(
            write.path.clone(),
            StoredFile {
                sha: sha.clone(),
                content: write.content.clone(),
            },
        );
        let repo_name = repo.to_string();
        if let Some(prs) = state.pulls.get_mut(&repo_name) {
            for pr in prs.iter_mut().filter(|p| p.head_ref == write.branch) {
                pr.head_sha = sha.clone();
            }
        }
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &NewPullRequest,
    ) -> HostResult<PullRequest> {
        let mut state = self.enter("create_pull_request", Some(repo), true)?;
        let head_sha = state
            .heads
            .get(&(repo.to_string(), request.head.clone()))
            .cloned()
            .ok_or_else(|| not_found(format!("{} branch {}", repo, request.head)))?;
        let number = state.next_number(&repo.to_string());
        let pr = PullRequest {
            number,
            title: request.title.clone(),
            head_ref: request.head.clone(),
            head_sha,
            base_ref: request.base.clone(),
            state: PullRequestState::Open,
        };
        state
            .pulls
            .entry(repo.to_string())
            .or_default()
            .push(pr.clone());
        Ok(pr)
    }

    async fn list_open_issues(&self, repo: &RepoRef, label: &str) -> HostResult<Vec<Issue>> {
        let state = self.enter("list_open_issues", Some(repo), false)?;
        Ok(state
            .issues
            .get(&repo.to_string())
            .map(|issues| {
                issues
                    .iter()
                    .filter(|i| i.open && i.labels.iter().any(|l| l == label))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_issue(&self, repo: &RepoRef, number: u64) -> HostResult<Issue> {
        let state = self.enter("get_issue", Some(repo), false)?;
        state
            .issues
            .get(&repo.to_string())
            .and_then(|issues| issues.iter().find(|i| i.number == number))
            .cloned()
            .ok_or_else(|| not_found(format!("{} issue #{}", repo, number)))
    }

    async fn create_issue(&self, repo: &RepoRef, request: &NewIssue) -> HostResult<Issue> {
        let mut state = self.enter("create_issue", Some(repo), true)?;
        let number = state.next_number(&repo.to_string());
        let issue = Issue {
            number,
            title: request.title.clone(),
            body: Some(request.body.clone()),
            labels: request.labels.clone(),
            open: true,
        };
        state
            .issues
            .entry(repo.to_string())
            .or_default()
            .push(issue.clone());
        Ok(issue)
    }

    async fn comment_on_issue(&self, repo: &RepoRef, number: u64, body: &str) -> HostResult<()> {
        let mut state = self.enter("comment_on_issue", Some(repo), true)?;
        state
            .comments
            .entry((repo.to_string(), number))
            .or_default()
            .push(body.to_string());
        Ok(())
    }

    async fn collaborator_permission(
        &self,
        repo: &RepoRef,
        login: &str,
    ) -> HostResult<Permission> {
        let state = self.enter("collaborator_permission", Some(repo), false)?;
        Ok(state
            .permissions
            .get(&(repo.to_string(), login.to_string()))
            .copied()
            .unwrap_or(Permission::None))
    }

    async fn get_branch_protection(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> HostResult<Option<BranchProtection>> {
        let state = self.enter("get_branch_protection", Some(repo), false)?;
        Ok(state
            .protections
            .get(&(repo.to_string(), branch.to_string()))
            .cloned())
    }

    async fn update_branch_protection(
        &self,
        repo: &RepoRef,
        branch: &str,
        protection: &BranchProtection,
    ) -> HostResult<()> {
        let mut state = self.enter("update_branch_protection", Some(repo), true)?;
        state
            .protections
            .insert((repo.to_string(), branch.to_string()), protection.clone());
        Ok(())
    }

    async fn remove_branch_protection(&self, repo: &RepoRef, branch: &str) -> HostResult<()> {
        let mut state = self.enter("remove_branch_protection", Some(repo), true)?;
        state
            .protections
            .remove(&(repo.to_string(), branch.to_string()));
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        request: &MergeRequest,
    ) -> HostResult<MergeResult> {
        let mut state = self.enter("merge_pull_request", Some(repo), true)?;
        let repo_name = repo.to_string();
        let pr = state
            .pulls
            .get(&repo_name)
            .and_then(|prs| prs.iter().find(|p| p.number == number))
            .cloned()
            .ok_or_else(|| not_found(format!("{} PR #{}", repo, number)))?;
        if pr.state != PullRequestState::Open {
            return Err(HostError::Unprocessable(format!(
                "PR #{} is not open",
                number
            )));
        }
        if state
            .protections
            .contains_key(&(repo_name.clone(), pr.base_ref.clone()))
        {
            return Err(HostError::Unprocessable(format!(
                "{} is protected",
                pr.base_ref
            )));
        }

        let head_files: Vec<(String, String)> = state
            .files
            .get(&(repo_name.clone(), pr.head_ref.clone()))
            .map(|files| {
                files
                    .iter()
                    .map(|(p, f)| (p.clone(), f.content.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let sha = state.next_sha();
        let base_key = (repo_name.clone(), pr.base_ref.clone());
        let base = state.files.entry(base_key.clone()).or_default();
        for (path, content) in head_files {
            base.insert(
                path,
                StoredFile {
                    sha: sha.clone(),
                    content,
                },
            );
        }
        state.heads.insert(base_key, sha.clone());
        if let Some(prs) = state.pulls.get_mut(&repo_name) {
            if let Some(p) = prs.iter_mut().find(|p| p.number == number) {
                p.state = PullRequestState::Merged;
            }
        }
        Ok(MergeResult {
            merged: true,
            sha: Some(sha),
            message: format!("{} ({:?})", request.commit_title, request.method),
        })
    }

    async fn commit_count(&self, repo: &RepoRef, _branch: &str) -> HostResult<u64> {
        let state = self.enter("commit_count", Some(repo), false)?;
        Ok(state.commit_counts.get(&repo.to_string()).copied().unwrap_or(0))
    }

    async fn top_contributor(&self, repo: &RepoRef) -> HostResult<Option<String>> {
        let state = self.enter("top_contributor", Some(repo), false)?;
        Ok(state.contributors.get(&repo.to_string()).cloned())
    }

    async fn user_teams(&self, _org: &str, login: &str) -> HostResult<Vec<String>> {
        let state = self.enter("user_teams", None, false)?;
        Ok(state.teams.get(login).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoRef {
        RepoRef::new("acme", "widgets")
    }

    fn scm() -> InMemoryScm {
        let scm = InMemoryScm::new();
        scm.add_repository(sample_repository("acme", "widgets"));
        scm
    }

    #[tokio::test]
    async fn test_branch_pr_and_merge_flow() {
        let scm = scm();
        scm.seed_file(&repo(), "main", "README.md", "hi");
        let head = scm.branch_head(&repo(), "main").await.unwrap();
        scm.create_branch(&repo(), "feature", &head).await.unwrap();
        scm.put_file(
            &repo(),
            &FileWrite {
                path: "catalog-info.yaml".into(),
                branch: "feature".into(),
                message: "add".into(),
                content: "kind: Component".into(),
                sha: None,
            },
        )
        .await
        .unwrap();
        let pr = scm
            .create_pull_request(
                &repo(),
                &NewPullRequest {
                    title: "t".into(),
                    body: "b".into(),
                    head: "feature".into(),
                    base: "main".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(scm.file(&repo(), "feature", "README.md").as_deref(), Some("hi"));
        assert!(scm.file(&repo(), "main", "catalog-info.yaml").is_none());

        let request = MergeRequest {
            method: MergeMethod::Squash,
            commit_title: "merge".into(),
            commit_message: "m".into(),
        };
        assert!(scm.merge_pull_request(&repo(), pr.number, &request).await.unwrap().merged);
        assert_eq!(
            scm.file(&repo(), "main", "catalog-info.yaml").as_deref(),
            Some("kind: Component")
        );
        assert!(scm.list_open_pull_requests(&repo()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_sha_is_a_conflict() {
        let scm = scm();
        scm.seed_file(&repo(), "main", "a.txt", "1");
        let result = scm
            .put_file(
                &repo(),
                &FileWrite {
                    path: "a.txt".into(),
                    branch: "main".into(),
                    message: "m".into(),
                    content: "2".into(),
                    sha: Some("stale".into()),
                },
            )
            .await;
        assert!(matches!(result, Err(HostError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_protected_base_refuses_merge() {
        let scm = scm();
        let pr = scm.seed_pull_request(&repo(), "main", "feature", &[("x", "y")]);
        scm.set_protection(&repo(), "main", BranchProtection::default());
        let request = MergeRequest {
            method: MergeMethod::Squash,
            commit_title: "t".into(),
            commit_message: "m".into(),
        };
        let result = scm.merge_pull_request(&repo(), pr, &request).await;
        assert!(matches!(result, Err(HostError::Unprocessable(_))));
    }

    #[tokio::test]
    async fn test_injected_faults_fire_once() {
        let scm = scm();
        let reset_at = Utc::now();
        scm.rate_limit_next_call(&repo(), reset_at);
        assert!(matches!(
            scm.get_repository(&repo()).await,
            Err(HostError::RateLimited { .. })
        ));
        assert!(scm.get_repository(&repo()).await.is_ok());

        scm.fail_next("comment_on_issue", HostError::Transport("down".into()));
        assert!(scm.comment_on_issue(&repo(), 1, "x").await.is_err());
        assert!(scm.comment_on_issue(&repo(), 1, "x").await.is_ok());
        assert_eq!(scm.mutating_calls(), 2);
    }

    #[tokio::test]
    async fn test_directory_listing_synthesizes_dirs() {
        let scm = scm();
        scm.seed_file(&repo(), "main", "docs/index.md", "x");
        scm.seed_file(&repo(), "main", "api/openapi.yaml", "x");
        scm.seed_file(&repo(), "main", "Cargo.toml", "x");
        let root = scm.list_directory(&repo(), "", "main").await.unwrap();
        let names: Vec<_> = root.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("Cargo.toml", EntryKind::File),
                ("api", EntryKind::Dir),
                ("docs", EntryKind::Dir)
            ]
        );
        let api = scm.list_directory(&repo(), "api", "main").await.unwrap();
        assert_eq!(api[0].path, "api/openapi.yaml");
    }
}
