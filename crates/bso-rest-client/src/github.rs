// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! GitHub REST API client

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bso_host_api::{
    BranchProtection, DirEntry, EntryKind, FileContent, FileWrite, Issue, MergeMethod,
    MergeRequest, MergeResult, NewIssue, NewPullRequest, Permission, PullRequest,
    PullRequestState, PushRestrictions, RepoRef, Repository, RequiredReviews,
    RequiredStatusChecks,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client as HttpClient, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::AuthConfig;
use crate::error::{RestClientError, RestClientResult};

/// Public GitHub API endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = "Backstage-Automation";
const PAGE_SIZE: usize = 100;
/// Back-off applied when a 429 carries no reset hint
const DEFAULT_RETRY_AFTER_SECS: i64 = 60;

/// GitHub REST client
///
/// `api_base` may carry a path prefix, as GitHub Enterprise installations
/// serve the API under `/api/v3`.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http_client: HttpClient,
    api_base: String,
    auth: AuthConfig,
}

impl GitHubClient {
    pub fn new(api_base: &str, auth: AuthConfig) -> RestClientResult<Self> {
        Url::parse(api_base)?;
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        default_headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http_client = HttpClient::builder()
            .user_agent(USER_AGENT)
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    pub async fn list_org_repositories(&self, org: &str) -> RestClientResult<Vec<Repository>> {
        let path = format!("/orgs/{}/repos?type=all&per_page={}", org, PAGE_SIZE);
        let repos: Vec<GhRepository> = self.get_all(&path).await?;
        tracing::debug!(org = %org, count = repos.len(), "Listed organization repositories");
        Ok(repos.into_iter().map(Repository::from).collect())
    }

    pub async fn repository(&self, repo: &RepoRef) -> RestClientResult<Repository> {
        let gh: GhRepository = self.get(&format!("/repos/{}", repo)).await?;
        Ok(gh.into())
    }

    pub async fn file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> RestClientResult<Option<FileContent>> {
        let url = format!("/repos/{}/contents/{}?ref={}", repo, path, git_ref);
        let contents: GhContents = match self.get(&url).await {
            Ok(contents) => contents,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        match contents {
            GhContents::File(file) => {
                let content = decode_content(&file.content)?;
                Ok(Some(FileContent {
                    path: file.path,
                    sha: file.sha,
                    content,
                }))
            }
            GhContents::Dir(_) => Ok(None),
        }
    }

    pub async fn directory(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> RestClientResult<Vec<DirEntry>> {
        let path = path.trim_matches('/');
        let url = format!("/repos/{}/contents/{}?ref={}", repo, path, git_ref);
        match self.get::<GhContents>(&url).await {
            Ok(GhContents::Dir(entries)) => Ok(entries
                .into_iter()
                .map(|e| DirEntry {
                    kind: if e.kind == "dir" {
                        EntryKind::Dir
                    } else {
                        EntryKind::File
                    },
                    name: e.name,
                    path: e.path,
                })
                .collect()),
            Ok(GhContents::File(_)) => Ok(Vec::new()),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn open_pull_requests(&self, repo: &RepoRef) -> RestClientResult<Vec<PullRequest>> {
        let url = format!("/repos/{}/pulls?state=open&per_page={}", repo, PAGE_SIZE);
        let prs: Vec<GhPullRequest> = self.get_all(&url).await?;
        Ok(prs.into_iter().map(PullRequest::from).collect())
    }

    pub async fn pull_request(&self, repo: &RepoRef, number: u64) -> RestClientResult<PullRequest> {
        let pr: GhPullRequest = self.get(&format!("/repos/{}/pulls/{}", repo, number)).await?;
        Ok(pr.into())
    }

    pub async fn branch_sha(&self, repo: &RepoRef, branch: &str) -> RestClientResult<String> {
        let git_ref: GhGitRef = self
            .get(&format!("/repos/{}/git/ref/heads/{}", repo, branch))
            .await?;
        Ok(git_ref.object.sha)
    }

    pub async fn create_ref(&self, repo: &RepoRef, branch: &str, sha: &str) -> RestClientResult<()> {
        let body = serde_json::json!({
            "ref": format!("refs/heads/{}", branch),
            "sha": sha,
        });
        let _: serde_json::Value = self
            .request(Method::POST, &format!("/repos/{}/git/refs", repo), Some(&body))
            .await?;
        Ok(())
    }

    pub async fn write_file(&self, repo: &RepoRef, write: &FileWrite) -> RestClientResult<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            message: &'a str,
            content: String,
            branch: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            sha: Option<&'a str>,
        }
        let body = Body {
            message: &write.message,
            content: BASE64.encode(write.content.as_bytes()),
            branch: &write.branch,
            sha: write.sha.as_deref(),
        };
        let _: serde_json::Value = self
            .request(
                Method::PUT,
                &format!("/repos/{}/contents/{}", repo, write.path),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    pub async fn open_pull_request(
        &self,
        repo: &RepoRef,
        request: &NewPullRequest,
    ) -> RestClientResult<PullRequest> {
        let pr: GhPullRequest = self
            .request(Method::POST, &format!("/repos/{}/pulls", repo), Some(request))
            .await?;
        Ok(pr.into())
    }

    /// Open issues carrying `label`; pull requests are filtered out
    pub async fn open_issues(&self, repo: &RepoRef, label: &str) -> RestClientResult<Vec<Issue>> {
        let url = format!(
            "/repos/{}/issues?state=open&labels={}&per_page={}",
            repo, label, PAGE_SIZE
        );
        let issues: Vec<GhIssue> = self.get_all(&url).await?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(Issue::from)
            .collect())
    }

    pub async fn issue(&self, repo: &RepoRef, number: u64) -> RestClientResult<Issue> {
        let issue: GhIssue = self.get(&format!("/repos/{}/issues/{}", repo, number)).await?;
        Ok(issue.into())
    }

    pub async fn open_issue(&self, repo: &RepoRef, request: &NewIssue) -> RestClientResult<Issue> {
        let issue: GhIssue = self
            .request(Method::POST, &format!("/repos/{}/issues", repo), Some(request))
            .await?;
        Ok(issue.into())
    }

    pub async fn comment(&self, repo: &RepoRef, number: u64, body: &str) -> RestClientResult<()> {
        let payload = serde_json::json!({ "body": body });
        let _: serde_json::Value = self
            .request(
                Method::POST,
                &format!("/repos/{}/issues/{}/comments", repo, number),
                Some(&payload),
            )
            .await?;
        Ok(())
    }

    pub async fn permission(&self, repo: &RepoRef, login: &str) -> RestClientResult<Permission> {
        let answer: GhPermission = match self
            .get(&format!("/repos/{}/collaborators/{}/permission", repo, login))
            .await
        {
            Ok(answer) => answer,
            Err(e) if e.is_not_found() => return Ok(Permission::None),
            Err(e) => return Err(e),
        };
        // role_name distinguishes maintain/triage, the legacy field does not
        let raw = answer.role_name.unwrap_or(answer.permission);
        raw.parse().map_err(RestClientError::UnexpectedResponse)
    }

    pub async fn protection(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> RestClientResult<Option<BranchProtection>> {
        let url = format!("/repos/{}/branches/{}/protection", repo, branch);
        match self.get::<GhProtection>(&url).await {
            Ok(p) => Ok(Some(p.into())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn set_protection(
        &self,
        repo: &RepoRef,
        branch: &str,
        protection: &BranchProtection,
    ) -> RestClientResult<()> {
        let body = protection_request(protection);
        let _: serde_json::Value = self
            .request(
                Method::PUT,
                &format!("/repos/{}/branches/{}/protection", repo, branch),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_protection(&self, repo: &RepoRef, branch: &str) -> RestClientResult<()> {
        let url = format!("/repos/{}/branches/{}/protection", repo, branch);
        match self.send(Method::DELETE, &url, None::<&()>).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn merge(
        &self,
        repo: &RepoRef,
        number: u64,
        request: &MergeRequest,
    ) -> RestClientResult<MergeResult> {
        let method = match request.method {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        };
        let body = serde_json::json!({
            "commit_title": request.commit_title,
            "commit_message": request.commit_message,
            "merge_method": method,
        });
        let answer: GhMergeResult = self
            .request(
                Method::PUT,
                &format!("/repos/{}/pulls/{}/merge", repo, number),
                Some(&body),
            )
            .await?;
        Ok(MergeResult {
            merged: answer.merged,
            sha: answer.sha,
            message: answer.message,
        })
    }

    /// Commit count derived from the `last` page link with one commit per page
    pub async fn count_commits(&self, repo: &RepoRef, branch: &str) -> RestClientResult<u64> {
        let url = format!("/repos/{}/commits?sha={}&per_page=1", repo, branch);
        let response = self.send(Method::GET, &url, None::<&()>).await?;
        let last_page = response
            .headers()
            .get("link")
            .and_then(|v| v.to_str().ok())
            .and_then(last_page_from_link);
        if let Some(pages) = last_page {
            return Ok(pages);
        }
        let commits: Vec<serde_json::Value> = response.json().await?;
        Ok(commits.len() as u64)
    }

    pub async fn most_active_contributor(&self, repo: &RepoRef) -> RestClientResult<Option<String>> {
        let url = format!("/repos/{}/contributors?per_page=1", repo);
        let response = self.send(Method::GET, &url, None::<&()>).await?;
        // Empty repositories answer 204 without a body
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let contributors: Vec<GhUser> = response.json().await?;
        Ok(contributors.into_iter().next().map(|u| u.login))
    }

    pub async fn teams_of(&self, org: &str, login: &str) -> RestClientResult<Vec<String>> {
        let teams: Vec<GhTeam> = self
            .get_all(&format!("/orgs/{}/teams?per_page={}", org, PAGE_SIZE))
            .await?;
        let mut member_of = Vec::new();
        for team in teams {
            let url = format!("/orgs/{}/teams/{}/memberships/{}", org, team.slug, login);
            match self.get::<GhMembership>(&url).await {
                Ok(m) if m.state == "active" => member_of.push(team.name),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(member_of)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> RestClientResult<T> {
        self.request(Method::GET, path, None::<&()>).await
    }

    /// Follow `page=` until a short page; `path` must already carry `per_page`
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> RestClientResult<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let batch: Vec<T> = self.get(&format!("{}&page={}", path, page)).await?;
            let done = batch.len() < PAGE_SIZE;
            items.extend(batch);
            if done {
                return Ok(items);
            }
            page += 1;
        }
    }

    async fn request<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> RestClientResult<T> {
        let response = self.send(method, path, body).await?;
        let text = response.text().await?;
        if text.is_empty() {
            return serde_json::from_str("null").map_err(RestClientError::from);
        }
        serde_json::from_str(&text).map_err(RestClientError::from)
    }

    /// Send a request and turn non-success answers into errors
    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> RestClientResult<Response> {
        let url = self.endpoint(path);
        tracing::trace!(method = %method, url = %url, "GitHub request");

        let mut request = self.http_client.request(method, &url);
        request = request.headers(self.auth.headers()?);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if let Some(reset_at) = rate_limit_reset(status, response.headers(), Utc::now()) {
            tracing::warn!(url = %url, reset_at = %reset_at, "GitHub rate limit hit");
            return Err(RestClientError::RateLimited { reset_at });
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GhErrorBody>(&text)
            .map(|b| b.message)
            .unwrap_or(text);
        Err(RestClientError::Status { status, message })
    }
}

/// Reset time when a response signals rate limiting
///
/// Primary limits come as 403/429 with `x-ratelimit-remaining: 0` and an epoch
/// `x-ratelimit-reset`; secondary limits carry `retry-after` seconds.
pub fn rate_limit_reset(
    status: StatusCode,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if header("x-ratelimit-remaining") == Some("0") {
        if let Some(reset) = header("x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok()) {
            return Utc.timestamp_opt(reset, 0).single();
        }
    }

    if let Some(secs) = header("retry-after").and_then(|v| v.parse::<i64>().ok()) {
        return Some(now + Duration::seconds(secs));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(now + Duration::seconds(DEFAULT_RETRY_AFTER_SECS));
    }

    None
}

/// Page number of the `rel="last"` entry of a `Link` header
pub fn last_page_from_link(link: &str) -> Option<u64> {
    link.split(',')
        .find(|part| part.contains("rel=\"last\""))
        .and_then(|part| {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            let url = Url::parse(&part[start..end]).ok()?;
            let page = url
                .query_pairs()
                .find(|(k, _)| k == "page")
                .map(|(_, v)| v.into_owned())?;
            page.parse().ok()
        })
}

/// Decode a contents-API payload: base64 wrapped at 60 columns
fn decode_content(encoded: &str) -> RestClientResult<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|e| RestClientError::UnexpectedResponse(format!("file content: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| RestClientError::UnexpectedResponse(format!("file is not UTF-8: {}", e)))
}

fn protection_request(p: &BranchProtection) -> serde_json::Value {
    serde_json::json!({
        "required_status_checks": p.required_status_checks.as_ref().map(|c| serde_json::json!({
            "strict": c.strict,
            "contexts": c.contexts,
        })),
        "enforce_admins": p.enforce_admins,
        "required_pull_request_reviews": p.required_pull_request_reviews.as_ref().map(|r| serde_json::json!({
            "dismiss_stale_reviews": r.dismiss_stale_reviews,
            "require_code_owner_reviews": r.require_code_owner_reviews,
            "required_approving_review_count": r.required_approving_review_count,
        })),
        "restrictions": p.restrictions.as_ref().map(|r| serde_json::json!({
            "users": r.users,
            "teams": r.teams,
        })),
        "required_linear_history": p.required_linear_history,
        "allow_force_pushes": p.allow_force_pushes,
        "allow_deletions": p.allow_deletions,
    })
}

#[derive(Debug, Deserialize)]
struct GhErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GhOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhRepository {
    name: String,
    owner: GhOwner,
    default_branch: Option<String>,
    description: Option<String>,
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    private: bool,
    html_url: String,
    homepage: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    created_at: DateTime<Utc>,
    pushed_at: Option<DateTime<Utc>>,
}

impl From<GhRepository> for Repository {
    fn from(gh: GhRepository) -> Self {
        Repository {
            owner: gh.owner.login,
            name: gh.name,
            default_branch: gh.default_branch.unwrap_or_else(|| "main".to_string()),
            description: gh.description.filter(|d| !d.trim().is_empty()),
            language: gh.language,
            topics: gh.topics,
            archived: gh.archived,
            private: gh.private,
            html_url: gh.html_url,
            homepage: gh.homepage.filter(|h| !h.trim().is_empty()),
            stargazers_count: gh.stargazers_count,
            forks_count: gh.forks_count,
            created_at: gh.created_at,
            pushed_at: gh.pushed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhFile {
    path: String,
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct GhDirEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GhContents {
    Dir(Vec<GhDirEntry>),
    File(GhFile),
}

#[derive(Debug, Deserialize)]
struct GhBranchRef {
    #[serde(rename = "ref")]
    name: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    number: u64,
    title: String,
    state: String,
    merged_at: Option<DateTime<Utc>>,
    head: GhBranchRef,
    base: GhBranchRef,
}

impl From<GhPullRequest> for PullRequest {
    fn from(gh: GhPullRequest) -> Self {
        let state = if gh.merged_at.is_some() {
            PullRequestState::Merged
        } else if gh.state == "open" {
            PullRequestState::Open
        } else {
            PullRequestState::Closed
        };
        PullRequest {
            number: gh.number,
            title: gh.title,
            head_ref: gh.head.name,
            head_sha: gh.head.sha,
            base_ref: gh.base.name,
            state,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    #[serde(default)]
    labels: Vec<GhLabel>,
    pull_request: Option<serde_json::Value>,
}

impl From<GhIssue> for Issue {
    fn from(gh: GhIssue) -> Self {
        Issue {
            number: gh.number,
            title: gh.title,
            body: gh.body,
            labels: gh.labels.into_iter().map(|l| l.name).collect(),
            open: gh.state == "open",
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhGitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhGitRef {
    object: GhGitObject,
}

#[derive(Debug, Deserialize)]
struct GhPermission {
    permission: String,
    role_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhEnabled {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct GhStatusChecks {
    strict: bool,
    #[serde(default)]
    contexts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GhReviews {
    #[serde(default)]
    dismiss_stale_reviews: bool,
    #[serde(default)]
    require_code_owner_reviews: bool,
    #[serde(default)]
    required_approving_review_count: u32,
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhTeam {
    name: String,
    slug: String,
}

#[derive(Debug, Deserialize)]
struct GhMembership {
    state: String,
}

#[derive(Debug, Deserialize)]
struct GhRestrictions {
    #[serde(default)]
    users: Vec<GhUser>,
    #[serde(default)]
    teams: Vec<GhTeam>,
}

#[derive(Debug, Deserialize)]
struct GhProtection {
    required_status_checks: Option<GhStatusChecks>,
    enforce_admins: Option<GhEnabled>,
    required_pull_request_reviews: Option<GhReviews>,
    restrictions: Option<GhRestrictions>,
    required_linear_history: Option<GhEnabled>,
    allow_force_pushes: Option<GhEnabled>,
    allow_deletions: Option<GhEnabled>,
}

impl From<GhProtection> for BranchProtection {
    fn from(gh: GhProtection) -> Self {
        let enabled = |e: Option<GhEnabled>| e.map(|e| e.enabled).unwrap_or(false);
        BranchProtection {
            required_status_checks: gh.required_status_checks.map(|c| RequiredStatusChecks {
                strict: c.strict,
                contexts: c.contexts,
            }),
            enforce_admins: enabled(gh.enforce_admins),
            required_pull_request_reviews: gh.required_pull_request_reviews.map(|r| {
                RequiredReviews {
                    dismiss_stale_reviews: r.dismiss_stale_reviews,
                    require_code_owner_reviews: r.require_code_owner_reviews,
                    required_approving_review_count: r.required_approving_review_count,
                }
            }),
            restrictions: gh.restrictions.map(|r| PushRestrictions {
                users: r.users.into_iter().map(|u| u.login).collect(),
                teams: r.teams.into_iter().map(|t| t.slug).collect(),
            }),
            required_linear_history: enabled(gh.required_linear_history),
            allow_force_pushes: enabled(gh.allow_force_pushes),
            allow_deletions: enabled(gh.allow_deletions),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhMergeResult {
    sha: Option<String>,
    merged: bool,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local HTTP endpoint serving `total` items split into `PAGE_SIZE` pages
    async fn serve_pages(
        total: u64,
        item: fn(u64) -> serde_json::Value,
    ) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = vec![0u8; 16 * 1024];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let target = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let page: u64 = Url::parse(&format!("http://local{}", target))
                    .ok()
                    .and_then(|u| {
                        u.query_pairs()
                            .find(|(k, _)| k == "page")
                            .and_then(|(_, v)| v.parse().ok())
                    })
                    .unwrap_or(1);
                let first = (page - 1) * PAGE_SIZE as u64 + 1;
                let last = (page * PAGE_SIZE as u64).min(total);
                let items: Vec<serde_json::Value> = (first..=last).map(item).collect();
                let body = serde_json::to_string(&items).unwrap();
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{}", addr), requests)
    }

    fn pull_request_json(number: u64) -> serde_json::Value {
        let head = if number == 101 {
            "backstage-integration-1700000000".to_string()
        } else {
            format!("feature-{}", number)
        };
        serde_json::json!({
            "number": number,
            "title": "Change",
            "state": "open",
            "merged_at": null,
            "head": { "ref": head, "sha": "abc" },
            "base": { "ref": "main", "sha": "def" }
        })
    }

    fn issue_json(number: u64) -> serde_json::Value {
        serde_json::json!({
            "number": number,
            "title": "Review and Merge Backstage Integration",
            "body": null,
            "state": "open",
            "labels": [{ "name": "backstage-integration" }],
            "pull_request": null
        })
    }

    #[tokio::test]
    async fn test_open_pull_requests_follow_every_page() {
        let (base, requests) = serve_pages(101, pull_request_json).await;
        let client = GitHubClient::new(&base, AuthConfig::none()).unwrap();

        let prs = client
            .open_pull_requests(&RepoRef::new("acme", "widgets"))
            .await
            .unwrap();
        assert_eq!(prs.len(), 101);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
        assert!(prs.iter().any(|pr| pr.head_ref == "backstage-integration-1700000000"));
    }

    #[tokio::test]
    async fn test_open_issues_follow_every_page() {
        let (base, requests) = serve_pages(150, issue_json).await;
        let client = GitHubClient::new(&base, AuthConfig::none()).unwrap();

        let issues = client
            .open_issues(&RepoRef::new("acme", "widgets"), "backstage-integration")
            .await
            .unwrap();
        assert_eq!(issues.len(), 150);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exact_page_boundary_fetches_one_empty_page() {
        let (base, requests) = serve_pages(100, issue_json).await;
        let client = GitHubClient::new(&base, AuthConfig::none()).unwrap();

        let issues = client
            .open_issues(&RepoRef::new("acme", "widgets"), "backstage-integration")
            .await
            .unwrap();
        assert_eq!(issues.len(), 100);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn test_endpoint_keeps_enterprise_prefix() {
        let client =
            GitHubClient::new("https://ghe.example.com/api/v3/", AuthConfig::none()).unwrap();
        assert_eq!(
            client.endpoint("/repos/acme/widgets"),
            "https://ghe.example.com/api/v3/repos/acme/widgets"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(GitHubClient::new("not a url", AuthConfig::none()).is_err());
    }

    #[test]
    fn test_primary_rate_limit_uses_reset_header() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let h = headers(&[
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", "1700000120"),
        ]);
        let reset = rate_limit_reset(StatusCode::FORBIDDEN, &h, now).unwrap();
        assert_eq!(reset.timestamp(), 1_700_000_120);
    }

    #[test]
    fn test_secondary_rate_limit_uses_retry_after() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let h = headers(&[("retry-after", "30")]);
        let reset = rate_limit_reset(StatusCode::TOO_MANY_REQUESTS, &h, now).unwrap();
        assert_eq!(reset.timestamp(), 1_700_000_030);
    }

    #[test]
    fn test_plain_forbidden_is_not_a_rate_limit() {
        let now = Utc::now();
        let h = headers(&[("x-ratelimit-remaining", "42")]);
        assert!(rate_limit_reset(StatusCode::FORBIDDEN, &h, now).is_none());
        assert!(rate_limit_reset(StatusCode::NOT_FOUND, &HeaderMap::new(), now).is_none());
    }

    #[test]
    fn test_last_page_from_link_header() {
        let link = "<https://api.github.com/repositories/1/commits?sha=main&per_page=1&page=2>; rel=\"next\", \
                    <https://api.github.com/repositories/1/commits?sha=main&per_page=1&page=137>; rel=\"last\"";
        assert_eq!(last_page_from_link(link), Some(137));
        assert_eq!(last_page_from_link("<https://x/y?page=2>; rel=\"next\""), None);
    }

    #[test]
    fn test_decode_wrapped_content() {
        let encoded = "a2luZDogQ29t\ncG9uZW50Cg==\n";
        assert_eq!(decode_content(encoded).unwrap(), "kind: Component\n");
    }

    #[test]
    fn test_protection_mapping_from_api_shape() {
        let json = serde_json::json!({
            "required_status_checks": { "strict": true, "contexts": ["ci"] },
            "enforce_admins": { "enabled": true },
            "required_pull_request_reviews": {
                "dismiss_stale_reviews": true,
                "require_code_owner_reviews": true,
                "required_approving_review_count": 1
            },
            "required_linear_history": { "enabled": false },
            "allow_force_pushes": { "enabled": false },
            "allow_deletions": { "enabled": false }
        });
        let gh: GhProtection = serde_json::from_value(json).unwrap();
        let protection = BranchProtection::from(gh);
        assert!(protection.enforce_admins);
        assert_eq!(protection.required_status_checks.unwrap().contexts, vec!["ci"]);
        assert!(protection.restrictions.is_none());

        let request = protection_request(&BranchProtection::default());
        assert!(request["required_status_checks"].is_null());
        assert_eq!(request["enforce_admins"], serde_json::json!(false));
    }

    #[test]
    fn test_contents_payload_shapes() {
        let file: GhContents = serde_json::from_value(serde_json::json!({
            "path": "catalog-info.yaml", "sha": "abc", "content": "eA==", "type": "file"
        }))
        .unwrap();
        assert!(matches!(file, GhContents::File(_)));

        let dir: GhContents = serde_json::from_value(serde_json::json!([
            { "name": "openapi.yaml", "path": "api/openapi.yaml", "type": "file" }
        ]))
        .unwrap();
        assert!(matches!(dir, GhContents::Dir(ref v) if v.len() == 1));
    }
}
