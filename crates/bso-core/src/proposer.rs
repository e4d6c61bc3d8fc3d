// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Change Proposer
//!
//! Puts a generated descriptor in front of a repository's maintainers: an
//! onboarding branch, a pull request and a tracking issue. Every call
//! re-reads the live pull request and issue state first, so repeated runs
//! converge on at most one open onboarding pull request and one open
//! tracking issue per repository.

use crate::config::EngineSettings;
use crate::descriptor::GeneratedDescriptor;
use crate::error::ProposeError;
use crate::scanner::with_rate_limit_wait;
use bso_host_api::{
    FileWrite, HostError, NewIssue, NewPullRequest, PullRequest, RepoRef, Repository,
    SourceControl,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

pub const WORKFLOW_PATH: &str = ".github/workflows/publish-backstage.yml";
pub const PULL_REQUEST_TITLE: &str = "Add Backstage Integration";
pub const ISSUE_TITLE: &str = "Review and Merge Backstage Integration";

const DESCRIPTOR_COMMIT_MESSAGE: &str = "Add Backstage catalog entities";
const DESCRIPTOR_UPDATE_MESSAGE: &str = "Update Backstage catalog entities";
const WORKFLOW_COMMIT_MESSAGE: &str = "Add Backstage publish workflow";

/// Suffixed branch names tried before giving up on a name collision
const MAX_BRANCH_ATTEMPTS: u32 = 5;

/// What a proposal did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ProposeOutcome {
    /// Live state already matches
    NoOp,
    PrCreated { pr: u64, issue: u64, branch: String },
    /// The descriptor on the open onboarding branch was refreshed
    PrUpdated { pr: u64 },
    /// The pull request existed but its tracking issue did not
    IssueCreated { pr: u64, issue: u64 },
}

pub struct ChangeProposer {
    scm: Arc<dyn SourceControl>,
    settings: EngineSettings,
}

impl ChangeProposer {
    pub fn new(scm: Arc<dyn SourceControl>, settings: EngineSettings) -> Self {
        Self { scm, settings }
    }

    /// Propose `generated` for `repository`
    #[tracing::instrument(skip(self, repository, generated), fields(repo = %repository.full_name()))]
    pub async fn propose(
        &self,
        repository: &Repository,
        generated: &GeneratedDescriptor,
    ) -> Result<ProposeOutcome, ProposeError> {
        let repo = repository.repo_ref();

        let open = self
            .scm
            .list_open_pull_requests(&repo)
            .await?
            .into_iter()
            .filter(|pr| self.settings.is_onboarding_branch(&pr.head_ref))
            .min_by_key(|pr| pr.number);
        if let Some(pr) = open {
            return self.refresh(&repo, &pr, generated).await;
        }

        if self
            .scm
            .get_file(&repo, &self.settings.descriptor_path, &repository.default_branch)
            .await?
            .is_some()
        {
            tracing::debug!("Descriptor already merged, nothing to propose");
            return Ok(ProposeOutcome::NoOp);
        }

        self.create(repository, generated).await
    }

    /// Bring an open onboarding pull request up to date
    async fn refresh(
        &self,
        repo: &RepoRef,
        pr: &PullRequest,
        generated: &GeneratedDescriptor,
    ) -> Result<ProposeOutcome, ProposeError> {
        let current = with_rate_limit_wait(|| {
            self.scm
                .get_file(repo, &self.settings.descriptor_path, &pr.head_ref)
        })
        .await?;

        let updated = match current {
            Some(file) if generated.matches(&file.content) => false,
            current => {
                let write = FileWrite {
                    path: self.settings.descriptor_path.clone(),
                    branch: pr.head_ref.clone(),
                    message: DESCRIPTOR_UPDATE_MESSAGE.to_string(),
                    content: generated.yaml.clone(),
                    sha: current.map(|f| f.sha),
                };
                with_rate_limit_wait(|| self.scm.put_file(repo, &write))
                    .await
                    .map_err(|e| conflict(repo, &pr.head_ref, e))?;
                tracing::info!(pr = pr.number, "Updated descriptor on onboarding branch");
                true
            }
        };

        let has_issue = !with_rate_limit_wait(|| {
            self.scm
                .list_open_issues(repo, &self.settings.tracking_label)
        })
        .await?
        .is_empty();

        match (updated, has_issue) {
            (true, true) => Ok(ProposeOutcome::PrUpdated { pr: pr.number }),
            (false, true) => Ok(ProposeOutcome::NoOp),
            (_, false) => {
                let issue = self.open_issue(repo, pr.number).await?;
                Ok(ProposeOutcome::IssueCreated {
                    pr: pr.number,
                    issue,
                })
            }
        }
    }

    async fn create(
        &self,
        repository: &Repository,
        generated: &GeneratedDescriptor,
    ) -> Result<ProposeOutcome, ProposeError> {
        let repo = repository.repo_ref();
        let base = repository.default_branch.as_str();

        let head = with_rate_limit_wait(|| self.scm.branch_head(&repo, base)).await?;
        let branch = self.create_branch(&repo, &head).await?;
        let mut created = vec![format!("branch {}", branch)];

        let write = FileWrite {
            path: self.settings.descriptor_path.clone(),
            branch: branch.clone(),
            message: DESCRIPTOR_COMMIT_MESSAGE.to_string(),
            content: generated.yaml.clone(),
            sha: None,
        };
        with_rate_limit_wait(|| self.scm.put_file(&repo, &write))
            .await
            .map_err(|e| partial(&repo, &created, e))?;
        created.push(self.settings.descriptor_path.clone());

        if self.settings.include_publish_workflow {
            let existing = with_rate_limit_wait(|| self.scm.get_file(&repo, WORKFLOW_PATH, &branch))
                .await
                .map_err(|e| partial(&repo, &created, e))?;
            if existing.is_none() {
                let write = FileWrite {
                    path: WORKFLOW_PATH.to_string(),
                    branch: branch.clone(),
                    message: WORKFLOW_COMMIT_MESSAGE.to_string(),
                    content: publish_workflow(&repository.owner, &self.settings),
                    sha: None,
                };
                with_rate_limit_wait(|| self.scm.put_file(&repo, &write))
                    .await
                    .map_err(|e| partial(&repo, &created, e))?;
                created.push(WORKFLOW_PATH.to_string());
            }
        }

        let request = NewPullRequest {
            title: PULL_REQUEST_TITLE.to_string(),
            body: pull_request_body(generated, &self.settings),
            head: branch.clone(),
            base: base.to_string(),
        };
        let pr = with_rate_limit_wait(|| self.scm.create_pull_request(&repo, &request))
            .await
            .map_err(|e| partial(&repo, &created, e))?;
        created.push(format!("PR #{}", pr.number));

        let issue = self
            .open_issue(&repo, pr.number)
            .await
            .map_err(|e| match e {
                ProposeError::Host(source) => partial(&repo, &created, source),
                other => other,
            })?;

        tracing::info!(pr = pr.number, issue, branch = %branch, "Opened onboarding pull request");
        Ok(ProposeOutcome::PrCreated {
            pr: pr.number,
            issue,
            branch,
        })
    }

    /// Create a fresh onboarding branch at `head`
    ///
    /// Names are `<prefix>-<unix-seconds>`; a name left behind by an earlier
    /// partial proposal gets a `-<n>` suffix instead.
    async fn create_branch(&self, repo: &RepoRef, head: &str) -> Result<String, ProposeError> {
        let stem = format!("{}-{}", self.settings.branch_prefix, Utc::now().timestamp());
        let mut last = None;
        for attempt in 0..MAX_BRANCH_ATTEMPTS {
            let branch = match attempt {
                0 => stem.clone(),
                n => format!("{}-{}", stem, n),
            };
            match with_rate_limit_wait(|| self.scm.create_branch(repo, &branch, head)).await {
                Ok(()) => return Ok(branch),
                Err(HostError::Conflict(detail)) | Err(HostError::Unprocessable(detail)) => {
                    tracing::debug!(branch = %branch, %detail, "Branch name taken, trying the next one");
                    last = Some((branch, detail));
                }
                Err(other) => return Err(ProposeError::Host(other)),
            }
        }
        let (branch, detail) = last.unwrap_or_else(|| (stem, "no attempt made".to_string()));
        Err(ProposeError::Conflict {
            repo: repo.to_string(),
            branch,
            detail,
        })
    }

    async fn open_issue(&self, repo: &RepoRef, pr: u64) -> Result<u64, ProposeError> {
        let request = NewIssue {
            title: ISSUE_TITLE.to_string(),
            body: issue_body(pr, &self.settings),
            labels: vec![self.settings.tracking_label.clone()],
        };
        let issue = with_rate_limit_wait(|| self.scm.create_issue(repo, &request)).await?;
        Ok(issue.number)
    }
}

fn conflict(repo: &RepoRef, branch: &str, error: HostError) -> ProposeError {
    match error {
        HostError::Conflict(detail) | HostError::Unprocessable(detail) => ProposeError::Conflict {
            repo: repo.to_string(),
            branch: branch.to_string(),
            detail,
        },
        other => ProposeError::Host(other),
    }
}

fn partial(repo: &RepoRef, created: &[String], source: HostError) -> ProposeError {
    ProposeError::Partial {
        repo: repo.to_string(),
        created: created.to_vec(),
        source,
    }
}

/// Workflow that republishes the descriptor whenever it changes on the default branch
pub fn publish_workflow(owner: &str, settings: &EngineSettings) -> String {
    format!(
        r#"name: Publish to Backstage

on:
  push:
    branches:
      - main
    paths:
      - '{descriptor}'
  workflow_dispatch:

jobs:
  publish:
    uses: {owner}/{state_repo}/.github/workflows/publish-backstage-reusable.yml@main
    with:
      repository: ${{{{ github.event.repository.name }}}}
    secrets:
      AUTOMATION_TOKEN: ${{{{ secrets.AUTOMATION_TOKEN }}}}
      BACKSTAGE_URL: ${{{{ secrets.BACKSTAGE_URL }}}}
      GITHUB_API_URL: ${{{{ secrets.GITHUB_API_URL }}}}
"#,
        descriptor = settings.descriptor_path,
        owner = owner,
        state_repo = settings.canary_state_repo,
    )
}

fn pull_request_body(generated: &GeneratedDescriptor, settings: &EngineSettings) -> String {
    let apis = &generated.descriptor.apis;
    let api_line = if apis.is_empty() {
        "   - No API specifications were found".to_string()
    } else {
        apis.iter()
            .map(|api| format!("   - API entity `{}`", api.metadata.name))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let workflow_line = if settings.include_publish_workflow {
        format!(
            "2. Adds `{}` to publish future descriptor changes to Backstage\n",
            WORKFLOW_PATH
        )
    } else {
        String::new()
    };
    format!(
        "This PR adds Backstage integration:\n\n\
         1. Adds `{descriptor}` containing:\n   \
         - Component `{component}` owned by `{owner}`\n\
         {api_line}\n\
         {workflow_line}\n\
         After merging this PR the component and its APIs are registered in Backstage.\n\n\
         Required setup:\n\
         1. Add the `BACKSTAGE_URL` secret in repository settings\n\
         2. Ensure GitHub Actions has the necessary permissions\n",
        descriptor = settings.descriptor_path,
        component = generated.name(),
        owner = generated.descriptor.component.spec.owner,
    )
}

fn issue_body(pr: u64, settings: &EngineSettings) -> String {
    format!(
        "Please review and merge PR #{pr} for Backstage integration.\n\n\
         Required actions:\n\
         1. Review the changes in PR #{pr}\n\
         2. Add the `BACKSTAGE_URL` secret in repository settings\n\
         3. To force merge this PR (this temporarily lifts branch protection), \
         comment with `/force-merge`. This requires `{permission}` permission.\n\n\
         Force merge should only be used after proper review and secret configuration.\n",
        pr = pr,
        permission = settings.force_merge_permission,
    )
}
