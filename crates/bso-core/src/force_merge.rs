// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Force-Merge Handler
//!
//! Handles a `/force-merge` comment on a tracking issue: checks the
//! commenter's permission, resolves the onboarding pull request, lifts the
//! base branch protection just long enough to merge it, and reports back on
//! the issue.
//!
//! Protection is restored from a snapshot taken before it was lifted, on
//! every path out of the merge step, including a panic.

use crate::config::EngineSettings;
use crate::error::ForceMergeError;
use crate::scanner::with_rate_limit_wait;
use bso_host_api::{
    BranchProtection, MergeMethod, MergeRequest, Permission, PullRequestState, RepoRef,
    SourceControl,
};
use futures::FutureExt;
use regex::Regex;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

pub const COMMAND: &str = "/force-merge";
const MERGE_MESSAGE: &str = "Force merged via Backstage automation";

/// An issue comment that may carry the command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceMergeRequest {
    pub repo: RepoRef,
    pub issue: u64,
    /// Login of the commenter
    pub actor: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum ForceMergeOutcome {
    Merged {
        pr: u64,
        sha: Option<String>,
    },
    /// Refused before anything was changed
    Rejected(String),
    Failed(String),
    /// Not a force-merge command, or not on a tracking issue
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForceMergeReport {
    pub repo: String,
    pub issue: u64,
    pub pr: Option<u64>,
    pub protection_existed: bool,
    /// Protection is back to its snapshot (trivially true when there was none)
    pub restored: bool,
    pub comment_posted: bool,
    pub outcome: ForceMergeOutcome,
    #[serde(skip)]
    pub error: Option<ForceMergeError>,
}

impl ForceMergeReport {
    fn new(request: &ForceMergeRequest) -> Self {
        Self {
            repo: request.repo.to_string(),
            issue: request.issue,
            pr: None,
            protection_existed: false,
            restored: true,
            comment_posted: false,
            outcome: ForceMergeOutcome::Ignored,
            error: None,
        }
    }

    pub fn merged(&self) -> bool {
        matches!(self.outcome, ForceMergeOutcome::Merged { .. })
    }
}

/// Parse a comment; `Some(target)` when it is a force-merge command
///
/// The first non-empty line must be exactly `/force-merge`, optionally
/// followed by `#<pr>`.
pub fn parse_trigger(comment: &str) -> Option<Option<u64>> {
    let line = comment.lines().map(str::trim).find(|l| !l.is_empty())?;
    let rest = line.strip_prefix(COMMAND)?;
    let rest = rest.trim();
    if rest.is_empty() {
        return Some(None);
    }
    rest.strip_prefix('#')?.parse().ok().map(Some)
}

/// Pull request number referenced as `PR #<n>` in a tracking issue body
pub fn referenced_pull_request(body: &str) -> Option<u64> {
    static PR_REF: OnceLock<Regex> = OnceLock::new();
    let re = PR_REF.get_or_init(|| Regex::new(r"PR #(\d+)").expect("static regex"));
    re.captures(body).and_then(|c| c[1].parse().ok())
}

pub struct ForceMergeHandler {
    scm: Arc<dyn SourceControl>,
    settings: EngineSettings,
}

impl ForceMergeHandler {
    pub fn new(scm: Arc<dyn SourceControl>, settings: EngineSettings) -> Self {
        Self { scm, settings }
    }

    /// Handle one comment; every failure is captured in the report
    #[tracing::instrument(skip(self, request), fields(repo = %request.repo, issue = request.issue, actor = %request.actor))]
    pub async fn handle(&self, request: &ForceMergeRequest) -> ForceMergeReport {
        let mut report = ForceMergeReport::new(request);
        let Some(explicit) = parse_trigger(&request.comment) else {
            return report;
        };

        let result = self.run(request, explicit, &mut report).await;
        let (outcome, comment) = match &result {
            Ok(Some((pr, sha))) => (
                ForceMergeOutcome::Merged {
                    pr: *pr,
                    sha: sha.clone(),
                },
                format!("PR #{} was force merged by @{}.", pr, request.actor),
            ),
            Ok(None) => return report,
            Err(e @ ForceMergeError::Unauthorized { .. })
            | Err(e @ ForceMergeError::NoTarget { .. })
            | Err(e @ ForceMergeError::NotOnboardingPr { .. }) => (
                ForceMergeOutcome::Rejected(e.to_string()),
                format!("@{} force merge rejected: {}", request.actor, e),
            ),
            Err(e) => (
                ForceMergeOutcome::Failed(e.to_string()),
                format!("Force merge failed: {}", e),
            ),
        };

        match &outcome {
            ForceMergeOutcome::Merged { pr, .. } => tracing::info!(pr, "Force merged"),
            other => tracing::warn!(outcome = ?other, "Force merge did not complete"),
        }
        report.outcome = outcome;
        report.error = result.err();

        match self
            .scm
            .comment_on_issue(&request.repo, request.issue, &comment)
            .await
        {
            Ok(()) => report.comment_posted = true,
            Err(e) => tracing::warn!(error = %e, "Could not post force-merge status comment"),
        }
        report
    }

    /// `Ok(None)` when the issue is not a tracking issue
    async fn run(
        &self,
        request: &ForceMergeRequest,
        explicit: Option<u64>,
        report: &mut ForceMergeReport,
    ) -> Result<Option<(u64, Option<String>)>, ForceMergeError> {
        let repo = &request.repo;
        let issue = self.scm.get_issue(repo, request.issue).await?;
        if !issue.labels.iter().any(|l| *l == self.settings.tracking_label) {
            tracing::debug!("Command on an unrelated issue, ignoring");
            return Ok(None);
        }

        let required = self.settings.force_merge_permission;
        let actual = self.scm.collaborator_permission(repo, &request.actor).await?;
        if !is_authorized(actual, &self.settings) {
            return Err(ForceMergeError::Unauthorized {
                actor: request.actor.clone(),
                required,
                actual,
            });
        }

        let number = explicit
            .or_else(|| issue.body.as_deref().and_then(referenced_pull_request))
            .ok_or(ForceMergeError::NoTarget {
                issue: request.issue,
            })?;
        report.pr = Some(number);

        let pr = self.scm.get_pull_request(repo, number).await?;
        if pr.state != PullRequestState::Open || !self.settings.is_onboarding_branch(&pr.head_ref) {
            return Err(ForceMergeError::NotOnboardingPr { number });
        }

        let merge = MergeRequest {
            method: MergeMethod::Squash,
            commit_title: format!("Force merge PR #{} [skip ci]", number),
            commit_message: MERGE_MESSAGE.to_string(),
        };
        let scm = self.scm.clone();
        let result = self
            .with_relaxed_protection(repo, &pr.base_ref, report, async move {
                let result = scm
                    .merge_pull_request(repo, number, &merge)
                    .await
                    .map_err(|e| ForceMergeError::MergeFailed {
                        number,
                        reason: e.to_string(),
                    })?;
                if !result.merged {
                    return Err(ForceMergeError::MergeFailed {
                        number,
                        reason: result.message,
                    });
                }
                Ok(result.sha)
            })
            .await?;
        Ok(Some((number, result)))
    }

    /// Run `body` with the protection of `branch` removed, then put the
    /// snapshot back whatever `body` did
    async fn with_relaxed_protection<T, F>(
        &self,
        repo: &RepoRef,
        branch: &str,
        report: &mut ForceMergeReport,
        body: F,
    ) -> Result<T, ForceMergeError>
    where
        F: Future<Output = Result<T, ForceMergeError>>,
    {
        let snapshot = self.scm.get_branch_protection(repo, branch).await?;
        report.protection_existed = snapshot.is_some();

        let outcome = match &snapshot {
            Some(_) => match self.scm.remove_branch_protection(repo, branch).await {
                Ok(()) => {
                    report.restored = false;
                    tracing::info!(branch, "Branch protection lifted");
                    AssertUnwindSafe(body).catch_unwind().await
                }
                Err(e) => Ok(Err(ForceMergeError::Host(e))),
            },
            None => AssertUnwindSafe(body).catch_unwind().await,
        };

        if let Some(protection) = &snapshot {
            let restored = self.restore(repo, branch, protection).await;
            report.restored = restored.is_ok();
            if let Err(source) = restored {
                tracing::error!(branch, error = %source, "Branch protection was NOT restored");
                if let Ok(Err(e)) = &outcome {
                    tracing::error!(error = %e, "Merge step had also failed");
                }
                if let Err(panic) = outcome {
                    std::panic::resume_unwind(panic);
                }
                return Err(ForceMergeError::RestoreFailed {
                    branch: branch.to_string(),
                    source,
                });
            }
            tracing::info!(branch, "Branch protection restored");
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn restore(
        &self,
        repo: &RepoRef,
        branch: &str,
        protection: &BranchProtection,
    ) -> bso_host_api::HostResult<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match with_rate_limit_wait(|| self.scm.update_branch_protection(repo, branch, protection)).await {
                Err(e) if e.is_transient() && attempt < 3 => {
                    tracing::warn!(attempt, error = %e, "Retrying protection restore");
                }
                other => return other,
            }
        }
    }
}

/// Whether `permission` may force-merge under `settings`
pub fn is_authorized(permission: Permission, settings: &EngineSettings) -> bool {
    permission >= settings.force_merge_permission
}

#[cfg(test)]
mod tests {
    use super::*;
    use bso_host_api::{
        HostError, Issue, MockSourceControl, PullRequest, RequiredReviews, RequiredStatusChecks,
    };
    use bso_host_mock::{InMemoryScm, sample_repository};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn protection() -> BranchProtection {
        BranchProtection {
            required_status_checks: Some(RequiredStatusChecks {
                strict: true,
                contexts: vec!["ci/build".into()],
            }),
            enforce_admins: true,
            required_pull_request_reviews: Some(RequiredReviews {
                dismiss_stale_reviews: true,
                require_code_owner_reviews: false,
                required_approving_review_count: 2,
            }),
            ..BranchProtection::default()
        }
    }

    struct Fixture {
        scm: Arc<InMemoryScm>,
        handler: ForceMergeHandler,
        repo: RepoRef,
        pr: u64,
        issue: u64,
    }

    fn fixture() -> Fixture {
        let scm = Arc::new(InMemoryScm::new());
        scm.add_repository(sample_repository("acme", "widgets"));
        let repo = RepoRef::new("acme", "widgets");
        let pr = scm.seed_pull_request(
            &repo,
            "main",
            "backstage-integration-1",
            &[("catalog-info.yaml", "kind: Component\n")],
        );
        let issue = scm.seed_issue(
            &repo,
            "Review and Merge Backstage Integration",
            &format!("Please review and merge PR #{} for Backstage integration.", pr),
            &["backstage-integration"],
        );
        scm.set_protection(&repo, "main", protection());
        scm.set_permission(&repo, "maintainer", Permission::Maintain);
        scm.set_permission(&repo, "dev", Permission::Write);
        let handler = ForceMergeHandler::new(scm.clone(), EngineSettings::default());
        Fixture {
            scm,
            handler,
            repo,
            pr,
            issue,
        }
    }

    fn request(f: &Fixture, actor: &str, comment: &str) -> ForceMergeRequest {
        ForceMergeRequest {
            repo: f.repo.clone(),
            issue: f.issue,
            actor: actor.into(),
            comment: comment.into(),
        }
    }

    #[test]
    fn test_trigger_parsing() {
        assert_eq!(parse_trigger("/force-merge"), Some(None));
        assert_eq!(parse_trigger("\n  /force-merge  \nthanks"), Some(None));
        assert_eq!(parse_trigger("/force-merge #12"), Some(Some(12)));
        assert_eq!(parse_trigger("please /force-merge"), None);
        assert_eq!(parse_trigger("/force-merge now"), None);
        assert_eq!(parse_trigger("/force-merged"), None);
        assert_eq!(parse_trigger(""), None);
    }

    #[test]
    fn test_pull_request_reference() {
        assert_eq!(referenced_pull_request("merge PR #42 for Backstage"), Some(42));
        assert_eq!(referenced_pull_request("no reference"), None);
    }

    #[tokio::test]
    async fn test_authorized_merge_restores_protection() {
        let f = fixture();
        let report = f.handler.handle(&request(&f, "maintainer", "/force-merge")).await;

        assert!(report.merged(), "{:?}", report);
        assert_eq!(report.pr, Some(f.pr));
        assert!(report.protection_existed);
        assert!(report.restored);
        assert!(report.comment_posted);
        assert_eq!(f.scm.protection(&f.repo, "main"), Some(protection()));
        assert_eq!(
            f.scm.file(&f.repo, "main", "catalog-info.yaml").as_deref(),
            Some("kind: Component\n")
        );
        let comments = f.scm.comments(&f.repo, f.issue);
        assert_eq!(comments.len(), 1);
        assert!(comments[0].contains("force merged by @maintainer"));
    }

    #[tokio::test]
    async fn test_unauthorized_actor_changes_nothing() {
        let f = fixture();
        let report = f.handler.handle(&request(&f, "dev", "/force-merge")).await;

        assert!(matches!(report.outcome, ForceMergeOutcome::Rejected(_)));
        assert!(matches!(report.error, Some(ForceMergeError::Unauthorized { .. })));
        assert_eq!(f.scm.calls_for("remove_branch_protection"), 0);
        assert_eq!(f.scm.calls_for("merge_pull_request"), 0);
        assert_eq!(f.scm.mutating_calls(), 1, "only the rejection comment");
        assert!(f.scm.comments(&f.repo, f.issue)[0].contains("rejected"));
    }

    #[tokio::test]
    async fn test_failed_merge_still_restores_protection() {
        let f = fixture();
        f.scm.fail_next(
            "merge_pull_request",
            HostError::Unprocessable("merge conflict".into()),
        );
        let report = f.handler.handle(&request(&f, "maintainer", "/force-merge")).await;

        assert!(matches!(report.outcome, ForceMergeOutcome::Failed(_)));
        assert!(report.restored);
        assert_eq!(f.scm.protection(&f.repo, "main"), Some(protection()));
        assert!(report.comment_posted);
        assert!(f.scm.comments(&f.repo, f.issue)[0].contains("merge conflict"));
    }

    #[tokio::test]
    async fn test_non_command_and_unrelated_issue_are_ignored() {
        let f = fixture();
        let report = f.handler.handle(&request(&f, "maintainer", "LGTM")).await;
        assert_eq!(report.outcome, ForceMergeOutcome::Ignored);

        let other = f.scm.seed_issue(&f.repo, "Bug", "PR #1 broke it", &["bug"]);
        let mut req = request(&f, "maintainer", "/force-merge");
        req.issue = other;
        let report = f.handler.handle(&req).await;
        assert_eq!(report.outcome, ForceMergeOutcome::Ignored);
        assert_eq!(f.scm.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_explicit_target_must_be_onboarding_pull_request() {
        let f = fixture();
        let feature = f.scm.seed_pull_request(&f.repo, "main", "feature/login", &[]);
        let report = f
            .handler
            .handle(&request(&f, "maintainer", &format!("/force-merge #{}", feature)))
            .await;
        assert!(matches!(
            report.error,
            Some(ForceMergeError::NotOnboardingPr { number }) if number == feature
        ));
        assert_eq!(f.scm.calls_for("remove_branch_protection"), 0);
    }

    #[tokio::test]
    async fn test_panic_during_merge_restores_protection() {
        let restores = Arc::new(AtomicUsize::new(0));
        let mut scm = MockSourceControl::new();
        scm.expect_get_issue().returning(|_, number| {
            Ok(Issue {
                number,
                title: "Review and Merge Backstage Integration".into(),
                body: Some("Please review and merge PR #2".into()),
                labels: vec!["backstage-integration".into()],
                open: true,
            })
        });
        scm.expect_collaborator_permission()
            .returning(|_, _| Ok(Permission::Admin));
        scm.expect_get_pull_request().returning(|_, number| {
            Ok(PullRequest {
                number,
                title: "Add Backstage Integration".into(),
                head_ref: "backstage-integration-1".into(),
                head_sha: "abc".into(),
                base_ref: "main".into(),
                state: PullRequestState::Open,
            })
        });
        scm.expect_get_branch_protection()
            .returning(|_, _| Ok(Some(protection())));
        scm.expect_remove_branch_protection().returning(|_, _| Ok(()));
        scm.expect_merge_pull_request()
            .returning(|_, _, _| -> bso_host_api::HostResult<bso_host_api::MergeResult> {
                panic!("merge exploded")
            });
        let counter = restores.clone();
        scm.expect_update_branch_protection()
            .returning(move |_, _, p| {
                assert_eq!(*p, protection());
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let handler = ForceMergeHandler::new(Arc::new(scm), EngineSettings::default());
        let req = ForceMergeRequest {
            repo: RepoRef::new("acme", "widgets"),
            issue: 3,
            actor: "admin".into(),
            comment: "/force-merge".into(),
        };
        let joined = tokio::spawn(async move { handler.handle(&req).await }).await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(restores.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_permission_threshold() {
        let settings = EngineSettings::default();
        assert!(is_authorized(Permission::Admin, &settings));
        assert!(is_authorized(Permission::Maintain, &settings));
        assert!(!is_authorized(Permission::Write, &settings));
    }
}
