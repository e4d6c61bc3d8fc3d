// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Onboarding priority analysis
//!
//! Scores repositories that have no descriptor yet by activity, popularity
//! and how developer-facing they look, and renders the best candidates.

use crate::config::EngineSettings;
use crate::scanner::with_rate_limit_wait;
use bso_host_api::{HostResult, Repository, SourceControl};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt::Write as _;

/// Scores at or below this are left out
pub const MIN_SCORE: u32 = 30;
pub const TOP_N: usize = 10;

const API_KEYWORDS: [&str; 6] = ["api", "sdk", "library", "client", "developer", "toolkit"];
const DEV_FILES: [&str; 6] = ["README.md", "API.md", "docs", "api", "swagger.yml", "openapi.yml"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityEntry {
    pub name: String,
    pub score: u32,
    pub reasons: Vec<String>,
    pub url: String,
    pub description: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub stars: u64,
    pub forks: u64,
}

fn mentions_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    API_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Score one repository from its metadata and root entry names
pub fn score(repository: &Repository, root_entries: &[String], as_of: DateTime<Utc>) -> PriorityEntry {
    let mut score = 0u32;
    let mut reasons = Vec::new();

    if repository
        .pushed_at
        .is_some_and(|pushed| as_of - pushed <= Duration::days(30))
    {
        score += 30;
        reasons.push("Recently active".to_string());
    }
    if as_of - repository.created_at >= Duration::days(180) {
        score += 20;
        reasons.push("Established project".to_string());
    }
    if repository.stargazers_count > 0 {
        score += repository.stargazers_count.saturating_mul(2).min(50) as u32;
        reasons.push(format!("Has {} stars", repository.stargazers_count));
    }
    if repository.forks_count > 0 {
        score += repository.forks_count.saturating_mul(5).min(50) as u32;
        reasons.push(format!("Has {} forks", repository.forks_count));
    }

    let has_dev_files = root_entries.iter().any(|entry| {
        let entry = entry.to_lowercase();
        DEV_FILES.iter().any(|f| entry.contains(&f.to_lowercase()))
    });
    if has_dev_files {
        score += 30;
        reasons.push("Has developer documentation".to_string());
    }

    let description = repository.description.as_deref().filter(|d| !d.is_empty());
    if description.is_some_and(mentions_keyword) {
        score += 20;
        reasons.push("API/SDK-related description".to_string());
    }
    if repository.topics.iter().any(|t| mentions_keyword(t)) {
        score += 20;
        reasons.push("API/SDK-related topics".to_string());
    }
    if description.is_some() {
        score += 10;
        reasons.push("Has description".to_string());
    }
    if repository.homepage.as_deref().is_some_and(|h| !h.is_empty()) {
        score += 10;
        reasons.push("Has homepage URL".to_string());
    }
    if !repository.topics.is_empty() {
        score += (repository.topics.len() as u32).saturating_mul(5).min(20);
        reasons.push(format!("Has {} topics", repository.topics.len()));
    }

    PriorityEntry {
        name: repository.name.clone(),
        score,
        reasons,
        url: repository.html_url.clone(),
        description: description.unwrap_or_default().to_string(),
        updated_at: repository.pushed_at,
        stars: repository.stargazers_count,
        forks: repository.forks_count,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityReport {
    pub generated_at: DateTime<Utc>,
    pub candidates: Vec<PriorityEntry>,
}

impl PriorityReport {
    /// Keep meaningful scores, best first, names breaking ties
    pub fn from_entries(entries: Vec<PriorityEntry>, generated_at: DateTime<Utc>) -> Self {
        let mut candidates: Vec<PriorityEntry> =
            entries.into_iter().filter(|e| e.score > MIN_SCORE).collect();
        candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        candidates.truncate(TOP_N);
        Self {
            generated_at,
            candidates,
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Backstage Integration Priority Report\n");
        let _ = writeln!(
            out,
            "\nGenerated on: {} UTC\n\n## Top Candidates for Backstage Integration\n",
            self.generated_at.format("%Y-%m-%d %H:%M")
        );
        for (idx, entry) in self.candidates.iter().enumerate() {
            let _ = writeln!(out, "### {}. {} (Score: {})", idx + 1, entry.name, entry.score);
            let _ = writeln!(out, "- URL: {}", entry.url);
            let _ = writeln!(out, "- Description: {}", entry.description);
            if let Some(updated) = entry.updated_at {
                let _ = writeln!(out, "- Last Updated: {}", updated.to_rfc3339());
            }
            let _ = writeln!(out, "- Stars: {}, Forks: {}", entry.stars, entry.forks);
            out.push_str("\nRecommendation reasons:\n");
            for reason in &entry.reasons {
                let _ = writeln!(out, "- {}", reason);
            }
            out.push('\n');
        }
        out
    }
}

/// Score every repository of `org` that has no descriptor yet
#[tracing::instrument(skip(scm, settings))]
pub async fn analyze(
    scm: &dyn SourceControl,
    org: &str,
    settings: &EngineSettings,
    as_of: DateTime<Utc>,
) -> HostResult<PriorityReport> {
    let repositories = with_rate_limit_wait(|| scm.list_repositories(org)).await?;
    let mut entries = Vec::new();
    for repository in repositories.iter().filter(|r| !r.archived) {
        match score_live(scm, repository, settings, as_of).await {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(repo = %repository.full_name(), error = %e, "Skipping repository in priority analysis");
            }
        }
    }
    Ok(PriorityReport::from_entries(entries, as_of))
}

async fn score_live(
    scm: &dyn SourceControl,
    repository: &Repository,
    settings: &EngineSettings,
    as_of: DateTime<Utc>,
) -> HostResult<Option<PriorityEntry>> {
    let repo = repository.repo_ref();
    let branch = &repository.default_branch;
    let has_descriptor = with_rate_limit_wait(|| scm.get_file(&repo, &settings.descriptor_path, branch))
        .await?
        .is_some();
    if has_descriptor {
        return Ok(None);
    }
    let root: Vec<String> = with_rate_limit_wait(|| scm.list_directory(&repo, "", branch))
        .await?
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    Ok(Some(score(repository, &root, as_of)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bso_host_mock::{InMemoryScm, sample_repository};
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_scoring_rules() {
        let mut repo = sample_repository("acme", "payments-sdk");
        repo.pushed_at = Some(as_of() - Duration::days(3));
        repo.stargazers_count = 40;
        repo.forks_count = 2;
        repo.description = Some("Client SDK for payments".into());
        repo.homepage = Some("https://docs.acme.dev".into());
        repo.topics = vec!["payments".into(), "api".into()];

        let entry = score(&repo, &["README.md".to_string(), "src".to_string()], as_of());
        // 30 recent + 20 established + 50 stars + 10 forks + 30 docs
        // + 20 description + 20 topics + 10 description + 10 homepage + 10 topics
        assert_eq!(entry.score, 210);
        assert!(entry.reasons.contains(&"Has developer documentation".to_string()));
    }

    #[test]
    fn test_quiet_repository_scores_low() {
        let mut repo = sample_repository("acme", "scratch");
        repo.created_at = as_of() - Duration::days(10);
        let entry = score(&repo, &[], as_of());
        assert_eq!(entry.score, 0);
        assert!(entry.reasons.is_empty());
    }

    #[test]
    fn test_ranking_threshold_and_ties() {
        let entry = |name: &str, score: u32| PriorityEntry {
            name: name.into(),
            score,
            reasons: vec![],
            url: String::new(),
            description: String::new(),
            updated_at: None,
            stars: 0,
            forks: 0,
        };
        let mut entries: Vec<PriorityEntry> = (0..12).map(|i| entry(&format!("r{:02}", i), 100)).collect();
        entries.push(entry("low", 30));
        entries.push(entry("top", 150));

        let report = PriorityReport::from_entries(entries, as_of());
        assert_eq!(report.candidates.len(), 10);
        assert_eq!(report.candidates[0].name, "top");
        assert_eq!(report.candidates[1].name, "r00");
        assert!(report.candidates.iter().all(|c| c.name != "low"));
        assert!(report.to_markdown().contains("### 1. top (Score: 150)"));
    }

    #[tokio::test]
    async fn test_onboarded_repositories_are_skipped() {
        let scm = InMemoryScm::new();
        let mut candidate = sample_repository("acme", "candidate");
        candidate.stargazers_count = 30;
        candidate.description = Some("API gateway".into());
        let mut onboarded = candidate.clone();
        onboarded.name = "onboarded".into();
        scm.add_repository(candidate);
        scm.add_repository(onboarded.clone());
        scm.seed_file(&onboarded.repo_ref(), "main", "catalog-info.yaml", "kind: Component\n");

        let report = analyze(&scm, "acme", &EngineSettings::default(), as_of())
            .await
            .unwrap();
        let names: Vec<&str> = report.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["candidate"]);
    }
}
