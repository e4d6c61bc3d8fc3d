// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Repository facts gathered from the source-control host
//!
//! The descriptor generator is pure; everything it needs to know about a
//! repository is collected here first, with read-only calls.

use bso_host_api::{EntryKind, HostResult, Repository, SourceControl};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Locations searched for CODEOWNERS, in order
pub const CODEOWNERS_PATHS: [&str; 3] = ["CODEOWNERS", ".github/CODEOWNERS", "docs/CODEOWNERS"];

/// Subdirectories searched for API specifications besides the root
pub const API_SPEC_DIRS: [&str; 3] = ["docs", "api", "specs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    OpenApi,
    AsyncApi,
    GraphQl,
}

impl ApiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKind::OpenApi => "openapi",
            ApiKind::AsyncApi => "asyncapi",
            ApiKind::GraphQl => "graphql",
        }
    }

    /// Classify a file name as an API specification
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        if lower == "schema.graphql" || lower == "graphql.schema" {
            return Some(ApiKind::GraphQl);
        }
        let (stem, ext) = lower.rsplit_once('.')?;
        if !matches!(ext, "yaml" | "yml" | "json") {
            return None;
        }
        match stem {
            "openapi" | "swagger" => Some(ApiKind::OpenApi),
            "asyncapi" => Some(ApiKind::AsyncApi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApiSpecFile {
    pub path: String,
    pub kind: ApiKind,
}

/// Everything the descriptor generator looks at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFacts {
    pub repository: Repository,
    /// Names of the entries at the repository root
    pub root_entries: BTreeSet<String>,
    /// API specifications, sorted by path
    pub api_specs: Vec<ApiSpecFile>,
    pub default_branch_protected: bool,
    pub commit_count: u64,
    /// First `org/team` listed in CODEOWNERS
    pub codeowners_team: Option<String>,
    pub top_contributor: Option<String>,
    /// First organization team of the top contributor
    pub contributor_team: Option<String>,
    /// Reference instant for age-based classification
    pub as_of: DateTime<Utc>,
}

impl RepoFacts {
    /// Facts with no content, useful as a starting point
    pub fn bare(repository: Repository, as_of: DateTime<Utc>) -> Self {
        Self {
            repository,
            root_entries: BTreeSet::new(),
            api_specs: Vec::new(),
            default_branch_protected: false,
            commit_count: 0,
            codeowners_team: None,
            top_contributor: None,
            contributor_team: None,
            as_of,
        }
    }

    pub fn has_root_entry(&self, name: &str) -> bool {
        self.root_entries.contains(name)
    }

    pub fn has_docs(&self) -> bool {
        self.has_root_entry("docs") || self.has_root_entry("mkdocs.yml")
    }
}

/// First `@org/team` mention in a CODEOWNERS file, without the `@`
pub fn codeowners_team(content: &str) -> Option<String> {
    static TEAM: OnceLock<Regex> = OnceLock::new();
    let re = TEAM.get_or_init(|| Regex::new(r"@([\w-]+/[\w-]+)").expect("static regex"));
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .find_map(|line| re.captures(line).map(|c| c[1].to_string()))
}

/// Collect the facts of one repository
#[tracing::instrument(skip(scm, repository), fields(repo = %repository.full_name()))]
pub async fn gather(
    scm: &dyn SourceControl,
    repository: &Repository,
    as_of: DateTime<Utc>,
) -> HostResult<RepoFacts> {
    let repo = repository.repo_ref();
    let branch = repository.default_branch.as_str();
    let mut facts = RepoFacts::bare(repository.clone(), as_of);

    let root = scm.list_directory(&repo, "", branch).await?;
    let mut specs = BTreeSet::new();
    for entry in &root {
        facts.root_entries.insert(entry.name.clone());
        match entry.kind {
            EntryKind::File => {
                if let Some(kind) = ApiKind::detect(&entry.name) {
                    specs.insert(ApiSpecFile {
                        path: entry.path.clone(),
                        kind,
                    });
                }
            }
            EntryKind::Dir => {
                if API_SPEC_DIRS.contains(&entry.name.to_ascii_lowercase().as_str()) {
                    for sub in scm.list_directory(&repo, &entry.path, branch).await? {
                        if sub.kind != EntryKind::File {
                            continue;
                        }
                        if let Some(kind) = ApiKind::detect(&sub.name) {
                            specs.insert(ApiSpecFile {
                                path: sub.path,
                                kind,
                            });
                        }
                    }
                }
            }
        }
    }
    facts.api_specs = specs.into_iter().collect();

    facts.default_branch_protected = scm.get_branch_protection(&repo, branch).await?.is_some();
    facts.commit_count = scm.commit_count(&repo, branch).await?;

    for path in CODEOWNERS_PATHS {
        if let Some(file) = scm.get_file(&repo, path, branch).await? {
            if let Some(team) = codeowners_team(&file.content) {
                facts.codeowners_team = Some(team);
                break;
            }
        }
    }

    if facts.codeowners_team.is_none() {
        facts.top_contributor = scm.top_contributor(&repo).await?;
        if let Some(login) = &facts.top_contributor {
            facts.contributor_team = scm
                .user_teams(&repository.owner, login)
                .await?
                .into_iter()
                .next();
        }
    }

    tracing::debug!(
        api_specs = facts.api_specs.len(),
        protected = facts.default_branch_protected,
        "Gathered repository facts"
    );
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_spec_detection() {
        assert_eq!(ApiKind::detect("openapi.yaml"), Some(ApiKind::OpenApi));
        assert_eq!(ApiKind::detect("Swagger.JSON"), Some(ApiKind::OpenApi));
        assert_eq!(ApiKind::detect("asyncapi.yml"), Some(ApiKind::AsyncApi));
        assert_eq!(ApiKind::detect("schema.graphql"), Some(ApiKind::GraphQl));
        assert_eq!(ApiKind::detect("graphql.schema"), Some(ApiKind::GraphQl));
        assert_eq!(ApiKind::detect("openapi.md"), None);
        assert_eq!(ApiKind::detect("my-openapi.yaml"), None);
        assert_eq!(ApiKind::detect("README"), None);
    }

    #[test]
    fn test_codeowners_team_extraction() {
        let content = "# owners\n# @ignored/comment\n*.rs @alice @acme/core-team\n/docs @acme/docs\n";
        assert_eq!(codeowners_team(content).as_deref(), Some("acme/core-team"));
        assert_eq!(codeowners_team("* @alice @bob\n"), None);
    }
}
