// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Status Reporter
//!
//! Groups repository records into onboarded / pending-review / blocked /
//! failed and renders the result as Markdown or JSON. Pure: it never calls
//! a host.

use crate::scanner::{RepoState, RepositoryRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportGroup {
    Onboarded,
    PendingReview,
    Blocked,
    Failed,
}

impl ReportGroup {
    pub const ALL: [ReportGroup; 4] = [
        ReportGroup::Onboarded,
        ReportGroup::PendingReview,
        ReportGroup::Blocked,
        ReportGroup::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportGroup::Onboarded => "onboarded",
            ReportGroup::PendingReview => "pending-review",
            ReportGroup::Blocked => "blocked",
            ReportGroup::Failed => "failed",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            ReportGroup::Onboarded => "✅",
            ReportGroup::PendingReview => "🔄",
            ReportGroup::Blocked => "⛔",
            ReportGroup::Failed => "❌",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub repo: String,
    pub group: ReportGroup,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Merged descriptor differs from a fresh generation
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub drifted: bool,
}

impl ReportEntry {
    pub fn from_record(record: &RepositoryRecord) -> Self {
        let (group, detail) = match &record.state {
            RepoState::Onboarded => (ReportGroup::Onboarded, None),
            RepoState::PendingReview => (ReportGroup::PendingReview, None),
            RepoState::PendingRegistration => (
                ReportGroup::PendingReview,
                Some("merged, awaiting catalog registration".to_string()),
            ),
            RepoState::NeedsDescriptor => (
                ReportGroup::PendingReview,
                Some("no onboarding pull request yet".to_string()),
            ),
            RepoState::Blocked(reason) => (ReportGroup::Blocked, Some(reason.clone())),
            RepoState::Failed(reason) => (ReportGroup::Failed, Some(reason.clone())),
        };
        Self {
            repo: record.repo.to_string(),
            group,
            pr: record.open_pr.as_ref().map(|pr| pr.number),
            detail,
            drifted: record.has_drifted(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub totals: BTreeMap<ReportGroup, usize>,
    pub entries: Vec<ReportEntry>,
}

impl StatusReport {
    pub fn build(records: &[RepositoryRecord], generated_at: DateTime<Utc>) -> Self {
        let entries: Vec<ReportEntry> = records.iter().map(ReportEntry::from_record).collect();
        let mut totals: BTreeMap<ReportGroup, usize> =
            ReportGroup::ALL.iter().map(|g| (*g, 0)).collect();
        for entry in &entries {
            *totals.entry(entry.group).or_insert(0) += 1;
        }
        Self {
            generated_at,
            totals,
            entries,
        }
    }

    pub fn total(&self, group: ReportGroup) -> usize {
        self.totals.get(&group).copied().unwrap_or(0)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "## Status Summary ({} UTC)\n",
            self.generated_at.format("%Y-%m-%d %H:%M")
        );
        let _ = writeln!(out, "- Total repositories: {}", self.entries.len());
        for group in ReportGroup::ALL {
            let _ = writeln!(out, "- {} {}: {}", group.icon(), group.as_str(), self.total(group));
        }
        let _ = writeln!(out, "\n## Repository Details\n");
        for entry in &self.entries {
            let _ = write!(out, "- {} `{}` {}", entry.group.icon(), entry.repo, entry.group.as_str());
            match (&entry.pr, &entry.detail) {
                (Some(pr), Some(detail)) => {
                    let _ = write!(out, " (PR #{}): {}", pr, detail);
                }
                (Some(pr), None) => {
                    let _ = write!(out, " (PR #{})", pr);
                }
                (None, Some(detail)) => {
                    let _ = write!(out, ": {}", detail);
                }
                (None, None) => {}
            }
            if entry.drifted {
                out.push_str(" (descriptor drifted)");
            }
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
