// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `bso force-merge`
#![allow(clippy::disallowed_methods)] // CLI is allowed to print to stdout/stderr

use crate::connection::{ConnectionArgs, load_settings};
use anyhow::{Result, bail};
use bso_core::{ForceMergeOutcome, ForceMergeRequest};
use bso_host_api::RepoRef;
use clap::Args;
use std::path::Path;

#[derive(Debug, Clone, Args)]
pub struct ForceMergeArgs {
    /// Repository holding the tracking issue (`name` or `owner/name`)
    #[arg(long)]
    pub repo: String,

    /// Tracking issue number
    #[arg(long)]
    pub issue: u64,

    /// Login of the comment author
    #[arg(long, env = "GITHUB_ACTOR")]
    pub actor: String,

    /// Comment body
    #[arg(long, env = "COMMENT_BODY")]
    pub comment: String,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl ForceMergeArgs {
    pub fn request(&self, org: &str) -> ForceMergeRequest {
        let repo = match self.repo.split_once('/') {
            Some((owner, name)) => RepoRef::new(owner, name),
            None => RepoRef::new(org, &self.repo),
        };
        ForceMergeRequest {
            repo,
            issue: self.issue,
            actor: self.actor.clone(),
            comment: self.comment.clone(),
        }
    }

    pub async fn run(self, config: Option<&Path>) -> Result<()> {
        let settings = load_settings(config)?;
        let connection = self.connection.resolve().await?;
        let engine = connection.engine(settings, false)?;

        let request = self.request(&connection.org);
        let report = engine.force_merge_handler().handle(&request).await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            match &report.outcome {
                ForceMergeOutcome::Merged { pr, sha } => println!(
                    "Merged PR #{} of {} at {}",
                    pr,
                    report.repo,
                    sha.as_deref().unwrap_or("unknown commit")
                ),
                ForceMergeOutcome::Rejected(reason) => println!("Rejected: {}", reason),
                ForceMergeOutcome::Failed(reason) => println!("Failed: {}", reason),
                ForceMergeOutcome::Ignored => println!("No force-merge command found"),
            }
        }

        if !report.restored {
            bail!(
                "branch protection on {} was not restored; restore it manually",
                report.repo
            );
        }
        if let ForceMergeOutcome::Failed(reason) = &report.outcome {
            bail!("force merge failed: {}", reason);
        }
        Ok(())
    }
}
