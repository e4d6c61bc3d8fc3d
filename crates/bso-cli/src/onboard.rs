// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `bso run` and `bso canary`
#![allow(clippy::disallowed_methods)] // CLI is allowed to print to stdout/stderr

use crate::connection::{ConnectionArgs, load_settings};
use anyhow::{Result, bail};
use bso_core::{EngineError, GateState, RunMode, RunOutcome};
use clap::{Args, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunKind {
    /// Organization-wide; requires a recorded canary
    Scheduled,
    /// Operator-triggered; bypasses the canary gate
    Manual,
}

/// Output options shared by the mutating commands
#[derive(Debug, Clone, Default, Args)]
pub struct SummaryArgs {
    /// Only report what would change
    #[arg(long, env = "DRY_RUN", value_parser = clap::builder::FalseyValueParser::new())]
    pub dry_run: bool,

    /// Append the run summary (Markdown) to this file
    #[arg(long, env = "GITHUB_STEP_SUMMARY")]
    pub summary_file: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// How the run was triggered
    #[arg(long, value_enum, default_value_t = RunKind::Manual)]
    pub mode: RunKind,

    /// Limit a manual run to one repository
    #[arg(long)]
    pub repo: Option<String>,

    #[command(flatten)]
    pub summary: SummaryArgs,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl RunArgs {
    pub fn run_mode(&self) -> Result<RunMode> {
        match (self.mode, &self.repo) {
            (RunKind::Scheduled, Some(_)) => bail!("--repo is only valid with --mode manual"),
            (RunKind::Scheduled, None) => Ok(RunMode::Scheduled),
            (RunKind::Manual, repo) => Ok(RunMode::Manual(repo.clone())),
        }
    }

    pub async fn run(self, config: Option<&Path>) -> Result<()> {
        let mode = self.run_mode()?;
        let settings = load_settings(config)?;
        let engine = self.connection.resolve().await?.engine(settings, self.summary.dry_run)?;

        let outcome = match engine.run(mode).await {
            Ok(outcome) => outcome,
            Err(EngineError::GateBlocked(reason)) => {
                tracing::warn!(%reason, "Scheduled run blocked by canary gate");
                return emit_blocked(&self.summary, &reason);
            }
            Err(other) => return Err(other.into()),
        };
        emit(&self.summary, &outcome)?;

        if outcome.summary.failed > 0 {
            bail!("{} repositories failed", outcome.summary.failed);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
pub struct CanaryArgs {
    /// Repository to validate against
    #[arg(long, env = "CANARY_REPO", required_unless_present = "reset")]
    pub repo: Option<String>,

    /// Clear the recorded canary so scheduled runs block again
    #[arg(long)]
    pub reset: bool,

    #[command(flatten)]
    pub summary: SummaryArgs,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl CanaryArgs {
    pub async fn run(self, config: Option<&Path>) -> Result<()> {
        let settings = load_settings(config)?;
        let engine = self.connection.resolve().await?.engine(settings, self.summary.dry_run)?;

        if self.reset {
            engine.gate().reset().await?;
            println!("Canary gate reset; scheduled runs are blocked until the next canary");
            return Ok(());
        }

        let Some(repo) = self.repo else {
            bail!("--repo is required for a canary run");
        };
        let outcome = engine.run(RunMode::Canary(repo.clone())).await?;
        emit(&self.summary, &outcome)?;

        if !outcome.summary.canary_recorded && !outcome.summary.dry_run {
            bail!("canary on {} did not succeed; scheduled runs stay blocked", repo);
        }
        Ok(())
    }
}

fn emit(args: &SummaryArgs, outcome: &RunOutcome) -> Result<()> {
    let markdown = format!(
        "{}\n{}",
        outcome.summary.to_markdown(),
        outcome.report.to_markdown()
    );
    let json = serde_json::to_string_pretty(&outcome.summary)?;
    write_summary(args, &markdown, &json)
}

/// A blocked scheduled run is reported, not treated as a failure
fn emit_blocked(args: &SummaryArgs, reason: &str) -> Result<()> {
    let gate = GateState::Blocked {
        reason: reason.to_string(),
    };
    let markdown = format!(
        "## Automation Summary\n\n\
         - Mode: Scheduled\n\
         - Canary gate: {}\n\
         - Processed: 0, skipped: 0, failed: 0\n\n\
         No repositories were touched. Run `bso canary --repo <name>` to unlock scheduled runs.\n",
        gate
    );
    let json = serde_json::to_string_pretty(&serde_json::json!({
        "mode": RunMode::Scheduled,
        "gate": gate,
        "processed": 0,
    }))?;
    write_summary(args, &markdown, &json)
}

fn write_summary(args: &SummaryArgs, markdown: &str, json: &str) -> Result<()> {
    if args.json {
        println!("{}", json);
    } else {
        println!("{}", markdown);
    }

    if let Some(path) = &args.summary_file {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", markdown)?;
        tracing::debug!(path = %path.display(), "Appended run summary");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blocked_run_appends_reason_and_succeeds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.md");
        std::fs::write(&path, "previous step\n").unwrap();
        let args = SummaryArgs {
            summary_file: Some(path.clone()),
            ..SummaryArgs::default()
        };

        emit_blocked(&args, "no canary run recorded").unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("previous step\n"));
        assert!(written.contains("- Mode: Scheduled"));
        assert!(written.contains("- Canary gate: blocked: no canary run recorded"));
    }

    #[test]
    fn test_blocked_run_json_names_gate_state() {
        let args = SummaryArgs {
            json: true,
            ..SummaryArgs::default()
        };
        assert!(emit_blocked(&args, "stale canary").is_ok());
    }
}
