// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Read-only commands: `bso status` and `bso priority`
#![allow(clippy::disallowed_methods)] // CLI is allowed to print to stdout/stderr

use crate::connection::{ConnectionArgs, load_settings};
use anyhow::Result;
use chrono::Utc;
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    /// Emit JSON instead of Markdown
    #[arg(long)]
    pub json: bool,

    /// Write the report to a file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl StatusArgs {
    pub async fn run(self, config: Option<&Path>) -> Result<()> {
        let settings = load_settings(config)?;
        let engine = self.connection.resolve().await?.engine(settings, true)?;

        let gate = engine.gate().check().await?;
        let report = engine.status(Utc::now()).await?;

        let rendered = if self.json {
            serde_json::to_string_pretty(&serde_json::json!({
                "gate": gate,
                "report": report,
            }))?
        } else {
            format!("{}\nCanary gate: {}\n", report.to_markdown(), gate)
        };
        write_output(self.output.as_deref(), &rendered)
    }
}

#[derive(Debug, Clone, Args)]
pub struct PriorityArgs {
    /// Emit JSON instead of Markdown
    #[arg(long)]
    pub json: bool,

    /// Write the report to a file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl PriorityArgs {
    pub async fn run(self, config: Option<&Path>) -> Result<()> {
        let settings = load_settings(config)?;
        let engine = self.connection.resolve().await?.engine(settings, true)?;

        let report = engine.priority(Utc::now()).await?;
        let rendered = if self.json {
            serde_json::to_string_pretty(&report)?
        } else {
            report.to_markdown()
        };
        write_output(self.output.as_deref(), &rendered)
    }
}

fn write_output(path: Option<&Path>, rendered: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, rendered)?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
