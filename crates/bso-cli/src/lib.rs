// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

pub mod connection;
pub mod force_merge;
pub mod manifest;
pub mod onboard;
pub mod reports;
pub mod vault;

pub use clap::{Parser, Subcommand};

use bso_logging::CliLoggingArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bso")]
#[command(about = "Onboard an organization's repositories into the Backstage catalog")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Engine settings file (TOML)
    #[arg(long, global = true, env = "BSO_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub logging: CliLoggingArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the organization and perform the onboarding actions
    Run(onboard::RunArgs),
    /// Validate the automation against one repository and unlock scheduled runs
    Canary(onboard::CanaryArgs),
    /// Report onboarding status without changing anything
    Status(reports::StatusArgs),
    /// Rank repositories that are not onboarded yet
    Priority(reports::PriorityArgs),
    /// Handle a /force-merge comment on a tracking issue
    ForceMerge(force_merge::ForceMergeArgs),
    /// Manage encrypted per-organization connection settings
    Vault {
        #[command(subcommand)]
        subcommand: vault::VaultCommands,
    },
    /// Print the GitHub App manifest for the automation
    AppManifest(manifest::AppManifestArgs),
}
