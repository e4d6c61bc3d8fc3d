// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `bso app-manifest`
#![allow(clippy::disallowed_methods)] // CLI is allowed to print to stdout/stderr

use anyhow::Result;
use bso_core::app_manifest::AppManifest;
use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct AppManifestArgs {
    /// App name shown on the host
    #[arg(long, default_value = "backstage-onboarding")]
    pub name: String,

    /// Public base URL receiving webhooks
    #[arg(long)]
    pub webhook_url: String,
}

impl AppManifestArgs {
    pub fn run(self) -> Result<()> {
        let manifest = AppManifest::new(&self.name, &self.webhook_url);
        println!("{}", manifest.to_json()?);
        Ok(())
    }
}
