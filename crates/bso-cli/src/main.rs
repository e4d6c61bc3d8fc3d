// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use bso_cli::{Cli, Commands, Parser};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    cli.logging.clone().init("bso")?;
    tracing::debug!(run = %bso_logging::run_id(), "Starting bso");

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => args.run(config).await,
        Commands::Canary(args) => args.run(config).await,
        Commands::Status(args) => args.run(config).await,
        Commands::Priority(args) => args.run(config).await,
        Commands::ForceMerge(args) => args.run(config).await,
        Commands::Vault { subcommand } => subcommand.run().await,
        Commands::AppManifest(args) => args.run(),
    }
}
