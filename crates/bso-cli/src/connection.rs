// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Secret loading and host construction.
//!
//! Connection settings come from flags or the environment first; with
//! `--from-vault <org>` the stored organization config fills whatever is
//! still missing. Required secrets are checked before any client is built.

use anyhow::{Context, Result, anyhow};
use bso_core::{Engine, EngineConfig, EngineError, EngineSettings};
use bso_credentials::{CredentialVault, OrgConfig, VaultConfig, VaultKey};
use bso_logging::redact;
use bso_rest_client::{AuthConfig, BackstageClient, DEFAULT_API_URL, DEFAULT_TOKEN_TYPE, GitHubClient};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable accepted in place of `GITHUB_TOKEN`
pub const TOKEN_ALIAS_ENV: &str = "AUTOMATION_TOKEN";

/// Key material and location of the credential vault
#[derive(Debug, Clone, Default, Args)]
pub struct VaultKeyArgs {
    /// Base64 vault key
    #[arg(long, env = "BACKSTAGE_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    /// Version number of the vault key
    #[arg(long, env = "BACKSTAGE_ENCRYPTION_KEY_VERSION", default_value_t = 1)]
    pub key_version: u32,

    /// Vault directory (defaults to the platform config directory)
    #[arg(long)]
    pub vault_dir: Option<PathBuf>,

    /// Home directory override for all stored state
    #[arg(long, env = "BSO_HOME")]
    pub bso_home: Option<PathBuf>,
}

impl VaultKeyArgs {
    pub fn vault_config(&self) -> VaultConfig {
        VaultConfig {
            storage_path: self.vault_dir.clone(),
            home_override: self.bso_home.clone(),
        }
    }

    pub fn key(&self) -> Result<VaultKey> {
        let raw = non_empty(self.encryption_key.clone())
            .ok_or(EngineError::MissingSecret("BACKSTAGE_ENCRYPTION_KEY"))?;
        Ok(VaultKey::from_base64(self.key_version, &raw)?)
    }

    pub fn open(&self) -> Result<CredentialVault> {
        Ok(CredentialVault::new(self.vault_config(), self.key()?))
    }
}

/// Flags shared by every command that talks to the hosts
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// Organization to operate on
    #[arg(long, env = "GITHUB_ORG")]
    pub org: Option<String>,

    /// Source-control automation token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Enterprise API base URL
    #[arg(long, env = "GITHUB_API_URL")]
    pub github_api_url: Option<String>,

    /// Catalog base URL
    #[arg(long, env = "BACKSTAGE_URL")]
    pub backstage_url: Option<String>,

    /// Catalog API token
    #[arg(long, env = "BACKSTAGE_TOKEN", hide_env_values = true)]
    pub backstage_token: Option<String>,

    /// Authorization scheme for the catalog token
    #[arg(long, env = "BACKSTAGE_TOKEN_TYPE")]
    pub backstage_token_type: Option<String>,

    /// Fill missing settings from the vault entry of this organization
    #[arg(long, value_name = "ORG")]
    pub from_vault: Option<String>,

    #[command(flatten)]
    pub vault: VaultKeyArgs,
}

/// Fully resolved connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct Connection {
    pub org: String,
    pub github_token: String,
    pub github_api_url: String,
    pub backstage_url: String,
    pub backstage_token: Option<String>,
    pub backstage_token_type: String,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("org", &self.org)
            .field("github_token", &redact(&self.github_token))
            .field("github_api_url", &self.github_api_url)
            .field("backstage_url", &self.backstage_url)
            .field("backstage_token", &self.backstage_token.as_ref().map(redact))
            .field("backstage_token_type", &self.backstage_token_type)
            .finish()
    }
}

impl ConnectionArgs {
    /// Resolve flags, environment and (optionally) the vault
    pub async fn resolve(&self) -> Result<Connection> {
        let stored = match &self.from_vault {
            Some(org) => {
                let vault = self.vault.open()?;
                let config = vault
                    .load_org_config(org)
                    .await?
                    .ok_or_else(|| anyhow!("no vault entry for organization {}", org))?;
                tracing::info!(org = %org, "Loaded connection settings from vault");
                Some(config)
            }
            None => None,
        };
        let alias = std::env::var(TOKEN_ALIAS_ENV).ok();
        Ok(self.resolve_with(stored, alias)?)
    }

    /// Merge explicit settings with a stored org config
    ///
    /// Explicit values win; the token alias is consulted before the vault.
    pub fn resolve_with(
        &self,
        stored: Option<OrgConfig>,
        token_alias: Option<String>,
    ) -> Result<Connection, EngineError> {
        let stored = stored.unwrap_or_default();

        let org = non_empty(self.org.clone())
            .or_else(|| self.from_vault.clone())
            .ok_or(EngineError::MissingSecret("GITHUB_ORG"))?;
        let github_token = non_empty(self.github_token.clone())
            .or_else(|| non_empty(token_alias))
            .or_else(|| non_empty(Some(stored.github_token.clone())))
            .ok_or(EngineError::MissingSecret("GITHUB_TOKEN"))?;
        let backstage_url = non_empty(self.backstage_url.clone())
            .or_else(|| non_empty(Some(stored.backstage_url.clone())))
            .ok_or(EngineError::MissingSecret("BACKSTAGE_URL"))?;

        Ok(Connection {
            org,
            github_token,
            github_api_url: non_empty(self.github_api_url.clone())
                .or_else(|| non_empty(stored.github_api_url.clone()))
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            backstage_url,
            backstage_token: non_empty(self.backstage_token.clone())
                .or_else(|| non_empty(stored.backstage_token.clone())),
            backstage_token_type: non_empty(self.backstage_token_type.clone())
                .or_else(|| non_empty(stored.backstage_token_type.clone()))
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
        })
    }
}

impl Connection {
    /// Build the engine over the REST hosts
    pub fn engine(&self, settings: EngineSettings, dry_run: bool) -> Result<Engine> {
        let github = GitHubClient::new(&self.github_api_url, AuthConfig::bearer(&self.github_token))
            .context("failed to build source-control client")?;
        let catalog_auth = match &self.backstage_token {
            Some(token) => AuthConfig::with_scheme(&self.backstage_token_type, token),
            None => AuthConfig::none(),
        };
        let catalog = BackstageClient::from_url(&self.backstage_url, catalog_auth)
            .context("failed to build catalog client")?;

        tracing::debug!(
            org = %self.org,
            api = %self.github_api_url,
            catalog = %self.backstage_url,
            token = %redact(&self.github_token),
            "Connecting to hosts"
        );

        let config = EngineConfig::new(&self.org, &self.backstage_url)
            .with_settings(settings)
            .with_dry_run(dry_run);
        Ok(Engine::new(config, Arc::new(github), Arc::new(catalog))?)
    }
}

/// Engine settings from `--config`, or defaults
pub fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    match path {
        Some(path) => Ok(EngineSettings::load(path)?),
        None => Ok(EngineSettings::default()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
