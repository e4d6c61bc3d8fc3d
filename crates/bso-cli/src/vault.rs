// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! CLI surface for the credential vault.
#![allow(clippy::disallowed_methods)] // CLI is allowed to print to stdout/stderr

use crate::connection::VaultKeyArgs;
use anyhow::{Result, bail};
use bso_credentials::{OrgConfig, VaultKey, storage};
use clap::Subcommand;

#[derive(Debug, Clone, Subcommand)]
pub enum VaultCommands {
    /// Encrypt and store the connection settings of an organization
    Save {
        /// Organization name
        org: String,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: String,
        #[arg(long, env = "BACKSTAGE_URL")]
        backstage_url: String,
        #[arg(long, env = "GITHUB_API_URL")]
        github_api_url: Option<String>,
        #[arg(long, env = "BACKSTAGE_TOKEN", hide_env_values = true)]
        backstage_token: Option<String>,
        #[arg(long, env = "BACKSTAGE_TOKEN_TYPE")]
        backstage_token_type: Option<String>,
        #[command(flatten)]
        key: VaultKeyArgs,
    },
    /// Decrypt an entry and print it with secrets redacted
    Show {
        org: String,
        #[command(flatten)]
        key: VaultKeyArgs,
    },
    /// List organizations with stored settings
    List {
        #[command(flatten)]
        key: VaultKeyArgs,
    },
    /// Delete the stored settings of an organization
    Remove {
        org: String,
        #[command(flatten)]
        key: VaultKeyArgs,
    },
    /// Re-encrypt every entry with a new key
    Rotate {
        /// New base64 key
        #[arg(long, env = "BACKSTAGE_NEW_ENCRYPTION_KEY", hide_env_values = true)]
        new_key: String,
        /// Version of the new key (defaults to the current version + 1)
        #[arg(long)]
        new_version: Option<u32>,
        #[command(flatten)]
        key: VaultKeyArgs,
    },
    /// Print a fresh random base64 key
    GenerateKey {
        #[arg(long, default_value_t = 1)]
        key_version: u32,
    },
}

impl VaultCommands {
    pub async fn run(self) -> Result<()> {
        match self {
            VaultCommands::Save {
                org,
                github_token,
                backstage_url,
                github_api_url,
                backstage_token,
                backstage_token_type,
                key,
            } => {
                let vault = key.open()?;
                let config = OrgConfig {
                    github_token,
                    backstage_url,
                    github_api_url,
                    backstage_token,
                    backstage_token_type,
                };
                vault.save_org_config(&org, &config).await?;
                println!("Saved settings for {} (key version {})", org, vault.key_version());
            }
            VaultCommands::Show { org, key } => {
                let vault = key.open()?;
                match vault.load_org_config(&org).await? {
                    Some(config) => println!("{:#?}", config),
                    None => bail!("no vault entry for organization {}", org),
                }
            }
            VaultCommands::List { key } => {
                let orgs = storage::list_orgs(&key.vault_config()).await?;
                if orgs.is_empty() {
                    println!("No organizations stored");
                }
                for org in orgs {
                    println!("{}", org);
                }
            }
            VaultCommands::Remove { org, key } => {
                if storage::remove_org_secret(&key.vault_config(), &org).await? {
                    println!("Removed {}", org);
                } else {
                    bail!("no vault entry for organization {}", org);
                }
            }
            VaultCommands::Rotate {
                new_key,
                new_version,
                key,
            } => {
                let mut vault = key.open()?;
                let version = new_version.unwrap_or(vault.key_version() + 1);
                let new_key = VaultKey::from_base64(version, &new_key)?;
                let rotated = vault.rotate_key(new_key).await?;
                println!(
                    "Rotated {} organizations to key version {}; update BACKSTAGE_ENCRYPTION_KEY and BACKSTAGE_ENCRYPTION_KEY_VERSION",
                    rotated, version
                );
            }
            VaultCommands::GenerateKey { key_version } => {
                let key = VaultKey::generate(key_version)?;
                println!("{}", key.to_base64().as_str());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key_args(dir: &TempDir, key: &VaultKey) -> VaultKeyArgs {
        VaultKeyArgs {
            encryption_key: Some(key.to_base64().to_string()),
            key_version: key.version(),
            vault_dir: Some(dir.path().to_path_buf()),
            bso_home: None,
        }
    }

    #[tokio::test]
    async fn test_save_then_rotate_keeps_entries_readable() {
        let dir = TempDir::new().unwrap();
        let old = VaultKey::generate(1).unwrap();
        let new = VaultKey::generate(2).unwrap();

        VaultCommands::Save {
            org: "acme".into(),
            github_token: "ghp_secret".into(),
            backstage_url: "https://backstage.acme.dev".into(),
            github_api_url: None,
            backstage_token: None,
            backstage_token_type: None,
            key: key_args(&dir, &old),
        }
        .run()
        .await
        .unwrap();

        VaultCommands::Rotate {
            new_key: new.to_base64().to_string(),
            new_version: None,
            key: key_args(&dir, &old),
        }
        .run()
        .await
        .unwrap();

        let vault = key_args(&dir, &new).open().unwrap();
        let stored = vault.load_org_config("acme").await.unwrap().unwrap();
        assert_eq!(stored.github_token, "ghp_secret");
        assert!(key_args(&dir, &old).open().unwrap().load_org_config("acme").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_missing_entry_fails() {
        let dir = TempDir::new().unwrap();
        let key = VaultKey::generate(1).unwrap();
        let err = VaultCommands::Remove {
            org: "ghost".into(),
            key: key_args(&dir, &key),
        }
        .run()
        .await
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
