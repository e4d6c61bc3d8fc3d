// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! High-level vault operations

use crate::{
    config::VaultConfig,
    crypto::{VaultKey, decrypt_secret, encrypt_secret},
    error::{Error, Result},
    storage::{ensure_storage_dir, list_orgs, read_org_secret, remove_org_secret, write_org_secret},
    types::OrgConfig,
};
use zeroize::Zeroizing;

/// Encrypted per-organization configuration store
///
/// The vault holds exactly one key. Rotating to a new key re-encrypts every
/// stored blob before the vault switches over.
#[derive(Debug)]
pub struct CredentialVault {
    config: VaultConfig,
    key: VaultKey,
}

impl CredentialVault {
    pub fn new(config: VaultConfig, key: VaultKey) -> Self {
        Self { config, key }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Version of the key currently in use
    pub fn key_version(&self) -> u32 {
        self.key.version()
    }

    /// Encrypt and store the configuration of an organization
    pub async fn save_org_config(&self, org: &str, org_config: &OrgConfig) -> Result<()> {
        let plaintext = Zeroizing::new(serde_json::to_vec(org_config)?);
        let sealed = encrypt_secret(&plaintext, &self.key)?;
        let path = write_org_secret(&self.config, org, &sealed).await?;
        tracing::info!(org = %org, path = %path.display(), key_version = self.key.version(), "Saved organization config");
        Ok(())
    }

    /// Load and decrypt the configuration of an organization
    pub async fn load_org_config(&self, org: &str) -> Result<Option<OrgConfig>> {
        let Some(sealed) = read_org_secret(&self.config, org).await? else {
            return Ok(None);
        };
        let plaintext = decrypt_secret(&sealed, &self.key)?;
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    /// List all organizations with stored configuration
    pub async fn list_organizations(&self) -> Result<Vec<String>> {
        list_orgs(&self.config).await
    }

    /// Remove the stored configuration of an organization
    pub async fn remove_org_config(&self, org: &str) -> Result<bool> {
        remove_org_secret(&self.config, org).await
    }

    /// Re-encrypt every stored blob with `new_key` and switch to it
    ///
    /// All blobs are decrypted with the current key first; if any of them
    /// fails nothing is written. Returns the number of rotated organizations.
    pub async fn rotate_key(&mut self, new_key: VaultKey) -> Result<usize> {
        if new_key.version() <= self.key.version() {
            return Err(Error::Config(format!(
                "new key version {} must be greater than current version {}",
                new_key.version(),
                self.key.version()
            )));
        }

        let orgs = self.list_organizations().await?;
        let mut staged = Vec::with_capacity(orgs.len());
        for org in &orgs {
            let sealed = read_org_secret(&self.config, org)
                .await?
                .ok_or_else(|| Error::Config(format!("{} disappeared during rotation", org)))?;
            let plaintext = decrypt_secret(&sealed, &self.key)?;
            let resealed = encrypt_secret(&plaintext, &new_key)?;
            staged.push((org.clone(), resealed));
        }

        ensure_storage_dir(&self.config).await?;
        for (org, resealed) in &staged {
            write_org_secret(&self.config, org, resealed).await?;
        }

        tracing::info!(
            rotated = staged.len(),
            from_version = self.key.version(),
            to_version = new_key.version(),
            "Rotated vault key"
        );
        self.key = new_key;
        Ok(staged.len())
    }
}
