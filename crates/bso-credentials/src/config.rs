// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration for vault storage location

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Vault-related configuration section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct VaultConfig {
    /// Custom storage path for the encrypted files
    pub storage_path: Option<PathBuf>,

    /// Home directory override (from `BSO_HOME`)
    #[serde(skip)]
    pub home_override: Option<PathBuf>,
}

impl VaultConfig {
    pub fn with_storage_path(path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: Some(path.into()),
            home_override: None,
        }
    }

    /// Get the vault storage directory
    /// Precedence: storage_path > home_override > dirs::config_dir
    pub fn storage_dir(&self) -> crate::Result<PathBuf> {
        if let Some(custom_path) = &self.storage_path {
            return Ok(custom_path.clone());
        }

        if let Some(home) = &self.home_override {
            return Ok(home.join("secure_storage"));
        }

        let base_dir = dirs::config_dir().ok_or_else(|| {
            crate::Error::Config("Could not determine config directory".to_string())
        })?;
        Ok(base_dir.join("backstage-onboard").join("secure_storage"))
    }

    /// Path of the encrypted file for one organization
    pub fn org_file(&self, org: &str) -> crate::Result<PathBuf> {
        Ok(self.storage_dir()?.join(format!("{}.enc", org)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_dir_precedence() {
        let mut config = VaultConfig {
            storage_path: Some("/custom/path".into()),
            home_override: Some("/home/bso".into()),
        };
        assert_eq!(config.storage_dir().unwrap(), PathBuf::from("/custom/path"));

        config.storage_path = None;
        assert_eq!(
            config.storage_dir().unwrap(),
            PathBuf::from("/home/bso/secure_storage")
        );

        config.home_override = None;
        let fallback = config.storage_dir().unwrap();
        assert!(fallback.to_string_lossy().contains("backstage-onboard"));
        assert!(fallback.to_string_lossy().ends_with("secure_storage"));
    }

    #[test]
    fn test_org_file_uses_enc_extension() {
        let config = VaultConfig::with_storage_path("/vault");
        assert_eq!(config.org_file("acme").unwrap(), PathBuf::from("/vault/acme.enc"));
    }
}
