// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core types for the credential vault

use serde::{Deserialize, Serialize};

/// Current on-disk envelope format
pub const ENVELOPE_FORMAT: u8 = 1;

/// Ciphertext blob plus the version of the key that sealed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// Envelope layout version
    pub format: u8,

    /// Version of the vault key used for encryption
    pub key_version: u32,

    /// Base64 AES-GCM nonce
    pub nonce: String,

    /// Base64 ciphertext including the authentication tag
    pub ciphertext: String,
}

impl EncryptedSecret {
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Per-organization connection settings kept in the vault
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgConfig {
    /// Source-control automation token
    pub github_token: String,

    /// Catalog base URL
    pub backstage_url: String,

    /// Enterprise API base URL, when not using the public host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_api_url: Option<String>,

    /// Catalog API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backstage_token: Option<String>,

    /// Authorization scheme for the catalog token (defaults to Bearer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backstage_token_type: Option<String>,
}

impl std::fmt::Debug for OrgConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrgConfig")
            .field("github_token", &"[REDACTED]")
            .field("backstage_url", &self.backstage_url)
            .field("github_api_url", &self.github_api_url)
            .field(
                "backstage_token",
                &self.backstage_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("backstage_token_type", &self.backstage_token_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_org_config_debug_redacts_tokens() {
        let config = OrgConfig {
            github_token: "ghp_abc".to_string(),
            backstage_url: "https://backstage.example.com".to_string(),
            backstage_token: Some("bs_token".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("ghp_abc"));
        assert!(!rendered.contains("bs_token"));
        assert!(rendered.contains("backstage.example.com"));
    }

    #[test]
    fn test_org_config_accepts_minimal_json() {
        let config: OrgConfig = serde_json::from_str(
            r#"{"github_token": "t", "backstage_url": "https://b.example.com"}"#,
        )
        .unwrap();
        assert_eq!(config.github_api_url, None);
        assert_eq!(config.backstage_token_type, None);
    }
}
