// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Engine configuration
//!
//! [`EngineConfig`] is built once by the caller and handed to every
//! component. Nothing in this crate reads the process environment.

use crate::error::EngineError;
use bso_host_api::Permission;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Bounded exponential backoff for catalog submissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

/// Non-secret settings, optionally loaded from a TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineSettings {
    /// Descriptor location inside each repository
    pub descriptor_path: String,
    /// Prefix of onboarding branches
    pub branch_prefix: String,
    /// Label put on tracking issues
    pub tracking_label: String,
    /// Owner used when none can be derived from the repository
    pub default_owner: Option<String>,
    pub default_system: String,
    pub namespace: String,
    /// Repository holding the canary status record
    pub canary_state_repo: String,
    pub canary_state_path: String,
    pub publish_retry: RetryPolicy,
    /// Minimum permission for `/force-merge`
    pub force_merge_permission: Permission,
    /// Commit the publish workflow alongside the descriptor
    pub include_publish_workflow: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            descriptor_path: "catalog-info.yaml".to_string(),
            branch_prefix: "backstage-integration".to_string(),
            tracking_label: "backstage-integration".to_string(),
            default_owner: None,
            default_system: "default-system".to_string(),
            namespace: "default".to_string(),
            canary_state_repo: "backstage-github".to_string(),
            canary_state_path: ".backstage/canary-status.json".to_string(),
            publish_retry: RetryPolicy::default(),
            force_merge_permission: Permission::Maintain,
            include_publish_workflow: true,
        }
    }
}

impl EngineSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
        toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Whether `head_ref` names an onboarding branch
    pub fn is_onboarding_branch(&self, head_ref: &str) -> bool {
        head_ref == self.branch_prefix
            || head_ref
                .strip_prefix(&self.branch_prefix)
                .is_some_and(|rest| rest.starts_with('-'))
    }
}

/// Everything a run needs, built once and passed in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub org: String,
    pub catalog_url: String,
    pub dry_run: bool,
    pub settings: EngineSettings,
}

impl EngineConfig {
    pub fn new(org: impl Into<String>, catalog_url: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            catalog_url: catalog_url.into(),
            dry_run: false,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Reject a configuration missing a required value
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.org.trim().is_empty() {
            return Err(EngineError::MissingSecret("GITHUB_ORG"));
        }
        if self.catalog_url.trim().is_empty() {
            return Err(EngineError::MissingSecret("BACKSTAGE_URL"));
        }
        if self.settings.publish_retry.max_attempts == 0 {
            return Err(EngineError::Config(
                "publish-retry.max-attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = EngineSettings::from_toml_str(
            r#"
default-owner = "platform-team"
force-merge-permission = "admin"

[publish-retry]
max-attempts = 5
"#,
        )
        .unwrap();
        assert_eq!(settings.default_owner.as_deref(), Some("platform-team"));
        assert_eq!(settings.force_merge_permission, Permission::Admin);
        assert_eq!(settings.publish_retry.max_attempts, 5);
        assert_eq!(settings.publish_retry.base_backoff_ms, 500);
        assert_eq!(settings.descriptor_path, "catalog-info.yaml");
    }

    #[test]
    fn test_unknown_permission_is_a_config_error() {
        let err = EngineSettings::from_toml_str("force-merge-permission = \"owner\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_settings_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bso.toml");
        std::fs::write(&path, "branch-prefix = \"catalog-onboarding\"\n").unwrap();
        let settings = EngineSettings::load(&path).unwrap();
        assert_eq!(settings.branch_prefix, "catalog-onboarding");
        assert!(EngineSettings::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_onboarding_branch_detection() {
        let settings = EngineSettings::default();
        assert!(settings.is_onboarding_branch("backstage-integration-1700000000"));
        assert!(settings.is_onboarding_branch("backstage-integration"));
        assert!(!settings.is_onboarding_branch("backstage-integrationx"));
        assert!(!settings.is_onboarding_branch("feature/login"));
    }

    #[test]
    fn test_missing_values_are_reported_as_secrets() {
        assert_eq!(
            EngineConfig::new("", "https://backstage").validate(),
            Err(EngineError::MissingSecret("GITHUB_ORG"))
        );
        assert_eq!(
            EngineConfig::new("acme", " ").validate(),
            Err(EngineError::MissingSecret("BACKSTAGE_URL"))
        );
        assert!(EngineConfig::new("acme", "https://backstage").validate().is_ok());
    }
}
