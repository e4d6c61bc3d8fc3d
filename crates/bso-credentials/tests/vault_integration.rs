// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests for vault storage and key rotation

use bso_credentials::{CredentialVault, Error, OrgConfig, VaultConfig, VaultKey};

fn sample_config(token: &str) -> OrgConfig {
    OrgConfig {
        github_token: token.to_string(),
        backstage_url: "https://backstage.example.com".to_string(),
        github_api_url: Some("https://github.example.com/api/v3".to_string()),
        backstage_token: Some("catalog-token".to_string()),
        backstage_token_type: None,
    }
}

#[tokio::test]
async fn test_save_load_list_remove() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let vault = CredentialVault::new(
        VaultConfig::with_storage_path(temp_dir.path()),
        VaultKey::generate(1).unwrap(),
    );

    assert!(vault.list_organizations().await.unwrap().is_empty());
    assert!(vault.load_org_config("acme").await.unwrap().is_none());

    vault.save_org_config("acme", &sample_config("ghp_acme")).await.unwrap();
    vault.save_org_config("globex", &sample_config("ghp_globex")).await.unwrap();

    assert_eq!(vault.list_organizations().await.unwrap(), vec!["acme", "globex"]);
    let loaded = vault.load_org_config("acme").await.unwrap().unwrap();
    assert_eq!(loaded, sample_config("ghp_acme"));

    // The file on disk must not contain the token in clear
    let raw = std::fs::read_to_string(temp_dir.path().join("acme.enc")).unwrap();
    assert!(!raw.contains("ghp_acme"));
    assert!(raw.contains("\"key_version\": 1"));

    assert!(vault.remove_org_config("acme").await.unwrap());
    assert!(!vault.remove_org_config("acme").await.unwrap());
    assert_eq!(vault.list_organizations().await.unwrap(), vec!["globex"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_files_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let storage = temp_dir.path().join("vault");
    let config = VaultConfig::with_storage_path(&storage);
    let vault = CredentialVault::new(config.clone(), VaultKey::generate(1).unwrap());

    vault.save_org_config("acme", &sample_config("t")).await.unwrap();

    let dir_mode = std::fs::metadata(&storage).unwrap().permissions().mode();
    assert_eq!(dir_mode & 0o777, 0o700);
    let file_mode = std::fs::metadata(storage.join("acme.enc")).unwrap().permissions().mode();
    assert_eq!(file_mode & 0o777, 0o600);

    bso_credentials::storage::validate_permissions(&config).await.unwrap();
}

#[tokio::test]
async fn test_invalid_org_names_never_touch_disk() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let vault = CredentialVault::new(
        VaultConfig::with_storage_path(temp_dir.path()),
        VaultKey::generate(1).unwrap(),
    );

    let result = vault.save_org_config("../escape", &sample_config("t")).await;
    assert!(matches!(result, Err(Error::InvalidOrgName(_))));
    assert!(std::fs::read_dir(temp_dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_rotation_reencrypts_every_blob() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = VaultConfig::with_storage_path(temp_dir.path());
    let old_key = VaultKey::generate(1).unwrap();
    let new_key = VaultKey::generate(2).unwrap();

    let mut vault = CredentialVault::new(config.clone(), old_key.clone());
    vault.save_org_config("acme", &sample_config("a")).await.unwrap();
    vault.save_org_config("globex", &sample_config("g")).await.unwrap();

    let rotated = vault.rotate_key(new_key.clone()).await.unwrap();
    assert_eq!(rotated, 2);
    assert_eq!(vault.key_version(), 2);
    assert_eq!(
        vault.load_org_config("globex").await.unwrap().unwrap(),
        sample_config("g")
    );

    // A vault still configured with the old key cannot read rotated blobs
    let stale = CredentialVault::new(config, old_key);
    match stale.load_org_config("acme").await {
        Err(Error::KeyVersionMismatch { expected: 1, found: 2 }) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_rotation_requires_newer_version() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let mut vault = CredentialVault::new(
        VaultConfig::with_storage_path(temp_dir.path()),
        VaultKey::generate(3).unwrap(),
    );
    let result = vault.rotate_key(VaultKey::generate(3).unwrap()).await;
    assert!(matches!(result, Err(Error::Config(_))));
    assert_eq!(vault.key_version(), 3);
}

#[tokio::test]
async fn test_rotation_aborts_before_writing_when_a_blob_is_unreadable() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = VaultConfig::with_storage_path(temp_dir.path());

    let foreign = CredentialVault::new(config.clone(), VaultKey::generate(1).unwrap());
    foreign.save_org_config("acme", &sample_config("a")).await.unwrap();

    let mut vault = CredentialVault::new(config, VaultKey::generate(1).unwrap());
    vault.save_org_config("globex", &sample_config("g")).await.unwrap();
    let before = std::fs::read(temp_dir.path().join("globex.enc")).unwrap();

    let result = vault.rotate_key(VaultKey::generate(2).unwrap()).await;
    assert!(matches!(result, Err(Error::Decryption(_))));
    assert_eq!(vault.key_version(), 1);
    assert_eq!(std::fs::read(temp_dir.path().join("globex.enc")).unwrap(), before);
}
