// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! File layout and storage operations for encrypted secrets

use crate::{
    config::VaultConfig,
    error::{Error, Result},
    types::EncryptedSecret,
    validation::validate_org_name,
};
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Extension of the per-organization encrypted files
pub const SECRET_EXTENSION: &str = "enc";

/// Ensure the storage directory exists with owner-only permissions (0700)
pub async fn ensure_storage_dir(config: &VaultConfig) -> Result<PathBuf> {
    let storage_dir = config.storage_dir()?;

    if !storage_dir.exists() {
        async_fs::create_dir_all(&storage_dir).await?;
    }

    #[cfg(unix)]
    set_mode(&storage_dir, 0o700).await?;

    Ok(storage_dir)
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let metadata = async_fs::metadata(path).await?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(mode);
    async_fs::set_permissions(path, permissions).await?;
    Ok(())
}

/// Write a file through a temporary sibling and rename it into place
///
/// The temporary file gets 0600 before any rename so the secret is never
/// visible with wider permissions.
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_file = temp_path_for(path);
    async_fs::write(&temp_file, data).await?;

    #[cfg(unix)]
    set_mode(&temp_file, 0o600).await?;

    async_fs::rename(&temp_file, path).await?;
    Ok(())
}

/// Staging path used while a file is being replaced
fn temp_path_for(path: &Path) -> PathBuf {
    path.with_extension(format!("{}.tmp", SECRET_EXTENSION))
}

/// Persist the envelope for one organization
pub async fn write_org_secret(
    config: &VaultConfig,
    org: &str,
    secret: &EncryptedSecret,
) -> Result<PathBuf> {
    validate_org_name(org)?;
    ensure_storage_dir(config).await?;

    let path = config.org_file(org)?;
    write_atomic(&path, &secret.to_bytes()?).await?;
    Ok(path)
}

/// Read the envelope for one organization, `None` when nothing is stored
pub async fn read_org_secret(config: &VaultConfig, org: &str) -> Result<Option<EncryptedSecret>> {
    validate_org_name(org)?;
    let path = config.org_file(org)?;

    if !path.exists() {
        return Ok(None);
    }

    let bytes = async_fs::read(&path).await?;
    Ok(Some(EncryptedSecret::from_bytes(&bytes)?))
}

/// Remove the stored envelope for one organization, returning whether one existed
pub async fn remove_org_secret(config: &VaultConfig, org: &str) -> Result<bool> {
    validate_org_name(org)?;
    let path = config.org_file(org)?;

    if !path.exists() {
        return Ok(false);
    }

    async_fs::remove_file(&path).await?;
    Ok(true)
}

/// List organizations that have a stored envelope, sorted by name
pub async fn list_orgs(config: &VaultConfig) -> Result<Vec<String>> {
    let storage_dir = config.storage_dir()?;

    if !storage_dir.exists() {
        return Ok(Vec::new());
    }

    let mut orgs = Vec::new();
    let mut entries = async_fs::read_dir(&storage_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SECRET_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if validate_org_name(stem).is_ok() {
                orgs.push(stem.to_string());
            } else {
                tracing::warn!("Ignoring unexpected file in vault: {}", path.display());
            }
        }
    }

    orgs.sort();
    Ok(orgs)
}

/// Validate that the storage directory and its files are owner-only
pub async fn validate_permissions(config: &VaultConfig) -> Result<()> {
    let storage_dir = config.storage_dir()?;
    if !storage_dir.exists() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        let mode = async_fs::metadata(&storage_dir).await?.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(Error::PermissionDenied(storage_dir));
        }

        let mut entries = async_fs::read_dir(&storage_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() && metadata.permissions().mode() & 0o177 != 0 {
                return Err(Error::PermissionDenied(entry.path()));
            }
        }
    }

    #[cfg(not(unix))]
    {
        tracing::warn!(
            "Permission validation not supported on this platform for {}",
            storage_dir.display()
        );
    }

    Ok(())
}
