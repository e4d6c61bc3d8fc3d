// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the credential vault

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while storing or reading encrypted secrets
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid organization name: {0}")]
    InvalidOrgName(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Secret was encrypted with key version {found}, but the configured key is version {expected}")]
    KeyVersionMismatch { expected: u32, found: u32 },

    #[error("Unsupported envelope format: {0}")]
    UnsupportedFormat(u8),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption failed for {0}: wrong key or corrupted data")]
    Decryption(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
}
