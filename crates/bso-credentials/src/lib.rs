// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Encrypted at-rest storage for per-organization onboarding secrets.
//!
//! This crate provides:
//! - AES-256-GCM envelopes tagged with the key version that produced them
//! - Raw (base64) and passphrase-derived (Argon2id) vault keys
//! - One encrypted file per organization under the vault storage directory
//! - Engine-driven key rotation that re-encrypts every stored blob

pub mod config;
pub mod crypto;
pub mod error;
pub mod storage;
pub mod types;
pub mod validation;
pub mod vault;

/// Re-export key types for convenience
pub use config::VaultConfig;
pub use crypto::{KdfParams, VaultKey, decrypt_secret, encrypt_secret};
pub use error::{Error, Result};
pub use types::{EncryptedSecret, OrgConfig};
pub use vault::CredentialVault;
