// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Cryptographic operations for secret encryption.
//!
//! Secrets are sealed with AES-256-GCM under a 96-bit random nonce. The
//! envelope records the version of the key that sealed it; decryption only
//! ever uses the currently configured key.

use crate::error::{Error, Result};
use crate::types::{ENVELOPE_FORMAT, EncryptedSecret};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// Length of an AES-256 key in bytes
pub const KEY_LEN: usize = 32;

/// Length of an AES-GCM nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Minimum salt length accepted by Argon2
pub const MIN_SALT_LEN: usize = 16;

/// Symmetric vault key together with its version number
#[derive(Clone)]
pub struct VaultKey {
    version: u32,
    bytes: Zeroizing<Vec<u8>>,
}

impl VaultKey {
    /// Build a key from raw bytes
    pub fn from_bytes(version: u32, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(Error::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }
        if version == 0 {
            return Err(Error::InvalidKey("key version must be >= 1".to_string()));
        }
        Ok(Self {
            version,
            bytes: Zeroizing::new(bytes.to_vec()),
        })
    }

    /// Decode a base64 key as found in `BACKSTAGE_ENCRYPTION_KEY`
    ///
    /// Both the standard and the URL-safe alphabet are accepted.
    pub fn from_base64(version: u32, encoded: &str) -> Result<Self> {
        let trimmed = encoded.trim();
        let decoded = BASE64
            .decode(trimmed)
            .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(trimmed))
            .map_err(|e| Error::InvalidKey(format!("key is not valid base64: {}", e)))?;
        Self::from_bytes(version, &Zeroizing::new(decoded))
    }

    /// Derive a key from a passphrase with Argon2id
    pub fn derive_from_passphrase(version: u32, passphrase: &str, params: &KdfParams) -> Result<Self> {
        let key = derive_key_from_passphrase(passphrase, params)?;
        Self::from_bytes(version, &key)
    }

    /// Generate a fresh random key
    pub fn generate(version: u32) -> Result<Self> {
        let mut bytes = Zeroizing::new(vec![0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut bytes);
        Self::from_bytes(version, &bytes)
    }

    /// Key version recorded in every envelope sealed with this key
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Base64 form suitable for `BACKSTAGE_ENCRYPTION_KEY`
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(self.bytes.as_slice()))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.bytes))
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("version", &self.version)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id parameters for passphrase-derived keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    pub salt: Vec<u8>,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// OWASP-recommended Argon2id settings with the given salt
    pub fn with_salt(salt: Vec<u8>) -> Self {
        Self {
            salt,
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }

    /// Secure defaults with a freshly generated salt
    pub fn secure_defaults() -> Self {
        Self::with_salt(generate_salt())
    }
}

/// Derive a 32-byte key from a passphrase with Argon2id
pub fn derive_key_from_passphrase(passphrase: &str, params: &KdfParams) -> Result<Zeroizing<Vec<u8>>> {
    if params.salt.len() < MIN_SALT_LEN {
        return Err(Error::InvalidKey(format!(
            "salt must be at least {} bytes",
            MIN_SALT_LEN
        )));
    }

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| Error::InvalidKey(format!("invalid Argon2 parameters: {}", e)))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = Zeroizing::new(vec![0u8; KEY_LEN]);
    argon
        .hash_password_into(passphrase.as_bytes(), &params.salt, &mut out)
        .map_err(|e| Error::Encryption(format!("key derivation failed: {}", e)))?;
    Ok(out)
}

/// Generate a random salt for passphrase-derived keys
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; MIN_SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Seal plaintext bytes under the given key
pub fn encrypt_secret(plaintext: &[u8], key: &VaultKey) -> Result<EncryptedSecret> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| Error::Encryption(e.to_string()))?;

    Ok(EncryptedSecret {
        format: ENVELOPE_FORMAT,
        key_version: key.version(),
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
    })
}

/// Open an envelope with the currently configured key
///
/// There is no fallback to older keys: an envelope written under another key
/// version is rejected before any decryption is attempted.
pub fn decrypt_secret(secret: &EncryptedSecret, key: &VaultKey) -> Result<Zeroizing<Vec<u8>>> {
    if secret.format != ENVELOPE_FORMAT {
        return Err(Error::UnsupportedFormat(secret.format));
    }
    if secret.key_version != key.version() {
        return Err(Error::KeyVersionMismatch {
            expected: key.version(),
            found: secret.key_version,
        });
    }

    let nonce = BASE64
        .decode(&secret.nonce)
        .map_err(|e| Error::Decryption(format!("nonce: {}", e)))?;
    if nonce.len() != NONCE_LEN {
        return Err(Error::Decryption("nonce has the wrong length".to_string()));
    }
    let ciphertext = BASE64
        .decode(&secret.ciphertext)
        .map_err(|e| Error::Decryption(format!("ciphertext: {}", e)))?;

    key.cipher()
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| Error::Decryption("envelope".to_string()))
}
