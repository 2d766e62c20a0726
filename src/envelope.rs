//! Passphrase-sealed payloads (Argon2id + AES-256-GCM).
//!
//! Wire layout:
//!
//! ```text
//! "TPE1" | m_cost u32 BE | t_cost u32 BE | p_cost u32 BE | salt[32] | nonce[12] | ciphertext+tag
//! ```
//!
//! The KDF parameters travel in the header so history written with different
//! costs stays readable. Opening refuses parameters above [`KdfParams::MAX`].

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

const MAGIC: &[u8; 4] = b"TPE1";
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 12 + SALT_LEN + NONCE_LEN;

/// Errors raised while sealing or opening an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Payload is shorter than the fixed header or lacks the magic tag.
    #[error("not a sealed payload")]
    Malformed,
    /// Header asks for KDF costs outside the accepted range.
    #[error("kdf parameters out of range: m={memory_kib}KiB t={iterations} p={parallelism}")]
    ParamsOutOfRange {
        /// Memory cost in KiB.
        memory_kib: u32,
        /// Iteration count.
        iterations: u32,
        /// Lane count.
        parallelism: u32,
    },
    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    /// Wrong passphrase or tampered ciphertext.
    #[error("decryption failed")]
    Decryption,
    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Iteration count.
    pub iterations: u32,
    /// Lane count.
    pub parallelism: u32,
}

impl KdfParams {
    /// Costs used when sealing production payloads.
    pub const DEFAULT: Self = Self {
        memory_kib: 64 * 1024,
        iterations: 3,
        parallelism: 4,
    };

    /// Upper bounds accepted when opening.
    pub const MAX: Self = Self {
        memory_kib: 256 * 1024,
        iterations: 16,
        parallelism: 16,
    };

    fn within_bounds(&self) -> bool {
        self.memory_kib <= Self::MAX.memory_kib
            && self.iterations >= 1
            && self.iterations <= Self::MAX.iterations
            && self.parallelism >= 1
            && self.parallelism <= Self::MAX.parallelism
    }

    fn out_of_range(&self) -> EnvelopeError {
        EnvelopeError::ParamsOutOfRange {
            memory_kib: self.memory_kib,
            iterations: self.iterations,
            parallelism: self.parallelism,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Encrypts `plaintext` under `passphrase`.
pub fn seal(plaintext: &[u8], passphrase: &str, params: KdfParams) -> Result<Vec<u8>, EnvelopeError> {
    if !params.within_bounds() {
        return Err(params.out_of_range());
    }
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let mut key = derive_key(passphrase, &salt, params)?;
    let sealed = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| EnvelopeError::Encryption(e.to_string()))
        .and_then(|cipher| {
            cipher
                .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
                .map_err(|e| EnvelopeError::Encryption(e.to_string()))
        });
    key.zeroize();
    let ciphertext = sealed?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&params.memory_kib.to_be_bytes());
    out.extend_from_slice(&params.iterations.to_be_bytes());
    out.extend_from_slice(&params.parallelism.to_be_bytes());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a payload produced by [`seal`].
pub fn open(sealed: &[u8], passphrase: &str) -> Result<Vec<u8>, EnvelopeError> {
    if sealed.len() < HEADER_LEN || !sealed.starts_with(MAGIC) {
        return Err(EnvelopeError::Malformed);
    }
    let params = KdfParams {
        memory_kib: read_u32(sealed, 4),
        iterations: read_u32(sealed, 8),
        parallelism: read_u32(sealed, 12),
    };
    if !params.within_bounds() {
        return Err(params.out_of_range());
    }
    let salt_start = MAGIC.len() + 12;
    let nonce_start = salt_start + SALT_LEN;
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&sealed[salt_start..nonce_start]);
    let nonce = Nonce::from_slice(&sealed[nonce_start..HEADER_LEN]);

    let mut key = derive_key(passphrase, &salt, params)?;
    let opened = Aes256Gcm::new_from_slice(&key)
        .map_err(|_| EnvelopeError::Decryption)
        .and_then(|cipher| {
            cipher
                .decrypt(nonce, &sealed[HEADER_LEN..])
                .map_err(|_| EnvelopeError::Decryption)
        });
    key.zeroize();
    opened
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(word)
}

fn derive_key(
    passphrase: &str,
    salt: &[u8; SALT_LEN],
    params: KdfParams,
) -> Result<[u8; KEY_LEN], EnvelopeError> {
    let params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| EnvelopeError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| EnvelopeError::KeyDerivation(e.to_string()))?;
    Ok(key)
}
