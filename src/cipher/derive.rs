//! Argon2id key derivation for the passphrase backend.

use anyhow::{Result, anyhow, ensure};
use argon2::Algorithm::Argon2id;
use argon2::Version::V0x13;
use argon2::{Argon2, Params};
use rand::rand_core::{OsRng, TryRngCore};

use crate::config::ARGON_KEY_LEN;

/// Derives an AES-256 key from a passphrase via Argon2id.
pub struct Derive {
    key: Vec<u8>,
}

impl Derive {
    pub fn new(key: &[u8]) -> Result<Self> {
        ensure!(!key.is_empty(), "key cannot be empty");
        Ok(Self { key: key.to_vec() })
    }

    /// Derives a 32-byte AES-256 key with the given Argon2id cost parameters.
    pub fn derive_key(&self, salt: &[u8], memory: u32, time: u32, parallelism: u32) -> Result<[u8; ARGON_KEY_LEN]> {
        let params = Params::new(memory, time, parallelism, Some(ARGON_KEY_LEN)).map_err(|e| anyhow!("invalid argon2 parameter: {e}"))?;
        let argon2 = Argon2::new(Argon2id, V0x13, params);
        let mut key = [0u8; ARGON_KEY_LEN];
        argon2.hash_password_into(&self.key, salt, &mut key).map_err(|e| anyhow!("key derivation failed: {e}"))?;
        Ok(key)
    }

    /// Generates a cryptographically secure random salt of `N` bytes.
    pub fn generate_salt<const N: usize>() -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        OsRng.try_fill_bytes(&mut bytes).map_err(|e| anyhow!("rng failed: {e}"))?;
        Ok(bytes)
    }
}
