//! Authenticated encryption for the passphrase backend (§4.5 / Appendix A3).
//!
//! A single AES-256-GCM layer, keyed by an Argon2id-derived key. The
//! teacher crate's dual AES+ChaCha20 layering exists to protect whole files
//! at rest; here the unit of encryption is one property value, so a second
//! algorithm buys defense-in-depth the spec never asks for. Kept: the
//! nonce-prepended ciphertext format and the Argon2id derivation.

mod aes_gcm;
mod derive;

pub use aes_gcm::AesGcm;
pub use derive::Derive;

use crate::config::KEY_SIZE;

/// Authenticated encryption keyed by a single AES-256 key.
pub struct Cipher {
    aes: AesGcm,
}

impl Cipher {
    pub fn new(key: &[u8; KEY_SIZE]) -> anyhow::Result<Self> {
        Ok(Self { aes: AesGcm::new(key)? })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.aes.encrypt(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.aes.decrypt(ciphertext)
    }
}
