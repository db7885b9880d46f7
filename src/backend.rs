//! External interfaces (§6): the contract batchers and the provider registry
//! consume from a concrete cryptographic backend. The backends themselves
//! (§4.5 / Appendix A3–A5) are collaborators implementing this contract, not
//! part of the batching/caching core.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation, threaded into every backend call.
///
/// Deliberately not an async runtime primitive: every suspension point in
/// this core is a blocking one (§5), so a flag checked by the backend before
/// and during its own blocking I/O is all cancellation needs to be.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Encryption half of a backend (§6).
///
/// `batch_encrypt` must preserve input order in its output and must either
/// succeed entirely or return an error with no partial result.
pub trait Encrypter: Send + Sync {
    fn encrypt_value(&self, ctx: &CancelToken, plaintext: &str) -> anyhow::Result<String>;
    fn batch_encrypt(&self, ctx: &CancelToken, plaintexts: &[String]) -> anyhow::Result<Vec<String>>;
}

/// Decryption half of a backend (§6). Same ordering/all-or-nothing contract
/// as [`Encrypter::batch_encrypt`].
pub trait Decrypter: Send + Sync {
    fn decrypt_value(&self, ctx: &CancelToken, ciphertext: &str) -> anyhow::Result<String>;
    fn batch_decrypt(&self, ctx: &CancelToken, ciphertexts: &[String]) -> anyhow::Result<Vec<String>>;
}

/// A concrete cryptographic backend, as constructed by the provider registry
/// (§4.5) and consumed by the batching-caching layer (§4.4).
pub trait SecretsManager: Send + Sync {
    /// Stable tag persisted alongside a checkpoint (`"passphrase"`, `"service"`, `"cloud"`).
    fn type_tag(&self) -> &str;

    /// Opaque state persisted alongside a checkpoint, read back on the next load.
    fn state(&self) -> serde_json::Value;

    fn encrypter(&self) -> Arc<dyn Encrypter>;

    fn decrypter(&self) -> Arc<dyn Decrypter>;
}
