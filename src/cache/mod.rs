//! Bidirectional `ciphertext ↔ (plaintext, secret-identity)` memoization (§4.1).
//!
//! Selection between the real cache and the null cache happens once, at
//! construction, behind a single trait object — the "null object" pattern
//! the design notes (§9) call for, so no call site ever branches on whether
//! caching is enabled.

mod memo;
mod null;

use std::sync::Arc;

use crate::config::Config;
use crate::identity::SecretHandle;

pub use memo::MemoCache;
pub use null::NullCache;

/// One memoized `(plaintext, ciphertext, secret)` triple.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub plaintext: String,
    pub ciphertext: String,
    pub secret: SecretHandle,
}

/// The bidirectional secret cache.
///
/// All three operations are total: they never fail and are safe under
/// arbitrary concurrent access. Implementations do not need read-modify-write
/// consistency *across* `bySecret` and `byCiphertext` — a caller who misses
/// simply falls through to the backend, which is always correct, just
/// possibly not maximally cached.
pub trait SecretCache: Send + Sync {
    /// Stores or overwrites the mapping for `secret` and `ciphertext`.
    fn write(&self, plaintext: &str, ciphertext: &str, secret: &SecretHandle);

    /// Returns `Some(ciphertext)` only if a prior `write` for this exact
    /// `(secret, plaintext)` pair exists. A changed plaintext on the same
    /// secret is always a miss — this is the plaintext-rotation guard.
    fn lookup_ciphertext(&self, secret: &SecretHandle, plaintext: &str) -> Option<String>;

    /// Returns the plaintext previously written for `ciphertext`, if any.
    fn lookup_plaintext(&self, ciphertext: &str) -> Option<String>;
}

/// Builds the cache selected by `config.disable_secret_cache`.
pub fn build_cache(config: &Config) -> Arc<dyn SecretCache> {
    if config.disable_secret_cache {
        Arc::new(NullCache)
    } else {
        Arc::new(MemoCache::new())
    }
}
