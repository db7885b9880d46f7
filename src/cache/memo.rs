//! Concurrent-map-backed `SecretCache`.
//!
//! Uses `dashmap` (lock-sharded concurrent hash maps) for each of the two
//! indices rather than a single mutex-guarded `HashMap`, so lookups against
//! unrelated keys never contend — the same reasoning the broader example
//! pack applies `dashmap` for (request-scoped caches under concurrent load).

use dashmap::DashMap;

use super::{CacheEntry, SecretCache};
use crate::identity::SecretHandle;

/// The real cache: two independently-locked maps, per §4.1.
pub struct MemoCache {
    by_secret: DashMap<SecretHandle, CacheEntry>,
    by_ciphertext: DashMap<String, CacheEntry>,
}

impl MemoCache {
    pub fn new() -> Self {
        Self { by_secret: DashMap::new(), by_ciphertext: DashMap::new() }
    }
}

impl Default for MemoCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretCache for MemoCache {
    fn write(&self, plaintext: &str, ciphertext: &str, secret: &SecretHandle) {
        let entry = CacheEntry { plaintext: plaintext.to_string(), ciphertext: ciphertext.to_string(), secret: secret.clone() };
        // The two maps are updated independently; a reader may briefly see
        // one updated and not the other. Harmless: misses just fall through
        // to the backend (§4.1 Concurrency).
        self.by_secret.insert(secret.clone(), entry.clone());
        self.by_ciphertext.insert(ciphertext.to_string(), entry);
    }

    fn lookup_ciphertext(&self, secret: &SecretHandle, plaintext: &str) -> Option<String> {
        let entry = self.by_secret.get(secret)?;
        if entry.plaintext == plaintext { Some(entry.ciphertext.clone()) } else { None }
    }

    fn lookup_plaintext(&self, ciphertext: &str) -> Option<String> {
        self.by_ciphertext.get(ciphertext).map(|entry| entry.plaintext.clone())
    }
}
