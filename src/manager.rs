//! `BatchingCachingManager` (§4.4): a decorator over a backend
//! [`SecretsManager`] that hands out batchers sharing one cache.

use std::sync::Arc;

use crate::backend::{Decrypter, Encrypter, SecretsManager};
use crate::batch::{BatchDecrypter, BatchEncrypter, DeserializePropertyValue};
use crate::cache::{NullCache, SecretCache};
use crate::config::Config;

/// Wraps a concrete backend with shared-cache batch construction.
///
/// One instance owns exactly one cache; every batcher it mints shares that
/// cache. The manager itself is cheap to hold behind an `Arc` and share
/// across threads — `begin_batch_encryption`/`begin_batch_decryption` are
/// the only state-bearing operations, and each call mints an independent
/// one-shot batcher.
pub struct BatchingCachingManager {
    backend: Arc<dyn SecretsManager>,
    cache: Arc<dyn SecretCache>,
    max_batch_size: usize,
}

impl BatchingCachingManager {
    pub fn new(backend: Arc<dyn SecretsManager>, config: &Config) -> Self {
        Self { backend, cache: crate::cache::build_cache(config), max_batch_size: config.max_batch_size }
    }

    pub fn type_tag(&self) -> &str {
        self.backend.type_tag()
    }

    pub fn state(&self) -> serde_json::Value {
        self.backend.state()
    }

    pub fn encrypter(&self) -> Arc<dyn Encrypter> {
        self.backend.encrypter()
    }

    pub fn decrypter(&self) -> Arc<dyn Decrypter> {
        self.backend.decrypter()
    }

    /// Mints a batcher backed by this manager's shared cache.
    pub fn begin_batch_encryption(&self) -> BatchEncrypter {
        BatchEncrypter::new(self.backend.encrypter(), Arc::clone(&self.cache), self.max_batch_size)
    }

    /// Mints a batcher that always uses the null cache (§4.3).
    pub fn begin_batch_decryption(&self, deserialize: DeserializePropertyValue) -> BatchDecrypter {
        BatchDecrypter::new(self.backend.decrypter(), Arc::new(NullCache), deserialize, self.max_batch_size)
    }
}
