//! `BatchDecrypter` (§4.3): symmetric to [`super::encrypter::BatchEncrypter`].
//! The manager always constructs it with a [`crate::cache::NullCache`] (§9
//! Open Question, resolved: not configurable) — the cache parameter stays
//! generic here purely so the drain algorithm mirrors the encrypt side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::backend::{CancelToken, Decrypter};
use crate::cache::SecretCache;
use crate::error::BatchError;
use crate::identity::SecretHandle;

/// Turns a decrypted plaintext back into a property value, injected by the
/// caller (§4.3) rather than hard-coded, so the batcher stays agnostic to
/// any particular value encoding.
pub type DeserializePropertyValue = Box<dyn Fn(&str) -> Result<serde_json::Value, serde_json::Error> + Send + Sync>;

struct DecryptItem {
    target: SecretHandle,
    ciphertext: String,
}

/// A one-shot batcher for decryption requests.
pub struct BatchDecrypter {
    decrypter: Arc<dyn Decrypter>,
    cache: Arc<dyn SecretCache>,
    deserialize: DeserializePropertyValue,
    max_batch_size: usize,
    sender: flume::Sender<DecryptItem>,
    receiver: flume::Receiver<DecryptItem>,
    drain_lock: Mutex<()>,
    closed: AtomicBool,
    poisoned: AtomicBool,
}

impl BatchDecrypter {
    pub(crate) fn new(decrypter: Arc<dyn Decrypter>, cache: Arc<dyn SecretCache>, deserialize: DeserializePropertyValue, max_batch_size: usize) -> Self {
        assert!(max_batch_size > 0, "max_batch_size must be positive");
        let (sender, receiver) = flume::bounded(max_batch_size);
        Self {
            decrypter,
            cache,
            deserialize,
            max_batch_size,
            sender,
            receiver,
            drain_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Queues `ciphertext` for decryption into `target`'s element. Same
    /// backpressure contract as [`super::BatchEncrypter::enqueue`].
    pub fn enqueue(&self, ctx: &CancelToken, target: &SecretHandle, ciphertext: impl Into<String>) -> Result<(), BatchError> {
        assert!(!self.closed.load(Ordering::SeqCst), "Enqueue called on a closed BatchDecrypter");
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(BatchError::Poisoned);
        }

        let mut item = DecryptItem { target: target.clone(), ciphertext: ciphertext.into() };
        loop {
            match self.sender.try_send(item) {
                Ok(()) => return Ok(()),
                Err(flume::TrySendError::Full(returned)) => {
                    item = returned;
                    self.drain(ctx)?;
                }
                Err(flume::TrySendError::Disconnected(_)) => unreachable!("BatchDecrypter owns both channel ends for its lifetime"),
            }
        }
    }

    /// Direct passthrough to the backend, bypassing the queue and the cache.
    pub fn decrypt_value(&self, ctx: &CancelToken, ciphertext: &str) -> Result<serde_json::Value, BatchError> {
        let plaintext = self.decrypter.decrypt_value(ctx, ciphertext).map_err(BatchError::Backend)?;
        (self.deserialize)(&plaintext).map_err(BatchError::Deserialize)
    }

    /// Direct passthrough to the backend's batch method.
    pub fn batch_decrypt(&self, ctx: &CancelToken, ciphertexts: &[String]) -> Result<Vec<serde_json::Value>, BatchError> {
        let plaintexts = self.decrypter.batch_decrypt(ctx, ciphertexts).map_err(BatchError::Backend)?;
        plaintexts.iter().map(|p| (self.deserialize)(p).map_err(BatchError::Deserialize)).collect()
    }

    /// Flushes all remaining queued work. A second call on the same batcher
    /// is a contract violation and panics.
    pub fn complete(&self, ctx: &CancelToken) -> Result<(), BatchError> {
        let was_closed = self.closed.swap(true, Ordering::SeqCst);
        assert!(!was_closed, "Complete called twice on the same BatchDecrypter");

        while !self.receiver.is_empty() {
            self.drain(ctx)?;
        }
        Ok(())
    }

    fn drain(&self, ctx: &CancelToken) -> Result<(), BatchError> {
        if self.receiver.is_empty() {
            return Ok(());
        }

        let _guard = self.drain_lock.lock().unwrap();

        let mut items = Vec::with_capacity(self.max_batch_size);
        for _ in 0..self.max_batch_size {
            match self.receiver.try_recv() {
                Ok(item) => items.push(item),
                Err(_) => break,
            }
        }
        if items.is_empty() {
            return Ok(());
        }

        let cached: Option<Vec<String>> = items.iter().map(|item| self.cache.lookup_plaintext(&item.ciphertext)).collect();
        let served_from_cache = cached.is_some();

        let plaintexts = match cached {
            Some(plaintexts) => plaintexts,
            None => {
                let ciphertexts: Vec<String> = items.iter().map(|item| item.ciphertext.clone()).collect();
                match self.decrypter.batch_decrypt(ctx, &ciphertexts) {
                    Ok(plaintexts) => plaintexts,
                    Err(source) => {
                        self.poisoned.store(true, Ordering::SeqCst);
                        warn!(batch_size = items.len(), %source, "decrypt batch failed, batcher poisoned");
                        return Err(BatchError::Backend(source));
                    }
                }
            }
        };

        // Deserialize every plaintext before writing any target, so a
        // deserialize failure partway through a batch poisons the batcher
        // instead of leaving earlier targets populated and later ones
        // silently dropped — the same all-or-nothing commit the backend-error
        // path above already gives the cache and targets.
        let values: Vec<serde_json::Value> = match plaintexts.iter().map(|p| (self.deserialize)(p)).collect() {
            Ok(values) => values,
            Err(source) => {
                self.poisoned.store(true, Ordering::SeqCst);
                warn!(batch_size = items.len(), %source, "decrypt batch deserialization failed, batcher poisoned");
                return Err(BatchError::Deserialize(source));
            }
        };

        for ((item, plaintext), value) in items.iter().zip(plaintexts.iter()).zip(values) {
            item.target.set_element(value);
            if !served_from_cache {
                self.cache.write(plaintext, &item.ciphertext, &item.target);
            }
        }

        Ok(())
    }
}
