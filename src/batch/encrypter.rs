//! `BatchEncrypter` (§4.2): coalesces `Enqueue` calls into bounded batch
//! calls against an [`Encrypter`], memoizing results in a [`SecretCache`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::backend::{CancelToken, Encrypter};
use crate::cache::SecretCache;
use crate::error::BatchError;
use crate::identity::{SecretHandle, SerializedSecret};

struct EncryptItem {
    source: SecretHandle,
    target: SerializedSecret,
    plaintext: String,
}

/// A one-shot batcher for encryption requests.
///
/// Created by [`crate::manager::BatchingCachingManager::begin_batch_encryption`],
/// terminated by exactly one [`BatchEncrypter::complete`] call. Using it after
/// `complete` returns is a contract violation and panics, per §7 kind 4.
pub struct BatchEncrypter {
    encrypter: Arc<dyn Encrypter>,
    cache: Arc<dyn SecretCache>,
    max_batch_size: usize,
    sender: flume::Sender<EncryptItem>,
    receiver: flume::Receiver<EncryptItem>,
    drain_lock: Mutex<()>,
    closed: AtomicBool,
    poisoned: AtomicBool,
}

impl BatchEncrypter {
    pub(crate) fn new(encrypter: Arc<dyn Encrypter>, cache: Arc<dyn SecretCache>, max_batch_size: usize) -> Self {
        assert!(max_batch_size > 0, "max_batch_size must be positive");
        let (sender, receiver) = flume::bounded(max_batch_size);
        Self { encrypter, cache, max_batch_size, sender, receiver, drain_lock: Mutex::new(()), closed: AtomicBool::new(false), poisoned: AtomicBool::new(false) }
    }

    /// Queues `plaintext` for encryption under `source`'s identity.
    ///
    /// Does not block indefinitely on a full queue: the calling thread
    /// drives a drain itself and retries, per §4.2 Backpressure. The
    /// post-condition — `target`'s ciphertext assigned — holds no later
    /// than the batcher's eventual `complete` call.
    pub fn enqueue(&self, ctx: &CancelToken, source: &SecretHandle, plaintext: impl Into<String>, target: &SerializedSecret) -> Result<(), BatchError> {
        assert!(!self.closed.load(Ordering::SeqCst), "Enqueue called on a closed BatchEncrypter");
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(BatchError::Poisoned);
        }

        let mut item = EncryptItem { source: source.clone(), target: target.clone(), plaintext: plaintext.into() };
        loop {
            match self.sender.try_send(item) {
                Ok(()) => return Ok(()),
                Err(flume::TrySendError::Full(returned)) => {
                    item = returned;
                    self.drain(ctx)?;
                }
                Err(flume::TrySendError::Disconnected(_)) => unreachable!("BatchEncrypter owns both channel ends for its lifetime"),
            }
        }
    }

    /// Direct passthrough to the backend, bypassing the queue and the cache.
    pub fn encrypt_value(&self, ctx: &CancelToken, plaintext: &str) -> Result<String, BatchError> {
        self.encrypter.encrypt_value(ctx, plaintext).map_err(BatchError::Backend)
    }

    /// Direct passthrough to the backend's batch method.
    pub fn batch_encrypt(&self, ctx: &CancelToken, plaintexts: &[String]) -> Result<Vec<String>, BatchError> {
        self.encrypter.batch_encrypt(ctx, plaintexts).map_err(BatchError::Backend)
    }

    /// Flushes all remaining queued work. A second call on the same batcher
    /// is a contract violation and panics.
    pub fn complete(&self, ctx: &CancelToken) -> Result<(), BatchError> {
        let was_closed = self.closed.swap(true, Ordering::SeqCst);
        assert!(!was_closed, "Complete called twice on the same BatchEncrypter");

        while !self.receiver.is_empty() {
            self.drain(ctx)?;
        }
        Ok(())
    }

    /// `sendNextBatch` (§4.2): pop up to `max_batch_size` items, probe the
    /// cache, and either reuse cached ciphertexts or submit the whole
    /// popped group to the backend as one call.
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

        // `collect` into `Option<Vec<_>>` stops at the first miss, discarding
        // whatever hits were already found — exactly the "any miss ⇒ encrypt
        // everything" policy of §4.2 step 4 / §9.
        let cached: Option<Vec<String>> = items.iter().map(|item| self.cache.lookup_ciphertext(&item.source, &item.plaintext)).collect();
        let served_from_cache = cached.is_some();

        let ciphertexts = match cached {
            Some(ciphertexts) => {
                debug!(batch_size = items.len(), "encrypt batch served entirely from cache");
                ciphertexts
            }
            None => {
                let plaintexts: Vec<String> = items.iter().map(|item| item.plaintext.clone()).collect();
                match self.encrypter.batch_encrypt(ctx, &plaintexts) {
                    Ok(ciphertexts) => ciphertexts,
                    Err(source) => {
                        self.poisoned.store(true, Ordering::SeqCst);
                        warn!(batch_size = items.len(), %source, "encrypt batch failed, batcher poisoned");
                        return Err(BatchError::Backend(source));
                    }
                }
            }
        };

        for (item, ciphertext) in items.iter().zip(ciphertexts.iter()) {
            item.target.set_ciphertext(ciphertext.clone());
            if !served_from_cache {
                self.cache.write(&item.plaintext, ciphertext, &item.source);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::cache::{MemoCache, NullCache};

    /// A deterministic fake backend: returns `"<plaintext>!"` for each input
    /// and records every batch it was asked to encrypt, so tests can assert
    /// on call counts and batch contents without a mocking framework.
    struct FakeEncrypter {
        calls: StdMutex<Vec<Vec<String>>>,
        delay: Option<Duration>,
        fail_next: AtomicBool,
    }

    impl FakeEncrypter {
        fn new() -> Self {
            Self { calls: StdMutex::new(Vec::new()), delay: None, fail_next: AtomicBool::new(false) }
        }

        fn with_delay(delay: Duration) -> Self {
            Self { calls: StdMutex::new(Vec::new()), delay: Some(delay), fail_next: AtomicBool::new(false) }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Encrypter for FakeEncrypter {
        fn encrypt_value(&self, ctx: &CancelToken, plaintext: &str) -> anyhow::Result<String> {
            Ok(self.batch_encrypt(ctx, &[plaintext.to_string()])?.remove(0))
        }

        fn batch_encrypt(&self, _ctx: &CancelToken, plaintexts: &[String]) -> anyhow::Result<Vec<String>> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                anyhow::bail!("synthetic backend failure");
            }
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            self.calls.lock().unwrap().push(plaintexts.to_vec());
            Ok(plaintexts.iter().map(|p| format!("{p}!")).collect())
        }
    }

    #[test]
    fn s1_cold_batch_fills_targets_and_populates_cache() {
        let backend = Arc::new(FakeEncrypter::new());
        let cache = Arc::new(MemoCache::new());
        let batcher = BatchEncrypter::new(backend.clone(), cache.clone(), 10);
        let ctx = CancelToken::new();

        let s1 = SecretHandle::new();
        let s2 = SecretHandle::new();
        let t1 = SerializedSecret::new();
        let t2 = SerializedSecret::new();

        batcher.enqueue(&ctx, &s1, "a", &t1).unwrap();
        batcher.enqueue(&ctx, &s2, "b", &t2).unwrap();
        batcher.complete(&ctx).unwrap();

        assert_eq!(t1.ciphertext(), Some("a!".to_string()));
        assert_eq!(t2.ciphertext(), Some("b!".to_string()));
        assert_eq!(backend.call_count(), 1);
        assert_eq!(cache.lookup_ciphertext(&s1, "a"), Some("a!".to_string()));
    }

    #[test]
    fn s2_warm_batch_never_calls_backend() {
        let backend = Arc::new(FakeEncrypter::new());
        let cache = Arc::new(MemoCache::new());
        let s1 = SecretHandle::new();
        let s2 = SecretHandle::new();

        // Prime the cache as S1 would.
        {
            let batcher = BatchEncrypter::new(backend.clone(), cache.clone(), 10);
            let ctx = CancelToken::new();
            let t1 = SerializedSecret::new();
            let t2 = SerializedSecret::new();
            batcher.enqueue(&ctx, &s1, "a", &t1).unwrap();
            batcher.enqueue(&ctx, &s2, "b", &t2).unwrap();
            batcher.complete(&ctx).unwrap();
        }
        assert_eq!(backend.call_count(), 1);

        let batcher = BatchEncrypter::new(backend.clone(), cache, 10);
        let ctx = CancelToken::new();
        let t1 = SerializedSecret::new();
        let t2 = SerializedSecret::new();
        batcher.enqueue(&ctx, &s1, "a", &t1).unwrap();
        batcher.enqueue(&ctx, &s2, "b", &t2).unwrap();
        batcher.complete(&ctx).unwrap();

        assert_eq!(t1.ciphertext(), Some("a!".to_string()));
        assert_eq!(t2.ciphertext(), Some("b!".to_string()));
        assert_eq!(backend.call_count(), 1, "no new backend calls on a fully warm batch");
    }

    #[test]
    fn s3_changed_plaintext_forces_recompute() {
        let backend = Arc::new(FakeEncrypter::new());
        let cache = Arc::new(MemoCache::new());
        let s1 = SecretHandle::new();

        {
            let batcher = BatchEncrypter::new(backend.clone(), cache.clone(), 10);
            let ctx = CancelToken::new();
            let t1 = SerializedSecret::new();
            batcher.enqueue(&ctx, &s1, "a", &t1).unwrap();
            batcher.complete(&ctx).unwrap();
        }

        let batcher = BatchEncrypter::new(backend.clone(), cache.clone(), 10);
        let ctx = CancelToken::new();
        let t1b = SerializedSecret::new();
        batcher.enqueue(&ctx, &s1, "a2", &t1b).unwrap();
        batcher.complete(&ctx).unwrap();

        assert_eq!(t1b.ciphertext(), Some("a2!".to_string()));
        assert_eq!(backend.call_count(), 2);
        assert_eq!(cache.lookup_ciphertext(&s1, "a"), None);
        assert_eq!(cache.lookup_ciphertext(&s1, "a2"), Some("a2!".to_string()));
    }

    #[test]
    fn s4_backpressure_drains_without_deadlock() {
        let backend = Arc::new(FakeEncrypter::with_delay(Duration::from_millis(5)));
        let cache = Arc::new(MemoCache::new());
        let batcher = Arc::new(BatchEncrypter::new(backend.clone(), cache, 4));
        let ctx = CancelToken::new();

        let targets: Vec<SerializedSecret> = (0..10).map(|_| SerializedSecret::new()).collect();
        let secrets: Vec<SecretHandle> = (0..10).map(|_| SecretHandle::new()).collect();

        for i in 0..10 {
            batcher.enqueue(&ctx, &secrets[i], format!("v{i}"), &targets[i]).unwrap();
        }
        batcher.complete(&ctx).unwrap();

        for (i, target) in targets.iter().enumerate() {
            assert_eq!(target.ciphertext(), Some(format!("v{i}!")));
        }
        assert!(backend.call_count() >= 2, "10 items over a batch size of 4 must take at least 2 drains");
    }

    #[test]
    fn at_most_one_batch_in_flight_per_batcher() {
        let backend = Arc::new(FakeEncrypter::with_delay(Duration::from_millis(20)));
        let cache = Arc::new(MemoCache::new());
        let batcher = Arc::new(BatchEncrypter::new(backend.clone(), cache, 2));

        let mut handles = Vec::new();
        for i in 0..8 {
            let batcher = Arc::clone(&batcher);
            handles.push(thread::spawn(move || {
                let ctx = CancelToken::new();
                let secret = SecretHandle::new();
                let target = SerializedSecret::new();
                batcher.enqueue(&ctx, &secret, format!("p{i}"), &target).unwrap();
                target
            }));
        }
        let targets: Vec<SerializedSecret> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        batcher.complete(&CancelToken::new()).unwrap();

        for target in &targets {
            assert!(target.ciphertext().is_some());
        }
        // FakeEncrypter does not assert non-overlap directly, but the drain
        // mutex guarantees serialization; if it didn't, the sleep-based
        // delay combined with 8 producers across a batch size of 2 would
        // very likely corrupt `calls` under a data race, which Rust's
        // ownership model already makes impossible to observe incorrectly
        // here — the meaningful assertion is that every target resolved.
        assert!(backend.call_count() >= 4);
    }

    #[test]
    fn backend_error_poisons_batcher_and_is_not_recoverable() {
        let backend = Arc::new(FakeEncrypter::new());
        backend.fail_next.store(true, Ordering::SeqCst);
        let cache = Arc::new(NullCache);
        let batcher = BatchEncrypter::new(backend, cache, 10);
        let ctx = CancelToken::new();

        let secret = SecretHandle::new();
        let target = SerializedSecret::new();
        batcher.enqueue(&ctx, &secret, "a", &target).unwrap();

        let result = batcher.complete(&ctx);
        assert!(matches!(result, Err(BatchError::Backend(_))));
    }

    #[test]
    #[should_panic(expected = "Complete called twice")]
    fn double_complete_panics() {
        let backend = Arc::new(FakeEncrypter::new());
        let cache = Arc::new(NullCache);
        let batcher = BatchEncrypter::new(backend, cache, 10);
        let ctx = CancelToken::new();
        batcher.complete(&ctx).unwrap();
        let _ = batcher.complete(&ctx);
    }

    #[test]
    #[should_panic(expected = "Enqueue called on a closed")]
    fn enqueue_after_complete_panics() {
        let backend = Arc::new(FakeEncrypter::new());
        let cache = Arc::new(NullCache);
        let batcher = BatchEncrypter::new(backend, cache, 10);
        let ctx = CancelToken::new();
        batcher.complete(&ctx).unwrap();

        let secret = SecretHandle::new();
        let target = SerializedSecret::new();
        let _ = batcher.enqueue(&ctx, &secret, "late", &target);
    }
}
