//! Process-wide configuration and cryptographic constants.
//!
//! Mirrors the single-source-of-truth role the teacher crate's `config`
//! module plays for its file format: every constant a caller might need
//! to tune lives here, plus the one environment-driven toggle this core
//! exposes (`DISABLE_SECRET_CACHE`).

use std::env;

/// Argon2id time cost (number of passes) for the passphrase backend.
pub const ARGON_TIME: u32 = 3;

/// Argon2id memory cost in KiB (64 MiB).
pub const ARGON_MEMORY: u32 = 64 * 1024;

/// Argon2id parallelism factor (number of threads).
pub const ARGON_THREADS: u32 = 4;

/// Length of the derived AES-256 key in bytes.
pub const ARGON_KEY_LEN: usize = 32;

/// Length of the random salt used for key derivation in bytes.
pub const ARGON_SALT_LEN: usize = 16;

/// Size of the AES-GCM key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes (96 bits, NIST SP 800-38D).
pub const AES_NONCE_SIZE: usize = 12;

/// Default bound on a batcher's queue, and the largest number of items
/// submitted to a backend in a single batch call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Name of the environment variable that disables the secret cache.
pub const DISABLE_SECRET_CACHE_ENV: &str = "DISABLE_SECRET_CACHE";

/// Name of the environment variable carrying the passphrase backend's
/// passphrase when one is not supplied programmatically.
pub const SECRET_PASSPHRASE_ENV: &str = "SECRET_PASSPHRASE";

/// Resolved process configuration.
///
/// Constructed once per `BatchingCachingManager`/cache and threaded
/// through rather than re-reading the environment on every call.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub disable_secret_cache: bool,
    pub max_batch_size: usize,
}

impl Config {
    /// Resolves configuration from the process environment.
    ///
    /// `DISABLE_SECRET_CACHE=true` (exact match) disables the cache;
    /// any other value, or the variable being unset, leaves it enabled.
    pub fn from_env() -> Self {
        Self {
            disable_secret_cache: env::var(DISABLE_SECRET_CACHE_ENV).map(|v| v == "true").unwrap_or(false),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    /// Same as [`Config::from_env`] but with an explicit batch size override,
    /// for callers (and tests) that need a small bound to exercise backpressure.
    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self { max_batch_size, ..Self::from_env() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enables_cache() {
        // SAFETY: test runs single-threaded with respect to this var via serial execution.
        unsafe { std::env::remove_var(DISABLE_SECRET_CACHE_ENV) };
        let config = Config::from_env();
        assert!(!config.disable_secret_cache);
        assert_eq!(config.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
    }

    #[test]
    fn override_batch_size_preserves_env_toggle() {
        let config = Config::with_max_batch_size(4);
        assert_eq!(config.max_batch_size, 4);
    }
}
