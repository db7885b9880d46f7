//! `passphrase` backend (§4.5 Appendix A3): Argon2id-derived AES-256-GCM,
//! the default network-free backend.

use std::env;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::backend::{CancelToken, Decrypter, Encrypter, SecretsManager};
use crate::cipher::{Cipher, Derive};
use crate::config::{ARGON_MEMORY, ARGON_SALT_LEN, ARGON_THREADS, ARGON_TIME, SECRET_PASSPHRASE_ENV};
use crate::secret::SecretString;

/// Supplies the passphrase used to derive the encryption key. Injected
/// rather than read from the environment directly, so it stays testable
/// without mutating process state.
pub trait PassphraseSource: Send + Sync {
    fn passphrase(&self) -> anyhow::Result<SecretString>;
}

/// Reads `SECRET_PASSPHRASE` from the process environment.
pub struct EnvPassphraseSource;

impl PassphraseSource for EnvPassphraseSource {
    fn passphrase(&self) -> anyhow::Result<SecretString> {
        let value = env::var(SECRET_PASSPHRASE_ENV).map_err(|_| anyhow::anyhow!("{SECRET_PASSPHRASE_ENV} is not set"))?;
        anyhow::ensure!(!value.is_empty(), "{SECRET_PASSPHRASE_ENV} must not be empty");
        Ok(SecretString::from_str(&value))
    }
}

impl Encrypter for Cipher {
    fn encrypt_value(&self, ctx: &CancelToken, plaintext: &str) -> anyhow::Result<String> {
        anyhow::ensure!(!ctx.is_cancelled(), "operation cancelled");
        let ciphertext = self.encrypt(plaintext.as_bytes())?;
        Ok(STANDARD.encode(ciphertext))
    }

    fn batch_encrypt(&self, ctx: &CancelToken, plaintexts: &[String]) -> anyhow::Result<Vec<String>> {
        plaintexts.iter().map(|plaintext| self.encrypt_value(ctx, plaintext)).collect()
    }
}

impl Decrypter for Cipher {
    fn decrypt_value(&self, ctx: &CancelToken, ciphertext: &str) -> anyhow::Result<String> {
        anyhow::ensure!(!ctx.is_cancelled(), "operation cancelled");
        let raw = STANDARD.decode(ciphertext)?;
        let plaintext = self.decrypt(&raw)?;
        Ok(String::from_utf8(plaintext)?)
    }

    fn batch_decrypt(&self, ctx: &CancelToken, ciphertexts: &[String]) -> anyhow::Result<Vec<String>> {
        ciphertexts.iter().map(|ciphertext| self.decrypt_value(ctx, ciphertext)).collect()
    }
}

/// Argon2id + AES-256-GCM over individual property values.
pub struct PassphraseManager {
    cipher: Arc<Cipher>,
    salt: [u8; ARGON_SALT_LEN],
}

impl PassphraseManager {
    /// `state.salt`, base64-encoded, or a freshly generated salt when absent.
    pub fn new(state: &serde_json::Value, source: &dyn PassphraseSource) -> anyhow::Result<Self> {
        let salt = match state.get("salt").and_then(|v| v.as_str()) {
            Some(encoded) => {
                let bytes = STANDARD.decode(encoded)?;
                bytes.as_slice().try_into().map_err(|_| anyhow::anyhow!("salt must be {ARGON_SALT_LEN} bytes"))?
            }
            None => Derive::generate_salt::<ARGON_SALT_LEN>()?,
        };

        let passphrase = source.passphrase()?;
        let derive = Derive::new(passphrase.expose_secret().as_bytes())?;
        let key = derive.derive_key(&salt, ARGON_MEMORY, ARGON_TIME, ARGON_THREADS)?;

        Ok(Self { cipher: Arc::new(Cipher::new(&key)?), salt })
    }
}

impl SecretsManager for PassphraseManager {
    fn type_tag(&self) -> &str {
        "passphrase"
    }

    fn state(&self) -> serde_json::Value {
        serde_json::json!({ "salt": STANDARD.encode(self.salt) })
    }

    fn encrypter(&self) -> Arc<dyn Encrypter> {
        Arc::clone(&self.cipher) as Arc<dyn Encrypter>
    }

    fn decrypter(&self) -> Arc<dyn Decrypter> {
        Arc::clone(&self.cipher) as Arc<dyn Decrypter>
    }
}

/// Same backend, carrying a stack name so interactive prompts built on top
/// of this crate can show which deployment a passphrase prompt is for
/// (§4.5). Behaves identically otherwise.
pub struct StackAwarePassphraseManager {
    inner: PassphraseManager,
    stack_name: String,
}

impl StackAwarePassphraseManager {
    pub fn new(state: &serde_json::Value, stack_name: impl Into<String>, source: &dyn PassphraseSource) -> anyhow::Result<Self> {
        Ok(Self { inner: PassphraseManager::new(state, source)?, stack_name: stack_name.into() })
    }
}

impl SecretsManager for StackAwarePassphraseManager {
    fn type_tag(&self) -> &str {
        self.inner.type_tag()
    }

    fn state(&self) -> serde_json::Value {
        let mut state = self.inner.state();
        state["stack"] = serde_json::Value::String(self.stack_name.clone());
        state
    }

    fn encrypter(&self) -> Arc<dyn Encrypter> {
        self.inner.encrypter()
    }

    fn decrypter(&self) -> Arc<dyn Decrypter> {
        self.inner.decrypter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPassphrase(&'static str);
    impl PassphraseSource for FixedPassphrase {
        fn passphrase(&self) -> anyhow::Result<SecretString> {
            Ok(SecretString::from_str(self.0))
        }
    }

    #[test]
    fn round_trips_through_the_derived_key() {
        let manager = PassphraseManager::new(&serde_json::json!({}), &FixedPassphrase("hunter2")).unwrap();
        let ctx = CancelToken::new();

        let ciphertext = manager.encrypter().encrypt_value(&ctx, "top secret").unwrap();
        let plaintext = manager.decrypter().decrypt_value(&ctx, &ciphertext).unwrap();
        assert_eq!(plaintext, "top secret");
    }

    #[test]
    fn empty_state_generates_and_persists_a_fresh_salt() {
        let manager = PassphraseManager::new(&serde_json::json!({}), &FixedPassphrase("hunter2")).unwrap();
        let state = manager.state();
        assert!(state.get("salt").and_then(|v| v.as_str()).is_some());
    }

    #[test]
    fn persisted_salt_reproduces_the_same_key() {
        let first = PassphraseManager::new(&serde_json::json!({}), &FixedPassphrase("hunter2")).unwrap();
        let persisted_state = first.state();

        let second = PassphraseManager::new(&persisted_state, &FixedPassphrase("hunter2")).unwrap();
        assert_eq!(second.state(), persisted_state);

        let ctx = CancelToken::new();
        let ciphertext = first.encrypter().encrypt_value(&ctx, "x").unwrap();
        // Different manager instance, same salt + passphrase ⇒ same key ⇒ can decrypt.
        assert_eq!(second.decrypter().decrypt_value(&ctx, &ciphertext).unwrap(), "x");
    }

    #[test]
    fn wrong_passphrase_fails_authentication() {
        let salty = PassphraseManager::new(&serde_json::json!({}), &FixedPassphrase("hunter2")).unwrap();
        let state = salty.state();
        let ctx = CancelToken::new();
        let ciphertext = salty.encrypter().encrypt_value(&ctx, "x").unwrap();

        let wrong = PassphraseManager::new(&state, &FixedPassphrase("wrong password")).unwrap();
        assert!(wrong.decrypter().decrypt_value(&ctx, &ciphertext).is_err());
    }

    #[test]
    fn stack_aware_variant_adds_stack_to_state_and_behaves_identically() {
        let manager = StackAwarePassphraseManager::new(&serde_json::json!({}), "prod", &FixedPassphrase("hunter2")).unwrap();
        assert_eq!(manager.state().get("stack").and_then(|v| v.as_str()), Some("prod"));

        let ctx = CancelToken::new();
        let ciphertext = manager.encrypter().encrypt_value(&ctx, "x").unwrap();
        assert_eq!(manager.decrypter().decrypt_value(&ctx, &ciphertext).unwrap(), "x");
    }
}
