//! `service` backend (§4.5 Appendix A4): a hosted key-management-service
//! client behind an injectable transport, so it stays unit-testable without
//! live network access.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{CancelToken, Decrypter, Encrypter, SecretsManager};

/// The network boundary of the `service`/`cloud` backends. Swapped for a
/// fake in tests; backed by `reqwest::blocking` in production.
pub trait ServiceTransport: Send + Sync {
    fn post_batch(&self, ctx: &CancelToken, url: &str, items: &[String]) -> anyhow::Result<Vec<String>>;
}

/// Default [`ServiceTransport`]: a blocking `reqwest` client posting a JSON
/// array and expecting one back in the same order.
pub struct ReqwestServiceTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestServiceTransport {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self { client: reqwest::blocking::Client::builder().build()? })
    }
}

impl ServiceTransport for ReqwestServiceTransport {
    fn post_batch(&self, ctx: &CancelToken, url: &str, items: &[String]) -> anyhow::Result<Vec<String>> {
        anyhow::ensure!(!ctx.is_cancelled(), "operation cancelled");
        debug!(url, batch_size = items.len(), "posting batch to secrets service");
        let response = self.client.post(url).json(items).send()?.error_for_status()?;
        let values: Vec<String> = response.json()?;
        anyhow::ensure!(values.len() == items.len(), "backend returned {} items for a batch of {}", values.len(), items.len());
        Ok(values)
    }
}

struct ServiceCrypto {
    transport: Arc<dyn ServiceTransport>,
    encrypt_url: String,
    decrypt_url: String,
}

impl Encrypter for ServiceCrypto {
    fn encrypt_value(&self, ctx: &CancelToken, plaintext: &str) -> anyhow::Result<String> {
        Ok(self.batch_encrypt(ctx, &[plaintext.to_string()])?.remove(0))
    }

    fn batch_encrypt(&self, ctx: &CancelToken, plaintexts: &[String]) -> anyhow::Result<Vec<String>> {
        self.transport.post_batch(ctx, &self.encrypt_url, plaintexts)
    }
}

impl Decrypter for ServiceCrypto {
    fn decrypt_value(&self, ctx: &CancelToken, ciphertext: &str) -> anyhow::Result<String> {
        Ok(self.batch_decrypt(ctx, &[ciphertext.to_string()])?.remove(0))
    }

    fn batch_decrypt(&self, ctx: &CancelToken, ciphertexts: &[String]) -> anyhow::Result<Vec<String>> {
        self.transport.post_batch(ctx, &self.decrypt_url, ciphertexts)
    }
}

/// Hosted key-management-service backend. Opaque state: `{"endpoint": url, "key_id": string}`.
pub struct ServiceManager {
    transport: Arc<dyn ServiceTransport>,
    endpoint: String,
    key_id: String,
}

impl ServiceManager {
    pub fn new(state: &serde_json::Value, transport: Arc<dyn ServiceTransport>) -> anyhow::Result<Self> {
        let endpoint = require_str(state, "endpoint")?;
        let key_id = require_str(state, "key_id")?;
        Ok(Self { transport, endpoint, key_id })
    }

    pub fn with_default_transport(state: &serde_json::Value) -> anyhow::Result<Self> {
        Self::new(state, Arc::new(ReqwestServiceTransport::new()?))
    }
}

impl SecretsManager for ServiceManager {
    fn type_tag(&self) -> &str {
        "service"
    }

    fn state(&self) -> serde_json::Value {
        serde_json::json!({ "endpoint": self.endpoint, "key_id": self.key_id })
    }

    fn encrypter(&self) -> Arc<dyn Encrypter> {
        Arc::new(ServiceCrypto {
            transport: Arc::clone(&self.transport),
            encrypt_url: format!("{}/encrypt?key_id={}", self.endpoint, self.key_id),
            decrypt_url: format!("{}/decrypt?key_id={}", self.endpoint, self.key_id),
        })
    }

    fn decrypter(&self) -> Arc<dyn Decrypter> {
        Arc::new(ServiceCrypto {
            transport: Arc::clone(&self.transport),
            encrypt_url: format!("{}/encrypt?key_id={}", self.endpoint, self.key_id),
            decrypt_url: format!("{}/decrypt?key_id={}", self.endpoint, self.key_id),
        })
    }
}

pub(crate) fn require_str(state: &serde_json::Value, field: &'static str) -> anyhow::Result<String> {
    state.get(field).and_then(|v| v.as_str()).map(str::to_string).ok_or_else(|| anyhow::anyhow!("backend state is missing required field {field:?}"))
}
