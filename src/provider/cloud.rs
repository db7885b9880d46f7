//! `cloud` backend (§4.5 Appendix A5): a cloud KMS REST client, structurally
//! parallel to [`super::service::ServiceManager`] but with its own opaque
//! state shape and URL convention, kept distinct so the two backends evolve
//! independently the way their real-world counterparts do.

use std::sync::Arc;

use crate::backend::{CancelToken, Decrypter, Encrypter, SecretsManager};

use super::service::{ServiceTransport, require_str};

struct CloudCrypto {
    transport: Arc<dyn ServiceTransport>,
    encrypt_url: String,
    decrypt_url: String,
}

impl Encrypter for CloudCrypto {
    fn encrypt_value(&self, ctx: &CancelToken, plaintext: &str) -> anyhow::Result<String> {
        Ok(self.batch_encrypt(ctx, &[plaintext.to_string()])?.remove(0))
    }

    fn batch_encrypt(&self, ctx: &CancelToken, plaintexts: &[String]) -> anyhow::Result<Vec<String>> {
        self.transport.post_batch(ctx, &self.encrypt_url, plaintexts)
    }
}

impl Decrypter for CloudCrypto {
    fn decrypt_value(&self, ctx: &CancelToken, ciphertext: &str) -> anyhow::Result<String> {
        Ok(self.batch_decrypt(ctx, &[ciphertext.to_string()])?.remove(0))
    }

    fn batch_decrypt(&self, ctx: &CancelToken, ciphertexts: &[String]) -> anyhow::Result<Vec<String>> {
        self.transport.post_batch(ctx, &self.decrypt_url, ciphertexts)
    }
}

/// Cloud KMS backend. Opaque state: `{"key_resource": string, "region": string}`.
/// Addresses `https://kms.{region}.example/v1/{key_resource}:encrypt`.
pub struct CloudManager {
    transport: Arc<dyn ServiceTransport>,
    key_resource: String,
    region: String,
}

impl CloudManager {
    pub fn new(state: &serde_json::Value, transport: Arc<dyn ServiceTransport>) -> anyhow::Result<Self> {
        let key_resource = require_str(state, "key_resource")?;
        let region = require_str(state, "region")?;
        Ok(Self { transport, key_resource, region })
    }

    pub fn with_default_transport(state: &serde_json::Value) -> anyhow::Result<Self> {
        Self::new(state, Arc::new(super::service::ReqwestServiceTransport::new()?))
    }

    fn resource_url(&self) -> String {
        format!("https://kms.{}.example/v1/{}", self.region, self.key_resource)
    }
}

impl SecretsManager for CloudManager {
    fn type_tag(&self) -> &str {
        "cloud"
    }

    fn state(&self) -> serde_json::Value {
        serde_json::json!({ "key_resource": self.key_resource, "region": self.region })
    }

    fn encrypter(&self) -> Arc<dyn Encrypter> {
        let base = self.resource_url();
        Arc::new(CloudCrypto { transport: Arc::clone(&self.transport), encrypt_url: format!("{base}:encrypt"), decrypt_url: format!("{base}:decrypt") })
    }

    fn decrypter(&self) -> Arc<dyn Decrypter> {
        let base = self.resource_url();
        Arc::new(CloudCrypto { transport: Arc::clone(&self.transport), encrypt_url: format!("{base}:encrypt"), decrypt_url: format!("{base}:decrypt") })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct FakeTransport {
        calls: Mutex<Vec<String>>,
    }

    impl ServiceTransport for FakeTransport {
        fn post_batch(&self, _ctx: &CancelToken, url: &str, items: &[String]) -> anyhow::Result<Vec<String>> {
            self.calls.lock().unwrap().push(url.to_string());
            Ok(items.iter().map(|item| format!("cloud:{item}")).collect())
        }
    }

    #[test]
    fn url_embeds_region_and_key_resource() {
        let transport = Arc::new(FakeTransport { calls: Mutex::new(Vec::new()) });
        let manager = CloudManager::new(&serde_json::json!({"key_resource": "projects/1/keys/a", "region": "us-east1"}), transport.clone()).unwrap();
        let ctx = CancelToken::new();

        manager.encrypter().batch_encrypt(&ctx, &["a".to_string()]).unwrap();
        let calls = transport.calls.lock().unwrap();
        assert!(calls[0].contains("us-east1"));
        assert!(calls[0].contains("projects/1/keys/a"));
        assert!(calls[0].ends_with(":encrypt"));
    }

    #[test]
    fn missing_region_is_a_construction_error() {
        let transport = Arc::new(FakeTransport { calls: Mutex::new(Vec::new()) });
        let result = CloudManager::new(&serde_json::json!({"key_resource": "x"}), transport);
        assert!(result.is_err());
    }
}
