//! Provider registry (§4.5): maps a `(type-tag, opaque-state)` pair to a
//! backend, wrapped with [`crate::manager::BatchingCachingManager`].

mod cloud;
mod passphrase;
mod service;

use std::sync::Arc;

pub use cloud::CloudManager;
pub use passphrase::{EnvPassphraseSource, PassphraseManager, PassphraseSource, StackAwarePassphraseManager};
pub use service::{ReqwestServiceTransport, ServiceManager, ServiceTransport};

use crate::backend::SecretsManager;
use crate::config::Config;
use crate::error::ProviderError;
use crate::manager::BatchingCachingManager;

/// Resolves `(tag, state)` to a wrapped backend manager.
pub fn of_type(tag: &str, state: serde_json::Value, config: &Config) -> Result<BatchingCachingManager, ProviderError> {
    build_backend(tag, &state, None).map(|backend| BatchingCachingManager::new(backend, config))
}

/// Same as [`of_type`], but for `"passphrase"` selects the stack-aware
/// variant (§4.5) so the passphrase prompt can show `stack_name`.
pub fn of_type_for_stack(tag: &str, state: serde_json::Value, stack_name: &str, config: &Config) -> Result<BatchingCachingManager, ProviderError> {
    build_backend(tag, &state, Some(stack_name)).map(|backend| BatchingCachingManager::new(backend, config))
}

fn build_backend(tag: &str, state: &serde_json::Value, stack_name: Option<&str>) -> Result<Arc<dyn SecretsManager>, ProviderError> {
    let wrap = |source: anyhow::Error| ProviderError::Construction { tag: tag.to_string(), source };
    match tag {
        "passphrase" => match stack_name {
            Some(name) => StackAwarePassphraseManager::new(state, name, &EnvPassphraseSource).map(|m| Arc::new(m) as Arc<dyn SecretsManager>).map_err(wrap),
            None => PassphraseManager::new(state, &EnvPassphraseSource).map(|m| Arc::new(m) as Arc<dyn SecretsManager>).map_err(wrap),
        },
        "service" => ServiceManager::with_default_transport(state).map(|m| Arc::new(m) as Arc<dyn SecretsManager>).map_err(wrap),
        "cloud" => CloudManager::with_default_transport(state).map(|m| Arc::new(m) as Arc<dyn SecretsManager>).map_err(wrap),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_unknown_provider_tag_is_reported_verbatim() {
        let result = of_type("quantum", serde_json::json!({}), &Config::default());
        let err = result.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(ref tag) if tag == "quantum"));
        assert!(err.to_string().contains("quantum"));
    }

    #[test]
    fn service_construction_error_is_wrapped_with_the_tag() {
        let result = of_type("service", serde_json::json!({}), &Config::default());
        match result.unwrap_err() {
            ProviderError::Construction { tag, .. } => assert_eq!(tag, "service"),
            other => panic!("expected Construction, got {other:?}"),
        }
    }

    #[test]
    fn passphrase_without_env_passphrase_is_a_construction_error() {
        // SAFETY: test-only; no other test in this binary relies on this var being set.
        unsafe { std::env::remove_var("SECRET_PASSPHRASE") };
        let result = of_type("passphrase", serde_json::json!({}), &Config::default());
        assert!(matches!(result.unwrap_err(), ProviderError::Construction { .. }));
    }
}
