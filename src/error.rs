//! Typed error hierarchy.
//!
//! The teacher crate is an application and leans on `anyhow` everywhere;
//! this crate is a library consumed by a deployment serializer, so its
//! public errors are a closed, matchable `thiserror` enum per kind (§7
//! of the spec this implements). Backend-internal plumbing still uses
//! `anyhow` the way the teacher's crypto modules do, and gets wrapped
//! at the boundary.

use thiserror::Error;

/// Errors raised while resolving a `(type-tag, opaque-state)` pair to a
/// backend secrets manager.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no known secrets provider for type {0:?}")]
    UnknownProvider(String),

    #[error("failed to construct secrets provider {tag:?}: {source}")]
    Construction {
        tag: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors raised while draining a batch encrypter or decrypter.
///
/// Contract violations (null inputs, use-after-close, double-complete)
/// are deliberately **not** represented here: those are programmer
/// errors and panic immediately rather than returning a `Result`
/// callers might be tempted to ignore.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("secrets backend batch call failed: {0}")]
    Backend(#[source] anyhow::Error),

    #[error("failed to deserialize decrypted property value: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("batcher already failed a previous drain and cannot accept further work")]
    Poisoned,
}
