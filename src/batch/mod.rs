//! The batching-caching core (§4.2 / §4.3): one-shot encrypt/decrypt
//! batchers created per operation by [`crate::manager::BatchingCachingManager`].

mod decrypter;
mod encrypter;

pub use decrypter::{BatchDecrypter, DeserializePropertyValue};
pub use encrypter::BatchEncrypter;
