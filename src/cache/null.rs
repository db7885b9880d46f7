//! The null-object cache selected by `DISABLE_SECRET_CACHE=true` (§4.1), and
//! always used on the decrypt path regardless of configuration (§4.3).

use super::SecretCache;
use crate::identity::SecretHandle;

/// A cache whose `write` is a no-op and whose lookups always miss.
pub struct NullCache;

impl SecretCache for NullCache {
    fn write(&self, _plaintext: &str, _ciphertext: &str, _secret: &SecretHandle) {}

    fn lookup_ciphertext(&self, _secret: &SecretHandle, _plaintext: &str) -> Option<String> {
        None
    }

    fn lookup_plaintext(&self, _ciphertext: &str) -> Option<String> {
        None
    }
}
