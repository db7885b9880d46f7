//! Secret identity and the value objects batchers write into.
//!
//! A *secret* (§3) is an opaque, stable in-memory handle: identity is the
//! handle's address, never the plaintext it carries. `SecretHandle` models
//! this the way the teacher crate's `Secret<T>` (`secret.rs`) models a
//! zeroize-on-drop wrapper — except here the wrapper's *identity*, not its
//! contents, is what the cache keys on, so equality and hashing are defined
//! over the `Arc` allocation address rather than derived on the data.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

/// A decrypted property value. The deployment's property model is JSON-shaped,
/// so `DeserializeSecretPropertyValue` (§4.3) parses into this type directly.
pub type PropertyValue = serde_json::Value;

struct SecretInner {
    element: Mutex<Option<PropertyValue>>,
}

/// A stable, clonable handle to one secret property.
///
/// Cloning a `SecretHandle` shares the same identity (it clones the
/// underlying `Arc`); it does not create a distinct cache key. Two
/// *separately constructed* handles are always distinct keys even if
/// they happen to carry equal plaintext.
#[derive(Clone)]
pub struct SecretHandle(Arc<SecretInner>);

impl SecretHandle {
    /// Creates a new secret handle with no resolved element yet.
    pub fn new() -> Self {
        Self(Arc::new(SecretInner { element: Mutex::new(None) }))
    }

    /// Creates a handle already carrying a resolved element (used on the
    /// encrypt side, where the in-memory secret is already live).
    pub fn with_element(value: PropertyValue) -> Self {
        Self(Arc::new(SecretInner { element: Mutex::new(Some(value)) }))
    }

    /// Assigns the resolved element. Called by a `BatchDecrypter` drain
    /// once the backend-returned plaintext has been deserialized.
    pub fn set_element(&self, value: PropertyValue) {
        *self.0.element.lock().unwrap() = Some(value);
    }

    /// Returns the resolved element, if any.
    pub fn element(&self) -> Option<PropertyValue> {
        self.0.element.lock().unwrap().clone()
    }

    fn identity(&self) -> *const () {
        Arc::as_ptr(&self.0).cast()
    }
}

impl Default for SecretHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SecretHandle {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for SecretHandle {}

impl Hash for SecretHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for SecretHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretHandle({:p})", self.identity())
    }
}

struct SerializedSecretInner {
    ciphertext: Mutex<Option<String>>,
}

/// A value object with a mutable `Ciphertext` field, produced empty by the
/// serializer and filled in by a `BatchEncrypter` drain (§3). Interior
/// mutability lets the drain — possibly running on a different thread than
/// the one that called `Enqueue` — populate it after the fact.
#[derive(Clone)]
pub struct SerializedSecret(Arc<SerializedSecretInner>);

impl SerializedSecret {
    /// Creates an empty shell, as the serializer does before traversal
    /// resolves the ciphertext.
    pub fn new() -> Self {
        Self(Arc::new(SerializedSecretInner { ciphertext: Mutex::new(None) }))
    }

    /// Assigns the ciphertext. Called exactly once per target, during drain.
    pub fn set_ciphertext(&self, ciphertext: String) {
        *self.0.ciphertext.lock().unwrap() = Some(ciphertext);
    }

    /// Returns the ciphertext once assigned.
    pub fn ciphertext(&self) -> Option<String> {
        self.0.ciphertext.lock().unwrap().clone()
    }
}

impl Default for SerializedSecret {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_handles_are_distinct_identities_even_with_equal_plaintext() {
        let a = SecretHandle::with_element(PropertyValue::from("same"));
        let b = SecretHandle::with_element(PropertyValue::from("same"));
        assert_ne!(a, b);
    }

    #[test]
    fn cloned_handle_shares_identity() {
        let a = SecretHandle::new();
        let b = a.clone();
        assert_eq!(a, b);
        b.set_element(PropertyValue::from(42));
        assert_eq!(a.element(), Some(PropertyValue::from(42)));
    }

    #[test]
    fn serialized_secret_starts_empty() {
        let target = SerializedSecret::new();
        assert_eq!(target.ciphertext(), None);
        target.set_ciphertext("X".to_string());
        assert_eq!(target.ciphertext(), Some("X".to_string()));
    }
}
