//! Guest cart persistence on top of a [`KeyValueStore`].

use std::sync::Arc;

use edustore_core::CartSnapshot;
use tracing::warn;

use super::{CartCipher, KeyValueStore, StoreError};

/// Outcome of reading the stored guest cart.
///
/// `Corrupted` is kept distinct from `Empty` so callers can tell "no cart"
/// from "a cart we could not read", even though both are treated as an empty
/// cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// Nothing is stored under the cart key.
    Empty,
    /// The stored cart decrypted and parsed.
    Loaded(CartSnapshot),
    /// Something is stored but it cannot be decrypted or parsed.
    Corrupted,
}

impl DecodeResult {
    /// The snapshot to use, failing open to an empty cart.
    #[must_use]
    pub fn into_snapshot(self) -> CartSnapshot {
        match self {
            Self::Loaded(snapshot) => snapshot,
            Self::Empty | Self::Corrupted => CartSnapshot::new(),
        }
    }

    /// True for [`DecodeResult::Corrupted`].
    #[must_use]
    pub const fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted)
    }
}

/// Encrypted guest cart stored under a fixed key.
pub struct EncryptedCartStore {
    backend: Arc<dyn KeyValueStore>,
    cipher: CartCipher,
    key: String,
}

impl std::fmt::Debug for EncryptedCartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedCartStore")
            .field("key", &self.key)
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}

impl EncryptedCartStore {
    /// Create a store writing under `key` in `backend`.
    pub fn new(
        backend: Arc<dyn KeyValueStore>,
        cipher: CartCipher,
        key: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            cipher,
            key: key.into(),
        }
    }

    /// Key the cart is stored under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialize, encrypt and write the snapshot.
    ///
    /// On error nothing is written, so a previously stored cart survives.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, encryption or the backend write fails.
    pub fn save(&self, snapshot: &CartSnapshot) -> Result<(), StoreError> {
        let plaintext = serde_json::to_vec(snapshot)?;
        let envelope = self.cipher.encrypt(&plaintext)?;
        self.backend.set(&self.key, &envelope)
    }

    /// Read the stored cart.
    ///
    /// Never fails: unreadable data (backend error, malformed envelope,
    /// wrong key, tampered value, unparseable JSON) yields
    /// [`DecodeResult::Corrupted`] and is logged.
    #[must_use]
    pub fn load(&self) -> DecodeResult {
        let envelope = match self.backend.get(&self.key) {
            Ok(Some(envelope)) if !envelope.trim().is_empty() => envelope,
            Ok(_) => return DecodeResult::Empty,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read stored cart");
                return DecodeResult::Corrupted;
            }
        };

        match self.decode(&envelope) {
            Ok(snapshot) => DecodeResult::Loaded(snapshot),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Stored cart is unreadable, treating as empty");
                DecodeResult::Corrupted
            }
        }
    }

    /// Remove the stored cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove(&self.key)
    }

    fn decode(&self, envelope: &str) -> Result<CartSnapshot, StoreError> {
        let plaintext = self.cipher.decrypt(envelope)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use edustore_core::{CartLine, ItemId, LineId};
    use secrecy::SecretString;

    use super::*;
    use crate::store::MemoryStore;

    const SECRET: &str = "k9#Lm2!qZ8@rT4$w";

    fn store_with(backend: &MemoryStore, secret: &str) -> EncryptedCartStore {
        EncryptedCartStore::new(
            Arc::new(backend.clone()),
            CartCipher::from_secret(&SecretString::from(secret)),
            "edustore.cart",
        )
    }

    #[test]
    fn test_load_absent_is_empty() {
        let backend = MemoryStore::new();
        assert_eq!(store_with(&backend, SECRET).load(), DecodeResult::Empty);
    }

    #[test]
    fn test_roundtrip_empty_snapshot() {
        let backend = MemoryStore::new();
        let store = store_with(&backend, SECRET);
        store.save(&CartSnapshot::new()).unwrap();
        assert_eq!(store.load(), DecodeResult::Loaded(CartSnapshot::new()));
    }

    #[test]
    fn test_roundtrip_large_snapshot() {
        let backend = MemoryStore::new();
        let store = store_with(&backend, SECRET);
        let snapshot: CartSnapshot = (1..=64)
            .map(|i| {
                let line = CartLine::new(ItemId::from(i), u32::try_from(i).unwrap());
                if i % 2 == 0 {
                    line.with_server_line_id(LineId::new(format!("L{i}")))
                } else {
                    line
                }
            })
            .collect();
        assert_eq!(snapshot.len(), 64);

        store.save(&snapshot).unwrap();
        assert_eq!(store.load(), DecodeResult::Loaded(snapshot));
    }

    #[test]
    fn test_stored_value_is_not_plaintext() {
        let backend = MemoryStore::new();
        let store = store_with(&backend, SECRET);
        let snapshot =
            CartSnapshot::from_lines(vec![CartLine::new(ItemId::new("lab-manual-42"), 1)]);
        store.save(&snapshot).unwrap();

        let raw = backend.get("edustore.cart").unwrap().unwrap();
        assert!(!raw.contains("lab-manual-42"));
    }

    #[test]
    fn test_wrong_key_is_corrupted_not_empty() {
        let backend = MemoryStore::new();
        store_with(&backend, SECRET)
            .save(&CartSnapshot::from_lines(vec![CartLine::new(ItemId::new("x"), 2)]))
            .unwrap();

        let other = store_with(&backend, "different-K3y&9x");
        let result = other.load();
        assert!(result.is_corrupted());
        assert!(result.into_snapshot().is_empty());
    }

    #[test]
    fn test_garbage_value_is_corrupted() {
        let backend = MemoryStore::new();
        backend.set("edustore.cart", "U2FsdGVkX1+legacy").unwrap();
        assert_eq!(store_with(&backend, SECRET).load(), DecodeResult::Corrupted);
    }

    #[test]
    fn test_valid_envelope_with_bad_json_is_corrupted() {
        let backend = MemoryStore::new();
        let cipher = CartCipher::from_secret(&SecretString::from(SECRET));
        backend
            .set("edustore.cart", &cipher.encrypt(b"{\"not\":\"a list\"}").unwrap())
            .unwrap();
        assert_eq!(store_with(&backend, SECRET).load(), DecodeResult::Corrupted);
    }

    #[test]
    fn test_clear_removes_entry() {
        let backend = MemoryStore::new();
        let store = store_with(&backend, SECRET);
        store
            .save(&CartSnapshot::from_lines(vec![CartLine::new(ItemId::new("x"), 1)]))
            .unwrap();
        store.clear().unwrap();
        assert_eq!(store.load(), DecodeResult::Empty);
        assert!(backend.is_empty());
    }
}
