//! Encrypted local persistence for the guest cart.
//!
//! # Layers
//!
//! - [`KeyValueStore`] - string-keyed persistent store (browser local storage
//!   equivalent); [`MemoryStore`] and [`FileStore`] implementations
//! - [`CartCipher`] - ChaCha20-Poly1305 envelope around the serialized cart
//! - [`EncryptedCartStore`] - save/load/clear of a [`CartSnapshot`] under a
//!   fixed key, failing open on undecodable data
//!
//! [`CartSnapshot`]: edustore_core::CartSnapshot

mod cipher;
mod encrypted;
mod kv;

pub use cipher::CartCipher;
pub use encrypted::{DecodeResult, EncryptedCartStore};
pub use kv::{FileStore, KeyValueStore, MemoryStore};

use thiserror::Error;

/// Errors raised by the local store layers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Encryption or decryption failed.
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// Stored envelope is not in the expected format.
    #[error("Malformed envelope: {0}")]
    Envelope(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Cipher("authentication tag mismatch".to_string());
        assert_eq!(err.to_string(), "Cipher error: authentication tag mismatch");

        let err = StoreError::Envelope("missing nonce".to_string());
        assert_eq!(err.to_string(), "Malformed envelope: missing nonce");
    }
}
