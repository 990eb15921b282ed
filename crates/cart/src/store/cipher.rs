//! Symmetric envelope encryption for the stored cart.
//!
//! Envelope format: `v1:<nonce>:<ciphertext>`, both parts base64url without
//! padding. The key is the SHA-256 digest of the configured cart secret and
//! every encryption draws a fresh 96-bit nonce.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use secrecy::{ExposeSecret, SecretBox, SecretString};
use sha2::{Digest, Sha256};

use super::StoreError;

const ENVELOPE_VERSION: &str = "v1";
const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 cipher keyed from the cart secret.
pub struct CartCipher {
    key: SecretBox<[u8; 32]>,
}

impl std::fmt::Debug for CartCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CartCipher {
    /// Derive the cipher key from the configured secret.
    #[must_use]
    pub fn from_secret(secret: &SecretString) -> Self {
        let digest: [u8; 32] = Sha256::digest(secret.expose_secret().as_bytes()).into();
        Self {
            key: SecretBox::new(Box::new(digest)),
        }
    }

    fn aead(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(self.key.expose_secret()))
    }

    /// Encrypt `plaintext` into an envelope string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cipher`] if the AEAD rejects the input.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, StoreError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .aead()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| StoreError::Cipher(format!("failed to encrypt cart: {e}")))?;

        Ok(format!(
            "{ENVELOPE_VERSION}:{}:{}",
            URL_SAFE_NO_PAD.encode(nonce_bytes),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    /// Decrypt an envelope produced by [`CartCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Envelope`] for a malformed envelope and
    /// [`StoreError::Cipher`] when authentication fails (wrong key or
    /// tampered ciphertext).
    pub fn decrypt(&self, envelope: &str) -> Result<Vec<u8>, StoreError> {
        let mut parts = envelope.trim().split(':');
        let version = parts.next().unwrap_or_default();
        let nonce_b64 = parts.next().unwrap_or_default();
        let ciphertext_b64 = parts.next().unwrap_or_default();

        if version != ENVELOPE_VERSION || parts.next().is_some() {
            return Err(StoreError::Envelope(format!(
                "unsupported envelope version '{version}'"
            )));
        }

        let nonce_raw = URL_SAFE_NO_PAD
            .decode(nonce_b64.as_bytes())
            .map_err(|e| StoreError::Envelope(format!("invalid nonce encoding: {e}")))?;
        if nonce_raw.len() != NONCE_LEN {
            return Err(StoreError::Envelope(format!(
                "nonce must be {NONCE_LEN} bytes (got {})",
                nonce_raw.len()
            )));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64.as_bytes())
            .map_err(|e| StoreError::Envelope(format!("invalid ciphertext encoding: {e}")))?;

        self.aead()
            .decrypt(Nonce::from_slice(&nonce_raw), ciphertext.as_ref())
            .map_err(|e| StoreError::Cipher(format!("failed to decrypt cart: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cipher(secret: &str) -> CartCipher {
        CartCipher::from_secret(&SecretString::from(secret))
    }

    #[test]
    fn test_roundtrip() {
        let c = cipher("k9#Lm2!qZ8@rT4$w");
        let envelope = c.encrypt(b"[{\"itemId\":\"x\",\"quantity\":2}]").unwrap();
        assert!(envelope.starts_with("v1:"));
        assert_eq!(
            c.decrypt(&envelope).unwrap(),
            b"[{\"itemId\":\"x\",\"quantity\":2}]"
        );
    }

    #[test]
    fn test_nonce_differs_per_encryption() {
        let c = cipher("k9#Lm2!qZ8@rT4$w");
        assert_ne!(c.encrypt(b"same").unwrap(), c.encrypt(b"same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let envelope = cipher("k9#Lm2!qZ8@rT4$w").encrypt(b"cart").unwrap();
        let err = cipher("another-Key-7&fj").decrypt(&envelope).unwrap_err();
        assert!(matches!(err, StoreError::Cipher(_)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let c = cipher("k9#Lm2!qZ8@rT4$w");
        let envelope = c.encrypt(b"cart contents").unwrap();
        let (head, body) = envelope.rsplit_once(':').unwrap();
        let mut raw = URL_SAFE_NO_PAD.decode(body).unwrap();
        raw[0] ^= 0x01;
        let tampered = format!("{head}:{}", URL_SAFE_NO_PAD.encode(raw));
        assert!(matches!(c.decrypt(&tampered), Err(StoreError::Cipher(_))));
    }

    #[test]
    fn test_malformed_envelopes() {
        let c = cipher("k9#Lm2!qZ8@rT4$w");
        for bad in ["", "garbage", "v2:AAAA:BBBB", "v1:!!:BBBB", "v1:AAAA:BBBB", "v1:a:b:c"] {
            assert!(
                matches!(c.decrypt(bad), Err(StoreError::Envelope(_))),
                "expected envelope error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug_output = format!("{:?}", cipher("k9#Lm2!qZ8@rT4$w"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
