//! Record encryption for serialized output.
//!
//! AES-256-GCM with a random 96-bit nonce per operation. The cipher key is
//! derived once from the configured secret (SHA-256), so a bad secret fails
//! at encoder construction instead of per record. Ciphertext travels as a
//! two-field JSON object: `iv` (the nonce) and `bytes` (ciphertext plus
//! authentication tag), both base64.

use crate::error::{EventError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

/// An encrypted payload as it appears in serialized records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// Base64 nonce
    pub iv: String,
    /// Base64 ciphertext + tag
    pub bytes: String,
}

/// Encrypts (and, for consumers, decrypts) record payloads.
pub struct RecordCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl RecordCipher {
    /// Derive the cipher from the configured secret.
    pub fn new(secret: &str) -> Result<Self> {
        let key_material = digest(&SHA256, secret.as_bytes());
        let unbound = UnboundKey::new(&AES_256_GCM, key_material.as_ref())
            .map_err(|_| EventError::crypto("invalid key material"))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt a payload under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBlob> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| EventError::crypto("failed to generate nonce"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| EventError::crypto("encryption failed"))?;

        Ok(EncryptedBlob {
            iv: BASE64.encode(nonce_bytes),
            bytes: BASE64.encode(&in_out),
        })
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Vec<u8>> {
        let nonce_bytes: [u8; NONCE_LEN] = BASE64
            .decode(&blob.iv)
            .map_err(|_| EventError::crypto("invalid base64 nonce"))?
            .try_into()
            .map_err(|_| EventError::crypto("invalid nonce length"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = BASE64
            .decode(&blob.bytes)
            .map_err(|_| EventError::crypto("invalid base64 ciphertext"))?;
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| EventError::crypto("decryption failed"))?;
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let cipher = RecordCipher::new("s3cret").unwrap();
        let blob = cipher.encrypt(b"hello change stream").unwrap();
        assert_ne!(blob.iv, blob.bytes);
        let plaintext = cipher.decrypt(&blob).unwrap();
        assert_eq!(plaintext, b"hello change stream");
    }

    #[test]
    fn test_nonce_varies() {
        let cipher = RecordCipher::new("s3cret").unwrap();
        let a = cipher.encrypt(b"x").unwrap();
        let b = cipher.encrypt(b"x").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.bytes, b.bytes);
    }

    #[test]
    fn test_wrong_key_fails() {
        let cipher = RecordCipher::new("s3cret").unwrap();
        let other = RecordCipher::new("different").unwrap();
        let blob = cipher.encrypt(b"payload").unwrap();
        assert!(other.decrypt(&blob).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = RecordCipher::new("s3cret").unwrap();
        let mut blob = cipher.encrypt(b"payload").unwrap();
        blob.bytes = BASE64.encode(b"garbage-garbage-garbage");
        assert!(cipher.decrypt(&blob).is_err());
    }
}
