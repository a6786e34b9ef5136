//! Email Cipher
//!
//! AES-256-GCM with a random 96-bit nonce prepended to the ciphertext, the
//! whole blob URL-safe base64 encoded so it can sit in a form or query
//! string.

use aes_gcm::{Aes256Gcm, KeyInit, Nonce, aead::Aead};
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::error::{AuthError, Result};

const NONCE_LENGTH: usize = 12;

/// Symmetric cipher for short strings
#[derive(Clone)]
pub struct EmailCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for EmailCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailCipher")
            .field("key", &"***redacted***")
            .finish()
    }
}

impl EmailCipher {
    /// Derive the 256-bit key from an arbitrary-length secret
    pub fn from_secret(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(AuthError::Config("cipher secret is empty".into()));
        }
        Ok(Self {
            key: Sha256::digest(secret).into(),
        })
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| AuthError::Cipher(e.to_string()))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| AuthError::Cipher("encryption failure".into()))?;

        let mut blob = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(URL_SAFE.encode(blob))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let blob = URL_SAFE
            .decode(encoded.trim())
            .map_err(|e| AuthError::Cipher(e.to_string()))?;
        if blob.len() < NONCE_LENGTH {
            return Err(AuthError::Cipher("ciphertext missing nonce".into()));
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AuthError::Cipher("decryption failure".into()))?;
        String::from_utf8(plaintext).map_err(|e| AuthError::Cipher(e.to_string()))
    }
}
