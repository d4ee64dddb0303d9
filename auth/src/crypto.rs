//! Symmetric primitives for data at rest and opaque token handling.
//!
//! - [`SecretCipher`]: AES-256-GCM authenticated encryption keyed from a
//!   process secret. Output is `base64(nonce || ciphertext)`.
//! - [`keyed_digest`]: HMAC-SHA256, used where set membership is needed
//!   without keeping plaintext (backup codes).
//! - [`sha256_hex`]: unkeyed digest for lookup keys of high-entropy values
//!   (refresh tokens, one-time tokens).

use crate::error::{AuthError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for secrets stored at rest.
///
/// The 256-bit key is the SHA-256 digest of the configured process secret, so
/// any secret string yields a valid key.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
    mac_key: [u8; 32],
}

impl SecretCipher {
    /// Derive a cipher from a process secret.
    #[must_use]
    pub fn from_secret(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        let mac_digest = Sha256::new()
            .chain_update(b"sentinel-mac:")
            .chain_update(secret.as_bytes())
            .finalize();

        let mut mac_key = [0u8; 32];
        mac_key.copy_from_slice(&mac_digest);

        Self {
            cipher: Aes256Gcm::new(&key),
            mac_key,
        }
    }

    /// Encrypt a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::EncryptionError`] if the AEAD operation fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| AuthError::EncryptionError(format!("Encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypt a value produced by [`SecretCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::EncryptionError`] if the value is not valid base64,
    /// is truncated, was produced under a different key, or was tampered with.
    pub fn decrypt(&self, sealed: &str) -> Result<String> {
        let bytes = STANDARD
            .decode(sealed)
            .map_err(|e| AuthError::EncryptionError(format!("Invalid encoding: {e}")))?;

        if bytes.len() <= NONCE_LEN {
            return Err(AuthError::EncryptionError("Ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| AuthError::EncryptionError(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| AuthError::EncryptionError(format!("Invalid plaintext: {e}")))
    }

    /// Keyed digest of a value under this cipher's MAC key.
    #[must_use]
    pub fn keyed_digest(&self, value: &str) -> String {
        keyed_digest(&self.mac_key, value)
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

/// HMAC-SHA256 of `value`, hex encoded.
#[must_use]
pub fn keyed_digest(key: &[u8], value: &str) -> String {
    // HMAC accepts keys of any length.
    let Ok(mut mac) = <Hmac<Sha256> as Mac>::new_from_slice(key) else {
        return sha256_hex(value);
    };
    mac.update(value.as_bytes());
    to_hex(&mac.finalize().into_bytes())
}

/// SHA-256 of `value`, lowercase hex.
///
/// # Examples
///
/// ```
/// use sentinel_auth::crypto::sha256_hex;
///
/// assert_eq!(
///     sha256_hex("abc"),
///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
/// );
/// ```
#[must_use]
pub fn sha256_hex(value: &str) -> String {
    to_hex(&Sha256::digest(value.as_bytes()))
}

/// URL-safe random token with `bytes` bytes of entropy.
#[must_use]
pub fn random_urlsafe_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Lowercase hex string of `bytes` random bytes.
#[must_use]
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    to_hex(&buf)
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
