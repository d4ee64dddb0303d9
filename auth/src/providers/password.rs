//! Password hashing.

use crate::error::{AuthError, Result};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use rand::rngs::OsRng;

/// Password hashing scheme.
///
/// Hashes are self-describing strings (PHC format for the default
/// implementation) so that parameters can evolve without a schema change.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails.
    fn hash(&self, password: &str) -> impl std::future::Future<Output = Result<String>> + Send;

    /// Check a plaintext password against a stored hash.
    ///
    /// A malformed stored hash verifies as `false`.
    ///
    /// # Errors
    ///
    /// Returns error if the hashing worker fails.
    fn verify(
        &self,
        password: &str,
        hash: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

/// Argon2id with default parameters.
///
/// Hashing is CPU and memory bound, so both operations run on the blocking
/// thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl Argon2Hasher {
    /// Create a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PasswordHasher for Argon2Hasher {
    async fn hash(&self, password: &str) -> Result<String> {
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || {
            use argon2::PasswordHasher as _;

            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::InternalError(format!("Password hashing failed: {e}")))
        })
        .await
        .map_err(|e| AuthError::InternalError(format!("Hashing task failed: {e}")))?
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let password = password.to_owned();
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || {
            let Ok(parsed) = PasswordHash::new(&hash) else {
                tracing::warn!("Stored password hash is not a valid PHC string");
                return false;
            };

            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .await
        .map_err(|e| AuthError::InternalError(format!("Hashing task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = Argon2Hasher::new();
        let hash = hasher.hash("correct horse").await.unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash).await.unwrap());
        assert!(!hasher.verify("battery staple", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_salts_differ() {
        let hasher = Argon2Hasher::new();
        let a = hasher.hash("same").await.unwrap();
        let b = hasher.hash("same").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_malformed_hash_does_not_verify() {
        let hasher = Argon2Hasher::new();
        assert!(!hasher.verify("anything", "not-a-phc-string").await.unwrap());
    }
}
