//! Fast password hasher for tests.

use crate::error::Result;
use crate::providers::PasswordHasher;

const PREFIX: &str = "mock$";

/// Reversible "hash" that keeps test suites fast.
///
/// Never use outside tests: the stored value contains the password.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockPasswordHasher;

impl MockPasswordHasher {
    /// Create a new mock hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PasswordHasher for MockPasswordHasher {
    async fn hash(&self, password: &str) -> Result<String> {
        Ok(format!("{PREFIX}{password}"))
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        Ok(hash
            .strip_prefix(PREFIX)
            .is_some_and(|stored| {
                constant_time_eq::constant_time_eq(stored.as_bytes(), password.as_bytes())
            }))
    }
}
