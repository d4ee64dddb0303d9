//! Authentication constants.
//!
//! This module contains constant values used throughout the authentication system.

/// Login method identifiers recorded on login attempts.
pub mod login_methods {
    /// Email and password.
    pub const PASSWORD: &str = "password";

    /// OAuth prefix for OAuth-based authentication.
    ///
    /// Full method format: `oauth_{provider}` (e.g., "oauth_google", "oauth_github").
    pub const OAUTH_PREFIX: &str = "oauth_";
}

/// Failure reasons recorded on failed or blocked login attempts.
pub mod failure_reasons {
    /// Password did not match.
    pub const WRONG_PASSWORD: &str = "wrong_password";

    /// Second factor did not match.
    pub const INVALID_2FA_CODE: &str = "invalid_2fa_code";

    /// Rejected by the rate limiter.
    pub const RATE_LIMITED: &str = "rate_limited";

    /// Account is deactivated.
    pub const ACCOUNT_DISABLED: &str = "account_disabled";
}

/// Number of backup codes generated per setup or regeneration.
pub const BACKUP_CODE_COUNT: usize = 8;

/// Maximum stored user agent length on login attempts.
pub const MAX_ATTEMPT_USER_AGENT_LEN: usize = 500;

/// Maximum stored device descriptor length on refresh tokens.
pub const MAX_DEVICE_INFO_LEN: usize = 255;

/// Default page size for login history.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Largest page size for login history.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Length of generated passwords for accounts created through `OAuth`.
pub const GENERATED_PASSWORD_LEN: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_method_format() {
        let method = format!("{}{}", login_methods::OAUTH_PREFIX, "github");
        assert_eq!(method, "oauth_github");
    }
}
