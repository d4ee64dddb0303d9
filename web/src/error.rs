//! HTTP error mapping.
//!
//! Every handler returns [`AppError`]; the core's [`AuthError`] converts into
//! it with a stable machine-readable `code` and the status table below.
//!
//! | Status | Errors |
//! |---|---|
//! | 400 | duplicate account, validation, 2FA state and code, `OAuth`, one-time links |
//! | 401 | bad credentials, expired / revoked / malformed / forged tokens |
//! | 403 | token scope |
//! | 404 | unknown device or account |
//! | 429 | rate limited (with `Retry-After` and `X-RateLimit-*` headers) |
//! | 500 | store, encryption and internal failures |

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sentinel_auth::AuthError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the rate-limit ceiling.
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";

/// Header carrying the rate-limit window in seconds.
pub const RATE_LIMIT_WINDOW_HEADER: &str = "x-ratelimit-window";

/// Header carrying the remaining budget (always zero on a 429).
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Rate-limit facts echoed on a 429 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RateLimitHeaders {
    retry_after_secs: u64,
    limit: u32,
    window_secs: u64,
}

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    rate_limit: Option<RateLimitHeaders>,
    /// Logged on 5xx, never serialized.
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            rate_limit: None,
            source: None,
        }
    }

    /// Attach an internal cause for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 with code `BAD_REQUEST`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 401 with code `UNAUTHORIZED`.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// 403 with code `FORBIDDEN`.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// 500 with code `INTERNAL_SERVER_ERROR`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", message)
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code, e.g. `INVALID_CREDENTIALS`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorBody {
            code: self.code.to_string(),
            message: self.message,
        };
        let mut response = (self.status, Json(body)).into_response();

        if let Some(limits) = self.rate_limit {
            let headers = response.headers_mut();
            headers.insert(
                axum::http::header::RETRY_AFTER,
                HeaderValue::from(limits.retry_after_secs),
            );
            headers.insert(
                HeaderName::from_static(RATE_LIMIT_LIMIT_HEADER),
                HeaderValue::from(limits.limit),
            );
            headers.insert(
                HeaderName::from_static(RATE_LIMIT_WINDOW_HEADER),
                HeaderValue::from(limits.window_secs),
            );
            headers.insert(
                HeaderName::from_static(RATE_LIMIT_REMAINING_HEADER),
                HeaderValue::from_static("0"),
            );
        }

        response
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            AuthError::TokenRevoked => (StatusCode::UNAUTHORIZED, "TOKEN_REVOKED"),
            AuthError::TokenMalformed | AuthError::TokenSignatureInvalid => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN")
            }
            AuthError::InsufficientScope => (StatusCode::FORBIDDEN, "INSUFFICIENT_SCOPE"),
            AuthError::DuplicateAccount { .. } => (StatusCode::BAD_REQUEST, "DUPLICATE_ACCOUNT"),
            AuthError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AuthError::InvalidResetToken => (StatusCode::BAD_REQUEST, "INVALID_RESET_TOKEN"),
            AuthError::InvalidVerificationToken => {
                (StatusCode::BAD_REQUEST, "INVALID_VERIFICATION_TOKEN")
            }
            AuthError::TwoFactorRequired => (StatusCode::BAD_REQUEST, "TWO_FACTOR_REQUIRED"),
            AuthError::InvalidTwoFactorCode => (StatusCode::BAD_REQUEST, "INVALID_2FA_CODE"),
            AuthError::AlreadyEnabled => (StatusCode::BAD_REQUEST, "2FA_ALREADY_ENABLED"),
            AuthError::NotEnabled => (StatusCode::BAD_REQUEST, "2FA_NOT_ENABLED"),
            AuthError::OAuthProviderUnknown(_) => {
                (StatusCode::BAD_REQUEST, "OAUTH_PROVIDER_UNKNOWN")
            }
            AuthError::OAuthFailure(_) => (StatusCode::BAD_REQUEST, "OAUTH_FAILED"),
            AuthError::DeviceNotFound => (StatusCode::NOT_FOUND, "DEVICE_NOT_FOUND"),
            AuthError::AccountNotFound => (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND"),
            AuthError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            AuthError::DatabaseError(_)
            | AuthError::EncryptionError(_)
            | AuthError::InternalError(_) => {
                return Self::internal("An internal error occurred")
                    .with_source(anyhow::Error::new(err));
            }
        };

        let mut app = Self::new(status, code, message);
        if let AuthError::RateLimited {
            retry_after_secs,
            limit,
            window_secs,
        } = err
        {
            app.rate_limit = Some(RateLimitHeaders {
                retry_after_secs,
                limit,
                window_secs,
            });
        }
        app
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}
