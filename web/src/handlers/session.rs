//! Login, second factor, refresh and logout handlers.

use super::MessageResponse;
use crate::error::AppError;
use crate::extractors::{BearerToken, CurrentAccount, RequestMeta};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use sentinel_auth::providers::RefreshTokenRecord;
use sentinel_auth::{AuthProviders, LoginOrchestrator, LoginOutcome, TokenPair};
use serde::{Deserialize, Serialize};

/// Password login request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// Second factor code.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TwoFactorCodeRequest {
    /// Six-digit TOTP or a backup code.
    pub code: String,
}

/// Body carrying a refresh token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshRequest {
    /// Refresh token from a previous login or refresh.
    pub refresh_token: String,
}

/// Number of sessions ended.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogoutAllResponse {
    /// Refresh tokens revoked.
    pub revoked: u64,
}

/// An active refresh session, without its digest.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionView {
    /// Record id.
    pub id: uuid::Uuid,
    /// User agent at issue.
    pub device_info: Option<String>,
    /// Client IP at issue.
    pub ip_address: Option<String>,
    /// Issue time.
    pub created_at: DateTime<Utc>,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
    /// Last rotation.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<RefreshTokenRecord> for SessionView {
    fn from(record: RefreshTokenRecord) -> Self {
        Self {
            id: record.id,
            device_info: record.device_info,
            ip_address: record.ip_address,
            created_at: record.created_at,
            expires_at: record.expires_at,
            last_used_at: record.last_used_at,
        }
    }
}

/// Password login.
///
/// # Endpoint
///
/// ```text
/// POST /auth/login
///
/// { "email": "ada@example.com", "password": "..." }
/// ```
///
/// # Response
///
/// A full session:
///
/// ```json
/// { "access_token": "...", "refresh_token": "...", "token_type": "bearer", "expires_in": 1800 }
/// ```
///
/// or, with two-factor enabled, a partial token for `/auth/2fa/verify`:
///
/// ```json
/// {
///   "access_token": "...",
///   "requires_2fa": true,
///   "device_id": "...",
///   "token_type": "bearer",
///   "expires_in": 300
/// }
/// ```
pub async fn login<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    RequestMeta(ctx): RequestMeta,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginOutcome>, AppError> {
    let outcome = auth.login(&request.email, &request.password, &ctx).await?;
    Ok(Json(outcome))
}

/// Finish a login with the second factor.
///
/// # Endpoint
///
/// ```text
/// POST /auth/2fa/verify
/// Authorization: Bearer <partial token>
///
/// { "code": "123456" }
/// ```
pub async fn verify_two_factor<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    BearerToken(partial): BearerToken,
    RequestMeta(ctx): RequestMeta,
    Json(request): Json<TwoFactorCodeRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let tokens = auth.verify_two_factor(&partial, &request.code, &ctx).await?;
    Ok(Json(tokens))
}

/// Rotate a refresh token.
///
/// # Endpoint
///
/// ```text
/// POST /auth/refresh
///
/// { "refresh_token": "..." }
/// ```
pub async fn refresh<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    RequestMeta(ctx): RequestMeta,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let tokens = auth.refresh(&request.refresh_token, &ctx).await?;
    Ok(Json(tokens))
}

/// Revoke one refresh token. Idempotent.
///
/// # Endpoint
///
/// ```text
/// POST /auth/logout
///
/// { "refresh_token": "..." }
/// ```
pub async fn logout<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.logout(&request.refresh_token).await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// Revoke every refresh token of the caller.
///
/// # Endpoint
///
/// ```text
/// POST /auth/logout-all
/// Authorization: Bearer <access token>
/// ```
pub async fn logout_all<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    BearerToken(access): BearerToken,
) -> Result<Json<LogoutAllResponse>, AppError> {
    let revoked = auth.logout_all(&access).await?;
    Ok(Json(LogoutAllResponse { revoked }))
}

/// Active sessions of the caller.
///
/// # Endpoint
///
/// ```text
/// GET /auth/sessions
/// Authorization: Bearer <access token>
/// ```
pub async fn list_sessions<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<Vec<SessionView>>, AppError> {
    let sessions = auth.list_sessions(account.id).await?;
    Ok(Json(sessions.into_iter().map(SessionView::from).collect()))
}
