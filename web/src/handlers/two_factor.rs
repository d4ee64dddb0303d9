//! Two-factor management for the signed-in account.

use super::session::TwoFactorCodeRequest;
use super::MessageResponse;
use crate::error::AppError;
use crate::extractors::{CurrentAccount, RequestMeta};
use axum::{extract::State, Json};
use sentinel_auth::two_factor::{TwoFactorMethod, TwoFactorSetup, TwoFactorStatus};
use sentinel_auth::{AuthProviders, LoginOrchestrator};
use serde::{Deserialize, Serialize};

/// Result of a standalone code check.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TwoFactorCheckResponse {
    /// Human-readable confirmation.
    pub message: String,
    /// Which factor matched.
    pub method: TwoFactorMethod,
}

/// Freshly generated backup codes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupCodesResponse {
    /// Plaintext codes, shown once.
    pub backup_codes: Vec<String>,
}

/// Generate a secret, QR code and backup codes. 2FA stays off until enabled.
///
/// # Endpoint
///
/// ```text
/// POST /auth/2fa/setup
/// Authorization: Bearer <access token>
/// ```
pub async fn setup<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<TwoFactorSetup>, AppError> {
    let setup = auth.setup_two_factor(&account).await?;
    Ok(Json(setup))
}

/// Turn 2FA on with a code from the new secret.
///
/// # Endpoint
///
/// ```text
/// POST /auth/2fa/enable
/// Authorization: Bearer <access token>
///
/// { "code": "123456" }
/// ```
pub async fn enable<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
    Json(request): Json<TwoFactorCodeRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.enable_two_factor(account.id, &request.code).await?;
    Ok(Json(MessageResponse::new("Two-factor authentication enabled")))
}

/// Turn 2FA off. The bearer token is the only proof required.
///
/// # Endpoint
///
/// ```text
/// POST /auth/2fa/disable
/// Authorization: Bearer <access token>
/// ```
pub async fn disable<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<MessageResponse>, AppError> {
    auth.disable_two_factor(account.id).await?;
    Ok(Json(MessageResponse::new("Two-factor authentication disabled")))
}

/// Replace the backup codes.
///
/// # Endpoint
///
/// ```text
/// POST /auth/2fa/backup-codes
/// Authorization: Bearer <access token>
/// ```
pub async fn regenerate_backup_codes<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<BackupCodesResponse>, AppError> {
    let backup_codes = auth.regenerate_backup_codes(account.id).await?;
    Ok(Json(BackupCodesResponse { backup_codes }))
}

/// Check a code against the signed-in account's second factor.
///
/// A backup code is consumed on success. Shares the `/auth/2fa/verify` limit.
///
/// # Endpoint
///
/// ```text
/// POST /auth/2fa/check
/// Authorization: Bearer <access token>
///
/// { "code": "123456" }
/// ```
pub async fn check<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
    RequestMeta(context): RequestMeta,
    Json(request): Json<TwoFactorCodeRequest>,
) -> Result<Json<TwoFactorCheckResponse>, AppError> {
    let method = auth.check_two_factor(account.id, &request.code, &context).await?;
    Ok(Json(TwoFactorCheckResponse {
        message: "Two-factor code accepted".to_string(),
        method,
    }))
}

/// Two-factor summary.
///
/// # Endpoint
///
/// ```text
/// GET /auth/2fa/status
/// Authorization: Bearer <access token>
/// ```
pub async fn status<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<TwoFactorStatus>, AppError> {
    let status = auth.two_factor_status(account.id).await?;
    Ok(Json(status))
}
