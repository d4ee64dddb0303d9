//! Registration, profile, password and email verification handlers.

use super::MessageResponse;
use crate::error::AppError;
use crate::extractors::{CurrentAccount, RequestMeta};
use axum::{
    extract::{Query, State},
    Json,
};
use sentinel_auth::providers::{AccountView, NewAccount, ProfileUpdate};
use sentinel_auth::{AuthProviders, LoginOrchestrator};
use serde::{Deserialize, Serialize};

/// Request to start a password reset.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForgotPasswordRequest {
    /// Account email.
    pub email: String,
}

/// Request to complete a password reset.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResetPasswordRequest {
    /// One-time token from the reset email.
    pub token: String,
    /// Replacement password.
    pub new_password: String,
}

/// Query for checking a reset token before showing the reset form.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResetTokenQuery {
    /// One-time token from the reset email.
    pub token: String,
}

/// Whether a reset token is still usable.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResetTokenValidity {
    /// `true` while the token is unused and unexpired.
    pub valid: bool,
}

/// Request to change the password of the signed-in account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChangePasswordRequest {
    /// Current password.
    pub current_password: String,
    /// Replacement password.
    pub new_password: String,
}

/// Request to confirm an email address.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifyEmailRequest {
    /// One-time token from the verification email.
    pub token: String,
}

/// Create an account.
///
/// # Endpoint
///
/// ```text
/// POST /auth/register
/// Content-Type: application/json
///
/// {
///   "email": "ada@example.com",
///   "username": "ada",
///   "password": "correct horse battery"
/// }
/// ```
///
/// # Response
///
/// The new account without its password hash.
pub async fn register<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    RequestMeta(ctx): RequestMeta,
    Json(request): Json<NewAccount>,
) -> Result<Json<AccountView>, AppError> {
    let account = auth.register(request, &ctx).await?;
    Ok(Json(account.view()))
}

/// Profile of the signed-in account.
///
/// # Endpoint
///
/// ```text
/// GET /auth/me
/// Authorization: Bearer <access token>
/// ```
#[allow(clippy::unused_async)]
pub async fn me(CurrentAccount(account): CurrentAccount) -> Json<AccountView> {
    Json(account.view())
}

/// Update full name, phone or avatar.
///
/// # Endpoint
///
/// ```text
/// PATCH /auth/me
/// Authorization: Bearer <access token>
///
/// { "full_name": "Ada Lovelace" }
/// ```
pub async fn update_profile<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<AccountView>, AppError> {
    let account = auth.update_profile(account.id, update).await?;
    Ok(Json(account.view()))
}

/// Send a reset link if the email belongs to an account.
///
/// Always answers with the same message.
///
/// # Endpoint
///
/// ```text
/// POST /auth/password/forgot
///
/// { "email": "ada@example.com" }
/// ```
pub async fn forgot_password<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    RequestMeta(ctx): RequestMeta,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.request_password_reset(&request.email, &ctx).await?;
    Ok(Json(MessageResponse::new(
        "If the email is registered, a reset link has been sent",
    )))
}

/// Check a reset token without consuming it.
///
/// # Endpoint
///
/// ```text
/// GET /auth/password/reset?token=<token>
/// ```
pub async fn validate_reset_token<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    Query(query): Query<ResetTokenQuery>,
) -> Result<Json<ResetTokenValidity>, AppError> {
    let valid = auth.validate_reset_token(&query.token).await?;
    Ok(Json(ResetTokenValidity { valid }))
}

/// Set a new password with a reset token. Ends every session.
///
/// # Endpoint
///
/// ```text
/// POST /auth/password/reset
///
/// { "token": "...", "new_password": "..." }
/// ```
pub async fn reset_password<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.reset_password(&request.token, &request.new_password).await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// Change the password of the signed-in account. Ends every session.
///
/// # Endpoint
///
/// ```text
/// POST /auth/password/change
/// Authorization: Bearer <access token>
///
/// { "current_password": "...", "new_password": "..." }
/// ```
pub async fn change_password<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.change_password(account.id, &request.current_password, &request.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password changed")))
}

/// Confirm an email address.
///
/// # Endpoint
///
/// ```text
/// POST /auth/email/verify
///
/// { "token": "..." }
/// ```
pub async fn verify_email<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<Json<AccountView>, AppError> {
    let account = auth.verify_email(&request.token).await?;
    Ok(Json(account.view()))
}

/// Send a fresh verification email to the signed-in account.
///
/// # Endpoint
///
/// ```text
/// POST /auth/email/resend
/// Authorization: Bearer <access token>
/// ```
pub async fn resend_verification<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<MessageResponse>, AppError> {
    if account.is_verified {
        return Err(AppError::bad_request("Email is already verified"));
    }
    auth.resend_verification(account.id).await?;
    Ok(Json(MessageResponse::new("Verification email sent")))
}
