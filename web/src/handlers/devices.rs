//! Device registry and login history.

use super::MessageResponse;
use crate::error::AppError;
use crate::extractors::CurrentAccount;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use sentinel_auth::providers::{Device, LoginAttempt};
use sentinel_auth::{AuthProviders, DeviceId, LoginOrchestrator};
use serde::{Deserialize, Serialize};

/// Body for `PUT /auth/devices/:id/trust`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrustRequest {
    /// New trust flag.
    pub trusted: bool,
}

/// Paging for `GET /auth/login-history`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HistoryQuery {
    /// Page size; defaults to 50 and is capped at 100.
    pub limit: Option<usize>,
    /// Rows to skip.
    #[serde(default)]
    pub offset: usize,
}

/// Devices of the caller, most recently active first.
pub async fn list<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<Vec<Device>>, AppError> {
    Ok(Json(auth.list_devices(account.id).await?))
}

/// Mark a device trusted or untrusted.
pub async fn trust<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
    Path(device_id): Path<String>,
    Json(request): Json<TrustRequest>,
) -> Result<Json<Device>, AppError> {
    let device = auth
        .trust_device(account.id, &DeviceId(device_id), request.trusted)
        .await?;
    Ok(Json(device))
}

/// Forget a device.
pub async fn remove<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
    Path(device_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.remove_device(account.id, &DeviceId(device_id)).await?;
    Ok(Json(MessageResponse::new("Device removed")))
}

/// Login attempts of the caller, newest first.
pub async fn login_history<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentAccount(account): CurrentAccount,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<LoginAttempt>>, AppError> {
    let history = auth
        .login_history(account.id, query.limit, query.offset)
        .await?;
    Ok(Json(history))
}
