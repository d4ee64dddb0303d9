//! Superuser account administration.

use crate::error::AppError;
use crate::extractors::CurrentSuperuser;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use sentinel_auth::providers::{Account, AccountView};
use sentinel_auth::{AccountId, AuthProviders, LoginOrchestrator};
use serde::{Deserialize, Serialize};

/// Page size when `limit` is omitted.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Query for `GET /users/`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListQuery {
    /// Accounts to skip.
    #[serde(default)]
    pub skip: usize,
    /// Page size.
    pub limit: Option<usize>,
}

/// All accounts, oldest first.
///
/// # Endpoint
///
/// ```text
/// GET /users/?skip=0&limit=100
/// Authorization: Bearer <superuser access token>
/// ```
pub async fn list<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentSuperuser(_admin): CurrentSuperuser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<AccountView>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let accounts = auth.list_accounts(query.skip, limit).await?;
    Ok(Json(accounts.iter().map(Account::view).collect()))
}

/// One account by id.
pub async fn get<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    CurrentSuperuser(_admin): CurrentSuperuser,
    Path(account_id): Path<AccountId>,
) -> Result<Json<AccountView>, AppError> {
    let account = auth.get_account(account_id).await?;
    Ok(Json(account.view()))
}
