//! External identity sign-in.
//!
//! The authorize endpoint redirects the browser to the provider. The
//! frontend receives `code` and `state` on its callback page and posts them
//! here; tokens travel in the response body, never in a URL.

use crate::error::AppError;
use crate::extractors::RequestMeta;
use axum::{
    extract::{Path, State},
    response::Redirect,
    Json,
};
use sentinel_auth::{AuthProviders, LoginOrchestrator, OAuthProvider, TokenPair};
use serde::{Deserialize, Serialize};

/// A provider users may sign in with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderInfo {
    /// Path segment, e.g. `github`.
    pub name: String,
    /// Label for buttons, e.g. `GitHub`.
    pub display_name: String,
}

/// Configured providers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersResponse {
    /// Providers with credentials.
    pub providers: Vec<ProviderInfo>,
}

/// Authorization result posted back by the frontend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackRequest {
    /// Authorization code from the provider.
    pub code: String,
    /// CSRF state issued by the authorize endpoint.
    pub state: String,
}

/// List configured providers.
///
/// # Endpoint
///
/// ```text
/// GET /auth/oauth/providers
/// ```
#[allow(clippy::unused_async)]
pub async fn providers<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
) -> Json<ProvidersResponse> {
    let providers = auth
        .oauth_providers()
        .into_iter()
        .map(|p| ProviderInfo {
            name: p.as_str().to_string(),
            display_name: p.display_name().to_string(),
        })
        .collect();

    Json(ProvidersResponse { providers })
}

/// Redirect to the provider's consent page.
///
/// # Endpoint
///
/// ```text
/// GET /auth/oauth/:provider/authorize
/// ```
///
/// # Response
///
/// `307 Temporary Redirect` with the authorization URL in `Location`.
pub async fn authorize<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    Path(provider): Path<String>,
) -> Result<Redirect, AppError> {
    let provider: OAuthProvider = provider.parse()?;
    let redirect = auth.oauth_authorization_url(provider).await?;

    tracing::debug!(provider = %provider, "Redirecting to OAuth provider");
    Ok(Redirect::temporary(&redirect.url))
}

/// Complete sign-in with the provider's authorization code.
///
/// # Endpoint
///
/// ```text
/// POST /auth/oauth/:provider/callback
///
/// { "code": "...", "state": "..." }
/// ```
pub async fn callback<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    Path(provider): Path<String>,
    RequestMeta(ctx): RequestMeta,
    Json(request): Json<CallbackRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let provider: OAuthProvider = provider.parse()?;
    let tokens = auth
        .oauth_login(provider, &request.code, &request.state, &ctx)
        .await?;
    Ok(Json(tokens))
}
