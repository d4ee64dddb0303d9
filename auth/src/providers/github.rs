//! GitHub `OAuth` client.

use crate::error::{AuthError, Result};
use crate::providers::{OAuthTokenResponse, OAuthUserInfo};
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;

const AUTHORIZATION_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";

/// GitHub requires a `User-Agent` on every API request.
const API_USER_AGENT: &str = "sentinel-auth";

/// GitHub `OAuth` client.
///
/// The profile email comes from `/user`; when that is private the primary
/// verified address from `/user/emails` is used instead.
#[derive(Clone, Debug)]
pub struct GitHubOAuthProvider {
    client_id: String,
    client_secret: String,
    http_client: Client,
}

impl GitHubOAuthProvider {
    /// Create a new GitHub client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the HTTP client cannot be built.
    pub fn new(client_id: String, client_secret: String, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::InternalError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client_id,
            client_secret,
            http_client,
        })
    }

    /// Build the authorization URL.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the query cannot be encoded.
    pub fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", "user:email"),
            ("state", state),
        ];

        let query = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::InternalError(format!("Failed to build URL: {e}")))?;

        Ok(format!("{AUTHORIZATION_URL}?{query}"))
    }

    /// Exchange an authorization code for tokens.
    ///
    /// GitHub answers `200` with an `error` field for rejected codes, so the
    /// body is inspected as well as the status.
    ///
    /// # Errors
    ///
    /// Returns `OAuthFailure` if the request fails or GitHub rejects the code.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokenResponse> {
        let params = [
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(TOKEN_URL)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::OAuthFailure(format!("Token exchange failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(%status, "GitHub token exchange failed");
            return Err(AuthError::OAuthFailure("Token exchange failed".to_string()));
        }

        let body: GitHubTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::OAuthFailure(format!("Invalid token response: {e}")))?;

        match (body.access_token, body.error) {
            (Some(access_token), None) => Ok(OAuthTokenResponse {
                access_token,
                refresh_token: body.refresh_token,
                expires_at: body.expires_in.map(|secs| {
                    chrono::Utc::now() + chrono::Duration::seconds(i64::from(secs))
                }),
            }),
            (_, error) => {
                let error = error.unwrap_or_else(|| "missing access_token".to_string());
                tracing::warn!(error = %error, "GitHub rejected authorization code");
                Err(AuthError::OAuthFailure(format!("Token exchange failed: {error}")))
            }
        }
    }

    /// Fetch the GitHub profile of the token holder.
    ///
    /// # Errors
    ///
    /// Returns `OAuthFailure` if either request fails.
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<OAuthUserInfo> {
        let user: GitHubUser = self.get_json(USER_URL, access_token).await?;

        let (email, email_verified) = match user.email {
            Some(email) => (Some(email), true),
            None => {
                let emails: Vec<GitHubEmail> = self.get_json(EMAILS_URL, access_token).await?;
                match primary_verified(&emails) {
                    Some(email) => (Some(email), true),
                    None => (None, false),
                }
            }
        };

        Ok(OAuthUserInfo {
            provider_user_id: user.id.to_string(),
            email,
            email_verified,
            name: user.name.or(Some(user.login)),
            picture: user.avatar_url,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .header(AUTHORIZATION, format!("token {access_token}"))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, API_USER_AGENT)
            .send()
            .await
            .map_err(|e| AuthError::OAuthFailure(format!("GitHub API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(%status, url = %url, "GitHub API request failed");
            return Err(AuthError::OAuthFailure("GitHub API request failed".to_string()));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::OAuthFailure(format!("Invalid GitHub response: {e}")))
    }
}

fn primary_verified(emails: &[GitHubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email.clone())
}

#[derive(Debug, Deserialize)]
struct GitHubTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u32>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}
