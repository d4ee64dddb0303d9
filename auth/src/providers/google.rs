//! Google `OAuth` 2.0 client.

use crate::error::{AuthError, Result};
use crate::providers::{OAuthTokenResponse, OAuthUserInfo};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const AUTHORIZATION_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USER_INFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Google `OAuth` 2.0 client.
///
/// # Configuration
///
/// 1. Create OAuth 2.0 credentials in Google Cloud Console
/// 2. Register `{FRONTEND_URL}/auth/callback/google` as redirect URI
/// 3. Set `GOOGLE_CLIENT_ID` and `GOOGLE_CLIENT_SECRET`
///
/// # Example
///
/// ```no_run
/// use sentinel_auth::providers::GoogleOAuthProvider;
/// use std::time::Duration;
///
/// let google = GoogleOAuthProvider::new(
///     "your-client-id".to_string(),
///     "your-client-secret".to_string(),
///     Duration::from_secs(10),
/// )?;
/// # Ok::<(), sentinel_auth::AuthError>(())
/// ```
#[derive(Clone, Debug)]
pub struct GoogleOAuthProvider {
    client_id: String,
    client_secret: String,
    http_client: Client,

    /// Scopes to request (default: "openid email profile").
    scopes: Vec<String>,

    /// Request a refresh token for offline access.
    ///
    /// Default: true
    request_refresh_token: bool,

    /// Show the consent screen on every authorization.
    ///
    /// Default: true
    force_consent: bool,
}

impl GoogleOAuthProvider {
    /// Create a new Google client whose requests time out after `timeout`.
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
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            request_refresh_token: true,
            force_consent: true,
        })
    }

    /// Set custom scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Request refresh token for offline access.
    #[must_use]
    pub const fn with_refresh_token(mut self, request: bool) -> Self {
        self.request_refresh_token = request;
        self
    }

    /// Force the consent screen on every authorization.
    #[must_use]
    pub const fn with_force_consent(mut self, force: bool) -> Self {
        self.force_consent = force;
        self
    }

    /// Build the authorization URL.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the query cannot be encoded.
    pub fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String> {
        let scope = self.scopes.join(" ");
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
        ];

        if self.request_refresh_token {
            params.push(("access_type", "offline"));
        }

        if self.force_consent {
            params.push(("prompt", "consent"));
        }

        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| AuthError::InternalError(format!("Failed to build URL: {e}")))?;

        Ok(format!("{AUTHORIZATION_URL}?{query}"))
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns `OAuthFailure` if the request fails or Google rejects the code.
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
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http_client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::OAuthFailure(format!("Token exchange failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %error_body, "Google token exchange failed");
            return Err(AuthError::OAuthFailure("Token exchange failed".to_string()));
        }

        let google_response: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::OAuthFailure(format!("Invalid token response: {e}")))?;

        let expires_at = google_response.expires_in.map(|expires_in| {
            chrono::Utc::now() + chrono::Duration::seconds(i64::from(expires_in))
        });

        Ok(OAuthTokenResponse {
            access_token: google_response.access_token,
            refresh_token: google_response.refresh_token,
            expires_at,
        })
    }

    /// Fetch the Google profile of the token holder.
    ///
    /// # Errors
    ///
    /// Returns `OAuthFailure` if the request fails.
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<OAuthUserInfo> {
        let response = self
            .http_client
            .get(USER_INFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::OAuthFailure(format!("UserInfo request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(%status, "Google UserInfo request failed");
            return Err(AuthError::OAuthFailure("UserInfo fetch failed".to_string()));
        }

        let google_user: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| AuthError::OAuthFailure(format!("Invalid UserInfo response: {e}")))?;

        Ok(google_user.into())
    }
}

/// Google's token endpoint response.
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,

    /// Seconds until expiry (typically 3600).
    expires_in: Option<u32>,

    /// Only present with `access_type=offline`.
    refresh_token: Option<String>,
}

/// Google's v2 `UserInfo` response.
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    /// Stable Google user ID, e.g. "110169484474386276334".
    id: String,
    email: Option<String>,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl From<GoogleUserInfo> for OAuthUserInfo {
    fn from(user: GoogleUserInfo) -> Self {
        Self {
            provider_user_id: user.id,
            email: user.email,
            email_verified: user.verified_email,
            name: user.name,
            picture: user.picture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GoogleOAuthProvider {
        GoogleOAuthProvider::new(
            "test_client_id".to_string(),
            "test_secret".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_google_provider_defaults() {
        let google = provider();
        assert_eq!(google.scopes, vec!["openid", "email", "profile"]);
        assert!(google.request_refresh_token);
        assert!(google.force_consent);
    }

    #[test]
    fn test_authorization_url() {
        let url = provider()
            .authorization_url("test_state_123", "http://localhost:3000/auth/callback/google")
            .unwrap();

        assert!(url.starts_with(AUTHORIZATION_URL));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback%2Fgoogle"
        ));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid+email+profile"));
        assert!(url.contains("state=test_state_123"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
    }

    #[test]
    fn test_authorization_url_without_optional_params() {
        let url = provider()
            .with_refresh_token(false)
            .with_force_consent(false)
            .authorization_url("s", "http://localhost:3000/cb")
            .unwrap();

        assert!(!url.contains("access_type=offline"));
        assert!(!url.contains("prompt=consent"));
    }

    #[test]
    fn test_user_info_mapping() {
        let raw = r#"{"id":"1101","email":"a@example.com","verified_email":true,
            "name":"A","picture":null}"#;
        let user: GoogleUserInfo = serde_json::from_str(raw).unwrap();
        let info = OAuthUserInfo::from(user);

        assert_eq!(info.provider_user_id, "1101");
        assert_eq!(info.email.as_deref(), Some("a@example.com"));
        assert!(info.email_verified);
    }
}
