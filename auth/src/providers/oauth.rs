//! `OAuth2` provider trait and the configured HTTP dispatcher.

use crate::config::OAuthConfig;
use crate::error::{AuthError, Result};
use crate::providers::{GitHubOAuthProvider, GoogleOAuthProvider, OAuthUserInfo};
use crate::state::OAuthProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `OAuth` token response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokenResponse {
    /// Access token for provider API requests.
    pub access_token: String,

    /// Refresh token, when the provider issued one.
    pub refresh_token: Option<String>,

    /// Access token expiry, when the provider disclosed one.
    pub expires_at: Option<DateTime<Utc>>,
}

/// `OAuth2` provider.
///
/// One implementation may serve several providers; each method receives the
/// provider it should talk to and fails with `OAuthProviderUnknown` for
/// providers it does not handle.
pub trait OAuth2Provider: Send + Sync {
    /// Whether `provider` has usable client credentials.
    fn is_configured(&self, provider: OAuthProvider) -> bool;

    /// Build the authorization URL the user is redirected to.
    ///
    /// # Errors
    ///
    /// Returns `OAuthProviderUnknown` if the provider is not configured.
    fn authorization_url(
        &self,
        provider: OAuthProvider,
        state: &str,
        redirect_uri: &str,
    ) -> Result<String>;

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns `OAuthFailure` if the provider rejects the code or is unreachable.
    fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
        redirect_uri: &str,
    ) -> impl std::future::Future<Output = Result<OAuthTokenResponse>> + Send;

    /// Fetch the user's profile.
    ///
    /// # Errors
    ///
    /// Returns `OAuthFailure` if the request fails.
    fn fetch_user_info(
        &self,
        provider: OAuthProvider,
        access_token: &str,
    ) -> impl std::future::Future<Output = Result<OAuthUserInfo>> + Send;
}

/// Dispatches to the Google and GitHub clients that have credentials.
#[derive(Clone, Debug, Default)]
pub struct HttpOAuthProviders {
    google: Option<GoogleOAuthProvider>,
    github: Option<GitHubOAuthProvider>,
}

impl HttpOAuthProviders {
    /// Build clients for every provider configured in `config`.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if an HTTP client cannot be constructed.
    pub fn from_config(config: &OAuthConfig) -> Result<Self> {
        let mut providers = Self::default();

        if config.is_configured(OAuthProvider::Google) {
            if let Some(creds) = &config.google {
                providers.google = Some(GoogleOAuthProvider::new(
                    creds.client_id.clone(),
                    creds.client_secret.clone(),
                    config.request_timeout,
                )?);
            }
        }

        if config.is_configured(OAuthProvider::GitHub) {
            if let Some(creds) = &config.github {
                providers.github = Some(GitHubOAuthProvider::new(
                    creds.client_id.clone(),
                    creds.client_secret.clone(),
                    config.request_timeout,
                )?);
            }
        }

        Ok(providers)
    }

    fn google(&self) -> Result<&GoogleOAuthProvider> {
        self.google
            .as_ref()
            .ok_or_else(|| AuthError::OAuthProviderUnknown(OAuthProvider::Google.to_string()))
    }

    fn github(&self) -> Result<&GitHubOAuthProvider> {
        self.github
            .as_ref()
            .ok_or_else(|| AuthError::OAuthProviderUnknown(OAuthProvider::GitHub.to_string()))
    }
}

impl OAuth2Provider for HttpOAuthProviders {
    fn is_configured(&self, provider: OAuthProvider) -> bool {
        match provider {
            OAuthProvider::Google => self.google.is_some(),
            OAuthProvider::GitHub => self.github.is_some(),
        }
    }

    fn authorization_url(
        &self,
        provider: OAuthProvider,
        state: &str,
        redirect_uri: &str,
    ) -> Result<String> {
        match provider {
            OAuthProvider::Google => self.google()?.authorization_url(state, redirect_uri),
            OAuthProvider::GitHub => self.github()?.authorization_url(state, redirect_uri),
        }
    }

    async fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokenResponse> {
        match provider {
            OAuthProvider::Google => self.google()?.exchange_code(code, redirect_uri).await,
            OAuthProvider::GitHub => self.github()?.exchange_code(code, redirect_uri).await,
        }
    }

    async fn fetch_user_info(
        &self,
        provider: OAuthProvider,
        access_token: &str,
    ) -> Result<OAuthUserInfo> {
        match provider {
            OAuthProvider::Google => self.google()?.fetch_user_info(access_token).await,
            OAuthProvider::GitHub => self.github()?.fetch_user_info(access_token).await,
        }
    }
}
