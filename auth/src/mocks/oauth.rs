//! Mock `OAuth2` provider for testing.

use super::lock;
use crate::error::{AuthError, Result};
use crate::providers::{OAuth2Provider, OAuthTokenResponse, OAuthUserInfo};
use crate::state::OAuthProvider;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock `OAuth2` provider.
///
/// Returns a configurable profile for every configured provider.
#[derive(Debug, Clone)]
pub struct MockOAuth2Provider {
    /// Whether to simulate success or failure.
    pub should_succeed: bool,
    configured: HashSet<OAuthProvider>,
    user_info: Arc<Mutex<OAuthUserInfo>>,
    latency: Option<Duration>,
}

impl MockOAuth2Provider {
    /// Create a mock with every provider configured.
    #[must_use]
    pub fn new() -> Self {
        Self {
            should_succeed: true,
            configured: OAuthProvider::ALL.into_iter().collect(),
            user_info: Arc::new(Mutex::new(OAuthUserInfo {
                provider_user_id: "oauth_user_123".to_string(),
                email: Some("oauth@example.com".to_string()),
                email_verified: true,
                name: Some("OAuth User".to_string()),
                picture: Some("https://example.com/avatar.jpg".to_string()),
            })),
            latency: None,
        }
    }

    /// Create a mock that fails every exchange.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            should_succeed: false,
            ..Self::new()
        }
    }

    /// Restrict the configured providers.
    #[must_use]
    pub fn with_providers(mut self, providers: &[OAuthProvider]) -> Self {
        self.configured = providers.iter().copied().collect();
        self
    }

    /// Delay every network-shaped call.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace the profile returned by `fetch_user_info`.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the lock is poisoned.
    pub fn set_user_info(&self, info: OAuthUserInfo) -> Result<()> {
        *lock(&self.user_info)? = info;
        Ok(())
    }

    fn check(&self, provider: OAuthProvider) -> Result<()> {
        if self.configured.contains(&provider) {
            Ok(())
        } else {
            Err(AuthError::OAuthProviderUnknown(provider.to_string()))
        }
    }
}

impl Default for MockOAuth2Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuth2Provider for MockOAuth2Provider {
    fn is_configured(&self, provider: OAuthProvider) -> bool {
        self.configured.contains(&provider)
    }

    fn authorization_url(
        &self,
        provider: OAuthProvider,
        state: &str,
        redirect_uri: &str,
    ) -> Result<String> {
        self.check(provider)?;
        Ok(format!(
            "https://{provider}.example.com/oauth/authorize\
             ?state={state}&redirect_uri={redirect_uri}"
        ))
    }

    fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
        _redirect_uri: &str,
    ) -> impl Future<Output = Result<OAuthTokenResponse>> + Send {
        let configured = self.check(provider);
        let should_succeed = self.should_succeed;
        let latency = self.latency;
        let code = code.to_string();

        async move {
            configured?;
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            if !should_succeed {
                return Err(AuthError::OAuthFailure("Token exchange failed".into()));
            }

            Ok(OAuthTokenResponse {
                access_token: format!("mock_access_{code}"),
                refresh_token: Some("mock_refresh_token".to_string()),
                expires_at: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
            })
        }
    }

    fn fetch_user_info(
        &self,
        provider: OAuthProvider,
        _access_token: &str,
    ) -> impl Future<Output = Result<OAuthUserInfo>> + Send {
        let configured = self.check(provider);
        let user_info = Arc::clone(&self.user_info);
        let should_succeed = self.should_succeed;

        async move {
            configured?;
            if !should_succeed {
                return Err(AuthError::OAuthFailure("UserInfo fetch failed".into()));
            }
            Ok(lock(&user_info)?.clone())
        }
    }
}
