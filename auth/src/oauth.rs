//! External identity sign-in.
//!
//! # Flow
//!
//! 1. [`OAuthLinker::authorization_url`] stores a random CSRF state as a
//!    ten-minute one-time token and returns the provider URL.
//! 2. The provider redirects back with `code` and `state`.
//! 3. [`OAuthLinker::handle_callback`] consumes the state, exchanges the code,
//!    fetches the profile and resolves it to an account:
//!    existing link, then account with the same email, then a new account
//!    created together with its link.
//!
//! Provider tokens are sealed with [`SecretCipher`] before they are stored
//! on the link.

use crate::config::OAuthConfig;
use crate::constants::GENERATED_PASSWORD_LEN;
use crate::crypto::{random_urlsafe_token, SecretCipher};
use crate::error::{AuthError, Result};
use crate::providers::{
    Account, AccountRepository, OAuth2Provider, OAuthLink, OAuthTokenResponse, OAuthUserInfo,
    PasswordHasher, TokenData, TokenStore, TokenType,
};
use crate::state::OAuthProvider;
use crate::utils::{truncate_chars, username_seed};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const STATE_PREFIX: &str = "oauth_state";

/// Where to send the user, plus the state they will bring back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRedirect {
    /// Provider authorization URL.
    pub url: String,
    /// CSRF state embedded in the URL.
    pub state: String,
}

/// How a provider identity was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The identity was already linked.
    ExistingLink,
    /// Linked to an account with the same email.
    LinkedByEmail,
    /// A new account was created for it.
    Created,
}

/// Account resolved from a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthResolution {
    /// The signed-in account.
    pub account: Account,
    /// How it was found.
    pub outcome: LinkOutcome,
}

/// Resolves provider identities to accounts.
#[derive(Clone)]
pub struct OAuthLinker<O, A, H, T> {
    oauth: O,
    accounts: A,
    hasher: H,
    tokens: T,
    config: OAuthConfig,
    cipher: SecretCipher,
}

impl<O, A, H, T> OAuthLinker<O, A, H, T>
where
    O: OAuth2Provider,
    A: AccountRepository,
    H: PasswordHasher,
    T: TokenStore,
{
    /// Create a linker.
    #[must_use]
    pub const fn new(
        oauth: O,
        accounts: A,
        hasher: H,
        tokens: T,
        config: OAuthConfig,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            oauth,
            accounts,
            hasher,
            tokens,
            config,
            cipher,
        }
    }

    /// Providers with usable credentials.
    #[must_use]
    pub fn available_providers(&self) -> Vec<OAuthProvider> {
        OAuthProvider::ALL
            .into_iter()
            .filter(|p| self.oauth.is_configured(*p))
            .collect()
    }

    fn ensure_configured(&self, provider: OAuthProvider) -> Result<()> {
        if self.oauth.is_configured(provider) {
            Ok(())
        } else {
            Err(AuthError::OAuthProviderUnknown(provider.to_string()))
        }
    }

    /// Start a sign-in with `provider`.
    ///
    /// # Errors
    ///
    /// - `OAuthProviderUnknown` if the provider is not configured
    /// - Store errors while saving the state
    pub async fn authorization_url(
        &self,
        provider: OAuthProvider,
    ) -> Result<AuthorizationRedirect> {
        self.ensure_configured(provider)?;

        let state = random_urlsafe_token(32);
        let url = self
            .oauth
            .authorization_url(provider, &state, &self.config.redirect_uri(provider))?;

        self.tokens
            .store_token(
                &format!("{STATE_PREFIX}:{state}"),
                TokenData::new(
                    TokenType::OAuthState,
                    state.clone(),
                    serde_json::json!({ "provider": provider.as_str() }),
                    Utc::now() + self.config.state_ttl,
                ),
            )
            .await?;

        Ok(AuthorizationRedirect { url, state })
    }

    /// Complete a sign-in.
    ///
    /// # Errors
    ///
    /// - `OAuthProviderUnknown` if the provider is not configured
    /// - `OAuthFailure` for a bad state, a provider failure or timeout, a
    ///   profile without email, or a deactivated account
    pub async fn handle_callback(
        &self,
        provider: OAuthProvider,
        code: &str,
        state: &str,
    ) -> Result<OAuthResolution> {
        self.ensure_configured(provider)?;
        self.consume_state(provider, state).await?;

        let redirect_uri = self.config.redirect_uri(provider);
        let (tokens, profile) = tokio::time::timeout(self.config.request_timeout, async {
            let tokens = self.oauth.exchange_code(provider, code, &redirect_uri).await?;
            let profile = self.oauth.fetch_user_info(provider, &tokens.access_token).await?;
            Ok::<_, AuthError>((tokens, profile))
        })
        .await
        .map_err(|_| {
            warn!(provider = %provider, "OAuth provider request timed out");
            AuthError::OAuthFailure("Provider request timed out".into())
        })??;

        let resolution = self.resolve(provider, &tokens, &profile).await?;
        if !resolution.account.is_active {
            warn!(
                account_id = %resolution.account.id,
                provider = %provider,
                "OAuth sign-in to deactivated account"
            );
            return Err(AuthError::OAuthFailure("Account is deactivated".into()));
        }

        info!(
            account_id = %resolution.account.id,
            provider = %provider,
            outcome = ?resolution.outcome,
            "OAuth sign-in resolved"
        );
        Ok(resolution)
    }

    async fn consume_state(&self, provider: OAuthProvider, state: &str) -> Result<()> {
        let stored = self
            .tokens
            .consume_token(&format!("{STATE_PREFIX}:{state}"), state)
            .await?
            .filter(|t| t.token_type == TokenType::OAuthState);

        let matches = stored.is_some_and(|t| {
            t.data.get("provider").and_then(serde_json::Value::as_str) == Some(provider.as_str())
        });

        if matches {
            Ok(())
        } else {
            warn!(provider = %provider, "OAuth callback with invalid state");
            Err(AuthError::OAuthFailure("Invalid or expired state".into()))
        }
    }

    async fn resolve(
        &self,
        provider: OAuthProvider,
        tokens: &OAuthTokenResponse,
        profile: &OAuthUserInfo,
    ) -> Result<OAuthResolution> {
        if let Some(resolution) = self.resolve_existing_link(provider, tokens, profile).await? {
            return Ok(resolution);
        }

        let email = profile
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                AuthError::OAuthFailure("Provider did not disclose an email address".into())
            })?;

        if let Some(account) = self.accounts.get_by_email(&email).await? {
            if !profile.email_verified {
                warn!(
                    account_id = %account.id,
                    provider = %provider,
                    "Refusing to link unverified provider email"
                );
                return Err(AuthError::OAuthFailure("Provider email is not verified".into()));
            }

            self.accounts
                .create_link(&self.link_for(&account, provider, tokens, profile)?)
                .await?;
            return Ok(OAuthResolution {
                account,
                outcome: LinkOutcome::LinkedByEmail,
            });
        }

        let account = self.new_account(&email, profile).await?;
        let link = self.link_for(&account, provider, tokens, profile)?;

        match self.accounts.create_with_link(&account, &link).await {
            Ok(account) => Ok(OAuthResolution {
                account,
                outcome: LinkOutcome::Created,
            }),
            // A concurrent callback for the same identity won the race.
            Err(AuthError::DuplicateAccount { .. }) => self
                .resolve_existing_link(provider, tokens, profile)
                .await?
                .ok_or_else(|| AuthError::OAuthFailure("Account creation conflicted".into())),
            Err(e) => Err(e),
        }
    }

    async fn resolve_existing_link(
        &self,
        provider: OAuthProvider,
        tokens: &OAuthTokenResponse,
        profile: &OAuthUserInfo,
    ) -> Result<Option<OAuthResolution>> {
        let Some(mut link) = self
            .accounts
            .find_link(provider, &profile.provider_user_id)
            .await?
        else {
            return Ok(None);
        };

        let account = self
            .accounts
            .get_by_id(link.account_id)
            .await?
            .ok_or_else(|| AuthError::OAuthFailure("Linked account no longer exists".into()))?;

        self.seal_tokens(&mut link, tokens)?;
        self.accounts.update_link_tokens(&link).await?;

        Ok(Some(OAuthResolution {
            account,
            outcome: LinkOutcome::ExistingLink,
        }))
    }

    async fn new_account(&self, email: &str, profile: &OAuthUserInfo) -> Result<Account> {
        let base = username_seed(email);
        let mut username = base.clone();
        let mut counter = 1u32;
        while self.accounts.get_by_username(&username).await?.is_some() {
            username = format!("{base}{counter}");
            counter += 1;
        }

        let password = truncate_chars(
            &random_urlsafe_token(GENERATED_PASSWORD_LEN),
            GENERATED_PASSWORD_LEN,
        );
        let password_hash = self.hasher.hash(&password).await?;

        let mut account = Account::new(email.to_string(), username, password_hash);
        account.full_name.clone_from(&profile.name);
        account.avatar_url.clone_from(&profile.picture);
        account.is_verified = true;
        Ok(account)
    }

    fn link_for(
        &self,
        account: &Account,
        provider: OAuthProvider,
        tokens: &OAuthTokenResponse,
        profile: &OAuthUserInfo,
    ) -> Result<OAuthLink> {
        let now = Utc::now();
        let mut link = OAuthLink {
            id: uuid::Uuid::new_v4(),
            provider,
            provider_user_id: profile.provider_user_id.clone(),
            account_id: account.id,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        self.seal_tokens(&mut link, tokens)?;
        Ok(link)
    }

    fn seal_tokens(&self, link: &mut OAuthLink, tokens: &OAuthTokenResponse) -> Result<()> {
        link.access_token = Some(self.cipher.encrypt(&tokens.access_token)?);
        link.refresh_token = tokens
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.encrypt(t))
            .transpose()?;
        link.expires_at = tokens.expires_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{
        MockAccountRepository, MockOAuth2Provider, MockPasswordHasher, MockTokenStore,
    };
    use std::time::Duration;

    type Linker =
        OAuthLinker<MockOAuth2Provider, MockAccountRepository, MockPasswordHasher, MockTokenStore>;

    fn linker(oauth: MockOAuth2Provider) -> (Linker, MockAccountRepository) {
        let accounts = MockAccountRepository::new();
        let linker = OAuthLinker::new(
            oauth,
            accounts.clone(),
            MockPasswordHasher::new(),
            MockTokenStore::new(),
            OAuthConfig::default(),
            SecretCipher::from_secret("test-secret"),
        );
        (linker, accounts)
    }

    #[test]
    fn test_available_providers() {
        let (linker, _) =
            linker(MockOAuth2Provider::new().with_providers(&[OAuthProvider::GitHub]));
        assert_eq!(linker.available_providers(), vec![OAuthProvider::GitHub]);
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let (linker, _) =
            linker(MockOAuth2Provider::new().with_providers(&[OAuthProvider::GitHub]));
        assert!(matches!(
            linker.authorization_url(OAuthProvider::Google).await,
            Err(AuthError::OAuthProviderUnknown(_))
        ));
    }

    #[tokio::test]
    async fn test_new_account_then_existing_link() {
        let (linker, accounts) = linker(MockOAuth2Provider::new());

        let redirect = linker.authorization_url(OAuthProvider::Google).await.unwrap();
        assert!(redirect.url.contains(&redirect.state));

        let first = linker
            .handle_callback(OAuthProvider::Google, "code", &redirect.state)
            .await
            .unwrap();
        assert_eq!(first.outcome, LinkOutcome::Created);
        assert!(first.account.is_verified);
        assert_eq!(first.account.username, "oauth");

        let links = accounts.list_links(first.account.id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_ne!(links[0].access_token.as_deref(), Some("mock_access_code"));

        let redirect = linker.authorization_url(OAuthProvider::Google).await.unwrap();
        let second = linker
            .handle_callback(OAuthProvider::Google, "code", &redirect.state)
            .await
            .unwrap();
        assert_eq!(second.outcome, LinkOutcome::ExistingLink);
        assert_eq!(second.account.id, first.account.id);
    }

    #[tokio::test]
    async fn test_state_is_single_use_and_provider_bound() {
        let (linker, _) = linker(MockOAuth2Provider::new());
        let redirect = linker.authorization_url(OAuthProvider::Google).await.unwrap();

        assert!(matches!(
            linker.handle_callback(OAuthProvider::GitHub, "code", &redirect.state).await,
            Err(AuthError::OAuthFailure(_))
        ));
        assert!(matches!(
            linker.handle_callback(OAuthProvider::Google, "code", &redirect.state).await,
            Err(AuthError::OAuthFailure(_))
        ));
        assert!(matches!(
            linker.handle_callback(OAuthProvider::Google, "code", "forged").await,
            Err(AuthError::OAuthFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_links_existing_account_by_email_and_avoids_username_clash() {
        let (linker, accounts) = linker(MockOAuth2Provider::new());
        accounts
            .create(&Account::new("someone@example.com".into(), "oauth".into(), "h".into()))
            .await
            .unwrap();

        let redirect = linker.authorization_url(OAuthProvider::GitHub).await.unwrap();
        let created = linker
            .handle_callback(OAuthProvider::GitHub, "code", &redirect.state)
            .await
            .unwrap();
        assert_eq!(created.account.username, "oauth1");

        let existing = accounts
            .create(&Account::new("linked@example.com".into(), "linked".into(), "h".into()))
            .await
            .unwrap();
        let oauth = MockOAuth2Provider::new();
        oauth
            .set_user_info(OAuthUserInfo {
                provider_user_id: "gh-99".into(),
                email: Some("Linked@Example.com".into()),
                email_verified: true,
                name: None,
                picture: None,
            })
            .unwrap();
        let linker = OAuthLinker::new(
            oauth,
            accounts.clone(),
            MockPasswordHasher::new(),
            MockTokenStore::new(),
            OAuthConfig::default(),
            SecretCipher::from_secret("test-secret"),
        );

        let redirect = linker.authorization_url(OAuthProvider::GitHub).await.unwrap();
        let linked = linker
            .handle_callback(OAuthProvider::GitHub, "code", &redirect.state)
            .await
            .unwrap();
        assert_eq!(linked.outcome, LinkOutcome::LinkedByEmail);
        assert_eq!(linked.account.id, existing.id);
    }

    #[tokio::test]
    async fn test_unverified_email_never_links_existing_account() {
        let oauth = MockOAuth2Provider::new();
        oauth
            .set_user_info(OAuthUserInfo {
                provider_user_id: "g-7".into(),
                email: Some("victim@example.com".into()),
                email_verified: false,
                name: None,
                picture: None,
            })
            .unwrap();
        let (linker, accounts) = linker(oauth);
        let victim = accounts
            .create(&Account::new("victim@example.com".into(), "victim".into(), "h".into()))
            .await
            .unwrap();

        let redirect = linker.authorization_url(OAuthProvider::Google).await.unwrap();
        assert!(matches!(
            linker.handle_callback(OAuthProvider::Google, "code", &redirect.state).await,
            Err(AuthError::OAuthFailure(_))
        ));
        assert!(accounts.list_links(victim.id).await.unwrap().is_empty());
        assert_eq!(accounts.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure() {
        let (linker, accounts) = linker(MockOAuth2Provider::failing());
        let redirect = linker.authorization_url(OAuthProvider::Google).await.unwrap();

        assert!(matches!(
            linker.handle_callback(OAuthProvider::Google, "code", &redirect.state).await,
            Err(AuthError::OAuthFailure(_))
        ));
        assert_eq!(accounts.count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let (linker, accounts) =
            linker(MockOAuth2Provider::new().with_latency(Duration::from_secs(30)));
        let redirect = linker.authorization_url(OAuthProvider::Google).await.unwrap();

        let result = linker
            .handle_callback(OAuthProvider::Google, "code", &redirect.state)
            .await;

        assert_eq!(result, Err(AuthError::OAuthFailure("Provider request timed out".into())));
        assert_eq!(accounts.count().unwrap(), 0);
    }
}
