//! Authentication configuration.
//!
//! Configuration values are provided by the application. Every struct offers
//! `Default` values matching a typical deployment plus `with_*` builders.
//! [`AuthConfig::from_env`] is a convenience for binaries; the library never
//! reads the environment on its own.

use chrono::Duration;
use std::net::IpAddr;
use std::time::Duration as StdDuration;

/// Token issuance configuration.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Secret used to sign tokens.
    pub secret_key: String,

    /// Full-session access token lifetime.
    ///
    /// Default: 30 minutes
    pub access_token_ttl: Duration,

    /// Partial (pending 2FA) token lifetime.
    ///
    /// Default: 5 minutes
    pub partial_token_ttl: Duration,

    /// Refresh token lifetime.
    ///
    /// Default: 7 days
    pub refresh_token_ttl: Duration,
}

impl TokenConfig {
    /// Create token configuration with default lifetimes.
    #[must_use]
    pub const fn new(secret_key: String) -> Self {
        Self {
            secret_key,
            access_token_ttl: Duration::minutes(30),
            partial_token_ttl: Duration::minutes(5),
            refresh_token_ttl: Duration::days(7),
        }
    }

    /// Set access token lifetime.
    #[must_use]
    pub const fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    /// Set refresh token lifetime.
    #[must_use]
    pub const fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    /// Set partial token lifetime.
    #[must_use]
    pub const fn with_partial_ttl(mut self, ttl: Duration) -> Self {
        self.partial_token_ttl = ttl;
        self
    }
}

/// One rate-limit rule: at most `max_requests` per `window` per client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Route name used in the limiter key.
    pub route: String,

    /// Maximum admitted requests per window.
    pub max_requests: u32,

    /// Sliding window length.
    pub window: StdDuration,
}

impl RateLimitRule {
    /// Create a rule.
    #[must_use]
    pub fn new(route: impl Into<String>, max_requests: u32, window_secs: u64) -> Self {
        Self {
            route: route.into(),
            max_requests,
            window: StdDuration::from_secs(window_secs),
        }
    }

    /// Limiter key for a client, `route_limit:{client}:{route}`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sentinel_auth::config::RateLimitRule;
    ///
    /// let rule = RateLimitRule::new("/auth/login", 5, 60);
    /// assert_eq!(rule.key_for("10.0.0.1"), "route_limit:10.0.0.1:/auth/login");
    /// ```
    #[must_use]
    pub fn key_for(&self, client: &str) -> String {
        format!("route_limit:{client}:{}", self.route)
    }

    /// Limiter key of the API-wide rule for one path, `rate_limit:{client}:{path}`.
    ///
    /// Distinct from [`RateLimitRule::key_for`], so a path with its own rule is
    /// counted in both buckets independently.
    #[must_use]
    pub fn path_key(client: &str, path: &str) -> String {
        format!("rate_limit:{client}:{path}")
    }
}

/// Rate limits for the guarded flows.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Master switch. When off, no request is ever limited.
    ///
    /// Default: on
    pub enabled: bool,

    /// API-wide limit applied per client and path. `route` is unused.
    ///
    /// Default: 100 per 60 seconds
    pub global: RateLimitRule,

    /// Path prefixes the API-wide limit skips.
    ///
    /// Default: login, registration and the health check, which have their
    /// own rules or none.
    pub global_exempt: Vec<String>,

    /// Peers whose `X-Forwarded-For`/`X-Real-IP` headers name the client.
    /// Requests from any other peer are keyed on the socket address.
    ///
    /// Default: empty
    pub trusted_proxies: Vec<IpAddr>,

    /// Password login.
    pub login: RateLimitRule,

    /// Account registration.
    pub register: RateLimitRule,

    /// Second-factor verification.
    pub two_factor: RateLimitRule,

    /// Password reset requests.
    pub password_reset: RateLimitRule,

    /// Refresh token rotation.
    pub refresh: RateLimitRule,

    /// Idle age after which a limiter key is purged by the sweep.
    ///
    /// Default: 1 hour
    pub idle_key_ttl: StdDuration,
}

impl RateLimitConfig {
    /// Replace the login rule.
    #[must_use]
    pub fn with_login(mut self, rule: RateLimitRule) -> Self {
        self.login = rule;
        self
    }

    /// Replace the registration rule.
    #[must_use]
    pub fn with_register(mut self, rule: RateLimitRule) -> Self {
        self.register = rule;
        self
    }

    /// Turn all limiting on or off.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replace the API-wide rule.
    #[must_use]
    pub fn with_global(mut self, rule: RateLimitRule) -> Self {
        self.global = rule;
        self
    }

    /// Set the reverse proxies allowed to report the client address.
    #[must_use]
    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    /// Whether the API-wide rule applies to `path`.
    ///
    /// An exempt prefix covers itself and its sub-paths, so `/auth/login`
    /// does not exempt `/auth/login-history`.
    #[must_use]
    pub fn global_applies_to(&self, path: &str) -> bool {
        !self.global_exempt.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global: RateLimitRule::new("*", 100, 60),
            global_exempt: vec![
                "/auth/login".to_string(),
                "/auth/register".to_string(),
                "/health".to_string(),
            ],
            trusted_proxies: Vec::new(),
            login: RateLimitRule::new("/auth/login", 5, 60),
            register: RateLimitRule::new("/auth/register", 3, 300),
            two_factor: RateLimitRule::new("/auth/2fa/verify", 5, 60),
            password_reset: RateLimitRule::new("/auth/password/forgot", 3, 300),
            refresh: RateLimitRule::new("/auth/refresh", 30, 60),
            idle_key_ttl: StdDuration::from_secs(3600),
        }
    }
}

/// Two-factor configuration.
#[derive(Debug, Clone)]
pub struct TwoFactorConfig {
    /// Issuer shown in authenticator apps.
    pub issuer: String,

    /// Process secret from which the at-rest encryption key is derived.
    pub encryption_secret: String,
}

impl TwoFactorConfig {
    /// Create two-factor configuration.
    #[must_use]
    pub const fn new(issuer: String, encryption_secret: String) -> Self {
        Self {
            issuer,
            encryption_secret,
        }
    }
}

/// Client credentials for one `OAuth` provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClientCredentials {
    /// `OAuth` client ID.
    pub client_id: String,

    /// `OAuth` client secret.
    pub client_secret: String,
}

impl OAuthClientCredentials {
    /// Create credentials.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

/// Typed `OAuth` configuration: a provider is available only when its
/// credentials are present with a non-empty client id.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Frontend base URL; redirect URIs are `{frontend_url}/auth/callback/{provider}`.
    pub frontend_url: String,

    /// Google credentials.
    pub google: Option<OAuthClientCredentials>,

    /// GitHub credentials.
    pub github: Option<OAuthClientCredentials>,

    /// CSRF state lifetime.
    ///
    /// Default: 10 minutes
    pub state_ttl: Duration,

    /// Upper bound for all provider calls made during one callback.
    ///
    /// Default: 10 seconds
    pub request_timeout: StdDuration,
}

impl OAuthConfig {
    /// Create `OAuth` configuration with no providers.
    #[must_use]
    pub const fn new(frontend_url: String) -> Self {
        Self {
            frontend_url,
            google: None,
            github: None,
            state_ttl: Duration::minutes(10),
            request_timeout: StdDuration::from_secs(10),
        }
    }

    /// Configure Google.
    #[must_use]
    pub fn with_google(mut self, credentials: OAuthClientCredentials) -> Self {
        self.google = Some(credentials);
        self
    }

    /// Configure GitHub.
    #[must_use]
    pub fn with_github(mut self, credentials: OAuthClientCredentials) -> Self {
        self.github = Some(credentials);
        self
    }

    /// Set the provider call timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: StdDuration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Credentials for a provider, if configured.
    #[must_use]
    pub const fn credentials(
        &self,
        provider: crate::state::OAuthProvider,
    ) -> Option<&OAuthClientCredentials> {
        match provider {
            crate::state::OAuthProvider::Google => self.google.as_ref(),
            crate::state::OAuthProvider::GitHub => self.github.as_ref(),
        }
    }

    /// Whether a provider may be offered to users.
    #[must_use]
    pub fn is_configured(&self, provider: crate::state::OAuthProvider) -> bool {
        self.credentials(provider)
            .is_some_and(|c| !c.client_id.trim().is_empty())
    }

    /// Redirect URI registered with the provider.
    #[must_use]
    pub fn redirect_uri(&self, provider: crate::state::OAuthProvider) -> String {
        format!(
            "{}/auth/callback/{}",
            self.frontend_url.trim_end_matches('/'),
            provider.as_str()
        )
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000".to_string())
    }
}

/// Device registry and audit log configuration.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Devices idle for longer than this are swept.
    ///
    /// Default: 90 days
    pub inactive_retention: Duration,

    /// Login attempts older than this are swept.
    ///
    /// Default: 180 days
    pub attempt_retention: Duration,

    /// Window for "recent failed attempts".
    ///
    /// Default: 30 minutes
    pub recent_failure_window: Duration,
}

impl DeviceConfig {
    /// Set device retention.
    #[must_use]
    pub const fn with_inactive_retention(mut self, retention: Duration) -> Self {
        self.inactive_retention = retention;
        self
    }

    /// Set login attempt retention.
    #[must_use]
    pub const fn with_attempt_retention(mut self, retention: Duration) -> Self {
        self.attempt_retention = retention;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            inactive_retention: Duration::days(90),
            attempt_retention: Duration::days(180),
            recent_failure_window: Duration::minutes(30),
        }
    }
}

/// Password reset and email verification configuration.
#[derive(Debug, Clone)]
pub struct AccountRecoveryConfig {
    /// Base URL used in emailed links.
    pub frontend_url: String,

    /// Password reset token lifetime.
    ///
    /// Default: 1 hour
    pub reset_token_ttl: Duration,

    /// Email verification token lifetime.
    ///
    /// Default: 24 hours
    pub verification_token_ttl: Duration,

    /// Minimum password length.
    ///
    /// Default: 8
    pub min_password_length: usize,
}

impl AccountRecoveryConfig {
    /// Create recovery configuration.
    #[must_use]
    pub const fn new(frontend_url: String) -> Self {
        Self {
            frontend_url,
            reset_token_ttl: Duration::hours(1),
            verification_token_ttl: Duration::hours(24),
            min_password_length: 8,
        }
    }
}

impl Default for AccountRecoveryConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000".to_string())
    }
}

/// Background housekeeping intervals.
#[derive(Debug, Clone)]
pub struct HousekeepingConfig {
    /// Rate-limiter sweep interval.
    ///
    /// Default: 5 minutes
    pub rate_limit_interval: StdDuration,

    /// Token, device and audit sweep interval.
    ///
    /// Default: 1 hour
    pub storage_interval: StdDuration,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            rate_limit_interval: StdDuration::from_secs(300),
            storage_interval: StdDuration::from_secs(3600),
        }
    }
}

/// Aggregate configuration handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Token issuance.
    pub tokens: TokenConfig,
    /// Rate limits.
    pub rate_limits: RateLimitConfig,
    /// Two-factor.
    pub two_factor: TwoFactorConfig,
    /// `OAuth` providers.
    pub oauth: OAuthConfig,
    /// Devices and audit log.
    pub devices: DeviceConfig,
    /// Password reset and verification.
    pub recovery: AccountRecoveryConfig,
    /// Housekeeping.
    pub housekeeping: HousekeepingConfig,
}

impl AuthConfig {
    /// Build a configuration from a single process secret with defaults elsewhere.
    #[must_use]
    pub fn new(secret_key: impl Into<String>, app_name: impl Into<String>) -> Self {
        let secret_key = secret_key.into();
        Self {
            tokens: TokenConfig::new(secret_key.clone()),
            rate_limits: RateLimitConfig::default(),
            two_factor: TwoFactorConfig::new(app_name.into(), secret_key),
            oauth: OAuthConfig::default(),
            devices: DeviceConfig::default(),
            recovery: AccountRecoveryConfig::default(),
            housekeeping: HousekeepingConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `SECRET_KEY` (required), `APP_NAME`, `FRONTEND_URL`,
    /// `ACCESS_TOKEN_EXPIRE_MINUTES`, `REFRESH_TOKEN_EXPIRE_DAYS`,
    /// `GOOGLE_CLIENT_ID`/`GOOGLE_CLIENT_SECRET`,
    /// `GITHUB_CLIENT_ID`/`GITHUB_CLIENT_SECRET`, `RATE_LIMIT_ENABLED`,
    /// `RATE_LIMIT_REQUESTS`, `RATE_LIMIT_WINDOW` (seconds) and
    /// `TRUSTED_PROXIES` (comma-separated addresses).
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthError::Validation`] if `SECRET_KEY` is missing or a
    /// numeric, boolean or address variable does not parse.
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`AuthConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        let secret_key = lookup("SECRET_KEY")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| crate::AuthError::Validation("SECRET_KEY must be set".into()))?;
        let app_name = lookup("APP_NAME").unwrap_or_else(|| "Sentinel".to_string());

        let mut config = Self::new(secret_key, app_name);

        if let Some(minutes) = parse_number(&lookup, "ACCESS_TOKEN_EXPIRE_MINUTES")? {
            config.tokens = config.tokens.with_access_ttl(Duration::minutes(minutes));
        }
        if let Some(days) = parse_number(&lookup, "REFRESH_TOKEN_EXPIRE_DAYS")? {
            config.tokens = config.tokens.with_refresh_ttl(Duration::days(days));
        }

        if let Some(frontend_url) = lookup("FRONTEND_URL") {
            config.oauth.frontend_url.clone_from(&frontend_url);
            config.recovery.frontend_url = frontend_url;
        }

        config.oauth.google = credentials_from(&lookup, "GOOGLE");
        config.oauth.github = credentials_from(&lookup, "GITHUB");

        if let Some(raw) = lookup("RATE_LIMIT_ENABLED") {
            config.rate_limits.enabled = parse_flag(&raw).ok_or_else(|| {
                crate::AuthError::Validation("RATE_LIMIT_ENABLED must be a boolean".into())
            })?;
        }
        if let Some(requests) = parse_number(&lookup, "RATE_LIMIT_REQUESTS")? {
            config.rate_limits.global.max_requests = u32::try_from(requests).map_err(|_| {
                crate::AuthError::Validation("RATE_LIMIT_REQUESTS is out of range".into())
            })?;
        }
        if let Some(window) = parse_number(&lookup, "RATE_LIMIT_WINDOW")? {
            let secs = u64::try_from(window).map_err(|_| {
                crate::AuthError::Validation("RATE_LIMIT_WINDOW is out of range".into())
            })?;
            config.rate_limits.global.window = StdDuration::from_secs(secs);
        }
        if let Some(raw) = lookup("TRUSTED_PROXIES") {
            config.rate_limits.trusted_proxies = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<IpAddr>().map_err(|_| {
                        crate::AuthError::Validation(format!("Invalid TRUSTED_PROXIES entry: {s}"))
                    })
                })
                .collect::<crate::Result<_>>()?;
        }

        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> crate::Result<Option<i64>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| crate::AuthError::Validation(format!("{key} must be an integer")))
        })
        .transpose()
}

fn credentials_from(
    lookup: &impl Fn(&str) -> Option<String>,
    prefix: &str,
) -> Option<OAuthClientCredentials> {
    let client_id = lookup(&format!("{prefix}_CLIENT_ID"))?;
    let client_secret = lookup(&format!("{prefix}_CLIENT_SECRET")).unwrap_or_default();
    Some(OAuthClientCredentials::new(client_id, client_secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OAuthProvider;
    use std::collections::HashMap;

    #[test]
    fn test_token_config_defaults() {
        let config = TokenConfig::new("secret".to_string());
        assert_eq!(config.access_token_ttl, Duration::minutes(30));
        assert_eq!(config.partial_token_ttl, Duration::minutes(5));
        assert_eq!(config.refresh_token_ttl, Duration::days(7));
    }

    #[test]
    fn test_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert_eq!(config.login.max_requests, 5);
        assert_eq!(config.login.window, StdDuration::from_secs(60));
        assert_eq!(config.register.max_requests, 3);
        assert_eq!(config.register.window, StdDuration::from_secs(300));
    }

    #[test]
    fn test_provider_requires_non_empty_client_id() {
        let config = OAuthConfig::default()
            .with_google(OAuthClientCredentials::new("google-id", "google-secret"))
            .with_github(OAuthClientCredentials::new("  ", "github-secret"));

        assert!(config.is_configured(OAuthProvider::Google));
        assert!(!config.is_configured(OAuthProvider::GitHub));
    }

    #[test]
    fn test_redirect_uri() {
        let config = OAuthConfig::new("https://app.example.com/".to_string());
        assert_eq!(
            config.redirect_uri(OAuthProvider::GitHub),
            "https://app.example.com/auth/callback/github"
        );
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SECRET_KEY", "s3cret"),
            ("ACCESS_TOKEN_EXPIRE_MINUTES", "15"),
            ("FRONTEND_URL", "https://front.example.com"),
            ("GITHUB_CLIENT_ID", "gh-id"),
        ]);

        let config = AuthConfig::from_lookup(|k| env.get(k).map(ToString::to_string)).unwrap();

        assert_eq!(config.tokens.access_token_ttl, Duration::minutes(15));
        assert_eq!(config.tokens.refresh_token_ttl, Duration::days(7));
        assert_eq!(config.oauth.frontend_url, "https://front.example.com");
        assert!(config.oauth.is_configured(OAuthProvider::GitHub));
        assert!(!config.oauth.is_configured(OAuthProvider::Google));
    }

    #[test]
    fn test_from_lookup_rate_limit_switches() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SECRET_KEY", "s3cret"),
            ("RATE_LIMIT_ENABLED", "False"),
            ("RATE_LIMIT_REQUESTS", "250"),
            ("RATE_LIMIT_WINDOW", "30"),
            ("TRUSTED_PROXIES", "10.0.0.1, ::1"),
        ]);

        let config = AuthConfig::from_lookup(|k| env.get(k).map(ToString::to_string)).unwrap();

        assert!(!config.rate_limits.enabled);
        assert_eq!(config.rate_limits.global.max_requests, 250);
        assert_eq!(config.rate_limits.global.window, StdDuration::from_secs(30));
        assert_eq!(
            config.rate_limits.trusted_proxies,
            vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]
        );
    }

    #[test]
    fn test_from_lookup_rejects_bad_proxy() {
        let env: HashMap<&str, &str> =
            HashMap::from([("SECRET_KEY", "s3cret"), ("TRUSTED_PROXIES", "proxy.internal")]);

        let result = AuthConfig::from_lookup(|k| env.get(k).map(ToString::to_string));
        assert!(matches!(result, Err(crate::AuthError::Validation(_))));
    }

    #[test]
    fn test_global_rule_exemptions() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.global.max_requests, 100);
        assert!(!config.global_applies_to("/auth/login"));
        assert!(!config.global_applies_to("/health"));
        assert!(config.global_applies_to("/auth/me"));
        assert!(config.global_applies_to("/auth/login-history"));
    }

    #[test]
    fn test_from_lookup_requires_secret() {
        let result = AuthConfig::from_lookup(|_| None);
        assert!(matches!(result, Err(crate::AuthError::Validation(_))));
    }
}
