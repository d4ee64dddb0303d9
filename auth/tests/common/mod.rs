//! Shared fixtures for integration tests.

#![allow(dead_code)]

use sentinel_auth::mocks::InMemoryProviders;
use sentinel_auth::providers::NewAccount;
use sentinel_auth::{
    AuthConfig, AuthEnvironment, LoginOrchestrator, LoginOutcome, RequestContext, TokenPair,
};
use std::net::{IpAddr, Ipv4Addr};
use totp_rs::{Algorithm, Secret, TOTP};

pub const FIREFOX_LINUX: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
pub const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";

pub type Auth = LoginOrchestrator<InMemoryProviders>;

/// Orchestrator plus a handle on the environment it shares state with.
pub fn setup() -> (Auth, AuthEnvironment<InMemoryProviders>) {
    setup_with(config())
}

/// Same as [`setup`] with a custom configuration.
pub fn setup_with(config: AuthConfig) -> (Auth, AuthEnvironment<InMemoryProviders>) {
    init_tracing();
    let env = AuthEnvironment::in_memory();
    let auth = LoginOrchestrator::new(env.clone(), config);
    (auth, env)
}

pub fn config() -> AuthConfig {
    AuthConfig::new("integration-secret", "Sentinel")
}

/// Route core logs to the test harness; `RUST_LOG=sentinel_auth=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ctx(last_octet: u8) -> RequestContext {
    RequestContext::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)), FIREFOX_LINUX)
}

pub fn new_account(email: &str, username: &str) -> NewAccount {
    NewAccount {
        email: email.to_string(),
        username: username.to_string(),
        password: "password123".to_string(),
        full_name: Some("Test User".to_string()),
        phone: None,
    }
}

pub fn expect_session(outcome: LoginOutcome) -> TokenPair {
    match outcome {
        LoginOutcome::Authenticated(tokens) => tokens,
        LoginOutcome::TwoFactorPending(_) => panic!("expected a full session"),
    }
}

pub fn totp_code(secret: &str) -> String {
    let bytes = Secret::Encoded(secret.to_string()).to_bytes().unwrap();
    TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, None, String::new())
        .unwrap()
        .generate_current()
        .unwrap()
}
