//! End-to-end tests of the HTTP surface over in-memory providers.

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use sentinel_auth::config::RateLimitRule;
use sentinel_auth::mocks::MockAccountRepository;
use sentinel_auth::providers::AccountRepository;
use sentinel_auth::{AuthConfig, AuthEnvironment, LoginOrchestrator};
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};
use totp_rs::{Algorithm, Secret, TOTP};
use tower::ServiceExt;

const FIREFOX_LINUX: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

/// Socket every test request arrives from.
const PEER: [u8; 4] = [203, 0, 113, 7];

fn config() -> AuthConfig {
    AuthConfig::new("http-test-secret", "Sentinel")
}

fn app() -> Router {
    app_with(config()).0
}

fn app_with(config: AuthConfig) -> (Router, MockAccountRepository) {
    let env = AuthEnvironment::in_memory();
    let accounts = env.accounts.clone();
    let auth = LoginOrchestrator::new(env, config);
    (sentinel_web::app(auth), accounts)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    call_with(app, method, uri, bearer, body, &[]).await
}

async fn call_with(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::USER_AGENT, FIREFOX_LINUX);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder = builder.extension(ConnectInfo(SocketAddr::from((PEER, 50_000))));
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, value)
}

async fn post(app: &Router, uri: &str, bearer: Option<&str>, body: Value) -> (StatusCode, Value) {
    let (status, _, value) = call(app, Method::POST, uri, bearer, Some(body)).await;
    (status, value)
}

async fn get(app: &Router, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
    let (status, _, value) = call(app, Method::GET, uri, bearer, None).await;
    (status, value)
}

async fn register(app: &Router, email: &str, username: &str) -> (StatusCode, Value) {
    post(
        app,
        "/auth/register",
        None,
        json!({ "email": email, "username": username, "password": "password123" }),
    )
    .await
}

async fn login(app: &Router, email: &str) -> Value {
    let (status, body) = post(
        app,
        "/auth/login",
        None,
        json!({ "email": email, "password": "password123" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body
}

fn totp_code(secret: &str) -> String {
    let bytes = Secret::Encoded(secret.to_string()).to_bytes().unwrap();
    TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, None, String::new())
        .unwrap()
        .generate_current()
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(sentinel_web::REQUEST_ID_HEADER));
}

#[tokio::test]
async fn test_register_returns_account_without_password_hash() {
    let app = app();
    let (status, body) = register(&app, "ada@example.com", "ada").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["username"], "ada");
    assert_eq!(body["is_verified"], false);
    assert!(body.get("password_hash").is_none());
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn test_duplicate_email_is_rejected() {
    let app = app();
    register(&app, "ada@example.com", "ada").await;
    let (status, body) = register(&app, "ADA@example.com", "ada2").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DUPLICATE_ACCOUNT");
    assert!(body["message"].as_str().unwrap().contains("email"));
}

#[tokio::test]
async fn test_login_me_refresh_logout() {
    let app = app();
    register(&app, "ada@example.com", "ada").await;

    let session = login(&app, "ada@example.com").await;
    assert_eq!(session["token_type"], "bearer");
    let access = session["access_token"].as_str().unwrap();
    let refresh = session["refresh_token"].as_str().unwrap();

    let (status, me) = get(&app, "/auth/me", Some(access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "ada");

    let (status, rotated) =
        post(&app, "/auth/refresh", None, json!({ "refresh_token": refresh })).await;
    assert_eq!(status, StatusCode::OK);
    let new_refresh = rotated["refresh_token"].as_str().unwrap();
    assert_ne!(new_refresh, refresh);

    // The rotated-away token is dead.
    let (status, body) =
        post(&app, "/auth/refresh", None, json!({ "refresh_token": refresh })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_REVOKED");

    let (status, _) =
        post(&app, "/auth/logout", None, json!({ "refresh_token": new_refresh })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        post(&app, "/auth/refresh", None, json!({ "refresh_token": new_refresh })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_password_and_missing_token() {
    let app = app();
    register(&app, "ada@example.com", "ada").await;

    let (status, body) = post(
        &app,
        "/auth/login",
        None,
        json!({ "email": "ada@example.com", "password": "nope-nope" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");

    let (status, _) = get(&app, "/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = get(&app, "/auth/me", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_two_factor_login_requires_code() {
    let app = app();
    register(&app, "ada@example.com", "ada").await;
    let session = login(&app, "ada@example.com").await;
    let access = session["access_token"].as_str().unwrap().to_string();

    let (status, setup) = post(&app, "/auth/2fa/setup", Some(&access), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let secret = setup["secret"].as_str().unwrap().to_string();
    assert!(setup["provisioning_uri"].as_str().unwrap().starts_with("otpauth://totp/"));
    assert_eq!(setup["backup_codes"].as_array().unwrap().len(), 8);

    let (status, _) = post(
        &app,
        "/auth/2fa/enable",
        Some(&access),
        json!({ "code": totp_code(&secret) }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, status_body) = get(&app, "/auth/2fa/status", Some(&access)).await;
    assert_eq!(status_body["state"], "enabled");

    let pending = login(&app, "ada@example.com").await;
    assert_eq!(pending["requires_2fa"], true);
    assert!(pending.get("refresh_token").is_none());
    let partial = pending["access_token"].as_str().unwrap();

    let (status, body) = get(&app, "/auth/me", Some(partial)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "INSUFFICIENT_SCOPE");

    let (status, body) =
        post(&app, "/auth/2fa/verify", Some(partial), json!({ "code": "not-a-code" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_2FA_CODE");

    let (status, tokens) = post(
        &app,
        "/auth/2fa/verify",
        Some(partial),
        json!({ "code": totp_code(&secret) }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let full = tokens["access_token"].as_str().unwrap();
    assert!(tokens["refresh_token"].is_string());

    let (status, _) = get(&app, "/auth/me", Some(full)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_sixth_login_is_rate_limited_with_headers() {
    let app = app();
    register(&app, "ada@example.com", "ada").await;

    for _ in 0..5 {
        let (status, _) = post(
            &app,
            "/auth/login",
            None,
            json!({ "email": "ada@example.com", "password": "wrong-password" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, headers, body) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "password123" })),
    )
    .await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
    let retry_after: u64 = headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(headers["x-ratelimit-limit"], "5");
    assert_eq!(headers["x-ratelimit-window"], "60");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
}

#[tokio::test]
async fn test_devices_and_history() {
    let app = app();
    register(&app, "ada@example.com", "ada").await;
    let session = login(&app, "ada@example.com").await;
    let access = session["access_token"].as_str().unwrap();

    let (status, devices) = get(&app, "/auth/devices", Some(access)).await;
    assert_eq!(status, StatusCode::OK);
    let devices = devices.as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["browser"], "Firefox");
    let device_id = devices[0]["id"].as_str().unwrap().to_string();

    let (status, _, trusted) = call(
        &app,
        Method::PUT,
        &format!("/auth/devices/{device_id}/trust"),
        Some(access),
        Some(json!({ "trusted": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trusted["is_trusted"], true);

    let (status, _, body) =
        call(&app, Method::DELETE, "/auth/devices/unknown", Some(access), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "DEVICE_NOT_FOUND");

    let (status, history) = get(&app, "/auth/login-history?limit=10", Some(access)).await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["status"], "success");
    assert_eq!(history[0]["ip_address"], "203.0.113.7");
}

#[tokio::test]
async fn test_forgot_password_does_not_reveal_accounts() {
    let app = app();
    register(&app, "ada@example.com", "ada").await;

    let (known_status, known) =
        post(&app, "/auth/password/forgot", None, json!({ "email": "ada@example.com" })).await;
    let (unknown_status, unknown) =
        post(&app, "/auth/password/forgot", None, json!({ "email": "ghost@example.com" })).await;

    assert_eq!(known_status, StatusCode::OK);
    assert_eq!(unknown_status, StatusCode::OK);
    assert_eq!(known, unknown);

    let (status, body) = get(&app, "/auth/password/reset?token=bogus", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn test_unknown_oauth_provider() {
    let app = app();
    let (status, body) = get(&app, "/auth/oauth/myspace/authorize", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "OAUTH_PROVIDER_UNKNOWN");

    let (status, body) = get(&app, "/auth/oauth/providers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["providers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_forwarded_headers_do_not_reset_login_limit() {
    let app = app();
    register(&app, "ada@example.com", "ada").await;

    for i in 1..=5 {
        let forwarded = format!("198.51.100.{i}");
        let (status, _, _) = call_with(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "wrong-password" })),
            &[("X-Forwarded-For", forwarded.as_str()), ("X-Real-IP", forwarded.as_str())],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _, body) = call_with(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "password123" })),
        &[("X-Forwarded-For", "198.51.100.6")],
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_trusted_proxy_reports_client_address() {
    let mut config = config();
    config.rate_limits = config
        .rate_limits
        .with_trusted_proxies(vec![IpAddr::from(PEER)]);
    let (app, _accounts) = app_with(config);
    register(&app, "ada@example.com", "ada").await;

    let (status, _, session) = call_with(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "password123" })),
        &[("X-Forwarded-For", "198.51.100.20, 203.0.113.7")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let access = session["access_token"].as_str().unwrap();

    let (_, history) = get(&app, "/auth/login-history", Some(access)).await;
    assert_eq!(history[0]["ip_address"], "198.51.100.20");
}

#[tokio::test]
async fn test_api_wide_limit_rejects_with_retry_after() {
    let mut config = config();
    config.rate_limits = config
        .rate_limits
        .with_global(RateLimitRule::new("*", 2, 60));
    let (app, _accounts) = app_with(config);
    register(&app, "ada@example.com", "ada").await;
    let session = login(&app, "ada@example.com").await;
    let access = session["access_token"].as_str().unwrap();

    for _ in 0..2 {
        let (status, _) = get(&app, "/auth/me", Some(access)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, headers, body) = call(&app, Method::GET, "/auth/me", Some(access), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
    assert!(headers.contains_key("retry-after"));
    assert_eq!(headers["x-ratelimit-limit"], "2");

    // Counted per path.
    let (status, _) = get(&app, "/auth/2fa/status", Some(access)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_two_factor_management_without_code() {
    let app = app();
    register(&app, "ada@example.com", "ada").await;
    let session = login(&app, "ada@example.com").await;
    let access = session["access_token"].as_str().unwrap().to_string();

    let (_, setup) = post(&app, "/auth/2fa/setup", Some(&access), json!({})).await;
    let secret = setup["secret"].as_str().unwrap().to_string();
    let (status, _) = post(
        &app,
        "/auth/2fa/enable",
        Some(&access),
        json!({ "code": totp_code(&secret) }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, checked) = call(
        &app,
        Method::POST,
        "/auth/2fa/check",
        Some(&access),
        Some(json!({ "code": totp_code(&secret) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(checked["method"], "totp");
    let (status, body) =
        post(&app, "/auth/2fa/check", Some(&access), json!({ "code": "not-a-code" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_2FA_CODE");

    let (status, _, codes) =
        call(&app, Method::POST, "/auth/2fa/backup-codes", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(codes["backup_codes"].as_array().unwrap().len(), 8);

    let (status, _, _) = call(&app, Method::POST, "/auth/2fa/disable", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, status_body) = get(&app, "/auth/2fa/status", Some(&access)).await;
    assert_eq!(status_body["state"], "not_set_up");

    let (status, _, body) =
        call(&app, Method::POST, "/auth/2fa/disable", Some(&access), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "2FA_NOT_ENABLED");
}

#[tokio::test]
async fn test_account_admin_requires_superuser() {
    let (app, accounts) = app_with(config());
    register(&app, "ada@example.com", "ada").await;
    let (_, bob) = register(&app, "bob@example.com", "bob").await;

    let mut ada = accounts.get_by_email("ada@example.com").await.unwrap().unwrap();
    ada.is_superuser = true;
    accounts.update(&ada).await.unwrap();

    let bob_session = login(&app, "bob@example.com").await;
    let (status, body) = get(&app, "/users/", bob_session["access_token"].as_str()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
    let (status, _) = get(&app, "/users/", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let ada_session = login(&app, "ada@example.com").await;
    let admin = ada_session["access_token"].as_str();

    let (status, all) = get(&app, "/users/", admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);
    assert!(all[0].get("password_hash").is_none());

    let (_, page) = get(&app, "/users/?skip=1&limit=1", admin).await;
    assert_eq!(page.as_array().unwrap().len(), 1);

    let bob_id = bob["id"].as_str().unwrap();
    let (status, found) = get(&app, &format!("/users/{bob_id}"), admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["email"], "bob@example.com");

    let missing = uuid::Uuid::new_v4();
    let (status, body) = get(&app, &format!("/users/{missing}"), admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ACCOUNT_NOT_FOUND");
}
