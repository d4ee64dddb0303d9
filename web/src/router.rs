//! Router composition.

use crate::extractors::TrustedProxies;
use crate::handlers::{account, devices, health, oauth, session, two_factor, users};
use crate::middleware::rate_limit;
use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Extension, Router,
};
use http::{header::HeaderName, Method};
use sentinel_auth::{AuthProviders, LoginOrchestrator};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Authentication routes, to be nested under `/auth`.
///
/// # Routes
///
/// ## Account
/// - `POST /register`
/// - `GET /me`, `PATCH /me`
/// - `POST /password/forgot`, `GET|POST /password/reset`, `POST /password/change`
/// - `POST /email/verify`, `POST /email/resend`
///
/// ## Session
/// - `POST /login`, `POST /2fa/verify`
/// - `POST /refresh`, `POST /logout`, `POST /logout-all`
/// - `GET /sessions`
///
/// ## Two-factor
/// - `POST /2fa/setup`, `/2fa/enable`, `/2fa/disable`, `/2fa/backup-codes`, `/2fa/check`
/// - `GET /2fa/status`
///
/// ## Devices
/// - `GET /devices`, `PUT /devices/:id/trust`, `DELETE /devices/:id`
/// - `GET /login-history?limit&offset`
///
/// ## `OAuth`
/// - `GET /oauth/providers`
/// - `GET /oauth/:provider/authorize`
/// - `POST /oauth/:provider/callback`
pub fn auth_router<P: AuthProviders>(auth: LoginOrchestrator<P>) -> Router {
    Router::new()
        .route("/register", post(account::register::<P>))
        .route("/me", get(account::me).patch(account::update_profile::<P>))
        .route("/password/forgot", post(account::forgot_password::<P>))
        .route(
            "/password/reset",
            get(account::validate_reset_token::<P>).post(account::reset_password::<P>),
        )
        .route("/password/change", post(account::change_password::<P>))
        .route("/email/verify", post(account::verify_email::<P>))
        .route("/email/resend", post(account::resend_verification::<P>))
        .route("/login", post(session::login::<P>))
        .route("/2fa/verify", post(session::verify_two_factor::<P>))
        .route("/refresh", post(session::refresh::<P>))
        .route("/logout", post(session::logout::<P>))
        .route("/logout-all", post(session::logout_all::<P>))
        .route("/sessions", get(session::list_sessions::<P>))
        .route("/2fa/setup", post(two_factor::setup::<P>))
        .route("/2fa/enable", post(two_factor::enable::<P>))
        .route("/2fa/disable", post(two_factor::disable::<P>))
        .route("/2fa/backup-codes", post(two_factor::regenerate_backup_codes::<P>))
        .route("/2fa/check", post(two_factor::check::<P>))
        .route("/2fa/status", get(two_factor::status::<P>))
        .route("/devices", get(devices::list::<P>))
        .route("/devices/:id/trust", put(devices::trust::<P>))
        .route("/devices/:id", delete(devices::remove::<P>))
        .route("/login-history", get(devices::login_history::<P>))
        .route("/oauth/providers", get(oauth::providers::<P>))
        .route("/oauth/:provider/authorize", get(oauth::authorize::<P>))
        .route("/oauth/:provider/callback", post(oauth::callback::<P>))
        .with_state(auth)
}

/// Superuser account reads, merged at the root.
///
/// # Routes
///
/// - `GET /users/?skip&limit` (also `/users`)
/// - `GET /users/:id`
pub fn users_router<P: AuthProviders>(auth: LoginOrchestrator<P>) -> Router {
    Router::new()
        .route("/users", get(users::list::<P>))
        .route("/users/", get(users::list::<P>))
        .route("/users/:id", get(users::get::<P>))
        .with_state(auth)
}

/// Full application: `/health`, `/auth/*`, `/users/*`, the API-wide rate
/// limit, tracing, request ids and CORS.
///
/// Forwarding headers are honoured only from the configured trusted proxies.
///
/// # Example
///
/// ```rust,ignore
/// let auth = LoginOrchestrator::new(env, config);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
/// axum::serve(listener, app(auth).into_make_service_with_connect_info::<SocketAddr>()).await?;
/// ```
pub fn app<P: AuthProviders>(auth: LoginOrchestrator<P>) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    let trusted = TrustedProxies::new(&auth.rate_limits().trusted_proxies);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/auth", auth_router(auth.clone()))
        .merge(users_router(auth.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(cors)
                .layer(Extension(trusted))
                .layer(from_fn_with_state(auth, rate_limit::<P>)),
        )
}
