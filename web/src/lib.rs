//! HTTP surface for the Sentinel authentication core.
//!
//! Thin axum handlers over [`sentinel_auth::LoginOrchestrator`]: each one
//! extracts caller facts and JSON, calls one orchestrator operation and maps
//! the result. Errors convert through [`AppError`].
//!
//! # Example
//!
//! ```rust
//! use sentinel_auth::{AuthConfig, AuthEnvironment, LoginOrchestrator};
//!
//! let config = AuthConfig::new("secret", "Sentinel");
//! let auth = LoginOrchestrator::new(AuthEnvironment::in_memory(), config);
//! let app: axum::Router = sentinel_web::app(auth);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use error::{AppError, ErrorBody};
pub use extractors::{
    BearerToken, ClientIp, CurrentAccount, CurrentSuperuser, RequestMeta, TrustedProxies,
    UserAgent,
};
pub use router::{app, auth_router, users_router, REQUEST_ID_HEADER};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
