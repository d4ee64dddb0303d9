//! Request middleware.
//!
//! [`rate_limit`] counts every request against the API-wide rule before it
//! reaches a handler. Login and registration carry their own stricter rules
//! and are exempt, as is `/health`.

use crate::error::AppError;
use crate::extractors::ClientIp;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sentinel_auth::{AuthProviders, LoginOrchestrator};

/// Reject callers over the API-wide limit with `429`.
///
/// # Example
///
/// ```rust,ignore
/// let router = router.layer(axum::middleware::from_fn_with_state(
///     auth.clone(),
///     sentinel_web::middleware::rate_limit::<P>,
/// ));
/// ```
///
/// # Errors
///
/// `RATE_LIMITED` with `Retry-After`, or `500` when the limiter fails.
pub async fn rate_limit<P: AuthProviders>(
    State(auth): State<LoginOrchestrator<P>>,
    ClientIp(ip): ClientIp,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    auth.admit_request(ip, request.uri().path()).await?;
    Ok(next.run(request).await)
}
