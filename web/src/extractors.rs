//! Request extractors.
//!
//! - [`ClientIp`]: the peer address, or forwarded headers from a [`TrustedProxies`] peer
//! - [`UserAgent`]: the `User-Agent` header or `"Unknown"`
//! - [`RequestMeta`]: both of the above as a [`RequestContext`]
//! - [`BearerToken`]: raw `Authorization: Bearer` credential
//! - [`CurrentAccount`]: the account behind a full-session bearer token
//! - [`CurrentSuperuser`]: as above, `403` unless the account is a superuser
//!
//! # Example
//!
//! ```ignore
//! async fn me(CurrentAccount(account): CurrentAccount) -> Json<AccountView> {
//!     Json(account.view())
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use sentinel_auth::providers::Account;
use sentinel_auth::{AuthProviders, LoginOrchestrator, RequestContext};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// Proxies allowed to report the client address.
///
/// Installed as a request extension by [`crate::app`]. Without it, or when the
/// peer is not listed, forwarding headers are ignored.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(pub Arc<[IpAddr]>);

impl TrustedProxies {
    /// Trust the given proxy addresses.
    #[must_use]
    pub fn new(proxies: &[IpAddr]) -> Self {
        Self(proxies.into())
    }

    fn contains(&self, ip: IpAddr) -> bool {
        self.0.contains(&ip)
    }
}

/// Client IP address.
///
/// # Resolution
///
/// 1. Peer socket address (served with `into_make_service_with_connect_info`),
///    or `127.0.0.1` when absent
/// 2. Only when the peer is a [`TrustedProxies`] entry: the right-most
///    untrusted `X-Forwarded-For` hop, else `X-Real-IP`
///
/// Headers from any other peer are ignored, so a client cannot pick its own
/// rate-limit bucket.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or(IpAddr::V4(Ipv4Addr::LOCALHOST), |ConnectInfo(addr)| addr.ip());
        let ip = match parts.extensions.get::<TrustedProxies>() {
            Some(trusted) if trusted.contains(peer) => {
                forwarded_client(&parts.headers, trusted).unwrap_or(peer)
            }
            _ => peer,
        };

        Ok(Self(ip))
    }
}

fn forwarded_client(headers: &HeaderMap, trusted: &TrustedProxies) -> Option<IpAddr> {
    let hops: Vec<IpAddr> = headers
        .get_all("X-Forwarded-For")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(','))
        .filter_map(|hop| hop.trim().parse().ok())
        .collect();
    if let Some(ip) = hops.iter().rev().find(|ip| !trusted.contains(**ip)) {
        return Some(*ip);
    }

    headers
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// User-Agent header, or `"Unknown"`.
#[derive(Debug, Clone)]
pub struct UserAgent(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for UserAgent
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("Unknown")
            .to_string();

        Ok(Self(user_agent))
    }
}

/// Caller facts for the core flows.
#[derive(Debug, Clone)]
pub struct RequestMeta(pub RequestContext);

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ClientIp(ip) = ClientIp::from_request_parts(parts, state).await?;
        let UserAgent(user_agent) = UserAgent::from_request_parts(parts, state).await?;

        Ok(Self(RequestContext::new(ip, user_agent)))
    }
}

/// Raw bearer credential from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;

        let token = value
            .split_once(' ')
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map(|(_, token)| token.trim())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;

        Ok(Self(token.to_string()))
    }
}

/// Account authenticated by a full-session access token.
///
/// Rejects partial (second factor pending) tokens with `403`.
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub Account);

#[async_trait]
impl<P: AuthProviders> FromRequestParts<LoginOrchestrator<P>> for CurrentAccount {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        auth: &LoginOrchestrator<P>,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, auth).await?;
        let account = auth.authenticate(&token).await?;

        Ok(Self(account))
    }
}

/// Superuser authenticated by a full-session access token.
///
/// Any other account gets `403`.
#[derive(Debug, Clone)]
pub struct CurrentSuperuser(pub Account);

#[async_trait]
impl<P: AuthProviders> FromRequestParts<LoginOrchestrator<P>> for CurrentSuperuser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        auth: &LoginOrchestrator<P>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentAccount(account) = CurrentAccount::from_request_parts(parts, auth).await?;
        if !account.is_superuser {
            return Err(AppError::forbidden("Superuser privileges required"));
        }

        Ok(Self(account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    const PROXY: [u8; 4] = [10, 0, 0, 2];

    async fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, ()) = builder.body(()).expect("Valid request").into_parts();
        parts
    }

    fn from_peer(parts: &mut Parts, peer: [u8; 4]) {
        parts.extensions.insert(ConnectInfo(SocketAddr::from((peer, 4431))));
        parts
            .extensions
            .insert(TrustedProxies::new(&[IpAddr::from(PROXY)]));
    }

    async fn client_ip(parts: &mut Parts) -> IpAddr {
        ClientIp::from_request_parts(parts, &()).await.expect("Should extract").0
    }

    #[tokio::test]
    async fn test_client_ip_ignores_forwarding_from_untrusted_peer() {
        let mut parts = parts_with(&[
            ("X-Forwarded-For", "203.0.113.1"),
            ("X-Real-IP", "198.51.100.42"),
        ])
        .await;
        from_peer(&mut parts, [192, 0, 2, 9]);

        assert_eq!(client_ip(&mut parts).await.to_string(), "192.0.2.9");
    }

    #[tokio::test]
    async fn test_client_ip_from_x_forwarded_for_via_trusted_proxy() {
        let mut parts =
            parts_with(&[("X-Forwarded-For", "198.51.100.7, 203.0.113.1, 10.0.0.2")]).await;
        from_peer(&mut parts, PROXY);

        assert_eq!(client_ip(&mut parts).await.to_string(), "203.0.113.1");
    }

    #[tokio::test]
    async fn test_client_ip_from_x_real_ip_via_trusted_proxy() {
        let mut parts = parts_with(&[("X-Real-IP", "198.51.100.42")]).await;
        from_peer(&mut parts, PROXY);

        assert_eq!(client_ip(&mut parts).await.to_string(), "198.51.100.42");
    }

    #[tokio::test]
    async fn test_client_ip_trusted_proxy_without_headers() {
        let mut parts = parts_with(&[("X-Forwarded-For", "not-an-ip")]).await;
        from_peer(&mut parts, PROXY);

        assert_eq!(client_ip(&mut parts).await, IpAddr::from(PROXY));
    }

    #[tokio::test]
    async fn test_client_ip_headers_ignored_without_trust_list() {
        let mut parts = parts_with(&[("X-Forwarded-For", "203.0.113.1")]).await;
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 4431))));

        assert_eq!(client_ip(&mut parts).await.to_string(), "192.0.2.9");
    }

    #[tokio::test]
    async fn test_client_ip_fallback() {
        let mut parts = parts_with(&[("X-Real-IP", "198.51.100.42")]).await;

        assert_eq!(client_ip(&mut parts).await, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn test_request_meta_defaults_user_agent() {
        let mut parts = parts_with(&[]).await;
        let RequestMeta(ctx) =
            RequestMeta::from_request_parts(&mut parts, &()).await.expect("Should extract");

        assert_eq!(ctx.user_agent, "Unknown");
    }

    #[tokio::test]
    async fn test_bearer_token_parsed() {
        let mut parts = parts_with(&[("Authorization", "Bearer abc.def.ghi")]).await;
        let token =
            BearerToken::from_request_parts(&mut parts, &()).await.expect("Should extract");

        assert_eq!(token.0, "abc.def.ghi");
    }

    #[tokio::test]
    async fn test_bearer_token_rejects_other_schemes() {
        let mut parts = parts_with(&[("Authorization", "Basic dXNlcjpwYXNz")]).await;
        let err =
            BearerToken::from_request_parts(&mut parts, &()).await.expect_err("Should reject");

        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
