//! Requester address extraction for audit logging.
//!
//! The first entry of `X-Forwarded-For` wins when present (the service is
//! usually deployed behind a proxy); otherwise the peer address recorded by
//! `into_make_service_with_connect_info` is used.

use std::fmt;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

/// Header set by reverse proxies.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Best-effort address of the client that sent the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    /// Placeholder used when no address is known.
    pub const UNKNOWN: &'static str = "unknown";

    fn from_parts(parts: &Parts) -> Self {
        let forwarded = parts
            .headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ClientIp(ip.to_string());
        }

        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| ClientIp(addr.ip().to_string()))
            .unwrap_or_else(|| ClientIp(Self::UNKNOWN.to_string()))
    }
}

impl fmt::Display for ClientIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}
