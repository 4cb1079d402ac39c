use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use tracing::debug;

/// who is calling: best-effort peer IP plus the declared User-Agent
///
/// the IP feeds the private-network checks on the maintenance endpoints, the
/// User-Agent becomes part of the response-cache key and is forwarded upstream
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// maintenance endpoints are open to the box itself and the home LAN only
pub fn is_private_caller(ip: Option<&str>) -> bool {
    match ip {
        Some(ip) => ip.starts_with("127.0.0.1") || ip.starts_with("192.168.") || ip == "::1",
        None => false,
    }
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        // try to get client IP from X-Forwarded-For, X-Real-IP, or connection info
        let ip = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get("x-real-ip")
                    .and_then(|h| h.to_str().ok())
                    .map(|s| s.to_string())
            })
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ci| ci.0.ip().to_string())
            });

        debug!("client request from {:?}", ip);

        Ok(ClientInfo { ip, user_agent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_and_lan_are_private() {
        assert!(is_private_caller(Some("127.0.0.1")));
        assert!(is_private_caller(Some("192.168.1.5")));
        assert!(is_private_caller(Some("::1")));
    }

    #[test]
    fn other_networks_are_not() {
        assert!(!is_private_caller(Some("10.0.0.5")));
        assert!(!is_private_caller(Some("8.8.8.8")));
        assert!(!is_private_caller(None));
    }
}
