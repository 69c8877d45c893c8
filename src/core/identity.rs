use std::fmt;
use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// Who a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientIdentity {
    /// Authenticated user id
    User(String),
    /// Client IP address as reported by the proxy chain or the socket
    Ip(String),
    Anonymous,
}

/// Longest textual IPv6 address with an embedded IPv4 tail.
const MAX_IP_LEN: usize = 45;

fn parse_ip(value: &str) -> Option<IpAddr> {
    let value = value.trim();
    if value.is_empty() || value.len() > MAX_IP_LEN {
        return None;
    }
    value.parse().ok()
}

impl ClientIdentity {
    /// Resolve the client IP.
    ///
    /// With `trust_proxy_headers` the first `X-Forwarded-For` hop, then
    /// `X-Real-IP`, is used if it parses as an IP address. Otherwise, and
    /// always without trust, the peer address is used.
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> Self {
        let proxied = trust_proxy_headers
            .then(|| {
                let forwarded = headers
                    .get("x-forwarded-for")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split(',').next())
                    .and_then(parse_ip);
                forwarded.or_else(|| {
                    headers
                        .get("x-real-ip")
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_ip)
                })
            })
            .flatten();

        match proxied.or_else(|| peer.map(|addr| addr.ip())) {
            Some(ip) => Self::Ip(ip.to_string()),
            None => Self::Anonymous,
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    /// Rendering used inside counter store keys.
    pub fn store_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Ip(ip) => write!(f, "ip:{ip}"),
            Self::Anonymous => f.write_str("anonymous"),
        }
    }
}
