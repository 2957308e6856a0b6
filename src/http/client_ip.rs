//! Client identity extraction.
//!
//! The peer address is preferred when it is public. Behind a proxy the peer
//! is usually private, so the first public entry of `X-Forwarded-For` is used
//! instead.

use axum::http::HeaderMap;
use std::net::IpAddr;

/// Header carrying the proxy chain.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Identity used when neither the peer nor the headers provide one.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derive the client identity for rate limiting.
pub fn client_identity(peer: Option<IpAddr>, headers: &HeaderMap) -> String {
    if let Some(ip) = peer.filter(|ip| !is_private_ip(*ip)) {
        return ip.to_string();
    }

    if let Some(forwarded) = first_public_forwarded(headers) {
        return forwarded;
    }

    peer.map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn first_public_forwarded(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers.get(FORWARDED_FOR)?.to_str().ok()?;

    forwarded
        .split(',')
        .map(str::trim)
        .find(|entry| !entry.is_empty() && !is_private(entry))
        .map(str::to_string)
}

/// Whether a textual address is loopback or in a private range.
///
/// Strings that do not parse as an IP address are not private.
pub fn is_private(address: &str) -> bool {
    address
        .trim()
        .parse::<IpAddr>()
        .map(is_private_ip)
        .unwrap_or(false)
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        // 10/8, 172.16/12, 192.168/16
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                // fe80::/10 link-local
                || (first & 0xffc0) == 0xfe80
                // fec0::/10 site-local
                || (first & 0xffc0) == 0xfec0
        }
    }
}
