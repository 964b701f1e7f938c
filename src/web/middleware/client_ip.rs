//! Client IP resolution from trusted proxy headers.
//!
//! Priority: `CF-Connecting-IP` -> leftmost `X-Forwarded-For` -> `X-Real-IP`
//! -> socket peer address.

use axum::extract::ConnectInfo;
use http::request::Parts;
use std::net::{IpAddr, SocketAddr};

/// Best-effort client address for audit provenance.
pub fn resolve(parts: &Parts) -> Option<IpAddr> {
    if let Some(ip) = header_str(&parts.headers, "cf-connecting-ip").and_then(|s| s.parse().ok()) {
        return Some(ip);
    }

    // The first hop is the originating client; later entries are proxies.
    if let Some(xff) = header_str(&parts.headers, "x-forwarded-for")
        && let Some(ip) = xff
            .split(',')
            .map(str::trim)
            .find(|s| !s.is_empty() && !s.eq_ignore_ascii_case("unknown"))
            .and_then(|s| s.parse::<IpAddr>().ok())
    {
        return Some(ip);
    }

    if let Some(ip) = header_str(&parts.headers, "x-real-ip").and_then(|s| s.trim().parse().ok()) {
        return Some(ip);
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn header_str<'a>(headers: &'a http::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
