use std::net::IpAddr;

use axum::http::HeaderMap;

use crate::config::ForwardedAllowIps;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Address of the real client behind any trusted proxies.
///
/// `X-Forwarded-For` is only honoured when the direct peer is trusted. The
/// list is walked right to left and the first untrusted hop wins; if every
/// hop is trusted the left-most one is the client.
pub fn client_addr(
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    allow: &ForwardedAllowIps,
) -> Option<IpAddr> {
    let peer_trusted = match peer {
        Some(ip) => allow.trusts(&ip),
        None => matches!(allow, ForwardedAllowIps::Any),
    };
    if !peer_trusted {
        return peer;
    }

    let hops: Vec<IpAddr> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|hop| hop.trim().parse().ok())
        .collect();

    hops.iter()
        .rev()
        .find(|hop| !allow.trusts(hop))
        .or_else(|| hops.first())
        .copied()
        .or(peer)
}
