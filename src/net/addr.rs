//! Socket address normalization.
//!
//! # Responsibilities
//! - Rewrite IPv4 addresses to their IPv4-mapped IPv6 form
//! - Detect the `0.0.0.0` / `::` wildcards (including `::ffff:0.0.0.0`)
//! - Render addresses as `ipv4:` / `ipv6:` URIs for logs and peer names
//!
//! Every listening socket is created in the IPv6 family, so a requested
//! address goes through [`normalize`] before it is bound.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Rewrite an IPv4 address to its IPv4-mapped IPv6 form.
///
/// Returns `None` when the address is already IPv6.
pub fn to_v4_mapped(addr: &SocketAddr) -> Option<SocketAddr> {
    match addr {
        SocketAddr::V4(v4) => Some(SocketAddr::V6(SocketAddrV6::new(
            v4.ip().to_ipv6_mapped(),
            v4.port(),
            0,
            0,
        ))),
        SocketAddr::V6(_) => None,
    }
}

/// Unwrap an IPv4-mapped IPv6 address back into plain IPv4.
///
/// Returns `None` for IPv4 input and for IPv6 addresses that are not mapped.
pub fn from_v4_mapped(addr: &SocketAddr) -> Option<SocketAddr> {
    match addr {
        SocketAddr::V6(v6) => v6
            .ip()
            .to_ipv4_mapped()
            .map(|ip| SocketAddr::V4(SocketAddrV4::new(ip, v6.port()))),
        SocketAddr::V4(_) => None,
    }
}

/// Return the port when `addr` is a wildcard (`0.0.0.0`, `::` or `::ffff:0.0.0.0`).
pub fn wildcard_port(addr: &SocketAddr) -> Option<u16> {
    let ip = match from_v4_mapped(addr) {
        Some(unmapped) => unmapped.ip(),
        None => addr.ip(),
    };
    ip.is_unspecified().then(|| addr.port())
}

/// The canonical IPv6 wildcard `[::]:port`.
pub fn wildcard6(port: u16) -> SocketAddr {
    SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0))
}

/// Apply the IPv4-mapped and wildcard rewrites, in that order.
pub fn normalize(addr: SocketAddr) -> SocketAddr {
    let addr = to_v4_mapped(&addr).unwrap_or(addr);
    match wildcard_port(&addr) {
        Some(port) => wildcard6(port),
        None => addr,
    }
}

/// The plain IPv4 form of a mapped or wildcard address, used when the host
/// cannot create a dual-stack IPv6 socket.
pub fn ipv4_fallback(addr: &SocketAddr) -> Option<SocketAddr> {
    if let Some(unmapped) = from_v4_mapped(addr) {
        return Some(unmapped);
    }
    match addr.ip() {
        IpAddr::V6(ip) if ip.is_unspecified() => Some(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            addr.port(),
        ))),
        _ => None,
    }
}

/// Report a peer the way a client would name it: mapped addresses become IPv4.
pub fn normalize_peer(addr: SocketAddr) -> SocketAddr {
    from_v4_mapped(&addr).unwrap_or(addr)
}

/// Render an address as a URI (`ipv4:127.0.0.1:80`, `ipv6:[::1]:80`).
pub fn to_uri(addr: &SocketAddr) -> String {
    match normalize_peer(*addr) {
        SocketAddr::V4(v4) => format!("ipv4:{}", v4),
        SocketAddr::V6(v6) => format!("ipv6:[{}]:{}", v6.ip(), v6.port()),
    }
}
