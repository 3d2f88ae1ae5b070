//! Endpoint normalization (§9 "Tuple keys").
//!
//! The OS may report the same peer as an IPv4 address on one socket and as
//! an IPv4-mapped IPv6 address on another (common on dual-stack listeners).
//! Both forms must hash and compare equal, or the history cache and the
//! monitor registry would silently split one client's state across two keys.

use std::net::{IpAddr, SocketAddr};

/// An `(endpoint, request-id)` key, endpoint-normalized.
pub type Endpoint = SocketAddr;

/// Canonicalize a peer address as observed from a received datagram.
pub fn normalize(addr: SocketAddr) -> Endpoint {
  match addr.ip() {
    IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
      Some(v4) => SocketAddr::new(IpAddr::V4(v4), addr.port()),
      None => addr,
    },
    IpAddr::V4(_) => addr,
  }
}
