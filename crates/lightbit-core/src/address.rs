//! Peer endpoint addresses.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// An IPv4 endpoint of a remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress {
    /// IPv4 address.
    pub ip: Ipv4Addr,
    /// TCP port.
    pub port: u16,
}

impl PeerAddress {
    /// Create a new peer address.
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Convert to a socket address for connecting.
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// Build from a socket address; `None` for IPv6 endpoints.
    pub fn from_socket_addr(addr: &SocketAddr) -> Option<Self> {
        match addr {
            SocketAddr::V4(v4) => Some(Self::new(*v4.ip(), v4.port())),
            SocketAddr::V6(_) => None,
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}
