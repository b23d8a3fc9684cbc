//! Peer discovery sources.

use lightbit_core::{Network, NetworkParams, PeerAddress};
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::{debug, warn};

use crate::error::DiscoveryError;

/// Mainnet DNS seeds.
pub const MAINNET_DNS_SEEDS: &[&str] = &[
    "bitseed.xf2.org",
    "dnsseed.bluematt.me",
    "seed.bitcoin.sipa.be",
    "dnsseed.bitcoin.dashjr.org",
];

/// Testnet DNS seeds.
pub const TESTNET_DNS_SEEDS: &[&str] = &["testnet-seed.bitcoin.petertodd.org"];

/// A source of candidate peer endpoints. Resolution may block; the pool
/// calls it from a blocking task. Failures are retried on the next tick.
pub trait PeerDiscovery: Send + Sync {
    /// Produce candidate endpoints.
    fn peers(&self) -> Result<Vec<PeerAddress>, DiscoveryError>;
}

/// Discovery through DNS seeds.
pub struct DnsDiscovery {
    seeds: Vec<String>,
    port: u16,
}

impl DnsDiscovery {
    /// Use the well-known seeds for the network of `params`.
    pub fn new(params: &NetworkParams) -> Self {
        let seeds = match params.network {
            Network::Mainnet => MAINNET_DNS_SEEDS,
            Network::Testnet => TESTNET_DNS_SEEDS,
        };
        Self {
            seeds: seeds.iter().map(|s| s.to_string()).collect(),
            port: params.default_port,
        }
    }

    /// Use a custom seed list.
    pub fn with_seeds(seeds: Vec<String>, port: u16) -> Self {
        Self { seeds, port }
    }
}

impl PeerDiscovery for DnsDiscovery {
    fn peers(&self) -> Result<Vec<PeerAddress>, DiscoveryError> {
        let mut found = Vec::new();
        for seed in &self.seeds {
            match (seed.as_str(), self.port).to_socket_addrs() {
                Ok(addrs) => {
                    let before = found.len();
                    for addr in addrs {
                        if let SocketAddr::V4(v4) = addr {
                            found.push(PeerAddress::new(*v4.ip(), v4.port()));
                        }
                    }
                    debug!(seed = %seed, count = found.len() - before, "Resolved DNS seed");
                }
                Err(e) => warn!(seed = %seed, error = %e, "Failed to resolve DNS seed"),
            }
        }
        if found.is_empty() {
            return Err(DiscoveryError("no DNS seed resolved".to_string()));
        }
        found.sort();
        found.dedup();
        Ok(found)
    }
}

/// A fixed list of endpoints, for bootstrapping and tests.
pub struct SeedPeers {
    addresses: Vec<PeerAddress>,
}

impl SeedPeers {
    /// Use the given endpoints.
    pub fn new(addresses: Vec<PeerAddress>) -> Self {
        Self { addresses }
    }
}

impl PeerDiscovery for SeedPeers {
    fn peers(&self) -> Result<Vec<PeerAddress>, DiscoveryError> {
        if self.addresses.is_empty() {
            return Err(DiscoveryError("seed list is empty".to_string()));
        }
        Ok(self.addresses.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_seed_peers() {
        let addr = PeerAddress::new(Ipv4Addr::new(10, 0, 0, 1), 8333);
        let seeds = SeedPeers::new(vec![addr]);
        assert_eq!(seeds.peers().unwrap(), vec![addr]);

        assert!(SeedPeers::new(Vec::new()).peers().is_err());
    }

    #[test]
    fn test_dns_discovery_uses_network_port() {
        let discovery = DnsDiscovery::new(&NetworkParams::testnet());
        assert_eq!(discovery.port, 18333);
        assert_eq!(discovery.seeds.len(), TESTNET_DNS_SEEDS.len());
    }
}
