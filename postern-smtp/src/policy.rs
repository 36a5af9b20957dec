//! Per-connection policy: which clients may relay, which must authenticate,
//! and which recipient domains are delivered locally.

use std::{
    fmt::{self, Debug, Display},
    net::IpAddr,
    str::FromStr,
};

use serde::Deserialize;

use crate::error::NetworkError;

/// Decisions the session derives from the remote address and recipient
/// domains. Implementations are shared between all sessions.
pub trait ConnectionPolicy: Debug + Send + Sync {
    fn is_relaying_allowed(&self, ip: IpAddr) -> bool;

    fn is_auth_required(&self, ip: IpAddr) -> bool;

    fn is_local_domain(&self, domain: &str) -> bool;
}

/// An IP network in CIDR notation, e.g. `192.0.2.0/24` or `2001:db8::/32`.
///
/// A bare address is a network containing only that address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Network {
    address: IpAddr,
    prefix: u8,
}

impl Network {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.address, ip.to_canonical()) {
            (IpAddr::V4(network), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(network) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(network), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(network) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for Network {
    type Err = NetworkError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (address, prefix) = value
            .split_once('/')
            .map_or((value, None), |(address, prefix)| (address, Some(prefix)));

        let address = address
            .parse::<IpAddr>()
            .map_err(|_| NetworkError::InvalidAddress(value.to_string()))?;

        let max = if address.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            None => max,
            Some(prefix) => prefix
                .parse::<u8>()
                .ok()
                .filter(|prefix| *prefix <= max)
                .ok_or_else(|| NetworkError::InvalidPrefix(value.to_string()))?,
        };

        Ok(Self { address, prefix })
    }
}

impl TryFrom<String> for Network {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

/// Relay decisions from configured networks and domains.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayPolicy {
    /// Clients in these networks may relay to any domain.
    pub networks: Vec<Network>,
    /// Clients outside `networks` must authenticate before relaying.
    pub require_auth: bool,
    /// Domains accepted for local delivery, compared case-insensitively.
    pub local_domains: Vec<String>,
}

impl RelayPolicy {
    fn in_networks(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|network| network.contains(ip))
    }
}

impl ConnectionPolicy for RelayPolicy {
    fn is_relaying_allowed(&self, ip: IpAddr) -> bool {
        self.in_networks(ip)
    }

    fn is_auth_required(&self, ip: IpAddr) -> bool {
        self.require_auth && !self.in_networks(ip)
    }

    fn is_local_domain(&self, domain: &str) -> bool {
        self.local_domains
            .iter()
            .any(|local| local.eq_ignore_ascii_case(domain))
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use pretty_assertions::assert_eq;

    use super::*;

    fn ip(value: &str) -> IpAddr {
        value.parse().unwrap()
    }

    #[test]
    fn network_membership() {
        let network: Network = "192.168.0.0/16".parse().unwrap();
        assert!(network.contains(ip("192.168.10.1")));
        assert!(!network.contains(ip("192.169.0.1")));
        assert!(network.contains(ip("::ffff:192.168.1.1")));
        assert!(!network.contains(ip("2001:db8::1")));

        let single: Network = "127.0.0.1".parse().unwrap();
        assert_eq!(single.to_string(), "127.0.0.1/32");
        assert!(single.contains(ip("127.0.0.1")));
        assert!(!single.contains(ip("127.0.0.2")));

        let everything: Network = "0.0.0.0/0".parse().unwrap();
        assert!(everything.contains(ip("203.0.113.9")));

        let v6: Network = "2001:db8::/32".parse().unwrap();
        assert!(v6.contains(ip("2001:db8:1::1")));
    }

    #[test]
    fn invalid_networks() {
        assert_eq!(
            "10.0.0.0/33".parse::<Network>(),
            Err(NetworkError::InvalidPrefix("10.0.0.0/33".to_string()))
        );
        assert_eq!(
            "not-a-network".parse::<Network>(),
            Err(NetworkError::InvalidAddress("not-a-network".to_string()))
        );
    }

    #[test]
    fn relay_policy() {
        let policy = RelayPolicy {
            networks: vec!["10.0.0.0/8".parse().unwrap()],
            require_auth: true,
            local_domains: vec!["Example.COM".to_string()],
        };

        assert!(policy.is_relaying_allowed(ip("10.1.2.3")));
        assert!(!policy.is_auth_required(ip("10.1.2.3")));

        assert!(!policy.is_relaying_allowed(ip("203.0.113.1")));
        assert!(policy.is_auth_required(ip("203.0.113.1")));

        assert!(policy.is_local_domain("example.com"));
        assert!(!policy.is_local_domain("example.org"));
    }
}
