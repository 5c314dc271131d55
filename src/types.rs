//! Value types shared by the discovery and registry layers.
//!
//! These are serialised with [`serde`](https://serde.rs/) using one- or
//! two-letter keys, since every advertisement carries them over a LAN
//! broadcast.  The key names are a compatibility surface with deployed peers.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use log::debug;
use serde::{Deserialize, Serialize};

pub const LOOPBACK: &str = "127.0.0.1";

/// Where a process or endpoint can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HostInfo {
    #[serde(rename = "a", default)]
    pub address: String,
    #[serde(rename = "p", default)]
    pub port: u16,
}

impl HostInfo {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// The address to dial: loopback when `address` belongs to this process.
    pub fn address_or_localhost(&self, local: &LocalAddresses) -> String {
        if local.contains(&self.address) {
            LOOPBACK.to_string()
        } else {
            self.address.clone()
        }
    }
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// One registered control or equipment endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CrosspointInfo {
    #[serde(rename = "i", default)]
    pub id: i32,
    #[serde(rename = "n", default)]
    pub name: String,
    #[serde(rename = "h", default)]
    pub host: HostInfo,
}

impl CrosspointInfo {
    pub fn new(id: i32, name: impl Into<String>, host: HostInfo) -> Self {
        Self {
            id,
            name: name.into(),
            host,
        }
    }
}

/// The addresses under which this process can reach itself.
#[derive(Debug, Clone)]
pub struct LocalAddresses {
    addresses: Vec<String>,
}

impl LocalAddresses {
    /// Loopback, the unspecified address and the primary outbound IPv4
    /// address, if there is a route.
    pub fn detect() -> Self {
        let mut addresses = vec![
            LOOPBACK.to_string(),
            "localhost".to_string(),
            Ipv4Addr::UNSPECIFIED.to_string(),
        ];
        if let Some(ip) = primary_ipv4() {
            addresses.push(ip.to_string());
        }
        Self { addresses }
    }

    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a.eq_ignore_ascii_case(address))
    }

    /// The address peers should use for us, loopback when nothing better is
    /// known.
    pub fn primary(&self) -> &str {
        self.addresses
            .iter()
            .map(String::as_str)
            .find(|a| a.parse::<IpAddr>().is_ok_and(|ip| !ip.is_loopback() && !ip.is_unspecified()))
            .unwrap_or(LOOPBACK)
    }
}

/// Finds the interface address the OS would route LAN traffic from.  Connecting
/// a UDP socket sends nothing.
fn primary_ipv4() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    if let Err(e) = socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)) {
        debug!("no route for local address detection: {}", e);
        return None;
    }
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_address_resolves_to_loopback() {
        let local = LocalAddresses::from_addresses(["127.0.0.1", "10.1.2.3"]);
        assert_eq!(
            HostInfo::new("10.1.2.3", 1).address_or_localhost(&local),
            LOOPBACK
        );
        assert_eq!(
            HostInfo::new("10.9.9.9", 1).address_or_localhost(&local),
            "10.9.9.9"
        );
        assert_eq!(local.primary(), "10.1.2.3");
    }

    #[test]
    fn short_keys_on_the_wire() {
        let info = CrosspointInfo::new(7, "rack", HostInfo::new("10.0.0.2", 41000));
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(json, r#"{"i":7,"n":"rack","h":{"a":"10.0.0.2","p":41000}}"#);
        let back: CrosspointInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn detected_addresses_include_loopback() {
        let local = LocalAddresses::detect();
        assert!(local.contains(LOOPBACK));
        assert!(local.contains("LOCALHOST"));
    }
}
