//! Peer address allocation
//!
//! Given a parsed server config, find the next unused host address inside
//! the interface subnet. The scan is ascending so allocation is
//! deterministic for a given config.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::{Result, StewardError};
use crate::store::{ConfigDocument, ATTR_ADDRESS, ATTR_ALLOWED_IPS};

/// Return the first free host address in the interface subnet as a `/32`,
/// or `None` when the subnet is exhausted.
///
/// Reserved addresses are the interface's own address and every peer's
/// `AllowedIPs` host. Disabled peers keep their reservation so re-enabling
/// them never collides.
pub fn next_available_address(doc: &ConfigDocument) -> Result<Option<Ipv4Net>> {
    let subnet = interface_subnet(doc)?;

    let mut reserved: HashSet<Ipv4Addr> = HashSet::new();
    reserved.insert(subnet.addr());

    for peer in doc.peers() {
        if let Some(allowed) = peer.get(ATTR_ALLOWED_IPS) {
            reserved.insert(parse_host(allowed, &peer.name)?);
        }
    }

    for host in subnet.hosts() {
        if !reserved.contains(&host) {
            // hosts() yields ascending addresses, so the first miss wins
            let assigned = Ipv4Net::new(host, 32)
                .map_err(|e| StewardError::Parse(format!("Invalid host address: {}", e)))?;
            return Ok(Some(assigned));
        }
    }

    Ok(None)
}

/// Parse the interface `Address` attribute into its subnet
pub fn interface_subnet(doc: &ConfigDocument) -> Result<Ipv4Net> {
    let address = doc.interface().require(ATTR_ADDRESS)?;
    address.trim().parse::<Ipv4Net>().map_err(|e| {
        StewardError::Parse(format!("Invalid interface Address '{}': {}", address, e))
    })
}

fn parse_host(allowed_ips: &str, peer: &str) -> Result<Ipv4Addr> {
    // AllowedIPs is a single /32 in the configs we manage; tolerate a bare
    // address as well
    let host = allowed_ips
        .split(',')
        .next()
        .unwrap_or(allowed_ips)
        .trim()
        .split('/')
        .next()
        .unwrap_or_default();

    host.parse::<Ipv4Addr>().map_err(|e| {
        StewardError::Parse(format!(
            "Peer '{}' has invalid AllowedIPs '{}': {}",
            peer, allowed_ips, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Section, ATTR_PUBLIC_KEY};

    fn document(interface_addr: &str, peer_ips: &[&str]) -> ConfigDocument {
        let mut interface = Section::interface();
        interface.set(ATTR_ADDRESS, interface_addr);
        let mut doc = ConfigDocument::new(interface);

        for (i, ip) in peer_ips.iter().enumerate() {
            let mut peer = Section::peer(&format!("peer{}", i));
            peer.set(ATTR_PUBLIC_KEY, &format!("key{}", i));
            peer.set(ATTR_ALLOWED_IPS, ip);
            doc.push_peer(peer);
        }
        doc
    }

    #[test]
    fn test_first_free_host() {
        let doc = document("10.0.0.1/24", &["10.0.0.2/32", "10.0.0.3/32"]);
        let next = next_available_address(&doc).unwrap().unwrap();
        assert_eq!(next.to_string(), "10.0.0.4/32");
    }

    #[test]
    fn test_skips_gaps_in_ascending_order() {
        let doc = document("10.0.0.1/24", &["10.0.0.3/32", "10.0.0.5/32"]);
        let next = next_available_address(&doc).unwrap().unwrap();
        assert_eq!(next.to_string(), "10.0.0.2/32");
    }

    #[test]
    fn test_exhausted_subnet_returns_none() {
        // /30 has two usable hosts: .1 (interface) and .2
        let doc = document("10.0.0.1/30", &["10.0.0.2/32"]);
        assert!(next_available_address(&doc).unwrap().is_none());
    }

    #[test]
    fn test_full_24_returns_none() {
        let peers: Vec<String> = (2..255).map(|i| format!("10.0.0.{}/32", i)).collect();
        let refs: Vec<&str> = peers.iter().map(|s| s.as_str()).collect();
        let doc = document("10.0.0.1/24", &refs);
        assert!(next_available_address(&doc).unwrap().is_none());
    }

    #[test]
    fn test_missing_address_is_parse_error() {
        let doc = ConfigDocument::new(Section::interface());
        assert!(matches!(
            next_available_address(&doc),
            Err(StewardError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_peer_allowed_ips_is_parse_error() {
        let doc = document("10.0.0.1/24", &["not-an-ip/32"]);
        assert!(matches!(
            next_available_address(&doc),
            Err(StewardError::Parse(_))
        ));
    }
}
