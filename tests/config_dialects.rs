//! Cross-dialect config behavior
//!
//! Exercises the properties the dialects must share: parse/serialize
//! round-trip stability, the disabled-peer encoding, client-config
//! isolation, and the interaction with address allocation.

use proptest::prelude::*;

use wg_steward::allocator::next_available_address;
use wg_steward::protocol::{
    AmneziaProtocol, ClientConfigParams, Protocol, WireguardProtocol, OBFUSCATION_PARAMS,
};
use wg_steward::store::ConfigDocument;

fn dialects() -> Vec<Box<dyn Protocol>> {
    vec![Box::new(WireguardProtocol), Box::new(AmneziaProtocol)]
}

fn build_config(protocol: &dyn Protocol, peers: &[(String, bool)]) -> ConfigDocument {
    let base = "\
[Interface]
PrivateKey = c2VydmVyLXByaXZhdGUta2V5LXRoaXJ0eXR3b2I=
Address = 10.9.0.1/24
ListenPort = 51820
";
    let mut doc = protocol.parse_config(base).unwrap();
    for (i, (name, enabled)) in peers.iter().enumerate() {
        let pubkey = format!("peer-key-{}=", i);
        protocol.add_peer(&mut doc, &pubkey, name);
        let peer = doc.peer_by_pubkey_mut(&pubkey).unwrap();
        peer.set("AllowedIPs", &format!("10.9.0.{}/32", i + 2));
        peer.enabled = *enabled;
    }
    doc
}

#[test]
fn test_roundtrip_both_dialects() {
    for protocol in dialects() {
        let doc = build_config(
            protocol.as_ref(),
            &[
                ("alice".to_string(), true),
                ("bob".to_string(), false),
                ("carol phone".to_string(), true),
            ],
        );

        let text = protocol.serialize_config(&doc);
        let reparsed = protocol.parse_config(&text).unwrap();
        assert_eq!(doc, reparsed, "round-trip broke for {}", protocol.command());

        // A second cycle must be byte-stable
        let text2 = protocol.serialize_config(&reparsed);
        assert_eq!(text, text2);
    }
}

#[test]
fn test_disabled_peers_survive_roundtrip() {
    for protocol in dialects() {
        let doc = build_config(protocol.as_ref(), &[("bob".to_string(), false)]);
        let text = protocol.serialize_config(&doc);

        // Every line of the disabled block carries the marker
        let peer_block = text
            .split("\n\n")
            .find(|block| block.contains("peer-key-0="))
            .unwrap();
        for line in peer_block.lines() {
            assert!(line.starts_with("#!"), "unprefixed line: {}", line);
        }

        let reparsed = protocol.parse_config(&text).unwrap();
        assert!(!reparsed.peer_by_pubkey("peer-key-0=").unwrap().enabled);
    }
}

#[test]
fn test_allocation_sees_through_both_dialects() {
    for protocol in dialects() {
        let doc = build_config(
            protocol.as_ref(),
            &[("alice".to_string(), true), ("bob".to_string(), false)],
        );
        // Interface at .1, peers at .2/.3 (bob's reservation held while
        // disabled)
        let next = next_available_address(&doc).unwrap().unwrap();
        assert_eq!(next.to_string(), "10.9.0.4/32");
    }
}

#[test]
fn test_client_config_dialect_isolation() {
    let params = ClientConfigParams {
        private_key: "client-priv=",
        address: "10.9.0.2/32",
        server_public_key: "server-pub=",
        endpoint: "vpn.example.com",
        server_port: "51820",
    };

    let wg_doc = build_config(&WireguardProtocol, &[]);
    let wg_text = WireguardProtocol.build_client_config(&params, &wg_doc);
    for param in OBFUSCATION_PARAMS {
        assert!(
            !wg_text.contains(&format!("{} = ", param)),
            "WireGuard client config leaked {}",
            param
        );
    }

    let awg_doc = build_config(&AmneziaProtocol, &[]);
    let awg_text = AmneziaProtocol.build_client_config(&params, &awg_doc);
    for param in OBFUSCATION_PARAMS {
        assert!(
            awg_text.contains(&format!("{} = ", param)),
            "AmneziaWG client config missing {}",
            param
        );
    }
}

proptest! {
    #[test]
    fn prop_roundtrip_wireguard(
        names in proptest::collection::vec("[a-z][a-z0-9 _-]{0,15}", 0..6),
        disabled in proptest::collection::vec(any::<bool>(), 6),
    ) {
        let peers: Vec<(String, bool)> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), disabled[i]))
            .filter(|(name, _)| !name.is_empty())
            .collect();

        let protocol = WireguardProtocol;
        let doc = build_config(&protocol, &peers);
        let text = protocol.serialize_config(&doc);
        let reparsed = protocol.parse_config(&text).unwrap();
        prop_assert_eq!(doc, reparsed);
    }

    #[test]
    fn prop_roundtrip_amnezia(
        names in proptest::collection::vec("[a-z][a-z0-9 _-]{0,15}", 0..6),
        disabled in proptest::collection::vec(any::<bool>(), 6),
    ) {
        let peers: Vec<(String, bool)> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), disabled[i]))
            .filter(|(name, _)| !name.is_empty())
            .collect();

        let protocol = AmneziaProtocol;
        let doc = build_config(&protocol, &peers);
        let text = protocol.serialize_config(&doc);
        let reparsed = protocol.parse_config(&text).unwrap();
        prop_assert_eq!(doc, reparsed);
    }
}
