//! AmneziaWG dialect
//!
//! The obfuscated fork forbids bare comment lines above a peer block, so a
//! peer's display name travels as a `#_Name = name` attribute inside the
//! `[Peer]` block instead. The server `[Interface]` section additionally
//! carries the obfuscation parameters `Jc, Jmin, Jmax, S1, S2, H1..H4`,
//! which every client profile must mirror.

use crate::error::Result;
use crate::protocol::{
    push_new_peer, render_client_config, split_attr, ClientConfigParams, Protocol,
};
use crate::store::{ConfigDocument, Section, SectionKind, ATTR_PUBLIC_KEY};

/// The obfuscation parameters AmneziaWG adds to `[Interface]`
pub const OBFUSCATION_PARAMS: [&str; 9] =
    ["Jc", "Jmin", "Jmax", "S1", "S2", "H1", "H2", "H3", "H4"];

/// The attribute carrying a peer's display name
const NAME_ATTR: &str = "#_Name";

/// The AmneziaWG protocol (`awg`/`awg-quick`)
pub struct AmneziaProtocol;

impl Protocol for AmneziaProtocol {
    fn command(&self) -> &'static str {
        "awg"
    }

    fn quick_command(&self) -> &'static str {
        "awg-quick"
    }

    fn parse_config(&self, text: &str) -> Result<ConfigDocument> {
        let mut sections = vec![Section::interface()];
        // Display name seen for the section currently being collected
        let mut pending_name: Option<String> = None;

        for raw_line in text.lines() {
            let (line, prefixed) = match raw_line.trim().strip_prefix("#!") {
                Some(rest) => (rest.trim(), true),
                None => (raw_line.trim(), false),
            };

            if line.is_empty() || line == "[Interface]" {
                continue;
            }

            if line == "[Peer]" {
                finalize_name(sections.last_mut().expect("sections never empty"), &mut pending_name);
                let mut section = Section::peer("");
                section.enabled = !prefixed;
                sections.push(section);
                continue;
            }

            if let Some((key, value)) = split_attr(line) {
                let current = sections.last_mut().expect("sections never empty");
                if prefixed && current.kind == SectionKind::Peer {
                    current.enabled = false;
                }
                if key == NAME_ATTR {
                    pending_name = Some(value.to_string());
                } else {
                    current.set(key, value);
                }
            }
        }

        finalize_name(sections.last_mut().expect("sections never empty"), &mut pending_name);
        ConfigDocument::from_sections(sections)
    }

    fn serialize_config(&self, doc: &ConfigDocument) -> String {
        let mut blocks = Vec::new();

        let mut interface_lines = vec!["[Interface]".to_string()];
        for (key, value) in doc.interface().attrs() {
            interface_lines.push(format!("{} = {}", key, value));
        }
        blocks.push(interface_lines.join("\n"));

        for peer in doc.peers() {
            let mut lines = vec![
                "[Peer]".to_string(),
                format!("{} = {}", NAME_ATTR, peer.name),
            ];
            for (key, value) in peer.attrs() {
                lines.push(format!("{} = {}", key, value));
            }
            if !peer.enabled {
                for line in &mut lines {
                    *line = format!("#!{}", line);
                }
            }
            blocks.push(lines.join("\n"));
        }

        blocks.join("\n\n") + "\n"
    }

    fn build_client_config(
        &self,
        params: &ClientConfigParams<'_>,
        server_config: &ConfigDocument,
    ) -> String {
        // Obfuscation settings must match the server's, defaulting each
        // absent parameter to 0
        let interface = server_config.interface();
        let extra: Vec<(String, String)> = OBFUSCATION_PARAMS
            .iter()
            .map(|param| {
                (
                    param.to_string(),
                    interface.get(param).unwrap_or("0").to_string(),
                )
            })
            .collect();

        render_client_config(params, &extra)
    }

    fn add_peer(&self, doc: &mut ConfigDocument, pubkey: &str, name: &str) {
        push_new_peer(doc, pubkey, name);
    }

    fn rename_peer(&self, doc: &mut ConfigDocument, pubkey: &str, new_name: &str) -> Result<()> {
        doc.require_peer_mut(pubkey)?.name = new_name.to_string();
        Ok(())
    }
}

/// Resolve the display name of a just-completed section: the `#_Name`
/// attribute when present, otherwise the peer's public key.
fn finalize_name(section: &mut Section, pending_name: &mut Option<String>) {
    if section.kind != SectionKind::Peer {
        *pending_name = None;
        return;
    }
    section.name = match pending_name.take() {
        Some(name) => name,
        None => section.get(ATTR_PUBLIC_KEY).unwrap_or_default().to_string(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ATTR_ALLOWED_IPS;

    const SAMPLE: &str = "\
[Interface]
PrivateKey = server-priv=
Address = 10.8.0.1/24
ListenPort = 51820
Jc = 4
Jmin = 40
Jmax = 70
S1 = 116
S2 = 61
H1 = 1139437039
H2 = 1088834137
H3 = 977318325
H4 = 1455875553

[Peer]
#_Name = alice
PublicKey = alice-pub=
AllowedIPs = 10.8.0.2/32

#![Peer]
#!#_Name = bob
#!PublicKey = bob-pub=
#!AllowedIPs = 10.8.0.3/32
";

    #[test]
    fn test_parse_names_from_attribute() {
        let doc = AmneziaProtocol.parse_config(SAMPLE).unwrap();
        let names: Vec<&str> = doc.peers().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        // The name attribute is metadata, not a stored attr
        assert!(doc.peer_by_pubkey("alice-pub=").unwrap().get("#_Name").is_none());
    }

    #[test]
    fn test_parse_disabled_peer() {
        let doc = AmneziaProtocol.parse_config(SAMPLE).unwrap();
        assert!(doc.peer_by_pubkey("alice-pub=").unwrap().enabled);
        assert!(!doc.peer_by_pubkey("bob-pub=").unwrap().enabled);
    }

    #[test]
    fn test_unnamed_peer_falls_back_to_pubkey() {
        let text = "\
[Interface]
Address = 10.8.0.1/24

[Peer]
PublicKey = anon-pub=
AllowedIPs = 10.8.0.5/32
";
        let doc = AmneziaProtocol.parse_config(text).unwrap();
        assert_eq!(doc.peers().next().unwrap().name, "anon-pub=");
    }

    #[test]
    fn test_roundtrip_is_stable() {
        let protocol = AmneziaProtocol;
        let doc = protocol.parse_config(SAMPLE).unwrap();
        let text = protocol.serialize_config(&doc);
        let reparsed = protocol.parse_config(&text).unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn test_serialized_disabled_peer_is_fully_prefixed() {
        let protocol = AmneziaProtocol;
        let doc = protocol.parse_config(SAMPLE).unwrap();
        let text = protocol.serialize_config(&doc);

        assert!(text.contains("#![Peer]"));
        assert!(text.contains("#!#_Name = bob"));
        assert!(text.contains("#!PublicKey = bob-pub="));
    }

    #[test]
    fn test_client_config_carries_all_obfuscation_params() {
        let protocol = AmneziaProtocol;
        let doc = protocol.parse_config(SAMPLE).unwrap();
        let params = ClientConfigParams {
            private_key: "priv",
            address: "10.8.0.4/32",
            server_public_key: "server-pub=",
            endpoint: "vpn.example.com",
            server_port: "51820",
        };

        let text = protocol.build_client_config(&params, &doc);
        for param in OBFUSCATION_PARAMS {
            assert!(
                text.contains(&format!("\n{} = ", param)),
                "missing {}",
                param
            );
        }
        assert!(text.contains("Jc = 4\n"));
        assert!(text.contains("H4 = 1455875553\n"));
    }

    #[test]
    fn test_client_config_defaults_missing_params_to_zero() {
        let protocol = AmneziaProtocol;
        let doc = protocol
            .parse_config("[Interface]\nAddress = 10.8.0.1/24\nListenPort = 51820\n")
            .unwrap();
        let params = ClientConfigParams {
            private_key: "priv",
            address: "10.8.0.2/32",
            server_public_key: "server-pub=",
            endpoint: "vpn.example.com",
            server_port: "51820",
        };

        let text = protocol.build_client_config(&params, &doc);
        for param in OBFUSCATION_PARAMS {
            assert!(text.contains(&format!("{} = 0\n", param)), "param {}", param);
        }
    }

    #[test]
    fn test_add_peer_serializes_name_attribute() {
        let protocol = AmneziaProtocol;
        let mut doc = protocol.parse_config(SAMPLE).unwrap();
        protocol.add_peer(&mut doc, "carol-pub=", "carol");
        doc.peer_by_pubkey_mut("carol-pub=")
            .unwrap()
            .set(ATTR_ALLOWED_IPS, "10.8.0.4/32");

        let text = protocol.serialize_config(&doc);
        assert!(text.contains("[Peer]\n#_Name = carol\nPublicKey = carol-pub=\n"));
    }
}
