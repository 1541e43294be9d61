//! Plain WireGuard dialect
//!
//! Peers are delimited by a bare `# name` comment line above the `[Peer]`
//! block. Disabled peers have every line of their block, the name comment
//! included, prefixed with `#!`.

use crate::error::Result;
use crate::protocol::{
    push_new_peer, render_client_config, split_attr, ClientConfigParams, Protocol,
};
use crate::store::{ConfigDocument, Section, SectionKind};

/// The standard WireGuard protocol (`wg`/`wg-quick`)
pub struct WireguardProtocol;

impl Protocol for WireguardProtocol {
    fn command(&self) -> &'static str {
        "wg"
    }

    fn quick_command(&self) -> &'static str {
        "wg-quick"
    }

    fn parse_config(&self, text: &str) -> Result<ConfigDocument> {
        let mut sections = vec![Section::interface()];

        for raw_line in text.lines() {
            let (line, prefixed) = match raw_line.trim().strip_prefix("#!") {
                Some(rest) => (rest.trim(), true),
                None => (raw_line.trim(), false),
            };

            if line.is_empty() || line.starts_with('[') {
                continue;
            }

            if let Some(name) = line.strip_prefix("# ") {
                let mut section = Section::peer(name.trim());
                section.enabled = !prefixed;
                sections.push(section);
                continue;
            }

            if let Some((key, value)) = split_attr(line) {
                let current = sections.last_mut().expect("sections never empty");
                if prefixed && current.kind == SectionKind::Peer {
                    current.enabled = false;
                }
                current.set(key, value);
            }
        }

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
            let mut lines = vec![format!("# {}", peer.name), "[Peer]".to_string()];
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
        _server_config: &ConfigDocument,
    ) -> String {
        render_client_config(params, &[])
    }

    fn add_peer(&self, doc: &mut ConfigDocument, pubkey: &str, name: &str) {
        push_new_peer(doc, pubkey, name);
    }

    fn rename_peer(&self, doc: &mut ConfigDocument, pubkey: &str, new_name: &str) -> Result<()> {
        doc.require_peer_mut(pubkey)?.name = new_name.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ATTR_ALLOWED_IPS, ATTR_PUBLIC_KEY};

    const SAMPLE: &str = "\
[Interface]
PrivateKey = server-priv=
Address = 10.8.0.1/24
ListenPort = 51820

# alice
[Peer]
PublicKey = alice-pub=
AllowedIPs = 10.8.0.2/32

#!# bob
#![Peer]
#!PublicKey = bob-pub=
#!AllowedIPs = 10.8.0.3/32
";

    #[test]
    fn test_parse_sections_and_names() {
        let doc = WireguardProtocol.parse_config(SAMPLE).unwrap();

        assert_eq!(doc.interface().get("Address"), Some("10.8.0.1/24"));
        assert_eq!(doc.interface().get("ListenPort"), Some("51820"));

        let names: Vec<&str> = doc.peers().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(
            doc.peer_by_pubkey("alice-pub=").unwrap().get(ATTR_ALLOWED_IPS),
            Some("10.8.0.2/32")
        );
    }

    #[test]
    fn test_parse_disabled_peer() {
        let doc = WireguardProtocol.parse_config(SAMPLE).unwrap();
        assert!(doc.peer_by_pubkey("alice-pub=").unwrap().enabled);
        assert!(!doc.peer_by_pubkey("bob-pub=").unwrap().enabled);
    }

    #[test]
    fn test_roundtrip_is_stable() {
        let protocol = WireguardProtocol;
        let doc = protocol.parse_config(SAMPLE).unwrap();
        let text = protocol.serialize_config(&doc);
        let reparsed = protocol.parse_config(&text).unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn test_serialized_disabled_peer_is_fully_prefixed() {
        let protocol = WireguardProtocol;
        let doc = protocol.parse_config(SAMPLE).unwrap();
        let text = protocol.serialize_config(&doc);

        assert!(text.contains("#!# bob"));
        assert!(text.contains("#![Peer]"));
        assert!(text.contains("#!PublicKey = bob-pub="));
        // alice stays untouched
        assert!(text.contains("\n# alice\n[Peer]\nPublicKey = alice-pub=\n"));
    }

    #[test]
    fn test_add_and_rename_peer() {
        let protocol = WireguardProtocol;
        let mut doc = protocol.parse_config(SAMPLE).unwrap();

        protocol.add_peer(&mut doc, "carol-pub=", "carol");
        doc.peer_by_pubkey_mut("carol-pub=")
            .unwrap()
            .set(ATTR_ALLOWED_IPS, "10.8.0.4/32");

        protocol.rename_peer(&mut doc, "carol-pub=", "carol-laptop").unwrap();
        let text = protocol.serialize_config(&doc);
        assert!(text.contains("# carol-laptop\n[Peer]\nPublicKey = carol-pub=\n"));
    }

    #[test]
    fn test_rename_disabled_peer() {
        let protocol = WireguardProtocol;
        let mut doc = protocol.parse_config(SAMPLE).unwrap();

        protocol.rename_peer(&mut doc, "bob-pub=", "bob-phone").unwrap();
        let text = protocol.serialize_config(&doc);
        assert!(text.contains("#!# bob-phone"));
    }

    #[test]
    fn test_rename_unknown_peer_is_not_found() {
        let protocol = WireguardProtocol;
        let mut doc = protocol.parse_config(SAMPLE).unwrap();
        assert!(protocol.rename_peer(&mut doc, "missing", "x").is_err());
    }

    #[test]
    fn test_parse_requires_public_key_for_lookup() {
        let doc = WireguardProtocol.parse_config(SAMPLE).unwrap();
        let bob = doc.peer_by_pubkey("bob-pub=").unwrap();
        assert_eq!(bob.get(ATTR_PUBLIC_KEY), Some("bob-pub="));
    }
}
