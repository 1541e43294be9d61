//! Protocol dialects
//!
//! Everything dialect-specific lives behind the [`Protocol`] trait: the
//! external binary names, how a peer's display name is encoded in the
//! config text, the extra obfuscation parameters, and how config text is
//! parsed into and serialized from a [`ConfigDocument`]. The server
//! implementations stay dialect-agnostic by holding a protocol instance.

mod amnezia;
mod wireguard;

pub use amnezia::{AmneziaProtocol, OBFUSCATION_PARAMS};
pub use wireguard::WireguardProtocol;

use crate::descriptor::ProtocolKind;
use crate::error::Result;
use crate::store::{ConfigDocument, Section};

/// Inputs for rendering a one-shot client profile
#[derive(Debug)]
pub struct ClientConfigParams<'a> {
    /// The freshly generated peer private key
    pub private_key: &'a str,
    /// The `/32` address assigned to the peer
    pub address: &'a str,
    /// The server's public key
    pub server_public_key: &'a str,
    /// Host clients dial
    pub endpoint: &'a str,
    /// The server's listen port
    pub server_port: &'a str,
}

/// Dialect-specific knowledge, pure and stateless
pub trait Protocol: Send + Sync {
    /// The control binary (`wg` or `awg`)
    fn command(&self) -> &'static str;

    /// The interface helper binary (`wg-quick` or `awg-quick`)
    fn quick_command(&self) -> &'static str;

    /// Parse config text into a structured document
    fn parse_config(&self, text: &str) -> Result<ConfigDocument>;

    /// Serialize a document back to config text. Round-trip stable with
    /// [`Protocol::parse_config`] modulo attribute ordering.
    fn serialize_config(&self, doc: &ConfigDocument) -> String;

    /// Render a ready-to-import client profile
    fn build_client_config(
        &self,
        params: &ClientConfigParams<'_>,
        server_config: &ConfigDocument,
    ) -> String;

    /// Append a new peer section carrying the dialect's name encoding
    fn add_peer(&self, doc: &mut ConfigDocument, pubkey: &str, name: &str);

    /// Change a peer's display name; works on disabled peers too
    fn rename_peer(&self, doc: &mut ConfigDocument, pubkey: &str, new_name: &str) -> Result<()>;
}

/// Instantiate the protocol for a descriptor's dialect
pub fn protocol_for(kind: ProtocolKind) -> Box<dyn Protocol> {
    match kind {
        ProtocolKind::WireGuard => Box::new(WireguardProtocol),
        ProtocolKind::AmneziaWG => Box::new(AmneziaProtocol),
    }
}

/// Render the client profile shared by both dialects.
///
/// `interface_extra` lets a dialect append additional `[Interface]`
/// attributes (AmneziaWG's obfuscation parameters).
pub(crate) fn render_client_config(
    params: &ClientConfigParams<'_>,
    interface_extra: &[(String, String)],
) -> String {
    let mut text = String::new();
    text.push_str("[Interface]\n");
    text.push_str(&format!("PrivateKey = {}\n", params.private_key));
    text.push_str(&format!("Address = {}\n", params.address));
    text.push_str("DNS = 1.1.1.1, 1.0.0.1\n");
    for (key, value) in interface_extra {
        text.push_str(&format!("{} = {}\n", key, value));
    }

    text.push_str("\n[Peer]\n");
    text.push_str(&format!("PublicKey = {}\n", params.server_public_key));
    text.push_str("AllowedIPs = 0.0.0.0/0\n");
    text.push_str(&format!(
        "Endpoint = {}:{}\n",
        params.endpoint, params.server_port
    ));
    text.push_str("PersistentKeepalive = 30\n");
    text
}

/// Shared `key = value` line handling: strip the disabled prefix, split on
/// the first `=`, trim both halves. Returns `None` for non-attribute lines.
pub(crate) fn split_attr(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

/// Append one new, enabled peer section with its public key
pub(crate) fn push_new_peer(doc: &mut ConfigDocument, pubkey: &str, name: &str) {
    let mut section = Section::peer(name);
    section.set(crate::store::ATTR_PUBLIC_KEY, pubkey);
    doc.push_peer(section);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ClientConfigParams<'static> {
        ClientConfigParams {
            private_key: "priv-key",
            address: "10.8.0.2/32",
            server_public_key: "server-pub",
            endpoint: "vpn.example.com",
            server_port: "51820",
        }
    }

    #[test]
    fn test_render_client_config_layout() {
        let text = render_client_config(&params(), &[]);
        assert!(text.starts_with("[Interface]\n"));
        assert!(text.contains("PrivateKey = priv-key\n"));
        assert!(text.contains("Address = 10.8.0.2/32\n"));
        assert!(text.contains("DNS = 1.1.1.1, 1.0.0.1\n"));
        assert!(text.contains("\n[Peer]\n"));
        assert!(text.contains("Endpoint = vpn.example.com:51820\n"));
        assert!(text.contains("PersistentKeepalive = 30\n"));
    }

    #[test]
    fn test_render_client_config_extra_goes_into_interface() {
        let extra = vec![("Jc".to_string(), "4".to_string())];
        let text = render_client_config(&params(), &extra);
        let interface_block = text.split("[Peer]").next().unwrap();
        assert!(interface_block.contains("Jc = 4\n"));
    }

    #[test]
    fn test_split_attr() {
        assert_eq!(split_attr("Key = Value"), Some(("Key", "Value")));
        // Base64 values keep their trailing '='
        assert_eq!(split_attr("PublicKey = abc="), Some(("PublicKey", "abc=")));
        assert_eq!(split_attr("no attr here"), None);
        assert_eq!(split_attr("= value"), None);
    }
}
