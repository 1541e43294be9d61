//! Structured WireGuard configuration model
//!
//! An ordered document of sections: the `Interface` section first, then one
//! section per peer keyed by its display name. Attribute order inside a
//! section is preserved so a parse/serialize cycle leaves the file layout
//! intact. Whether a peer is enabled is a first-class bool here; the
//! on-disk `#!` comment-prefix encoding is applied only by the dialect
//! serializers.

use crate::error::{Result, StewardError};

/// Well-known attribute: a peer's public key
pub const ATTR_PUBLIC_KEY: &str = "PublicKey";
/// Well-known attribute: a peer's tunnelled address
pub const ATTR_ALLOWED_IPS: &str = "AllowedIPs";
/// Well-known attribute: the interface subnet address
pub const ATTR_ADDRESS: &str = "Address";
/// Well-known attribute: the interface listen port
pub const ATTR_LISTEN_PORT: &str = "ListenPort";

/// Section role inside a config document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// The server-side `[Interface]` block
    Interface,
    /// One `[Peer]` block
    Peer,
}

/// One section of a WireGuard config: an ordered attribute list plus the
/// metadata the raw file encodes in comments (display name, enabled bit)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Display name: `"Interface"` for the interface block, the peer's
    /// human-readable name otherwise
    pub name: String,
    /// Whether this is the interface block or a peer block
    pub kind: SectionKind,
    /// Disabled peers stay in the file but are commented out
    pub enabled: bool,
    attrs: Vec<(String, String)>,
}

impl Section {
    /// Create an empty interface section
    pub fn interface() -> Self {
        Self {
            name: "Interface".to_string(),
            kind: SectionKind::Interface,
            enabled: true,
            attrs: Vec::new(),
        }
    }

    /// Create an empty, enabled peer section
    pub fn peer(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: SectionKind::Peer,
            enabled: true,
            attrs: Vec::new(),
        }
    }

    /// Get an attribute value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get an attribute value, raising a loud parse error when absent
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            StewardError::Parse(format!(
                "Section '{}' is missing expected key '{}'",
                self.name, key
            ))
        })
    }

    /// Set an attribute, replacing an existing value in place or appending
    pub fn set(&mut self, key: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((key.to_string(), value.to_string())),
        }
    }

    /// Iterate attributes in file order
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The peer's public key, when present
    pub fn public_key(&self) -> Option<&str> {
        self.get(ATTR_PUBLIC_KEY)
    }
}

/// An ordered WireGuard configuration document
///
/// Invariant: exactly one interface section, always first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    sections: Vec<Section>,
}

impl ConfigDocument {
    /// Create a document from an interface section
    pub fn new(interface: Section) -> Self {
        debug_assert_eq!(interface.kind, SectionKind::Interface);
        Self {
            sections: vec![interface],
        }
    }

    /// Build a document from parsed sections, enforcing the single
    /// leading interface section
    pub fn from_sections(sections: Vec<Section>) -> Result<Self> {
        let interfaces = sections
            .iter()
            .filter(|s| s.kind == SectionKind::Interface)
            .count();
        if interfaces != 1 {
            return Err(StewardError::Parse(format!(
                "Expected exactly one Interface section, found {}",
                interfaces
            )));
        }
        if sections[0].kind != SectionKind::Interface {
            return Err(StewardError::Parse(
                "Interface section must come first".to_string(),
            ));
        }
        Ok(Self { sections })
    }

    /// The interface section
    pub fn interface(&self) -> &Section {
        &self.sections[0]
    }

    /// The interface section, mutable
    pub fn interface_mut(&mut self) -> &mut Section {
        &mut self.sections[0]
    }

    /// All sections in file order, interface first
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// Peer sections in file order
    pub fn peers(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.kind == SectionKind::Peer)
    }

    /// Find a peer by its public key
    pub fn peer_by_pubkey(&self, pubkey: &str) -> Option<&Section> {
        self.peers().find(|s| s.public_key() == Some(pubkey))
    }

    /// Find a peer by its public key, mutable
    pub fn peer_by_pubkey_mut(&mut self, pubkey: &str) -> Option<&mut Section> {
        self.sections
            .iter_mut()
            .filter(|s| s.kind == SectionKind::Peer)
            .find(|s| s.public_key() == Some(pubkey))
    }

    /// Find a peer by its public key, raising `NotFound` when absent
    pub fn require_peer_mut(&mut self, pubkey: &str) -> Result<&mut Section> {
        self.peer_by_pubkey_mut(pubkey)
            .ok_or_else(|| StewardError::NotFound(format!("No peer with public key {}", pubkey)))
    }

    /// Append a peer section
    pub fn push_peer(&mut self, section: Section) {
        debug_assert_eq!(section.kind, SectionKind::Peer);
        self.sections.push(section);
    }

    /// Remove a peer by public key; false when no such peer exists
    pub fn remove_peer(&mut self, pubkey: &str) -> bool {
        let before = self.sections.len();
        self.sections
            .retain(|s| s.kind != SectionKind::Peer || s.public_key() != Some(pubkey));
        self.sections.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> ConfigDocument {
        let mut interface = Section::interface();
        interface.set(ATTR_ADDRESS, "10.0.0.1/24");
        interface.set(ATTR_LISTEN_PORT, "51820");
        let mut doc = ConfigDocument::new(interface);

        let mut alice = Section::peer("alice");
        alice.set(ATTR_PUBLIC_KEY, "alice-key");
        alice.set(ATTR_ALLOWED_IPS, "10.0.0.2/32");
        doc.push_peer(alice);
        doc
    }

    #[test]
    fn test_attr_set_replaces_in_place() {
        let mut section = Section::interface();
        section.set("ListenPort", "51820");
        section.set("Address", "10.0.0.1/24");
        section.set("ListenPort", "51821");

        assert_eq!(section.get("ListenPort"), Some("51821"));
        let keys: Vec<&str> = section.attrs().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["ListenPort", "Address"]);
    }

    #[test]
    fn test_require_missing_key_is_loud() {
        let section = Section::interface();
        let err = section.require("Address").unwrap_err();
        assert!(err.to_string().contains("Address"));
    }

    #[test]
    fn test_peer_lookup_by_pubkey() {
        let doc = sample_document();
        assert_eq!(doc.peer_by_pubkey("alice-key").unwrap().name, "alice");
        assert!(doc.peer_by_pubkey("missing").is_none());
    }

    #[test]
    fn test_remove_peer() {
        let mut doc = sample_document();
        assert!(doc.remove_peer("alice-key"));
        assert!(!doc.remove_peer("alice-key"));
        assert_eq!(doc.peers().count(), 0);
    }

    #[test]
    fn test_from_sections_rejects_missing_interface() {
        let peer = Section::peer("alice");
        assert!(ConfigDocument::from_sections(vec![peer]).is_err());
    }

    #[test]
    fn test_from_sections_rejects_duplicate_interface() {
        let sections = vec![Section::interface(), Section::interface()];
        assert!(ConfigDocument::from_sections(sections).is_err());
    }
}
