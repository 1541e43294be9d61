//! Polymorphic server clients
//!
//! The [`VpnServer`] trait is the full peer-lifecycle contract; callers
//! never see which backend they are talking to. `LinuxServer` orchestrates
//! a transport, a protocol and the config document; `RouterOsServer`
//! drives the board's API resources and synthesizes an equivalent config
//! view.

mod linux;
mod registry;
mod routeros;

pub use linux::LinuxServer;
pub use registry::ServerRegistry;
pub use routeros::RouterOsServer;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::store::ConfigDocument;

/// Live state of one peer, cross-referenced with the static config for
/// its display name
#[derive(Debug, Clone, Default, Serialize)]
pub struct PeerStatus {
    /// The peer's public key
    pub public_key: String,
    /// Last seen endpoint, when the peer has connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// The peer's allowed addresses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<String>,
    /// Time of the most recent handshake, as reported by the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_handshake: Option<String>,
    /// Traffic received from the peer, as the backend reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_rx: Option<String>,
    /// Traffic sent to the peer, as the backend reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_tx: Option<String>,
    /// Keepalive interval, when configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<String>,
}

/// Map of peer display name to live status
pub type PeerMap = HashMap<String, PeerStatus>;

/// The peer-lifecycle contract every backend implements
#[async_trait]
pub trait VpnServer: Send + Sync {
    /// The logical server name from the descriptor file
    fn name(&self) -> &str;

    /// The raw config text (Linux: the file verbatim; RouterOS: a
    /// synthesized equivalent)
    async fn get_config(&self) -> Result<String>;

    /// The config parsed into a structured document
    async fn get_parsed_config(&self) -> Result<ConfigDocument>;

    /// Whether the interface is up
    async fn interface_enabled(&self) -> Result<bool>;

    /// Bring the interface up or down
    async fn set_interface_enabled(&self, enabled: bool) -> Result<()>;

    /// Bounce the interface: down, a short delay, up
    async fn restart(&self) -> Result<()>;

    /// Reboot the host or board
    async fn reboot_host(&self) -> Result<()>;

    /// Live peers keyed by display name; empty when the interface is down
    async fn get_peers(&self) -> Result<PeerMap>;

    /// Create a peer and return its one-shot client profile text
    async fn add_peer(&self, name: &str) -> Result<String>;

    /// Remove a peer; `NotFound` when the key is unknown
    async fn delete_peer(&self, pubkey: &str) -> Result<()>;

    /// Enable or disable a peer; idempotent, `NotFound` when unknown
    async fn set_peer_enabled(&self, pubkey: &str, enabled: bool) -> Result<()>;

    /// Whether a peer is enabled; `NotFound` when unknown
    async fn get_peer_enabled(&self, pubkey: &str) -> Result<bool>;

    /// Change a peer's display name; `NotFound` when unknown
    async fn rename_peer(&self, pubkey: &str, new_name: &str) -> Result<()>;
}

/// Reject names that would corrupt the comment-based name encoding when
/// the config is re-serialized
pub(crate) fn validate_peer_name(name: &str) -> Result<()> {
    use crate::error::StewardError;

    if name.trim().is_empty() {
        return Err(StewardError::Config(
            "Peer name must not be empty".to_string(),
        ));
    }
    if name.contains(['\n', '\r', '#', '=', '[', ']']) {
        return Err(StewardError::Config(format!(
            "Peer name '{}' contains characters not representable in the config",
            name
        )));
    }
    Ok(())
}
