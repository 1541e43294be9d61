//! RouterOS backend
//!
//! Implements the same peer-lifecycle contract over the board's API
//! resources: `/interface/wireguard` for the interface,
//! `/interface/wireguard/peers` for peers, `/ip/address` for the subnet.
//! The config view is synthesized from these reads so callers cannot
//! tell the backends apart by config shape.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::allocator::next_available_address;
use crate::error::{Result, StewardError};
use crate::keys::KeyPair;
use crate::protocol::{ClientConfigParams, Protocol};
use crate::server::{validate_peer_name, PeerMap, PeerStatus, VpnServer};
use crate::store::{
    ConfigDocument, Section, ATTR_ADDRESS, ATTR_ALLOWED_IPS, ATTR_LISTEN_PORT, ATTR_PUBLIC_KEY,
};
use crate::transport::routeros::{RouterOsClient, Row};

const IFACE_RESOURCE: &str = "/interface/wireguard";
const PEERS_RESOURCE: &str = "/interface/wireguard/peers";
const ADDRESS_RESOURCE: &str = "/ip/address";

/// Delay between disable and enable on a restart
const RESTART_DELAY: Duration = Duration::from_secs(3);

/// A WireGuard server on a RouterOS board, reached through the API
pub struct RouterOsServer {
    name: String,
    interface: String,
    endpoint: String,
    client: RouterOsClient,
    protocol: Box<dyn Protocol>,
    /// Serializes multi-call mutations, matching the Linux backend
    mutation_lock: Mutex<()>,
}

impl RouterOsServer {
    /// Build a server over an already-logged-in API client
    pub fn new(
        name: impl Into<String>,
        interface: impl Into<String>,
        endpoint: impl Into<String>,
        client: RouterOsClient,
        protocol: Box<dyn Protocol>,
    ) -> Self {
        Self {
            name: name.into(),
            interface: interface.into(),
            endpoint: endpoint.into(),
            client,
            protocol,
            mutation_lock: Mutex::new(()),
        }
    }

    async fn interface_row(&self) -> Result<Row> {
        let rows = self
            .client
            .call(
                &format!("{}/print", IFACE_RESOURCE),
                &[],
                &[("name", self.interface.as_str())],
            )
            .await?;
        rows.into_iter().next().ok_or_else(|| {
            StewardError::NotFound(format!("No WireGuard interface '{}'", self.interface))
        })
    }

    async fn peer_rows(&self) -> Result<Vec<Row>> {
        self.client
            .call(
                &format!("{}/print", PEERS_RESOURCE),
                &[],
                &[("interface", self.interface.as_str())],
            )
            .await
    }

    /// Find a peer row by public key; `NotFound` when absent
    async fn peer_row(&self, pubkey: &str) -> Result<Row> {
        let rows = self
            .client
            .call(
                &format!("{}/print", PEERS_RESOURCE),
                &[],
                &[("interface", self.interface.as_str()), ("public-key", pubkey)],
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StewardError::NotFound(format!("No peer with public key {}", pubkey)))
    }

    /// The interface CIDR from `/ip/address`
    async fn interface_address(&self) -> Result<String> {
        let rows = self
            .client
            .call(
                &format!("{}/print", ADDRESS_RESOURCE),
                &[],
                &[("interface", self.interface.as_str())],
            )
            .await?;
        let row = rows.into_iter().next().ok_or_else(|| {
            StewardError::NotFound(format!(
                "No address configured on interface '{}'",
                self.interface
            ))
        })?;
        require_field(&row, "address")
    }

    async fn synthesize_document(&self) -> Result<ConfigDocument> {
        let interface_row = self.interface_row().await?;
        let address = self.interface_address().await?;
        let peer_rows = self.peer_rows().await?;
        document_from_rows(&interface_row, &address, &peer_rows)
    }
}

#[async_trait]
impl VpnServer for RouterOsServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_config(&self) -> Result<String> {
        let doc = self.synthesize_document().await?;
        Ok(self.protocol.serialize_config(&doc))
    }

    async fn get_parsed_config(&self) -> Result<ConfigDocument> {
        self.synthesize_document().await
    }

    async fn interface_enabled(&self) -> Result<bool> {
        let row = self.interface_row().await?;
        Ok(!is_true(row.get("disabled")))
    }

    async fn set_interface_enabled(&self, enabled: bool) -> Result<()> {
        let row = self.interface_row().await?;
        let id = require_field(&row, ".id")?;
        self.client
            .call(
                &format!("{}/set", IFACE_RESOURCE),
                &[(".id", id.as_str()), ("disabled", bool_word(!enabled))],
                &[],
            )
            .await?;
        info!(
            "Interface {} set {}",
            self.interface,
            if enabled { "up" } else { "down" }
        );
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.set_interface_enabled(false).await?;
        tokio::time::sleep(RESTART_DELAY).await;
        self.set_interface_enabled(true).await
    }

    async fn reboot_host(&self) -> Result<()> {
        warn!("Rebooting board of server '{}'", self.name);
        self.client.call("/system/reboot", &[], &[]).await?;
        Ok(())
    }

    async fn get_peers(&self) -> Result<PeerMap> {
        if !self.interface_enabled().await? {
            return Ok(PeerMap::new());
        }

        let mut peers = PeerMap::new();
        for row in self.peer_rows().await? {
            let status = peer_status_from_row(&row);
            let name = row
                .get("name")
                .filter(|name| !name.is_empty())
                .cloned()
                .unwrap_or_else(|| status.public_key.clone());
            peers.insert(name, status);
        }
        Ok(peers)
    }

    async fn add_peer(&self, name: &str) -> Result<String> {
        validate_peer_name(name)?;
        let _guard = self.mutation_lock.lock().await;

        let doc = self.synthesize_document().await?;
        let address = next_available_address(&doc)?.ok_or_else(|| {
            StewardError::AddressPoolExhausted(format!(
                "No free address left in the subnet of {}",
                self.interface
            ))
        })?;

        let interface_row = self.interface_row().await?;
        let server_public_key = require_field(&interface_row, "public-key")?;
        let server_port = require_field(&interface_row, "listen-port")?;

        // No genkey shell on the board, so the keypair is generated locally
        let keypair = KeyPair::generate();
        let public_key = keypair.public.to_base64();
        let address_str = address.to_string();

        self.client
            .call(
                &format!("{}/add", PEERS_RESOURCE),
                &[
                    ("interface", self.interface.as_str()),
                    ("name", name),
                    ("public-key", public_key.as_str()),
                    ("allowed-address", address_str.as_str()),
                ],
                &[],
            )
            .await?;
        info!(
            "Added peer '{}' ({}) at {} on '{}'",
            name, public_key, address, self.name
        );

        let private_key = keypair.private.to_base64();
        Ok(self.protocol.build_client_config(
            &ClientConfigParams {
                private_key: &private_key,
                address: &address_str,
                server_public_key: &server_public_key,
                endpoint: &self.endpoint,
                server_port: &server_port,
            },
            &doc,
        ))
    }

    async fn delete_peer(&self, pubkey: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;

        let row = self.peer_row(pubkey).await?;
        let id = require_field(&row, ".id")?;
        self.client
            .call(&format!("{}/remove", PEERS_RESOURCE), &[(".id", id.as_str())], &[])
            .await?;
        info!("Deleted peer {} on '{}'", pubkey, self.name);
        Ok(())
    }

    async fn set_peer_enabled(&self, pubkey: &str, enabled: bool) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;

        let row = self.peer_row(pubkey).await?;
        let id = require_field(&row, ".id")?;
        self.client
            .call(
                &format!("{}/set", PEERS_RESOURCE),
                &[(".id", id.as_str()), ("disabled", bool_word(!enabled))],
                &[],
            )
            .await?;
        info!(
            "Peer {} on '{}' set {}",
            pubkey,
            self.name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    async fn get_peer_enabled(&self, pubkey: &str) -> Result<bool> {
        let row = self.peer_row(pubkey).await?;
        Ok(!is_true(row.get("disabled")))
    }

    async fn rename_peer(&self, pubkey: &str, new_name: &str) -> Result<()> {
        validate_peer_name(new_name)?;
        let _guard = self.mutation_lock.lock().await;

        let row = self.peer_row(pubkey).await?;
        let id = require_field(&row, ".id")?;
        self.client
            .call(
                &format!("{}/set", PEERS_RESOURCE),
                &[(".id", id.as_str()), ("name", new_name)],
                &[],
            )
            .await?;
        info!("Renamed peer {} to '{}' on '{}'", pubkey, new_name, self.name);
        Ok(())
    }
}

/// Compose the INI-equivalent document from API reads
fn document_from_rows(
    interface_row: &Row,
    address: &str,
    peer_rows: &[Row],
) -> Result<ConfigDocument> {
    let mut interface = Section::interface();
    if let Some(private_key) = interface_row.get("private-key") {
        interface.set("PrivateKey", private_key);
    }
    if let Some(port) = interface_row.get("listen-port") {
        interface.set(ATTR_LISTEN_PORT, port);
    }
    interface.set(ATTR_ADDRESS, address);

    let mut doc = ConfigDocument::new(interface);
    for row in peer_rows {
        let public_key = require_field(row, "public-key")?;
        let name = row
            .get("name")
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| public_key.clone());

        let mut peer = Section::peer(&name);
        peer.enabled = !is_true(row.get("disabled"));
        peer.set(ATTR_PUBLIC_KEY, &public_key);
        if let Some(allowed) = row.get("allowed-address") {
            peer.set(ATTR_ALLOWED_IPS, allowed);
        }
        doc.push_peer(peer);
    }
    Ok(doc)
}

/// Map one peer row to its live status view
fn peer_status_from_row(row: &Row) -> PeerStatus {
    let endpoint = match (
        row.get("current-endpoint-address"),
        row.get("current-endpoint-port"),
    ) {
        (Some(addr), Some(port)) if !addr.is_empty() => Some(format!("{}:{}", addr, port)),
        _ => None,
    };

    PeerStatus {
        public_key: row.get("public-key").cloned().unwrap_or_default(),
        endpoint,
        allowed_ips: row.get("allowed-address").cloned(),
        latest_handshake: row.get("last-handshake").cloned(),
        transfer_rx: row.get("rx").cloned(),
        transfer_tx: row.get("tx").cloned(),
        persistent_keepalive: row.get("persistent-keepalive").cloned(),
    }
}

fn require_field(row: &Row, field: &str) -> Result<String> {
    row.get(field).cloned().ok_or_else(|| {
        StewardError::Parse(format!("RouterOS reply is missing field '{}'", field))
    })
}

fn is_true(value: Option<&String>) -> bool {
    matches!(value.map(String::as_str), Some("true") | Some("yes"))
}

fn bool_word(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
