//! Linux backend
//!
//! Orchestrates a [`Transport`] and a [`Protocol`] against the config
//! file on a Linux host. The file is the only source of truth: every
//! mutation re-reads it, edits the parsed document, writes it back and
//! resynchronizes the live interface without dropping peer sessions
//! (`syncconf` over a `strip`ped config instead of a down/up bounce).

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::allocator::next_available_address;
use crate::error::{Result, StewardError};
use crate::keys;
use crate::protocol::{ClientConfigParams, Protocol};
use crate::server::{validate_peer_name, PeerMap, PeerStatus, VpnServer};
use crate::store::{ConfigDocument, ATTR_ALLOWED_IPS, ATTR_LISTEN_PORT};
use crate::transport::Transport;

/// Delay between down and up on a full restart
const RESTART_DELAY: Duration = Duration::from_secs(3);

/// A WireGuard server on a Linux host, reached through a transport
pub struct LinuxServer {
    name: String,
    interface: String,
    config_path: String,
    endpoint: String,
    transport: Box<dyn Transport>,
    protocol: Box<dyn Protocol>,
    /// Serializes the whole download→mutate→upload→resync sequence so two
    /// concurrent mutations cannot lose each other's edit
    mutation_lock: Mutex<()>,
}

impl LinuxServer {
    /// Build a server over an already-connected transport
    pub fn new(
        name: impl Into<String>,
        interface: impl Into<String>,
        config_path: impl Into<String>,
        endpoint: impl Into<String>,
        transport: Box<dyn Transport>,
        protocol: Box<dyn Protocol>,
    ) -> Self {
        Self {
            name: name.into(),
            interface: interface.into(),
            config_path: config_path.into(),
            endpoint: endpoint.into(),
            transport,
            protocol,
            mutation_lock: Mutex::new(()),
        }
    }

    /// The server's own public key, from the live interface
    pub async fn server_public_key(&self) -> Result<String> {
        let command = format!("{} show {} public-key", self.protocol.command(), self.interface);
        let output = self.transport.execute(&command).await?;

        if output.has_stderr() || output.first_line().is_empty() {
            return Err(StewardError::Command(format!(
                "Could not read public key of {}: {}",
                self.interface,
                output.stderr.trim()
            )));
        }
        Ok(output.first_line().to_string())
    }

    /// Download and parse the current config
    async fn read_document(&self) -> Result<ConfigDocument> {
        let raw = self.transport.read_file(&self.config_path).await?;
        let text = String::from_utf8(raw).map_err(|e| {
            StewardError::Parse(format!("Config {} is not UTF-8: {}", self.config_path, e))
        })?;
        self.protocol.parse_config(&text)
    }

    /// Serialize, upload and resynchronize the live interface
    async fn commit_document(&self, doc: &ConfigDocument) -> Result<()> {
        let text = self.protocol.serialize_config(doc);
        self.transport
            .write_file(&self.config_path, text.as_bytes())
            .await?;
        self.resync().await
    }

    /// Reconcile the running interface with the config file without
    /// severing existing peer sessions
    async fn resync(&self) -> Result<()> {
        let command = format!(
            "bash -c '{cmd} syncconf {iface} <({quick} strip {path})'",
            cmd = self.protocol.command(),
            iface = self.interface,
            quick = self.protocol.quick_command(),
            path = self.config_path,
        );
        let output = self.transport.execute(&command).await?;

        if let Some(code) = output.exit_status {
            if code != 0 {
                return Err(StewardError::Command(format!(
                    "syncconf of {} failed ({}): {}",
                    self.interface,
                    code,
                    output.stderr.trim()
                )));
            }
        }
        debug!("Interface {} resynchronized", self.interface);
        Ok(())
    }

    /// Generate a fresh keypair with the dialect's genkey/pubkey commands
    async fn generate_keypair(&self) -> Result<(String, String)> {
        let cmd = self.protocol.command();

        let output = self.transport.execute(&format!("{} genkey", cmd)).await?;
        let private_key = output.first_line().to_string();
        keys::validate_key(&private_key)
            .map_err(|e| StewardError::Command(format!("genkey returned no usable key: {}", e)))?;

        let output = self
            .transport
            .execute(&format!("echo '{}' | {} pubkey", private_key, cmd))
            .await?;
        let public_key = output.first_line().to_string();
        keys::validate_key(&public_key)
            .map_err(|e| StewardError::Command(format!("pubkey returned no usable key: {}", e)))?;

        Ok((private_key, public_key))
    }
}

#[async_trait]
impl VpnServer for LinuxServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_config(&self) -> Result<String> {
        let raw = self.transport.read_file(&self.config_path).await?;
        String::from_utf8(raw).map_err(|e| {
            StewardError::Parse(format!("Config {} is not UTF-8: {}", self.config_path, e))
        })
    }

    async fn get_parsed_config(&self) -> Result<ConfigDocument> {
        self.read_document().await
    }

    async fn interface_enabled(&self) -> Result<bool> {
        let command = format!("{} show {}", self.protocol.command(), self.interface);
        let output = self.transport.execute(&command).await?;
        Ok(!output.stdout.trim().is_empty())
    }

    async fn set_interface_enabled(&self, enabled: bool) -> Result<()> {
        let state = if enabled { "up" } else { "down" };
        let command = format!("{} {} {}", self.protocol.quick_command(), state, self.interface);
        let output = self.transport.execute(&command).await?;

        // quick exits nonzero when the interface is already in the
        // requested state; treat the toggle as idempotent
        if output.has_stderr() {
            debug!(
                "{} {} {}: {}",
                self.protocol.quick_command(),
                state,
                self.interface,
                output.stderr.trim()
            );
        }
        info!("Interface {} set {}", self.interface, state);
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.set_interface_enabled(false).await?;
        tokio::time::sleep(RESTART_DELAY).await;
        self.set_interface_enabled(true).await
    }

    async fn reboot_host(&self) -> Result<()> {
        warn!("Rebooting host of server '{}'", self.name);
        self.transport.execute("reboot").await?;
        Ok(())
    }

    async fn get_peers(&self) -> Result<PeerMap> {
        let command = format!("{} show {}", self.protocol.command(), self.interface);
        let output = self.transport.execute(&command).await?;

        // No live state while the interface is down
        if output.has_stderr() || output.stdout.trim().is_empty() {
            return Ok(PeerMap::new());
        }

        let doc = self.read_document().await?;
        let names: std::collections::HashMap<&str, &str> = doc
            .peers()
            .filter_map(|p| p.public_key().map(|key| (key, p.name.as_str())))
            .collect();

        let mut peers = PeerMap::new();
        for (pubkey, status) in parse_show_output(&output.stdout) {
            let name = names.get(pubkey.as_str()).copied().unwrap_or(pubkey.as_str());
            peers.insert(name.to_string(), status);
        }
        Ok(peers)
    }

    async fn add_peer(&self, name: &str) -> Result<String> {
        validate_peer_name(name)?;
        let _guard = self.mutation_lock.lock().await;

        let (private_key, public_key) = self.generate_keypair().await?;
        let mut doc = self.read_document().await?;

        let address = next_available_address(&doc)?.ok_or_else(|| {
            StewardError::AddressPoolExhausted(format!(
                "No free address left in the subnet of {}",
                self.interface
            ))
        })?;
        let server_public_key = self.server_public_key().await?;
        let server_port = doc.interface().require(ATTR_LISTEN_PORT)?.to_string();
        let address_str = address.to_string();

        self.protocol.add_peer(&mut doc, &public_key, name);
        doc.require_peer_mut(&public_key)?
            .set(ATTR_ALLOWED_IPS, &address_str);
        self.commit_document(&doc).await?;
        info!(
            "Added peer '{}' ({}) at {} on '{}'",
            name, public_key, address_str, self.name
        );

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

        let mut doc = self.read_document().await?;
        if !doc.remove_peer(pubkey) {
            return Err(StewardError::NotFound(format!(
                "No peer with public key {}",
                pubkey
            )));
        }
        self.commit_document(&doc).await?;
        info!("Deleted peer {} on '{}'", pubkey, self.name);
        Ok(())
    }

    async fn set_peer_enabled(&self, pubkey: &str, enabled: bool) -> Result<()> {
        let _guard = self.mutation_lock.lock().await;

        let mut doc = self.read_document().await?;
        doc.require_peer_mut(pubkey)?.enabled = enabled;
        self.commit_document(&doc).await?;
        info!(
            "Peer {} on '{}' set {}",
            pubkey,
            self.name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    async fn get_peer_enabled(&self, pubkey: &str) -> Result<bool> {
        let doc = self.read_document().await?;
        doc.peer_by_pubkey(pubkey)
            .map(|p| p.enabled)
            .ok_or_else(|| StewardError::NotFound(format!("No peer with public key {}", pubkey)))
    }

    async fn rename_peer(&self, pubkey: &str, new_name: &str) -> Result<()> {
        validate_peer_name(new_name)?;
        let _guard = self.mutation_lock.lock().await;

        let mut doc = self.read_document().await?;
        self.protocol.rename_peer(&mut doc, pubkey, new_name)?;
        self.commit_document(&doc).await?;
        info!("Renamed peer {} to '{}' on '{}'", pubkey, new_name, self.name);
        Ok(())
    }
}

/// Parse `wg show <iface>` output into per-peer status, skipping the
/// interface's own block
fn parse_show_output(stdout: &str) -> Vec<(String, PeerStatus)> {
    let mut peers = Vec::new();

    for block in stdout.split("\n\n") {
        let mut lines = block.lines();
        let header = match lines.next() {
            Some(line) => line.trim(),
            None => continue,
        };

        let pubkey = match header.strip_prefix("peer:") {
            Some(rest) => rest.trim().to_string(),
            None => continue, // the interface block, or noise
        };

        let mut status = PeerStatus {
            public_key: pubkey.clone(),
            ..Default::default()
        };

        for line in lines {
            let Some((key, value)) = line.trim().split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "endpoint" => status.endpoint = Some(value.to_string()),
                "allowed ips" => status.allowed_ips = Some(value.to_string()),
                "latest handshake" => status.latest_handshake = Some(value.to_string()),
                "transfer" => {
                    // "1.21 MiB received, 642.60 KiB sent"
                    for part in value.split(',') {
                        let part = part.trim();
                        if let Some(rx) = part.strip_suffix(" received") {
                            status.transfer_rx = Some(rx.to_string());
                        } else if let Some(tx) = part.strip_suffix(" sent") {
                            status.transfer_tx = Some(tx.to_string());
                        }
                    }
                }
                "persistent keepalive" => {
                    status.persistent_keepalive = Some(value.to_string())
                }
                _ => {}
            }
        }

        peers.push((pubkey, status));
    }

    peers
}
