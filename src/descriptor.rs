//! Server descriptors
//!
//! Declarative description of the managed servers, loaded from a
//! `servers.toml` file. A descriptor is immutable once a server instance
//! has been constructed from it.

use crate::error::{Result, StewardError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Backend kind for a managed server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerKind {
    /// A Linux host reachable over SSH (or locally when no host is given)
    Linux,
    /// A MikroTik board speaking the RouterOS API
    #[serde(rename = "RouterOS")]
    RouterOs,
}

/// Protocol dialect spoken by a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolKind {
    /// Plain WireGuard (`wg`/`wg-quick`)
    WireGuard,
    /// The obfuscated AmneziaWG fork (`awg`/`awg-quick`)
    AmneziaWG,
}

/// Declarative configuration for one managed server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Backend kind
    pub kind: ServerKind,

    /// Protocol dialect
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolKind,

    /// WireGuard interface name on the server
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Endpoint clients should connect to; defaults to `host`
    pub endpoint: Option<String>,

    /// Path to the config file (Linux only)
    #[serde(default = "default_config_path")]
    pub config_path: String,

    /// Server host; a Linux descriptor without a host is managed locally
    pub host: Option<String>,

    /// Connection port; defaults to 22 for SSH, 8728 for the RouterOS API
    pub port: Option<u16>,

    /// Username for authentication
    pub username: Option<String>,

    /// Password for authentication (also used for key decryption)
    pub password: Option<String>,

    /// Private key file for SSH authentication
    pub key_file: Option<String>,
}

impl ServerDescriptor {
    /// The port to connect to, backend-appropriate default applied
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.kind {
            ServerKind::Linux => 22,
            ServerKind::RouterOs => 8728,
        })
    }

    /// The endpoint clients should dial, falling back to the host
    pub fn endpoint(&self) -> Result<&str> {
        self.endpoint
            .as_deref()
            .or(self.host.as_deref())
            .ok_or_else(|| {
                StewardError::Config("Descriptor has neither endpoint nor host".to_string())
            })
    }

    /// Validate required fields for the descriptor's backend kind
    pub fn validate(&self) -> Result<()> {
        if self.interface.is_empty() {
            return Err(StewardError::Config(
                "Interface name must not be empty".to_string(),
            ));
        }

        match self.kind {
            ServerKind::Linux => {
                // Local management needs no credentials; remote needs a user
                // plus either a password or a key file
                if let Some(host) = &self.host {
                    if host.is_empty() {
                        return Err(StewardError::Config("Host must not be empty".to_string()));
                    }
                    if self.username.is_none() {
                        return Err(StewardError::Config(
                            "Remote Linux server requires a username".to_string(),
                        ));
                    }
                    if self.password.is_none() && self.key_file.is_none() {
                        return Err(StewardError::Config(
                            "Remote Linux server requires a password or key file".to_string(),
                        ));
                    }
                }
                if self.config_path.is_empty() {
                    return Err(StewardError::Config(
                        "Linux server requires a config path".to_string(),
                    ));
                }
            }
            ServerKind::RouterOs => {
                if self.host.as_deref().unwrap_or("").is_empty() {
                    return Err(StewardError::Config(
                        "RouterOS server requires a host".to_string(),
                    ));
                }
                if self.username.is_none() || self.password.is_none() {
                    return Err(StewardError::Config(
                        "RouterOS server requires a username and password".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// The `servers.toml` file: a map of logical server names to descriptors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersFile {
    /// Named server descriptors
    #[serde(default)]
    pub servers: HashMap<String, ServerDescriptor>,
}

impl ServersFile {
    /// Load descriptors from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            StewardError::Config(format!("Failed to read servers file {:?}: {}", path, e))
        })?;
        Self::parse(&contents)
    }

    /// Parse descriptors from a TOML string
    pub fn parse(toml: &str) -> Result<Self> {
        let file: ServersFile = toml::from_str(toml)
            .map_err(|e| StewardError::Config(format!("Failed to parse servers file: {}", e)))?;
        Ok(file)
    }
}

// Default value functions for serde
fn default_protocol() -> ProtocolKind {
    ProtocolKind::WireGuard
}

fn default_interface() -> String {
    "wg0".to_string()
}

fn default_config_path() -> String {
    "/etc/wireguard/wg0.conf".to_string()
}
