//! Server registry
//!
//! Builds concrete servers from their descriptors and caches one live
//! instance per logical name so repeated requests reuse the same
//! connection. The registry is an explicit object owned by the
//! application root; there is no ambient global state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::descriptor::{ServerDescriptor, ServerKind, ServersFile};
use crate::error::{Result, StewardError};
use crate::protocol::protocol_for;
use crate::server::{LinuxServer, RouterOsServer, VpnServer};
use crate::transport::routeros::{RouterOsClient, RouterOsParams};
use crate::transport::{LocalTransport, SshParams, SshTransport, Transport};

/// Factory and cache for server instances
pub struct ServerRegistry {
    descriptors: HashMap<String, ServerDescriptor>,
    instances: Mutex<HashMap<String, Arc<dyn VpnServer>>>,
}

impl ServerRegistry {
    /// Create a registry over a descriptor map
    pub fn new(descriptors: HashMap<String, ServerDescriptor>) -> Self {
        Self {
            descriptors,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Create a registry from a parsed servers file
    pub fn from_servers_file(file: ServersFile) -> Self {
        Self::new(file.servers)
    }

    /// The configured logical server names, sorted
    pub fn server_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get the cached instance for `name`, constructing and connecting it
    /// on first use.
    ///
    /// Validation failures and connection failures are returned to the
    /// caller; a server that failed to connect is not cached, so the next
    /// call retries from scratch. Once cached, the same instance is
    /// returned for the registry's lifetime regardless of descriptor
    /// edits.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn VpnServer>> {
        let mut instances = self.instances.lock().await;

        if let Some(server) = instances.get(name) {
            debug!("Reusing cached server instance '{}'", name);
            return Ok(server.clone());
        }

        let descriptor = self
            .descriptors
            .get(name)
            .ok_or_else(|| StewardError::NotFound(format!("No server named '{}'", name)))?;
        descriptor.validate()?;

        let server = build_server(name, descriptor).await?;
        info!("Connected server '{}'", name);
        instances.insert(name.to_string(), server.clone());
        Ok(server)
    }
}

async fn build_server(name: &str, descriptor: &ServerDescriptor) -> Result<Arc<dyn VpnServer>> {
    let protocol = protocol_for(descriptor.protocol);
    let endpoint = descriptor.endpoint()?.to_string();

    match descriptor.kind {
        ServerKind::Linux => {
            let transport: Box<dyn Transport> = match &descriptor.host {
                Some(host) => Box::new(
                    SshTransport::connect(SshParams {
                        host: host.clone(),
                        port: descriptor.port(),
                        username: required(&descriptor.username, "username")?,
                        password: descriptor.password.clone(),
                        key_file: descriptor.key_file.clone(),
                    })
                    .await?,
                ),
                None => Box::new(LocalTransport::new()),
            };

            Ok(Arc::new(LinuxServer::new(
                name,
                descriptor.interface.clone(),
                descriptor.config_path.clone(),
                endpoint,
                transport,
                protocol,
            )))
        }
        ServerKind::RouterOs => {
            let client = RouterOsClient::connect(RouterOsParams {
                host: required(&descriptor.host, "host")?,
                port: descriptor.port(),
                username: required(&descriptor.username, "username")?,
                password: required(&descriptor.password, "password")?,
            })
            .await?;

            Ok(Arc::new(RouterOsServer::new(
                name,
                descriptor.interface.clone(),
                endpoint,
                client,
                protocol,
            )))
        }
    }
}

fn required(field: &Option<String>, what: &str) -> Result<String> {
    field
        .clone()
        .ok_or_else(|| StewardError::Config(format!("Descriptor is missing required '{}'", what)))
}
