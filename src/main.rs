//! wg-steward main entry point
//!
//! This binary is the operator surface: CLI parsing, logging setup, and
//! dispatch of one server operation per invocation through the registry.

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wg_steward::descriptor::ServersFile;
use wg_steward::server::{ServerRegistry, VpnServer};
use wg_steward::store::ConfigDocument;
use wg_steward::{APP_NAME, VERSION};

/// Remote management of WireGuard and AmneziaWG servers
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version = VERSION, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Servers file path
    #[arg(short, long, global = true, default_value = "servers.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List configured servers
    Servers,

    /// Show whether the interface is up
    Status {
        /// Logical server name
        #[arg(short, long)]
        server: String,
    },

    /// Bring the interface up
    Up {
        /// Logical server name
        #[arg(short, long)]
        server: String,
    },

    /// Bring the interface down
    Down {
        /// Logical server name
        #[arg(short, long)]
        server: String,
    },

    /// Bounce the interface (down, wait, up)
    Restart {
        /// Logical server name
        #[arg(short, long)]
        server: String,
    },

    /// Reboot the host or board
    Reboot {
        /// Logical server name
        #[arg(short, long)]
        server: String,
    },

    /// Print the server config
    Config {
        /// Logical server name
        #[arg(short, long)]
        server: String,

        /// Print the parsed section view instead of the raw text
        #[arg(long)]
        parsed: bool,
    },

    /// List peers with their live state
    Peers {
        /// Logical server name
        #[arg(short, long)]
        server: String,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Create a peer and print its client config
    AddPeer {
        /// Logical server name
        #[arg(short, long)]
        server: String,

        /// Display name for the new peer
        name: String,
    },

    /// Delete a peer by public key
    DeletePeer {
        /// Logical server name
        #[arg(short, long)]
        server: String,

        /// The peer's public key
        pubkey: String,
    },

    /// Enable a peer by public key
    EnablePeer {
        /// Logical server name
        #[arg(short, long)]
        server: String,

        /// The peer's public key
        pubkey: String,
    },

    /// Disable a peer by public key
    DisablePeer {
        /// Logical server name
        #[arg(short, long)]
        server: String,

        /// The peer's public key
        pubkey: String,
    },

    /// Change a peer's display name
    RenamePeer {
        /// Logical server name
        #[arg(short, long)]
        server: String,

        /// The peer's public key
        pubkey: String,

        /// The new display name
        new_name: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize structured logging with tracing
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run the CLI command
async fn run(cli: Cli) -> anyhow::Result<()> {
    let registry = ServerRegistry::from_servers_file(ServersFile::from_file(&cli.config)?);

    match cli.command {
        Commands::Servers => {
            for name in registry.server_names() {
                println!("{}", name);
            }
        }
        Commands::Status { server } => {
            let server = registry.get(&server).await?;
            let state = if server.interface_enabled().await? {
                "up"
            } else {
                "down"
            };
            println!("{}: {}", server.name(), state);
        }
        Commands::Up { server } => {
            registry.get(&server).await?.set_interface_enabled(true).await?;
        }
        Commands::Down { server } => {
            registry.get(&server).await?.set_interface_enabled(false).await?;
        }
        Commands::Restart { server } => {
            registry.get(&server).await?.restart().await?;
        }
        Commands::Reboot { server } => {
            registry.get(&server).await?.reboot_host().await?;
        }
        Commands::Config { server, parsed } => {
            let server = registry.get(&server).await?;
            if parsed {
                print!("{}", render_parsed(&server.get_parsed_config().await?));
            } else {
                print!("{}", server.get_config().await?);
            }
        }
        Commands::Peers { server, json } => {
            let peers = registry.get(&server).await?.get_peers().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&peers)?);
            } else if peers.is_empty() {
                println!("No peers (interface may be down)");
            } else {
                let mut names: Vec<&String> = peers.keys().collect();
                names.sort();
                for name in names {
                    let peer = &peers[name];
                    println!("{} ({})", name, peer.public_key);
                    if let Some(endpoint) = &peer.endpoint {
                        println!("  endpoint: {}", endpoint);
                    }
                    if let Some(handshake) = &peer.latest_handshake {
                        println!("  latest handshake: {}", handshake);
                    }
                    if let (Some(rx), Some(tx)) = (&peer.transfer_rx, &peer.transfer_tx) {
                        println!("  transfer: {} received, {} sent", rx, tx);
                    }
                }
            }
        }
        Commands::AddPeer { server, name } => {
            let client_config = registry.get(&server).await?.add_peer(&name).await?;
            print!("{}", client_config);
        }
        Commands::DeletePeer { server, pubkey } => {
            registry.get(&server).await?.delete_peer(&pubkey).await?;
        }
        Commands::EnablePeer { server, pubkey } => {
            registry
                .get(&server)
                .await?
                .set_peer_enabled(&pubkey, true)
                .await?;
        }
        Commands::DisablePeer { server, pubkey } => {
            registry
                .get(&server)
                .await?
                .set_peer_enabled(&pubkey, false)
                .await?;
        }
        Commands::RenamePeer {
            server,
            pubkey,
            new_name,
        } => {
            registry
                .get(&server)
                .await?
                .rename_peer(&pubkey, &new_name)
                .await?;
        }
    }

    Ok(())
}

/// Human-readable section view of a parsed config
fn render_parsed(doc: &ConfigDocument) -> String {
    let mut out = String::new();
    for section in doc.sections() {
        if section.enabled {
            out.push_str(&format!("{}\n", section.name));
        } else {
            out.push_str(&format!("{} (disabled)\n", section.name));
        }
        for (key, value) in section.attrs() {
            out.push_str(&format!("  {} = {}\n", key, value));
        }
    }
    out
}
