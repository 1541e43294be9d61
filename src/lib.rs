//! wg-steward: remote WireGuard server management
//!
//! This library lets an operator inspect and mutate WireGuard (and
//! AmneziaWG) VPN servers across two backends: Linux hosts reached over
//! SSH/SFTP (or locally), and RouterOS boards reached over the
//! management API.
//!
//! # Architecture
//!
//! A [`server::VpnServer`] is the peer-lifecycle contract; both backends
//! implement it so callers never see which one they hold. The Linux
//! backend composes a [`transport::Transport`] (commands + files) with a
//! [`protocol::Protocol`] (dialect knowledge) over a structured
//! [`store::ConfigDocument`]; the RouterOS backend synthesizes the same
//! document from API resources. The [`server::ServerRegistry`] builds
//! instances from `servers.toml` descriptors and caches one per logical
//! name.
//!
//! # Modules
//!
//! - `descriptor`: declarative server configuration
//! - `transport`: local, SSH and RouterOS API transports
//! - `protocol`: WireGuard and AmneziaWG dialects
//! - `store`: the structured config document
//! - `allocator`: peer address allocation
//! - `server`: the backends and the registry
//! - `keys`: x25519 key material
//! - `error`: error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod descriptor;
pub mod error;
pub mod keys;
pub mod protocol;
pub mod server;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use error::{Result, StewardError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
