//! Local transport
//!
//! Runs commands as subprocesses of the current host and touches the
//! filesystem directly. Used for a Linux descriptor without connection
//! credentials, i.e. managing the WireGuard server this process runs on.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, StewardError};
use crate::transport::{CommandOutput, Transport};

/// Transport backed by `sh -c` and ordinary file I/O
#[derive(Debug, Default)]
pub struct LocalTransport;

impl LocalTransport {
    /// Create a new local transport
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("Executing locally: {}", command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| StewardError::Transport(format!("Failed to spawn '{}': {}", command, e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_status: output.status.code().map(|c| c as u32),
        })
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        Ok(tokio::fs::write(path, contents).await?)
    }
}
