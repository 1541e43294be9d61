//! Transport abstraction
//!
//! A transport executes shell commands and reads/writes files on the
//! target host. The Linux server logic is written against this trait so
//! it works identically over a local shell and an SSH session.

mod local;
pub mod routeros;
mod ssh;

pub use local::LocalTransport;
pub use ssh::{SshParams, SshTransport};

use crate::error::Result;
use async_trait::async_trait;

/// Output of one executed command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Exit status when the transport reports one
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    /// First line of stdout, trimmed; the shape `wg genkey`-style
    /// commands are read with
    pub fn first_line(&self) -> &str {
        self.stdout.lines().next().unwrap_or("").trim()
    }

    /// Whether the command produced any stderr output
    pub fn has_stderr(&self) -> bool {
        !self.stderr.trim().is_empty()
    }
}

/// Command execution and file access on a target host
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a shell command and capture its output
    async fn execute(&self, command: &str) -> Result<CommandOutput>;

    /// Read a file's contents
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Write a file's contents, replacing any existing file
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line() {
        let output = CommandOutput {
            stdout: "  abc  \ndef\n".to_string(),
            stderr: String::new(),
            exit_status: Some(0),
        };
        assert_eq!(output.first_line(), "abc");
    }

    #[test]
    fn test_first_line_empty_output() {
        assert_eq!(CommandOutput::default().first_line(), "");
    }

    #[test]
    fn test_has_stderr_ignores_whitespace() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "  \n".to_string(),
            exit_status: None,
        };
        assert!(!output.has_stderr());
    }
}
