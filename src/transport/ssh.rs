//! SSH transport
//!
//! Executes commands over an SSH session and moves files through the SFTP
//! subsystem. A failed call is retried after transparently re-establishing
//! the session, up to a fixed bound; construction fails fast so callers
//! never hold a transport that was unable to handshake.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::ChannelMsg;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, StewardError};
use crate::transport::{CommandOutput, Transport};

/// Attempts per operation, counting the first try
const MAX_ATTEMPTS: usize = 3;

/// Handshake timeout for session establishment
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters for an SSH transport
#[derive(Debug, Clone)]
pub struct SshParams {
    /// Remote host
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Username for authentication
    pub username: String,
    /// Password; also used to decrypt the key file when one is given
    pub password: Option<String>,
    /// Private key file for public-key authentication
    pub key_file: Option<String>,
}

struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        // Host keys are provisioned out of band by the operator
        Ok(true)
    }
}

/// Transport backed by an SSH session with SFTP file access
pub struct SshTransport {
    params: SshParams,
    session: Mutex<client::Handle<ClientHandler>>,
}

impl SshTransport {
    /// Open a session to the remote host, failing fast with a
    /// `Connection` error when the handshake or authentication fails
    pub async fn connect(params: SshParams) -> Result<Self> {
        let session = open_session(&params).await?;
        info!("SSH session established to {}:{}", params.host, params.port);

        Ok(Self {
            params,
            session: Mutex::new(session),
        })
    }

    /// Replace the live session with a freshly established one. Failures
    /// are logged; the next attempt of the retry loop reports them.
    async fn reconnect(&self) {
        match open_session(&self.params).await {
            Ok(session) => {
                *self.session.lock().await = session;
                info!("SSH session to {} re-established", self.params.host);
            }
            Err(e) => warn!("SSH reconnect to {} failed: {}", self.params.host, e),
        }
    }

    fn exhausted(&self, what: &str, last: Option<StewardError>) -> StewardError {
        let detail = last
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt recorded".to_string());
        StewardError::Connection(format!(
            "SSH {} against {} failed after {} attempts: {}",
            what, self.params.host, MAX_ATTEMPTS, detail
        ))
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        let mut last = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let result = {
                let session = self.session.lock().await;
                exec_once(&session, command).await
            };
            match result {
                Ok(output) => return Ok(output),
                Err(e) => {
                    warn!(
                        "SSH exec attempt {}/{} failed: {}",
                        attempt, MAX_ATTEMPTS, e
                    );
                    last = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        self.reconnect().await;
                    }
                }
            }
        }
        Err(self.exhausted("exec", last))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut last = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let result = {
                let session = self.session.lock().await;
                read_once(&session, path).await
            };
            match result {
                Ok(contents) => return Ok(contents),
                Err(e) => {
                    warn!(
                        "SFTP read attempt {}/{} failed: {}",
                        attempt, MAX_ATTEMPTS, e
                    );
                    last = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        self.reconnect().await;
                    }
                }
            }
        }
        Err(self.exhausted("file read", last))
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        let mut last = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let result = {
                let session = self.session.lock().await;
                write_once(&session, path, contents).await
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "SFTP write attempt {}/{} failed: {}",
                        attempt, MAX_ATTEMPTS, e
                    );
                    last = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        self.reconnect().await;
                    }
                }
            }
        }
        Err(self.exhausted("file write", last))
    }
}

async fn open_session(params: &SshParams) -> Result<client::Handle<ClientHandler>> {
    let config = Arc::new(client::Config {
        inactivity_timeout: Some(Duration::from_secs(3600)),
        ..Default::default()
    });

    let mut handle = tokio::time::timeout(
        CONNECT_TIMEOUT,
        client::connect(config, (params.host.as_str(), params.port), ClientHandler),
    )
    .await
    .map_err(|_| {
        StewardError::Connection(format!(
            "Timed out connecting to {}:{}",
            params.host, params.port
        ))
    })?
    .map_err(|e| {
        StewardError::Connection(format!(
            "Error connecting to {}:{}: {}",
            params.host, params.port, e
        ))
    })?;

    let authenticated = match &params.key_file {
        Some(key_file) => {
            let key = russh_keys::load_secret_key(key_file, params.password.as_deref()).map_err(
                |e| {
                    StewardError::Connection(format!(
                        "Failed to load key file {}: {}",
                        key_file, e
                    ))
                },
            )?;
            handle
                .authenticate_publickey(params.username.as_str(), Arc::new(key))
                .await
        }
        None => {
            handle
                .authenticate_password(
                    params.username.as_str(),
                    params.password.as_deref().unwrap_or(""),
                )
                .await
        }
    }
    .map_err(|e| StewardError::Connection(format!("SSH authentication error: {}", e)))?;

    if !authenticated {
        return Err(StewardError::Connection(format!(
            "SSH authentication failed for {}@{}",
            params.username, params.host
        )));
    }

    Ok(handle)
}

async fn exec_once(
    session: &client::Handle<ClientHandler>,
    command: &str,
) -> Result<CommandOutput> {
    debug!("Executing over SSH: {}", command);

    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| StewardError::Transport(format!("Failed to open channel: {}", e)))?;
    channel
        .exec(true, command)
        .await
        .map_err(|e| StewardError::Transport(format!("Failed to exec '{}': {}", command, e)))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status = None;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(&data[..]),
            ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(&data[..]),
            ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
            _ => {}
        }
    }

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_status,
    })
}

async fn read_once(session: &client::Handle<ClientHandler>, path: &str) -> Result<Vec<u8>> {
    let sftp = sftp_session(session).await?;
    let mut file = sftp
        .open(path)
        .await
        .map_err(|e| StewardError::Transport(format!("SFTP open {} failed: {}", path, e)))?;

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .await
        .map_err(|e| StewardError::Transport(format!("SFTP read {} failed: {}", path, e)))?;
    Ok(contents)
}

async fn write_once(
    session: &client::Handle<ClientHandler>,
    path: &str,
    contents: &[u8],
) -> Result<()> {
    let sftp = sftp_session(session).await?;
    let mut file = sftp
        .create(path)
        .await
        .map_err(|e| StewardError::Transport(format!("SFTP create {} failed: {}", path, e)))?;

    file.write_all(contents)
        .await
        .map_err(|e| StewardError::Transport(format!("SFTP write {} failed: {}", path, e)))?;
    file.shutdown()
        .await
        .map_err(|e| StewardError::Transport(format!("SFTP close {} failed: {}", path, e)))?;
    Ok(())
}

async fn sftp_session(session: &client::Handle<ClientHandler>) -> Result<SftpSession> {
    let channel = session
        .channel_open_session()
        .await
        .map_err(|e| StewardError::Transport(format!("Failed to open SFTP channel: {}", e)))?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| StewardError::Transport(format!("SFTP subsystem request failed: {}", e)))?;

    SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| StewardError::Transport(format!("Failed to start SFTP session: {}", e)))
}
