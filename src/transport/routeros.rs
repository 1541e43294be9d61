//! RouterOS API client
//!
//! Speaks the RouterOS management API wire protocol: length-prefixed words
//! grouped into sentences, commands like `/interface/wireguard/peers/print`
//! with `=key=value` attribute words and `?key=value` query words, replies
//! as `!re`/`!done`/`!trap`/`!fatal` sentences. Uses post-6.43 plaintext
//! login.
//!
//! A call is re-issued exactly once after reconnecting when the session
//! drops mid-call; every other failure is returned to the caller as an
//! explicit error.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, StewardError};

/// One `!re` reply row: attribute map including `.id`
pub type Row = HashMap<String, String>;

/// Connection parameters for the RouterOS API
#[derive(Debug, Clone)]
pub struct RouterOsParams {
    /// Board address
    pub host: String,
    /// API port (8728 by default)
    pub port: u16,
    /// API username
    pub username: String,
    /// API password
    pub password: String,
}

/// A live RouterOS API session
pub struct RouterOsClient {
    params: RouterOsParams,
    stream: Mutex<TcpStream>,
}

enum CallError {
    /// Socket died or the board sent `!fatal`; worth one reconnect
    Dropped(String),
    /// The board rejected the command (`!trap`)
    Trap(String),
    /// Reply did not follow the protocol
    Protocol(String),
}

impl CallError {
    fn into_steward(self) -> StewardError {
        match self {
            CallError::Dropped(msg) => {
                StewardError::Connection(format!("RouterOS API connection dropped: {}", msg))
            }
            CallError::Trap(msg) => StewardError::Command(format!("RouterOS error: {}", msg)),
            CallError::Protocol(msg) => {
                StewardError::Parse(format!("RouterOS protocol error: {}", msg))
            }
        }
    }
}

impl RouterOsClient {
    /// Dial the board and log in, failing fast with a `Connection` error
    pub async fn connect(params: RouterOsParams) -> Result<Self> {
        let stream = open_session(&params).await?;
        info!(
            "RouterOS API session established to {}:{}",
            params.host, params.port
        );

        Ok(Self {
            params,
            stream: Mutex::new(stream),
        })
    }

    /// Issue a command and collect its `!re` rows.
    ///
    /// `attrs` become `=key=value` words, `queries` become `?key=value`
    /// words (only meaningful on `print`).
    pub async fn call(
        &self,
        command: &str,
        attrs: &[(&str, &str)],
        queries: &[(&str, &str)],
    ) -> Result<Vec<Row>> {
        let mut stream = self.stream.lock().await;

        match call_on(&mut stream, command, attrs, queries).await {
            Ok(rows) => Ok(rows),
            Err(CallError::Dropped(msg)) => {
                warn!(
                    "RouterOS API connection to {} dropped ({}), reconnecting",
                    self.params.host, msg
                );
                *stream = open_session(&self.params).await?;
                call_on(&mut stream, command, attrs, queries)
                    .await
                    .map_err(CallError::into_steward)
            }
            Err(other) => Err(other.into_steward()),
        }
    }
}

async fn open_session(params: &RouterOsParams) -> Result<TcpStream> {
    let mut stream = TcpStream::connect((params.host.as_str(), params.port))
        .await
        .map_err(|e| {
            StewardError::Connection(format!(
                "Error connecting to RouterOS API {}:{}: {}",
                params.host, params.port, e
            ))
        })?;

    login(&mut stream, &params.username, &params.password)
        .await
        .map_err(|e| {
            StewardError::Connection(format!(
                "RouterOS login failed for {}@{}: {}",
                params.username, params.host, e
            ))
        })?;

    Ok(stream)
}

async fn login(stream: &mut TcpStream, username: &str, password: &str) -> Result<()> {
    let attrs = [("name", username), ("password", password)];
    call_on(stream, "/login", &attrs, &[])
        .await
        .map_err(|e| e.into_steward())?;
    Ok(())
}

async fn call_on(
    stream: &mut TcpStream,
    command: &str,
    attrs: &[(&str, &str)],
    queries: &[(&str, &str)],
) -> std::result::Result<Vec<Row>, CallError> {
    debug!("RouterOS call: {}", command);

    let mut words = Vec::with_capacity(1 + attrs.len() + queries.len());
    words.push(command.to_string());
    for (key, value) in attrs {
        words.push(format!("={}={}", key, value));
    }
    for (key, value) in queries {
        words.push(format!("?{}={}", key, value));
    }

    write_sentence(stream, &words)
        .await
        .map_err(|e| CallError::Dropped(e.to_string()))?;

    let mut rows = Vec::new();
    let mut trap: Option<String> = None;

    loop {
        let sentence = read_sentence(stream)
            .await
            .map_err(|e| CallError::Dropped(e.to_string()))?;

        match sentence.first().map(String::as_str) {
            Some("!re") => rows.push(parse_reply_attrs(&sentence[1..])),
            Some("!done") => {
                return match trap {
                    Some(msg) => Err(CallError::Trap(msg)),
                    None => Ok(rows),
                };
            }
            Some("!trap") => {
                let attrs = parse_reply_attrs(&sentence[1..]);
                trap = Some(
                    attrs
                        .get("message")
                        .cloned()
                        .unwrap_or_else(|| "unspecified trap".to_string()),
                );
            }
            Some("!fatal") => {
                let detail = sentence.get(1).cloned().unwrap_or_default();
                return Err(CallError::Dropped(format!("fatal: {}", detail)));
            }
            Some(other) => {
                return Err(CallError::Protocol(format!(
                    "Unexpected reply word '{}'",
                    other
                )));
            }
            None => {} // empty keepalive sentence
        }
    }
}

fn parse_reply_attrs(words: &[String]) -> Row {
    let mut attrs = HashMap::new();
    for word in words {
        if let Some(rest) = word.strip_prefix('=') {
            if let Some((key, value)) = rest.split_once('=') {
                attrs.insert(key.to_string(), value.to_string());
            }
        }
    }
    attrs
}

async fn write_sentence<W: AsyncWrite + Unpin>(
    writer: &mut W,
    words: &[String],
) -> std::io::Result<()> {
    for word in words {
        write_word(writer, word).await?;
    }
    // Zero-length word terminates the sentence
    writer.write_all(&[0]).await?;
    writer.flush().await
}

async fn read_sentence<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<String>> {
    let mut words = Vec::new();
    loop {
        match read_word(reader).await? {
            Some(word) => words.push(word),
            None => return Ok(words),
        }
    }
}

async fn write_word<W: AsyncWrite + Unpin>(writer: &mut W, word: &str) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(word.len() + 5);
    encode_length(word.len() as u32, &mut buf);
    buf.extend_from_slice(word.as_bytes());
    writer.write_all(&buf).await
}

async fn read_word<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<String>> {
    let len = read_length(reader).await?;
    if len == 0 {
        return Ok(None);
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// RouterOS variable-length word size prefix
fn encode_length(len: u32, buf: &mut Vec<u8>) {
    if len < 0x80 {
        buf.push(len as u8);
    } else if len < 0x4000 {
        buf.push(((len >> 8) | 0x80) as u8);
        buf.push(len as u8);
    } else if len < 0x20_0000 {
        buf.push(((len >> 16) | 0xC0) as u8);
        buf.push((len >> 8) as u8);
        buf.push(len as u8);
    } else if len < 0x1000_0000 {
        buf.push(((len >> 24) | 0xE0) as u8);
        buf.push((len >> 16) as u8);
        buf.push((len >> 8) as u8);
        buf.push(len as u8);
    } else {
        buf.push(0xF0);
        buf.extend_from_slice(&len.to_be_bytes());
    }
}

async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<u32> {
    let first = reader.read_u8().await?;

    let (extra, mut len) = if first & 0x80 == 0 {
        (0, first as u32)
    } else if first & 0xC0 == 0x80 {
        (1, (first & 0x3F) as u32)
    } else if first & 0xE0 == 0xC0 {
        (2, (first & 0x1F) as u32)
    } else if first & 0xF0 == 0xE0 {
        (3, (first & 0x0F) as u32)
    } else {
        (4, 0)
    };

    for _ in 0..extra {
        len = (len << 8) | reader.read_u8().await? as u32;
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(len: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_length(len, &mut buf);
        buf
    }

    #[tokio::test]
    async fn test_length_boundaries_roundtrip() {
        for len in [
            0u32,
            1,
            0x7F,
            0x80,
            0x3FFF,
            0x4000,
            0x1F_FFFF,
            0x20_0000,
            0xFFF_FFFF,
            0x1000_0000,
        ] {
            let buf = encoded(len);
            let mut reader = &buf[..];
            assert_eq!(read_length(&mut reader).await.unwrap(), len, "len {}", len);
        }
    }

    #[test]
    fn test_length_encoding_widths() {
        assert_eq!(encoded(0x7F).len(), 1);
        assert_eq!(encoded(0x80).len(), 2);
        assert_eq!(encoded(0x4000).len(), 3);
        assert_eq!(encoded(0x20_0000).len(), 4);
        assert_eq!(encoded(0x1000_0000).len(), 5);
    }

    #[tokio::test]
    async fn test_sentence_roundtrip() {
        let words = vec![
            "/interface/wireguard/peers/print".to_string(),
            "?interface=wg0".to_string(),
        ];

        let mut buf = Vec::new();
        write_sentence(&mut buf, &words).await.unwrap();

        let mut reader = &buf[..];
        let decoded = read_sentence(&mut reader).await.unwrap();
        assert_eq!(decoded, words);
    }

    #[test]
    fn test_parse_reply_attrs() {
        let words = vec![
            "=.id=*1".to_string(),
            "=public-key=abc=def".to_string(),
            "not-an-attr".to_string(),
        ];
        let attrs = parse_reply_attrs(&words);
        assert_eq!(attrs.get(".id").map(String::as_str), Some("*1"));
        // Values may themselves contain '='
        assert_eq!(attrs.get("public-key").map(String::as_str), Some("abc=def"));
        assert_eq!(attrs.len(), 2);
    }
}
