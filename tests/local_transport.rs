//! Integration tests for the local transport
//!
//! These run real subprocesses and touch the real filesystem, which is
//! exactly what the local transport is for.

use tempfile::tempdir;
use wg_steward::transport::{LocalTransport, Transport};

#[tokio::test]
async fn test_execute_captures_stdout_and_status() {
    let transport = LocalTransport::new();
    let output = transport.execute("echo hello").await.unwrap();

    assert_eq!(output.first_line(), "hello");
    assert_eq!(output.exit_status, Some(0));
    assert!(!output.has_stderr());
}

#[tokio::test]
async fn test_execute_captures_stderr() {
    let transport = LocalTransport::new();
    let output = transport.execute("echo oops >&2").await.unwrap();

    assert!(output.stdout.is_empty());
    assert!(output.has_stderr());
    assert_eq!(output.stderr.trim(), "oops");
}

#[tokio::test]
async fn test_execute_reports_nonzero_exit() {
    let transport = LocalTransport::new();
    let output = transport.execute("exit 3").await.unwrap();
    assert_eq!(output.exit_status, Some(3));
}

#[tokio::test]
async fn test_file_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wg0.conf");
    let path = path.to_str().unwrap();

    let transport = LocalTransport::new();
    transport
        .write_file(path, b"[Interface]\nListenPort = 51820\n")
        .await
        .unwrap();

    let contents = transport.read_file(path).await.unwrap();
    assert_eq!(contents, b"[Interface]\nListenPort = 51820\n");
}

#[tokio::test]
async fn test_write_file_replaces_existing_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wg0.conf");
    let path = path.to_str().unwrap();

    let transport = LocalTransport::new();
    transport.write_file(path, b"first version").await.unwrap();
    transport.write_file(path, b"second").await.unwrap();

    let contents = transport.read_file(path).await.unwrap();
    assert_eq!(contents, b"second");
}

#[tokio::test]
async fn test_read_missing_file_is_io_error() {
    let transport = LocalTransport::new();
    let err = transport.read_file("/definitely/not/a/file").await.unwrap_err();
    assert!(matches!(err, wg_steward::StewardError::Io(_)));
}
