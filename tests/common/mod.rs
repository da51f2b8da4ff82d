//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use movement_validator::stream::{ByteStream, bytes_stream};
use movement_validator::{ValidationConfig, ValidationEngine, ValidationError};

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn fixture_path(relative: &str) -> PathBuf {
    fixtures_dir().join(relative)
}

pub fn fixture_bytes(relative: &str) -> Vec<u8> {
    std::fs::read(fixture_path(relative))
        .unwrap_or_else(|e| panic!("missing fixture {}: {}", relative, e))
}

/// Fixture payload for each registered message type.
pub fn valid_fixture_for(code: &str) -> &'static str {
    match code {
        "IE007" => "xml/ie007_valid.xml",
        "IE015" => "xml/ie015_valid.xml",
        "IE007-JSON" => "json/ie007_valid.json",
        "IE015-JSON" => "json/ie015_valid.json",
        other => panic!("no fixture for message type {}", other),
    }
}

/// Body delivered in chunks of `chunk_size` bytes.
pub fn chunked_body(data: &[u8], chunk_size: usize) -> ByteStream {
    let chunks: Vec<Bytes> = data
        .chunks(chunk_size.max(1))
        .map(Bytes::copy_from_slice)
        .collect();
    bytes_stream(chunks)
}

pub fn body(data: &[u8]) -> ByteStream {
    chunked_body(data, 4096)
}

/// Body that delivers `head` and then never produces another chunk.
pub fn stalled_body(head: &'static [u8]) -> ByteStream {
    futures::stream::iter(vec![Ok(Bytes::from_static(head))])
        .chain(futures::stream::pending())
        .boxed()
}

/// Body that delivers `head` and then fails with an I/O error.
pub fn failing_body(head: &'static [u8]) -> ByteStream {
    futures::stream::iter(vec![
        Ok(Bytes::from_static(head)),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "producer went away",
        )),
    ])
    .boxed()
}

/// Body fed by a producer task through a bounded channel.
///
/// The handle resolves to the number of bytes the producer managed to send;
/// it only completes once the consumer has taken everything or dropped the
/// stream.
pub fn channel_body(
    total_bytes: usize,
    chunk_size: usize,
    capacity: usize,
) -> (ByteStream, JoinHandle<usize>) {
    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(capacity);
    let producer = tokio::spawn(async move {
        let chunk = Bytes::from(vec![b'x'; chunk_size]);
        let mut sent = 0;
        while sent < total_bytes {
            let len = chunk_size.min(total_bytes - sent);
            if tx.send(Ok(chunk.slice(..len))).await.is_err() {
                break;
            }
            sent += len;
        }
        sent
    });
    (ReceiverStream::new(rx).boxed(), producer)
}

pub fn config_with_spool(spool: &TempDir, check_root_element: bool) -> ValidationConfig {
    ValidationConfig {
        read_timeout: Duration::from_secs(10),
        spool_directory: Some(spool.path().to_path_buf()),
        check_root_element,
    }
}

pub fn engine_with_spool(spool: &TempDir, check_root_element: bool) -> ValidationEngine {
    ValidationEngine::new(config_with_spool(spool, check_root_element))
}

pub fn spool_dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

pub fn schema_violations(errors: &[ValidationError]) -> usize {
    errors
        .iter()
        .filter(|e| matches!(e, ValidationError::SchemaViolation { .. }))
        .count()
}

pub fn json_pointers(errors: &[ValidationError]) -> Vec<String> {
    errors
        .iter()
        .filter_map(|e| match e {
            ValidationError::JsonSchemaViolation { pointer, .. } => Some(pointer.clone()),
            _ => None,
        })
        .collect()
}
