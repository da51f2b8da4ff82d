//! Message bodies as asynchronous byte streams.
//!
//! A body is a [`ByteStream`]: a boxed stream of `Bytes` chunks that may
//! fail with an I/O error. Every wait on the next chunk is bounded by a
//! read timeout.

use std::io::{self, Read};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::runtime::Handle;

use crate::error::{Result, ServiceError};

/// Chunk size used when turning readers into streams.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A message body.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Body over chunks already in memory.
pub fn bytes_stream<I>(chunks: I) -> ByteStream
where
    I: IntoIterator<Item = Bytes>,
    I::IntoIter: Send + 'static,
{
    stream::iter(chunks.into_iter().map(Ok::<Bytes, io::Error>)).boxed()
}

/// Body over an async reader, read in chunks of at most `chunk_size` bytes.
///
/// The stream ends after the first error.
pub fn stream_from_reader<R>(reader: R, chunk_size: usize) -> ByteStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let chunk_size = chunk_size.max(1);
    stream::unfold(Some(reader), move |state| async move {
        let mut reader = state?;
        let mut buf = BytesMut::with_capacity(chunk_size);
        match reader.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(buf.freeze()), Some(reader))),
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

/// Wait for the next chunk, giving up after `read_timeout`.
pub async fn next_chunk(body: &mut ByteStream, read_timeout: Duration) -> Result<Option<Bytes>> {
    match tokio::time::timeout(read_timeout, body.next()).await {
        Err(_) => Err(ServiceError::Timeout {
            waited: read_timeout,
        }),
        Ok(None) => Ok(None),
        Ok(Some(Ok(chunk))) => Ok(Some(chunk)),
        Ok(Some(Err(e))) => Err(ServiceError::from_read_error(e, read_timeout)),
    }
}

/// Read the body to its end and discard it. Returns the number of bytes seen.
pub async fn drain(mut body: ByteStream, read_timeout: Duration) -> Result<u64> {
    let mut total = 0u64;
    while let Some(chunk) = next_chunk(&mut body, read_timeout).await? {
        total += chunk.len() as u64;
    }
    Ok(total)
}

/// Read the whole body into memory.
pub async fn collect_bytes(mut body: ByteStream, read_timeout: Duration) -> Result<Vec<u8>> {
    let mut collected = Vec::new();
    while let Some(chunk) = next_chunk(&mut body, read_timeout).await? {
        collected.extend_from_slice(&chunk);
    }
    Ok(collected)
}

/// Read at most `limit` bytes from the start of the body.
pub async fn read_prefix(
    body: &mut ByteStream,
    limit: usize,
    read_timeout: Duration,
) -> Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(limit.min(DEFAULT_CHUNK_SIZE));
    while prefix.len() < limit {
        match next_chunk(body, read_timeout).await? {
            Some(chunk) => {
                let take = chunk.len().min(limit - prefix.len());
                prefix.extend_from_slice(&chunk[..take]);
            }
            None => break,
        }
    }
    Ok(prefix)
}

/// Blocking `Read` over a [`ByteStream`].
///
/// Intended for `spawn_blocking` threads: each refill blocks on the runtime
/// behind `handle`. A chunk that does not arrive within the read timeout
/// fails the read with `ErrorKind::TimedOut`.
pub struct BlockingStreamReader {
    body: ByteStream,
    handle: Handle,
    read_timeout: Duration,
    pending: Bytes,
    finished: bool,
    bytes_read: u64,
}

impl BlockingStreamReader {
    pub fn new(body: ByteStream, handle: Handle, read_timeout: Duration) -> Self {
        Self {
            body,
            handle,
            read_timeout,
            pending: Bytes::new(),
            finished: false,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn refill(&mut self) -> io::Result<()> {
        while self.pending.is_empty() && !self.finished {
            let next = self
                .handle
                .block_on(tokio::time::timeout(self.read_timeout, self.body.next()));
            match next {
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!(
                            "no message data within {} seconds",
                            self.read_timeout.as_secs_f64()
                        ),
                    ));
                }
                Ok(None) => self.finished = true,
                Ok(Some(Ok(chunk))) => self.pending = chunk,
                Ok(Some(Err(e))) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Read for BlockingStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.refill()?;
        if self.pending.is_empty() {
            return Ok(0);
        }

        let n = buf.len().min(self.pending.len());
        let chunk = self.pending.split_to(n);
        buf[..n].copy_from_slice(&chunk);
        self.bytes_read += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static str]) -> ByteStream {
        bytes_stream(
            parts
                .iter()
                .map(|p| Bytes::from_static(p.as_bytes()))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_collect_bytes() {
        let body = chunks(&["<a>", "text", "</a>"]);
        let collected = collect_bytes(body, Duration::from_secs(1)).await.unwrap();
        assert_eq!(collected, b"<a>text</a>");
    }

    #[tokio::test]
    async fn test_drain_counts_bytes() {
        let body = chunks(&["abc", "", "defg"]);
        assert_eq!(drain(body, Duration::from_secs(1)).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_next_chunk_times_out() {
        let mut body: ByteStream = stream::pending().boxed();
        let result = next_chunk(&mut body, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ServiceError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let body: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ])
        .boxed();

        match collect_bytes(body, Duration::from_secs(1)).await {
            Err(ServiceError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_from_reader_chunks() {
        let reader = tokio_test::io::Builder::new()
            .read(b"hello ")
            .read(b"world")
            .build();
        let body = stream_from_reader(reader, 4);
        let collected = collect_bytes(body, Duration::from_secs(1)).await.unwrap();
        assert_eq!(collected, b"hello world");
    }

    #[tokio::test]
    async fn test_read_prefix_stops_at_limit() {
        let mut body = chunks(&["0123456789", "abcdef"]);
        let prefix = read_prefix(&mut body, 12, Duration::from_secs(1)).await.unwrap();
        assert_eq!(prefix, b"0123456789ab");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_reader_reads_everything() {
        let body = chunks(&["<root>", "", "<a>1</a>", "</root>"]);
        let handle = Handle::current();

        let (text, count) = tokio::task::spawn_blocking(move || {
            let mut reader = BlockingStreamReader::new(body, handle, Duration::from_secs(1));
            let mut text = String::new();
            reader.read_to_string(&mut text).unwrap();
            (text, reader.bytes_read())
        })
        .await
        .unwrap();

        assert_eq!(text, "<root><a>1</a></root>");
        assert_eq!(count, 21);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_reader_times_out() {
        let body: ByteStream = stream::pending().boxed();
        let handle = Handle::current();

        let kind = tokio::task::spawn_blocking(move || {
            let mut reader = BlockingStreamReader::new(body, handle, Duration::from_millis(20));
            let mut buf = [0u8; 16];
            reader.read(&mut buf).unwrap_err().kind()
        })
        .await
        .unwrap();

        assert_eq!(kind, io::ErrorKind::TimedOut);
    }
}
