//! Re-readable message bodies.
//!
//! A body arrives as a one-shot [`ByteStream`]. [`with_reusable_source`]
//! either hands it straight to a consumer, or spools it to a temporary file
//! so the consumer can open it as many times as it needs. The temporary file
//! never outlives the call.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{Result, ServiceError};
use crate::stream::{self, ByteStream, DEFAULT_CHUNK_SIZE};

/// How many times a consumer will read the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// One read; the stream is forwarded untouched.
    SinglePass,
    /// Several reads; the stream is spooled to a temporary file first.
    MultiPass,
}

/// Where spool files go and how long to wait on the producer.
#[derive(Debug, Clone)]
pub struct SpoolOptions {
    /// `None` means the OS temp directory.
    pub directory: Option<PathBuf>,
    pub read_timeout: Duration,
}

/// A body that can be opened for reading, possibly more than once.
pub enum ReusableSource {
    /// The original stream; can be opened once.
    Direct(Option<ByteStream>),
    /// A spooled copy; every `open` starts from the beginning.
    Spooled { path: PathBuf, size: u64 },
}

impl fmt::Debug for ReusableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReusableSource::Direct(slot) => f
                .debug_struct("Direct")
                .field("consumed", &slot.is_none())
                .finish(),
            ReusableSource::Spooled { path, size } => f
                .debug_struct("Spooled")
                .field("path", path)
                .field("size", size)
                .finish(),
        }
    }
}

impl ReusableSource {
    /// A fresh stream over the body.
    ///
    /// Fails with [`ServiceError::StreamConsumed`] when a `Direct` source is
    /// opened a second time.
    pub async fn open(&mut self) -> Result<ByteStream> {
        match self {
            ReusableSource::Direct(slot) => slot.take().ok_or(ServiceError::StreamConsumed),
            ReusableSource::Spooled { path, .. } => {
                let file = tokio::fs::File::open(path.as_path())
                    .await
                    .map_err(|e| ServiceError::Spool {
                        details: format!("cannot reopen {}: {}", path.display(), e),
                    })?;
                Ok(stream::stream_from_reader(file, DEFAULT_CHUNK_SIZE))
            }
        }
    }

    pub fn spooled_path(&self) -> Option<&Path> {
        match self {
            ReusableSource::Direct(_) => None,
            ReusableSource::Spooled { path, .. } => Some(path),
        }
    }

    /// Size in bytes, known only once spooled.
    pub fn spooled_size(&self) -> Option<u64> {
        match self {
            ReusableSource::Direct(_) => None,
            ReusableSource::Spooled { size, .. } => Some(*size),
        }
    }
}

/// Run `consumer` over `body` read according to `mode`.
///
/// In `MultiPass` mode the body is spooled before `consumer` runs; a spool
/// failure is returned and `consumer` is not called. The spool file is
/// removed once `consumer` finishes, whatever it returned. If the returned
/// future is dropped early the file is removed by its drop guard.
pub async fn with_reusable_source<F, Fut, T>(
    body: ByteStream,
    mode: ReadMode,
    options: &SpoolOptions,
    consumer: F,
) -> Result<T>
where
    F: FnOnce(ReusableSource) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match mode {
        ReadMode::SinglePass => consumer(ReusableSource::Direct(Some(body))).await,
        ReadMode::MultiPass => {
            let (temp_path, size) = spool(body, options).await?;
            debug!(path = %temp_path.display(), size, "message body spooled");

            let source = ReusableSource::Spooled {
                path: temp_path.to_path_buf(),
                size,
            };
            let outcome = consumer(source).await;

            let spool_file = temp_path.to_path_buf();
            if let Err(e) = temp_path.close() {
                warn!(path = %spool_file.display(), error = %e, "failed to remove spool file");
            }
            outcome
        }
    }
}

async fn spool(mut body: ByteStream, options: &SpoolOptions) -> Result<(TempPath, u64)> {
    let spool_error = |e: std::io::Error| ServiceError::Spool {
        details: e.to_string(),
    };

    let mut builder = tempfile::Builder::new();
    builder.prefix("movement-").suffix(".spool");
    let named = match &options.directory {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(spool_error)?;

    // From here on `temp_path` removes the file if we bail out.
    let (file, temp_path) = named.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut size = 0u64;
    while let Some(chunk) = stream::next_chunk(&mut body, options.read_timeout).await? {
        file.write_all(&chunk).await.map_err(spool_error)?;
        size += chunk.len() as u64;
    }
    file.flush().await.map_err(spool_error)?;
    drop(file);

    Ok((temp_path, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;
    use futures::stream as fstream;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> SpoolOptions {
        SpoolOptions {
            directory: Some(dir.path().to_path_buf()),
            read_timeout: Duration::from_secs(1),
        }
    }

    fn body(parts: &[&'static str]) -> ByteStream {
        stream::bytes_stream(
            parts
                .iter()
                .map(|p| Bytes::from_static(p.as_bytes()))
                .collect::<Vec<_>>(),
        )
    }

    fn spool_dir_is_empty(dir: &TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_single_pass_does_not_spool() {
        let dir = TempDir::new().unwrap();
        let text = with_reusable_source(
            body(&["abc", "def"]),
            ReadMode::SinglePass,
            &options(&dir),
            |mut source| async move {
                assert!(source.spooled_path().is_none());
                let stream = source.open().await?;
                let bytes = stream::collect_bytes(stream, Duration::from_secs(1)).await?;
                assert!(matches!(source.open().await, Err(ServiceError::StreamConsumed)));
                Ok::<_, ServiceError>(bytes)
            },
        )
        .await
        .unwrap();

        assert_eq!(text, b"abcdef");
        assert!(spool_dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_multi_pass_reopens_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let seen_path = with_reusable_source(
            body(&["<root>", "</root>"]),
            ReadMode::MultiPass,
            &options(&dir),
            |mut source| async move {
                assert_eq!(source.spooled_size(), Some(13));
                let path = source.spooled_path().map(Path::to_path_buf).unwrap();
                assert!(path.exists());

                for _ in 0..2 {
                    let stream = source.open().await?;
                    let bytes = stream::collect_bytes(stream, Duration::from_secs(1)).await?;
                    assert_eq!(bytes, b"<root></root>");
                }
                Ok::<_, ServiceError>(path)
            },
        )
        .await
        .unwrap();

        assert!(!seen_path.exists());
        assert!(spool_dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_multi_pass_cleans_up_on_consumer_error() {
        let dir = TempDir::new().unwrap();
        let result: Result<()> = with_reusable_source(
            body(&["payload"]),
            ReadMode::MultiPass,
            &options(&dir),
            |_source| async move {
                Err(ServiceError::LibXml2Internal {
                    details: "boom".to_string(),
                })
            },
        )
        .await;

        assert!(result.is_err());
        assert!(spool_dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_spool_file_already_removed_keeps_outcome() {
        let dir = TempDir::new().unwrap();
        let outcome = with_reusable_source(
            body(&["payload"]),
            ReadMode::MultiPass,
            &options(&dir),
            |source| async move {
                let path = source.spooled_path().map(Path::to_path_buf).unwrap();
                tokio::fs::remove_file(&path).await.unwrap();
                Ok::<_, ServiceError>("done")
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome, "done");
        assert!(spool_dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_spool_failure_skips_consumer() {
        let dir = TempDir::new().unwrap();
        let failing: ByteStream = fstream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone")),
        ])
        .boxed();

        let mut called = false;
        let result = with_reusable_source(failing, ReadMode::MultiPass, &options(&dir), |_| {
            called = true;
            async { Ok(()) }
        })
        .await;

        assert!(matches!(result, Err(ServiceError::Io(_))));
        assert!(!called);
        assert!(spool_dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_spool_timeout_cleans_up() {
        let dir = TempDir::new().unwrap();
        let stalled: ByteStream = fstream::iter(vec![Ok(Bytes::from_static(b"head"))])
            .chain(fstream::pending())
            .boxed();
        let opts = SpoolOptions {
            directory: Some(dir.path().to_path_buf()),
            read_timeout: Duration::from_millis(30),
        };

        let result = with_reusable_source(stalled, ReadMode::MultiPass, &opts, |_| async {
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ServiceError::Timeout { .. })));
        assert!(spool_dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_missing_spool_directory() {
        let opts = SpoolOptions {
            directory: Some(PathBuf::from("/nonexistent/spool/dir")),
            read_timeout: Duration::from_secs(1),
        };
        let result = with_reusable_source(body(&["x"]), ReadMode::MultiPass, &opts, |_| async {
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ServiceError::Spool { .. })));
    }
}
