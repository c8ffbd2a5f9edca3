use std::io::Cursor;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use stash_types::{ContentDigest, MediaType};

use crate::error::{HashError, HashResult};
use crate::sniff::sniff;

/// Number of leading bytes inspected for media sniffing.
pub const SNIFF_LEN: usize = 512;

const COPY_BUF_LEN: usize = 64 * 1024;

/// Configuration for the [`ContentHasher`].
#[derive(Clone, Debug)]
pub struct HasherConfig {
    /// Hard upper bound on payload size in bytes.
    pub max_size: u64,
    /// Directory for spool files. `None` uses the system temp directory.
    pub spool_dir: Option<PathBuf>,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            max_size: 50 * 1024 * 1024, // 50 MiB
            spool_dir: None,
        }
    }
}

/// Everything learned from consuming one payload stream.
#[derive(Debug)]
pub struct HashedContent {
    pub digest: ContentDigest,
    pub size: u64,
    pub media_type: MediaType,
    pub spool: Spool,
}

/// The consumed bytes of a payload, kept in a temporary file.
///
/// The file is removed when the spool is dropped.
#[derive(Debug)]
pub struct Spool {
    file: NamedTempFile,
    len: u64,
}

impl Spool {
    /// Open a fresh reader positioned at the first byte.
    pub async fn open(&self) -> std::io::Result<tokio::fs::File> {
        tokio::fs::File::open(self.file.path()).await
    }

    /// Number of spooled bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if nothing was spooled.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Location of the spool file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Streaming BLAKE3 hasher with media sniffing and a size bound.
#[derive(Clone, Debug, Default)]
pub struct ContentHasher {
    config: HasherConfig,
}

impl ContentHasher {
    pub fn new(config: HasherConfig) -> Self {
        Self { config }
    }

    /// The configured payload bound.
    pub fn max_size(&self) -> u64 {
        self.config.max_size
    }

    /// Consume `reader` to the end, hashing and spooling every byte.
    ///
    /// The first [`SNIFF_LEN`] bytes are read up front for sniffing and then
    /// replayed in front of the remainder, so the digest and the spool both
    /// cover the exact byte sequence of the source.
    pub async fn hash_stream<R>(&self, mut reader: R) -> HashResult<HashedContent>
    where
        R: AsyncRead + Unpin,
    {
        let mut prefix = vec![0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < SNIFF_LEN {
            let n = reader
                .read(&mut prefix[filled..])
                .await
                .map_err(HashError::Read)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        prefix.truncate(filled);
        let media_type = sniff(&prefix);

        let spool_file = match &self.config.spool_dir {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(HashError::Spool)?;
        let mut writer = tokio::fs::File::from_std(spool_file.reopen().map_err(HashError::Spool)?);

        let mut body = Cursor::new(prefix).chain(reader);
        let mut hasher = blake3::Hasher::new();
        let mut size: u64 = 0;
        let mut buf = vec![0u8; COPY_BUF_LEN];
        loop {
            let n = body.read(&mut buf).await.map_err(HashError::Read)?;
            if n == 0 {
                break;
            }
            size += n as u64;
            if size > self.config.max_size {
                return Err(HashError::PayloadTooLarge {
                    limit: self.config.max_size,
                });
            }
            hasher.update(&buf[..n]);
            writer.write_all(&buf[..n]).await.map_err(HashError::Spool)?;
        }
        writer.flush().await.map_err(HashError::Spool)?;

        let digest = ContentDigest::from(hasher.finalize());
        debug!(digest = %digest.short_hex(), size, media_type = %media_type, "payload hashed");

        Ok(HashedContent {
            digest,
            size,
            media_type,
            spool: Spool {
                file: spool_file,
                len: size,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    fn hasher(max_size: u64) -> ContentHasher {
        ContentHasher::new(HasherConfig {
            max_size,
            spool_dir: None,
        })
    }

    async fn read_spool(spool: &Spool) -> Vec<u8> {
        let mut file = spool.open().await.unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        out
    }

    /// Yields its data one byte per read, then fails.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        fail_at_end: bool,
    }

    impl AsyncRead for Trickle {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.pos < self.data.len() {
                let byte = self.data[self.pos];
                buf.put_slice(&[byte]);
                self.pos += 1;
                Poll::Ready(Ok(()))
            } else if self.fail_at_end {
                Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "client went away",
                )))
            } else {
                Poll::Ready(Ok(()))
            }
        }
    }

    #[tokio::test]
    async fn digest_and_size_match_input() {
        let data = b"hello, stash".to_vec();
        let hashed = hasher(1024).hash_stream(&data[..]).await.unwrap();
        assert_eq!(hashed.digest, ContentDigest::of(&data));
        assert_eq!(hashed.size, data.len() as u64);
        assert_eq!(hashed.spool.len(), data.len() as u64);
        assert_eq!(read_spool(&hashed.spool).await, data);
    }

    #[tokio::test]
    async fn spool_covers_prefix_and_remainder() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let hashed = hasher(1 << 20).hash_stream(&data[..]).await.unwrap();
        assert_eq!(read_spool(&hashed.spool).await, data);
        assert_eq!(hashed.digest, ContentDigest::of(&data));
    }

    #[tokio::test]
    async fn short_reads_fill_the_sniff_prefix() {
        let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
        data.extend_from_slice(&[0u8; 32]);
        let reader = Trickle {
            data: data.clone(),
            pos: 0,
            fail_at_end: false,
        };
        let hashed = hasher(1024).hash_stream(reader).await.unwrap();
        assert_eq!(hashed.media_type.mime(), "image/png");
        assert_eq!(read_spool(&hashed.spool).await, data);
    }

    #[tokio::test]
    async fn empty_stream_is_accepted() {
        let hashed = hasher(16).hash_stream(&b""[..]).await.unwrap();
        assert_eq!(hashed.size, 0);
        assert!(hashed.spool.is_empty());
        assert_eq!(hashed.digest, ContentDigest::of(b""));
    }

    #[tokio::test]
    async fn exactly_at_limit_is_accepted() {
        let data = vec![7u8; 100];
        let hashed = hasher(100).hash_stream(&data[..]).await.unwrap();
        assert_eq!(hashed.size, 100);
    }

    #[tokio::test]
    async fn one_byte_over_limit_is_rejected() {
        let data = vec![7u8; 101];
        let err = hasher(100).hash_stream(&data[..]).await.unwrap_err();
        assert!(matches!(err, HashError::PayloadTooLarge { limit: 100 }));
    }

    #[tokio::test]
    async fn source_failure_is_a_read_error() {
        let reader = Trickle {
            data: b"partial".to_vec(),
            pos: 0,
            fail_at_end: true,
        };
        let err = hasher(1024).hash_stream(reader).await.unwrap_err();
        assert!(matches!(err, HashError::Read(_)));
    }

    #[tokio::test]
    async fn missing_spool_dir_is_a_spool_error() {
        let dir = tempfile::tempdir().unwrap();
        let hasher = ContentHasher::new(HasherConfig {
            max_size: 1024,
            spool_dir: Some(dir.path().join("does-not-exist")),
        });
        let err = hasher.hash_stream(&b"data"[..]).await.unwrap_err();
        assert!(matches!(err, HashError::Spool(_)));
    }

    #[tokio::test]
    async fn spool_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let hasher = ContentHasher::new(HasherConfig {
            max_size: 1024,
            spool_dir: Some(dir.path().to_path_buf()),
        });
        let hashed = hasher.hash_stream(&b"transient"[..]).await.unwrap();
        let path = hashed.spool.path().to_path_buf();
        assert!(path.exists());
        drop(hashed);
        assert!(!path.exists());
    }
}
