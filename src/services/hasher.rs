//! Streaming MD5 digests over files, readers and buffers.
//!
//! The same digest serves as catalog identity and as the integrity check for
//! assembled uploads, so every caller goes through this module.

use md5::Context;
use std::{io, path::Path};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt},
};

/// Read buffer size used while hashing.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

pub struct ContentHasher;

impl ContentHasher {
    /// Hash an in-memory buffer.
    pub fn hash_bytes(data: &[u8]) -> String {
        format!("{:x}", md5::compute(data))
    }

    /// Hash everything `reader` yields, holding at most one buffer in memory.
    pub async fn hash_reader<R>(mut reader: R) -> io::Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut digest = Context::new();
        let mut buf = vec![0u8; HASH_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            digest.consume(&buf[..n]);
        }
        Ok(format!("{:x}", digest.compute()))
    }

    /// Hash the file at `path`.
    pub async fn hash_file(path: impl AsRef<Path>) -> io::Result<String> {
        let file = File::open(path.as_ref()).await?;
        Self::hash_reader(file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            ContentHasher::hash_bytes(b""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            ContentHasher::hash_bytes(b"hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[tokio::test]
    async fn reader_matches_buffer_across_buffer_boundaries() {
        let data: Vec<u8> = (0..(HASH_BUFFER_SIZE * 2 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        let streamed = ContentHasher::hash_reader(&data[..]).await.unwrap();
        assert_eq!(streamed, ContentHasher::hash_bytes(&data));
    }

    #[tokio::test]
    async fn hash_file_reads_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("blob");
        tokio::fs::write(&path, b"ABCDEFGHIJ").await.unwrap();

        let digest = ContentHasher::hash_file(&path).await.unwrap();
        assert_eq!(digest, ContentHasher::hash_bytes(b"ABCDEFGHIJ"));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ContentHasher::hash_file(dir.path().join("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
