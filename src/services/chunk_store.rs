//! src/services/chunk_store.rs
//!
//! ChunkStore — temporary on-disk storage for uploaded chunks. Each chunk lives
//! at `chunks_root/{identifier}/{chunk_number}.tmp` until its upload is merged
//! or abandoned. No in-memory state is kept, so distinct chunks of one upload
//! can be written fully in parallel.

use crate::{
    models::chunk::ChunkDescriptor,
    services::error::{StorageError, StorageResult},
};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_IDENTIFIER_LEN: usize = 255;
const CHUNK_SUFFIX: &str = "tmp";

#[derive(Clone, Debug)]
pub struct ChunkStore {
    /// Base directory holding one sub-directory per upload identifier.
    root: PathBuf,
}

impl ChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every chunk of one upload.
    fn session_dir(&self, identifier: &str) -> PathBuf {
        self.root.join(identifier)
    }

    /// Final location of a single chunk.
    pub fn chunk_path(&self, identifier: &str, chunk_number: u32) -> PathBuf {
        self.session_dir(identifier)
            .join(format!("{}.{}", chunk_number, CHUNK_SUFFIX))
    }

    /// Persist one chunk, replacing whatever was stored for the same number.
    ///
    /// Bytes are streamed into a hidden temp file first and renamed into place,
    /// so `has` never sees a half-written chunk under its final name.
    /// Returns the number of bytes written.
    pub async fn save<S>(&self, descriptor: &ChunkDescriptor, stream: S) -> StorageResult<u64>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        ensure_chunk_addressable(descriptor)?;

        let dir = self.session_dir(&descriptor.identifier);
        fs::create_dir_all(&dir).await?;
        let chunk_path = self.chunk_path(&descriptor.identifier, descriptor.chunk_number);
        let tmp_path = dir.join(format!(".part-{}", Uuid::new_v4()));

        let written = match write_stream(&tmp_path, stream).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &chunk_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&chunk_path).await?;
                fs::rename(&tmp_path, &chunk_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        if descriptor.chunk_size != written {
            debug!(
                identifier = %descriptor.identifier,
                chunk_number = descriptor.chunk_number,
                declared = descriptor.chunk_size,
                written,
                "chunk size differs from declared size"
            );
        }
        tracing::info!(
            identifier = %descriptor.identifier,
            chunk_number = descriptor.chunk_number,
            bytes = written,
            "chunk saved"
        );

        Ok(written)
    }

    /// True iff the chunk file exists and its length equals the declared size.
    ///
    /// A chunk with a different length (for example a truncated upload) reports
    /// `false` so the client uploads it again.
    pub async fn has(&self, descriptor: &ChunkDescriptor) -> StorageResult<bool> {
        ensure_chunk_addressable(descriptor)?;
        let path = self.chunk_path(&descriptor.identifier, descriptor.chunk_number);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file() && meta.len() == descriptor.chunk_size),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Open a stored chunk for reading.
    pub async fn read(&self, identifier: &str, chunk_number: u32) -> StorageResult<File> {
        ensure_identifier_safe(identifier)?;
        let path = self.chunk_path(identifier, chunk_number);
        File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ChunkMissing {
                    identifier: identifier.to_string(),
                    chunk_number,
                }
            } else {
                StorageError::Io(err)
            }
        })
    }

    /// Delete every chunk of an upload. Returns how many chunk files were removed.
    pub async fn remove_session(&self, identifier: &str) -> StorageResult<usize> {
        ensure_identifier_safe(identifier)?;
        let dir = self.session_dir(identifier);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(StorageError::Io(err)),
        };

        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            match fs::remove_file(entry.path()).await {
                Ok(_) => count += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        match fs::remove_dir(&dir).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => debug!("failed to remove chunk directory {}: {}", dir.display(), err),
        }

        debug!(identifier, removed = count, "reclaimed upload chunks");
        Ok(count)
    }
}

async fn write_stream<S>(path: &Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(path).await?;
    let mut written: u64 = 0;
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Reject identifiers that could escape `chunks_root` or `files_root`.
///
/// The identifier becomes a directory and file name verbatim, so separators,
/// parent references and control bytes are refused outright.
pub fn ensure_identifier_safe(identifier: &str) -> StorageResult<()> {
    let invalid = identifier.is_empty()
        || identifier.len() > MAX_IDENTIFIER_LEN
        || identifier == "."
        || identifier.contains("..")
        || identifier
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\');
    if invalid {
        return Err(StorageError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(())
}

/// Chunk numbers are 1-based and never exceed the declared total.
fn ensure_chunk_addressable(descriptor: &ChunkDescriptor) -> StorageResult<()> {
    ensure_identifier_safe(&descriptor.identifier)?;
    if descriptor.chunk_number == 0 {
        return Err(StorageError::InvalidDescriptor(
            "chunk numbers start at 1".into(),
        ));
    }
    if descriptor.total_chunks > 0 && descriptor.chunk_number > descriptor.total_chunks {
        return Err(StorageError::InvalidDescriptor(format!(
            "chunk {} exceeds total of {}",
            descriptor.chunk_number, descriptor.total_chunks
        )));
    }
    Ok(())
}
