//! Error taxonomy shared by the chunk store, catalog and assembler.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file record `{0}` not found")]
    RecordNotFound(String),
    #[error("content `{0}` is already cataloged")]
    DuplicateContent(String),
    #[error("chunk {chunk_number} of upload `{identifier}` is missing")]
    ChunkMissing {
        identifier: String,
        chunk_number: u32,
    },
    #[error("assembled content hashes to `{actual}`, expected `{expected}`")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("invalid upload identifier `{0}`")]
    InvalidIdentifier(String),
    #[error("invalid chunk descriptor: {0}")]
    InvalidDescriptor(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
