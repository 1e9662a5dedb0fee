//! Shared fixtures for unit tests.

use crate::{
    models::chunk::ChunkDescriptor,
    services::{
        chunk_store::ChunkStore, deletion_queue::DeletionQueue, file_assembler::FileAssembler,
        file_catalog::FileCatalog, hasher::ContentHasher,
    },
};
use bytes::Bytes;
use futures::Stream;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

/// In-memory SQLite database. A single, never-recycled connection keeps the
/// database alive for the whole test.
pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    Arc::new(pool)
}

pub async fn catalog() -> (FileCatalog, DeletionQueue) {
    let queue = DeletionQueue::spawn();
    let catalog = FileCatalog::new(memory_pool().await, queue.clone());
    catalog.migrate().await.unwrap();
    (catalog, queue)
}

pub struct Fixture {
    pub assembler: FileAssembler,
    pub chunks: ChunkStore,
    pub catalog: FileCatalog,
    pub queue: DeletionQueue,
    pub files_root: PathBuf,
}

pub async fn assembler(root: &Path, reclaim_chunks: bool) -> Fixture {
    let (catalog, queue) = catalog().await;
    let chunks = ChunkStore::new(root.join("chunks"));
    let files_root = root.join("files");
    let assembler = FileAssembler::new(
        chunks.clone(),
        catalog.clone(),
        files_root.clone(),
        reclaim_chunks,
    );
    Fixture {
        assembler,
        chunks,
        catalog,
        queue,
        files_root,
    }
}

pub fn descriptor(
    identifier: &str,
    chunk_number: u32,
    chunk_size: u64,
    total_chunks: u32,
    filename: &str,
) -> ChunkDescriptor {
    ChunkDescriptor {
        identifier: identifier.to_string(),
        chunk_number,
        chunk_size,
        total_chunks,
        filename: filename.to_string(),
    }
}

pub fn bytes_stream(parts: &[&[u8]]) -> impl Stream<Item = io::Result<Bytes>> + use<> {
    let parts: Vec<io::Result<Bytes>> = parts
        .iter()
        .map(|part| Ok(Bytes::copy_from_slice(part)))
        .collect();
    futures::stream::iter(parts)
}

pub fn md5_hex(data: &[u8]) -> String {
    ContentHasher::hash_bytes(data)
}
