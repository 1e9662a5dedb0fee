//! src/services/file_catalog.rs
//!
//! FileCatalog — durable mapping from content hash to `FileRecord`, backed by
//! SQLite. The `UNIQUE` constraint on `files.content_hash` is what guarantees at
//! most one record per distinct content: concurrent registrations of the same
//! hash race on the insert and every loser gets `DuplicateContent`.

use crate::{
    models::{chunk::file_extension, file_record::FileRecord},
    services::{
        deletion_queue::DeletionQueue,
        error::{StorageError, StorageResult},
    },
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::{path::Path, sync::Arc};
use tokio::fs;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct FileCatalog {
    /// Shared SQLite connection pool used for metadata operations.
    db: Arc<SqlitePool>,

    /// Receives the payload paths of deleted records.
    deletions: DeletionQueue,
}

impl FileCatalog {
    pub fn new(db: Arc<SqlitePool>, deletions: DeletionQueue) -> Self {
        Self { db, deletions }
    }

    /// Apply the embedded schema. Statements are idempotent.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());
        for stmt in statements {
            tracing::debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Lightweight connectivity probe.
    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }

    pub async fn exists_by_id(&self, id: &str) -> StorageResult<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM files WHERE id = ?")
            .bind(id)
            .fetch_one(&*self.db)
            .await?;
        Ok(found > 0)
    }

    pub async fn exists_by_hash(&self, hash: &str) -> StorageResult<bool> {
        if hash.is_empty() {
            return Ok(false);
        }
        let found =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM files WHERE content_hash = ?")
                .bind(hash)
                .fetch_one(&*self.db)
                .await?;
        Ok(found > 0)
    }

    pub async fn find_by_id(&self, id: &str) -> StorageResult<FileRecord> {
        let uuid = parse_id(id).ok_or_else(|| StorageError::RecordNotFound(id.to_string()))?;
        sqlx::query_as::<_, FileRecord>(
            "SELECT id, content_hash, extension, size_bytes, storage_path, created_at
             FROM files WHERE id = ?",
        )
        .bind(uuid)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StorageError::RecordNotFound(id.to_string()))
    }

    pub async fn find_by_hash(&self, hash: &str) -> StorageResult<FileRecord> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT id, content_hash, extension, size_bytes, storage_path, created_at
             FROM files WHERE content_hash = ?",
        )
        .bind(hash)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StorageError::RecordNotFound(hash.to_string()))
    }

    /// Register the file at `path` under `hash`. Size and extension are read
    /// from the file itself.
    ///
    /// Fails with `DuplicateContent` if `hash` is already cataloged, including
    /// when a concurrent registration wins the insert.
    pub async fn register(&self, path: &Path, hash: &str) -> StorageResult<FileRecord> {
        let size_bytes = fs::metadata(path).await?.len();
        let extension = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(file_extension)
            .unwrap_or_default()
            .to_string();
        let storage_path = path.to_string_lossy().into_owned();

        let inserted = sqlx::query_as::<_, FileRecord>(
            r#"
            INSERT INTO files (id, content_hash, extension, size_bytes, storage_path, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, content_hash, extension, size_bytes, storage_path, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(hash)
        .bind(&extension)
        .bind(size_bytes as i64)
        .bind(&storage_path)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match inserted {
            Ok(record) => {
                tracing::info!(
                    id = %record.id,
                    content_hash = %record.content_hash,
                    size_bytes = record.size_bytes,
                    "registered file"
                );
                Ok(record)
            }
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::DuplicateContent(hash.to_string()))
            }
            Err(err) => Err(StorageError::Database(err)),
        }
    }

    /// Remove the record now; its payload is handed to the deletion queue.
    pub async fn delete_by_id(&self, id: &str) -> StorageResult<FileRecord> {
        let uuid = parse_id(id).ok_or_else(|| StorageError::RecordNotFound(id.to_string()))?;
        let record = sqlx::query_as::<_, FileRecord>(
            "DELETE FROM files WHERE id = ?
             RETURNING id, content_hash, extension, size_bytes, storage_path, created_at",
        )
        .bind(uuid)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StorageError::RecordNotFound(id.to_string()))?;

        self.deletions.schedule(&record.storage_path).await;
        tracing::info!(id = %record.id, content_hash = %record.content_hash, "deleted file record");
        Ok(record)
    }

    /// Keep a previously deleted payload path from being removed, because it is
    /// about to hold a new file.
    pub async fn reclaim_path(&self, path: &Path) -> bool {
        self.deletions.cancel(path).await
    }
}

fn parse_id(id: &str) -> Option<Uuid> {
    if id.is_empty() {
        return None;
    }
    Uuid::parse_str(id).ok()
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.is_unique_violation()
            || db_err.message().to_ascii_lowercase().contains("unique")
    )
}
