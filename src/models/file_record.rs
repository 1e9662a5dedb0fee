//! Represents an assembled file registered in the content catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog entry for one distinct piece of content.
///
/// At most one record exists per `content_hash`. The struct stores metadata
/// only; the bytes live at `storage_path`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Lowercase hex MD5 of the full file content.
    pub content_hash: String,

    /// Extension of the stored file without the dot; empty when it has none.
    pub extension: String,

    /// Size in bytes at registration time.
    pub size_bytes: i64,

    /// Location of the assembled file on disk.
    pub storage_path: String,

    /// When the record was registered.
    pub created_at: DateTime<Utc>,
}
