//! Describes one numbered chunk of an upload session.

use serde::{Deserialize, Serialize};

/// Per-request description of a chunk, as sent by resumable-upload clients.
///
/// Chunks of one upload share an `identifier`; the pair
/// `(identifier, chunk_number)` addresses a single chunk file. The identifier is
/// also the expected content hash of the assembled file, so a client has to know
/// the digest of the whole file before it uploads the first byte.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    /// Upload session key and expected final content hash.
    pub identifier: String,

    /// 1-based position of this chunk. Ignored by merge requests.
    #[serde(default)]
    pub chunk_number: u32,

    /// Declared byte length of this chunk.
    #[serde(default)]
    pub chunk_size: u64,

    /// Number of chunks making up the whole file.
    pub total_chunks: u32,

    /// Original file name; only its extension is used.
    #[serde(default)]
    pub filename: String,
}

impl ChunkDescriptor {
    /// Extension of the original file name, if it has a usable one.
    pub fn extension(&self) -> Option<&str> {
        file_extension(&self.filename)
    }
}

/// Text after the last `.` of the final path segment, or `None` when empty.
///
/// `"data.txt"` gives `txt`, `"a.tar.gz"` gives `gz`, `"README"` and `"dir.d/file"`
/// give `None`.
pub fn file_extension(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}
