//! Data models for the chunked upload pipeline.
//!
//! `ChunkDescriptor` is transient and arrives with every chunk request;
//! `FileRecord` is the durable catalog entry and maps to the `files` table via
//! `sqlx::FromRow`.

pub mod chunk;
pub mod file_record;
