//! Core services: chunk persistence, hashing, the content catalog and the
//! assembler that ties them together.

pub mod chunk_store;
pub mod deletion_queue;
pub mod error;
pub mod file_assembler;
pub mod file_catalog;
pub mod hasher;
