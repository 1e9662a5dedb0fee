//! Shared state handed to every HTTP handler.

use crate::services::{
    chunk_store::ChunkStore, file_assembler::FileAssembler, file_catalog::FileCatalog,
};

#[derive(Clone)]
pub struct AppState {
    pub chunks: ChunkStore,
    pub catalog: FileCatalog,
    pub assembler: FileAssembler,
}
