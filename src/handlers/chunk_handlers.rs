//! HTTP handlers for chunk ingress and merging.
//! Only request framing is handled here; every decision is made by the
//! chunk store and the assembler.

use crate::{
    errors::AppError,
    models::{chunk::ChunkDescriptor, file_record::FileRecord},
    services::file_assembler::MergeState,
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Serialize;
use std::{io, str::FromStr};

/// Text fields collected from a chunk upload form before its `file` part.
#[derive(Debug, Default)]
struct ChunkForm {
    identifier: Option<String>,
    chunk_number: Option<u32>,
    chunk_size: Option<u64>,
    total_chunks: Option<u32>,
    filename: Option<String>,
}

impl ChunkForm {
    fn set(&mut self, name: &str, value: String) -> Result<(), AppError> {
        match name {
            "identifier" => self.identifier = Some(value),
            "chunkNumber" => self.chunk_number = Some(parse_field(name, &value)?),
            "chunkSize" => self.chunk_size = Some(parse_field(name, &value)?),
            "totalChunks" => self.total_chunks = Some(parse_field(name, &value)?),
            "filename" => self.filename = Some(value),
            // resumable clients send extra bookkeeping (totalSize, relativePath, ...)
            _ => {}
        }
        Ok(())
    }

    fn descriptor(&self) -> Result<ChunkDescriptor, AppError> {
        let missing = |field: &str| AppError::bad_request(format!("missing form field `{}`", field));
        Ok(ChunkDescriptor {
            identifier: self.identifier.clone().ok_or_else(|| missing("identifier"))?,
            chunk_number: self.chunk_number.ok_or_else(|| missing("chunkNumber"))?,
            chunk_size: self.chunk_size.ok_or_else(|| missing("chunkSize"))?,
            total_chunks: self.total_chunks.ok_or_else(|| missing("totalChunks"))?,
            filename: self.filename.clone().unwrap_or_default(),
        })
    }
}

fn parse_field<T: FromStr>(name: &str, value: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::bad_request(format!("form field `{}` is not a number", name)))
}

#[derive(Serialize)]
pub struct ChunkSaved {
    pub chunk_number: u32,
    pub bytes: u64,
}

#[derive(Serialize)]
pub struct ChunkPresence {
    pub exists: bool,
}

/// `POST /chunks` — multipart upload of one chunk.
///
/// The descriptor fields must precede the `file` part, whose body is streamed
/// straight to disk.
pub async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ChunkSaved>, AppError> {
    let mut form = ChunkForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let descriptor = form.descriptor()?;
            let stream = field.map(|chunk| chunk.map_err(io::Error::other));
            let bytes = state.chunks.save(&descriptor, stream).await?;
            return Ok(Json(ChunkSaved {
                chunk_number: descriptor.chunk_number,
                bytes,
            }));
        }
        let value = field
            .text()
            .await
            .map_err(|err| AppError::bad_request(err.to_string()))?;
        form.set(&name, value)?;
    }
    Err(AppError::bad_request("multipart body has no `file` part"))
}

/// `GET /chunks` — 200 if the chunk is stored with the declared size, 204 otherwise.
pub async fn has_chunk(
    State(state): State<AppState>,
    Query(descriptor): Query<ChunkDescriptor>,
) -> Result<Response, AppError> {
    if state.chunks.has(&descriptor).await? {
        Ok((StatusCode::OK, Json(ChunkPresence { exists: true })).into_response())
    } else {
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

/// `POST /chunks/merge` — assemble all chunks of an upload.
pub async fn merge_chunks(
    State(state): State<AppState>,
    Json(descriptor): Json<ChunkDescriptor>,
) -> Result<Json<FileRecord>, AppError> {
    let record = state.assembler.merge_chunks(&descriptor).await?;
    Ok(Json(record))
}

/// `GET /chunks/{identifier}/state`
pub async fn merge_state(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<MergeState>, AppError> {
    Ok(Json(state.assembler.state(&identifier).await?))
}
