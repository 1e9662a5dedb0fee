//! HTTP handlers for cataloged files.

use crate::{errors::AppError, models::file_record::FileRecord, state::AppState};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use std::io;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// `GET /files/{id}`
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, AppError> {
    Ok(Json(state.catalog.find_by_id(&id).await?))
}

/// `HEAD /files/{id}` — 200 if cataloged, 404 otherwise.
pub async fn head_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    Ok(presence(state.catalog.exists_by_id(&id).await?))
}

/// `HEAD /hashes/{hash}`
pub async fn head_file_by_hash(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<StatusCode, AppError> {
    Ok(presence(state.catalog.exists_by_hash(&hash).await?))
}

fn presence(exists: bool) -> StatusCode {
    if exists {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

/// `GET /hashes/{hash}`
pub async fn get_file_by_hash(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<FileRecord>, AppError> {
    Ok(Json(state.catalog.find_by_hash(&hash).await?))
}

/// `GET /files/{id}/content` — stream the stored bytes.
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let record = state.catalog.find_by_id(&id).await?;
    let file = File::open(&record.storage_path).await.map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            AppError::not_found(format!("payload of file `{}` is missing", record.id))
        } else {
            AppError::internal(err.to_string())
        }
    })?;
    let length = file
        .metadata()
        .await
        .map_err(|err| AppError::internal(err.to_string()))?
        .len();

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &record, length);
    Ok(response)
}

/// `DELETE /files/{id}` — metadata goes now, bytes are removed in the background.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, AppError> {
    Ok(Json(state.catalog.delete_by_id(&id).await?))
}

/// `length` is the size of the payload being sent, which is what the body
/// will actually contain.
fn set_file_headers(headers: &mut HeaderMap, record: &FileRecord, length: u64) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", record.content_hash)) {
        headers.insert(header::ETAG, value);
    }

    let name = if record.extension.is_empty() {
        record.content_hash.clone()
    } else {
        format!("{}.{}", record.content_hash, record.extension)
    };
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    headers.insert(
        header::LAST_MODIFIED,
        HeaderValue::from_str(&record.created_at.to_rfc2822())
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
}
