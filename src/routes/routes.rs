//! Defines routes for chunk ingress, merging and the file catalog.
//!
//! ## Structure
//! - **Chunk endpoints**
//!   - `POST   /chunks` — multipart chunk upload
//!   - `GET    /chunks` — does a chunk with the declared size exist? (200 / 204)
//!   - `POST   /chunks/merge` — assemble, verify and register an upload
//!   - `GET    /chunks/{identifier}/state` — merge state of an upload
//!
//! - **File endpoints**
//!   - `GET    /files/{id}` — catalog record
//!   - `HEAD   /files/{id}` — is the id cataloged? (200 / 404)
//!   - `GET    /files/{id}/content` — stored bytes
//!   - `DELETE /files/{id}` — remove record, schedule byte removal
//!   - `GET    /hashes/{hash}` — catalog record by content hash
//!   - `HEAD   /hashes/{hash}` — is the hash cataloged? (200 / 404)

use crate::{
    handlers::{
        chunk_handlers::{has_chunk, merge_chunks, merge_state, upload_chunk},
        file_handlers::{
            delete_file, download_file, get_file, get_file_by_hash, head_file, head_file_by_hash,
        },
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Largest accepted request body, which bounds the size of a single chunk.
const MAX_CHUNK_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Build and return the router for all upload and catalog routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Chunk routes
        .route("/chunks", get(has_chunk).post(upload_chunk))
        .route("/chunks/merge", post(merge_chunks))
        .route("/chunks/{identifier}/state", get(merge_state))
        // File routes
        .route(
            "/files/{id}",
            get(get_file).head(head_file).delete(delete_file),
        )
        .route("/files/{id}/content", get(download_file))
        .route("/hashes/{hash}", get(get_file_by_hash).head(head_file_by_hash))
        .layer(DefaultBodyLimit::max(MAX_CHUNK_BODY_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::file_record::FileRecord,
        test_support::{Fixture, assembler, md5_hex},
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "chunk-boundary";

    async fn app(root: &std::path::Path) -> (Router, Fixture) {
        let fx = assembler(root, false).await;
        let state = AppState {
            chunks: fx.chunks.clone(),
            catalog: fx.catalog.clone(),
            assembler: fx.assembler.clone(),
        };
        (routes().with_state(state), fx)
    }

    fn multipart(fields: &[(&str, String)], file: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"blob\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/chunks")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn chunk_fields(identifier: &str, number: u32, size: usize, total: u32) -> Vec<(&'static str, String)> {
        vec![
            ("identifier", identifier.to_string()),
            ("chunkNumber", number.to_string()),
            ("chunkSize", size.to_string()),
            ("totalChunks", total.to_string()),
            ("filename", "data.txt".to_string()),
        ]
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    async fn upload_all(app: &Router, hash: &str) {
        let parts: [&[u8]; 3] = [b"ABCD", b"EFGH", b"IJ"];
        for (i, part) in parts.iter().enumerate() {
            let request = multipart(&chunk_fields(hash, i as u32 + 1, part.len(), 3), part);
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn upload_probe_merge_download_delete() {
        let dir = TempDir::new().unwrap();
        let (app, fx) = app(dir.path()).await;
        let hash = md5_hex(b"ABCDEFGHIJ");

        let probe = format!(
            "/chunks?identifier={hash}&chunkNumber=1&chunkSize=4&totalChunks=3&filename=data.txt"
        );
        let before = app.clone().oneshot(empty_request(Method::GET, &probe)).await.unwrap();
        assert_eq!(before.status(), StatusCode::NO_CONTENT);

        upload_all(&app, &hash).await;

        let after = app.clone().oneshot(empty_request(Method::GET, &probe)).await.unwrap();
        assert_eq!(after.status(), StatusCode::OK);
        let presence: Value = body_json(after).await;
        assert_eq!(presence, json!({ "exists": true }));

        let merged = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/chunks/merge",
                json!({ "identifier": hash, "totalChunks": 3, "filename": "data.txt" }),
            ))
            .await
            .unwrap();
        assert_eq!(merged.status(), StatusCode::OK);
        let record: FileRecord = body_json(merged).await;
        assert_eq!(record.content_hash, hash);
        assert_eq!(record.extension, "txt");
        assert_eq!(record.size_bytes, 10);

        let known = app
            .clone()
            .oneshot(empty_request(Method::HEAD, &format!("/hashes/{hash}")))
            .await
            .unwrap();
        assert_eq!(known.status(), StatusCode::OK);

        let by_hash = app
            .clone()
            .oneshot(empty_request(Method::GET, &format!("/hashes/{hash}")))
            .await
            .unwrap();
        assert_eq!(body_json::<FileRecord>(by_hash).await, record);

        let state = app
            .clone()
            .oneshot(empty_request(Method::GET, &format!("/chunks/{hash}/state")))
            .await
            .unwrap();
        let state: Value = body_json(state).await;
        assert_eq!(state["state"], "complete");
        assert_eq!(state["file_id"], record.id.to_string());

        let content = app
            .clone()
            .oneshot(empty_request(
                Method::GET,
                &format!("/files/{}/content", record.id),
            ))
            .await
            .unwrap();
        assert_eq!(content.status(), StatusCode::OK);
        assert_eq!(
            content.headers()[header::ETAG],
            format!("\"{hash}\"").as_str()
        );
        assert_eq!(body_bytes(content).await, b"ABCDEFGHIJ");

        let deleted = app
            .clone()
            .oneshot(empty_request(Method::DELETE, &format!("/files/{}", record.id)))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);

        let gone = app
            .clone()
            .oneshot(empty_request(Method::GET, &format!("/files/{}", record.id)))
            .await
            .unwrap();
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);

        fx.queue.flush().await;
        assert!(!std::path::Path::new(&record.storage_path).exists());
    }

    #[tokio::test]
    async fn merge_with_missing_chunk_is_conflict() {
        let dir = TempDir::new().unwrap();
        let (app, _fx) = app(dir.path()).await;
        let hash = md5_hex(b"ABCDEFGHIJ");
        let request = multipart(&chunk_fields(&hash, 1, 4, 3), b"ABCD");
        app.clone().oneshot(request).await.unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/chunks/merge",
                json!({ "identifier": hash, "totalChunks": 3, "filename": "data.txt" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: Value = body_json(response).await;
        assert_eq!(body["status"], 409);
        assert!(body["error"].as_str().unwrap().contains("chunk 2"));
    }

    #[tokio::test]
    async fn upload_without_descriptor_fields_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (app, _fx) = app(dir.path()).await;

        let request = multipart(&[("identifier", "abc".to_string())], b"ABCD");
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (app, _fx) = app(dir.path()).await;

        for uri in ["/files/not-a-uuid", "/hashes/feedface"] {
            let response = app.clone().oneshot(empty_request(Method::GET, uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
        for uri in ["/files/not-a-uuid", "/hashes/feedface"] {
            let response = app.clone().oneshot(empty_request(Method::HEAD, uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
        let response = app
            .oneshot(empty_request(Method::DELETE, "/files/not-a-uuid"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_length_follows_the_stored_payload() {
        let dir = TempDir::new().unwrap();
        let (app, _fx) = app(dir.path()).await;
        let hash = md5_hex(b"ABCDEFGHIJ");
        upload_all(&app, &hash).await;
        let merged = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/chunks/merge",
                json!({ "identifier": hash, "totalChunks": 3, "filename": "data.txt" }),
            ))
            .await
            .unwrap();
        let record: FileRecord = body_json(merged).await;
        std::fs::write(&record.storage_path, b"ABCDEFGHIJKL").unwrap();

        let content = app
            .oneshot(empty_request(
                Method::GET,
                &format!("/files/{}/content", record.id),
            ))
            .await
            .unwrap();

        assert_eq!(content.headers()[header::CONTENT_LENGTH], "12");
        assert_eq!(body_bytes(content).await, b"ABCDEFGHIJKL");
    }

    #[tokio::test]
    async fn merge_with_unusable_extension_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (app, _fx) = app(dir.path()).await;
        let hash = md5_hex(b"ABCDEFGHIJ");
        upload_all(&app, &hash).await;

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/chunks/merge",
                json!({ "identifier": hash, "totalChunks": 3, "filename": "data.t\0xt" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn readiness_checks_both_roots() {
        let dir = TempDir::new().unwrap();
        let (app, fx) = app(dir.path()).await;

        let missing = app.clone().oneshot(empty_request(Method::GET, "/readyz")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::SERVICE_UNAVAILABLE);

        std::fs::create_dir_all(fx.chunks.root()).unwrap();
        std::fs::create_dir_all(&fx.files_root).unwrap();
        let ready = app.oneshot(empty_request(Method::GET, "/readyz")).await.unwrap();
        assert_eq!(ready.status(), StatusCode::OK);
    }
}
