//! Upload lifecycle routes.

use std::io;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use futures::TryStreamExt;
use stowage_core::storage::PresignedUrl;
use stowage_core::upload::{
    ChunkReceipt, CompleteUpload, CompletedUpload, InitiateUpload, UploadError, UploadStatus,
};
use stowage_shared::UploadId;
use tokio_util::io::StreamReader;

use crate::{
    AppState,
    error::ApiError,
    extract::{ApiJson, ApiPath},
};

/// Creates the upload routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/uploads", post(initiate_upload))
        .route(
            "/uploads/{upload_id}",
            get(upload_status).delete(abort_upload),
        )
        // Chunk bodies are streamed to disk and bounded by the part size.
        .route(
            "/uploads/{upload_id}/chunks/{part_index}",
            put(upload_chunk).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/uploads/{upload_id}/parts/{part_number}/presign",
            post(presign_part),
        )
        .route("/uploads/{upload_id}/presign", post(presign_single))
        .route("/uploads/{upload_id}/complete", post(complete_upload))
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/uploads`
async fn initiate_upload(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<InitiateUpload>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.uploads.initiate(request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET `/uploads/{upload_id}`
async fn upload_status(
    State(state): State<AppState>,
    ApiPath(upload_id): ApiPath<UploadId>,
) -> Result<Json<UploadStatus>, ApiError> {
    Ok(Json(state.uploads.status(&upload_id).await?))
}

/// PUT `/uploads/{upload_id}/chunks/{part_index}`
///
/// The raw request body is the chunk.
async fn upload_chunk(
    State(state): State<AppState>,
    ApiPath((upload_id, part_index)): ApiPath<(UploadId, u32)>,
    body: Body,
) -> Result<Json<ChunkReceipt>, ApiError> {
    let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    let receipt = state
        .uploads
        .upload_chunk(&upload_id, part_index, reader)
        .await?;
    Ok(Json(receipt))
}

/// POST `/uploads/{upload_id}/parts/{part_number}/presign`
async fn presign_part(
    State(state): State<AppState>,
    ApiPath((upload_id, part_number)): ApiPath<(UploadId, u32)>,
) -> Result<Json<PresignedUrl>, ApiError> {
    Ok(Json(
        state.uploads.presign_part(&upload_id, part_number).await?,
    ))
}

/// POST `/uploads/{upload_id}/presign`
async fn presign_single(
    State(state): State<AppState>,
    ApiPath(upload_id): ApiPath<UploadId>,
) -> Result<Json<PresignedUrl>, ApiError> {
    Ok(Json(state.uploads.presign_single(&upload_id).await?))
}

/// POST `/uploads/{upload_id}/complete`
///
/// The JSON body is optional; server-mediated uploads send none.
async fn complete_upload(
    State(state): State<AppState>,
    ApiPath(upload_id): ApiPath<UploadId>,
    body: Bytes,
) -> Result<Json<CompletedUpload>, ApiError> {
    let input = if body.iter().all(u8::is_ascii_whitespace) {
        CompleteUpload::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            UploadError::validation(format!("invalid completion body: {e}"))
        })?
    };
    Ok(Json(state.uploads.complete(&upload_id, input).await?))
}

/// DELETE `/uploads/{upload_id}`
async fn abort_upload(
    State(state): State<AppState>,
    ApiPath(upload_id): ApiPath<UploadId>,
) -> Result<StatusCode, ApiError> {
    state.uploads.abort(&upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use stowage_core::storage::{ProfileResolver, StorageProfiles, StorageProvider};
    use stowage_core::upload::{MemoryKv, UploadConfig, UploadService};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::create_router;

    fn test_app() -> (Router, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let profiles = StorageProfiles::single(
            "local",
            StorageProvider::local_fs(dir.path().join("objects")),
        );
        let service = UploadService::new(
            UploadConfig::with_work_dir(dir.path().join("work")),
            Arc::new(ProfileResolver::new(profiles)),
            Arc::new(MemoryKv::new()),
        );
        (create_router(AppState::new(service)), dir)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn initiate(app: &Router, file_size: u64) -> String {
        let (status, body) = send(
            app,
            json_request(
                "POST",
                "/api/v1/uploads",
                &json!({
                    "project_id": "proj",
                    "file_name": "notes.txt",
                    "file_size": file_size,
                    "content_type": "text/plain",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["upload_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = test_app();
        let (status, body) = send(&app, empty_request("GET", "/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_local_upload_flow() {
        let (app, dir) = test_app();
        let id = initiate(&app, 11).await;

        let (status, receipt) = send(
            &app,
            Request::builder()
                .method("PUT")
                .uri(format!("/api/v1/uploads/{id}/chunks/0"))
                .body(Body::from("hello world"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(receipt["size"], 11);
        assert_eq!(receipt["part_index"], 0);

        let (status, body) = send(&app, empty_request("GET", &format!("/api/v1/uploads/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["uploaded_parts"], json!([0]));
        assert_eq!(body["session"]["strategy"], "LOCAL_CHUNK");
        assert_eq!(body["session"]["provider_name"], "LOCAL");

        let (status, done) = send(
            &app,
            empty_request("POST", &format!("/api/v1/uploads/{id}/complete")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["object_key"], "proj/notes.txt");
        assert_eq!(done["url"], "/files/proj/notes.txt");
        assert_eq!(done["size"], 11);
        assert_eq!(
            std::fs::read(dir.path().join("objects/proj/notes.txt")).unwrap(),
            b"hello world"
        );

        let (status, body) = send(&app, empty_request("GET", &format!("/api/v1/uploads/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_initiate_validation_error() {
        let (app, _dir) = test_app();
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/uploads",
                &json!({"project_id": "proj", "file_name": "a.bin", "file_size": 0}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_complete_incomplete_upload() {
        let (app, _dir) = test_app();
        let id = initiate(&app, 11).await;

        let (status, body) = send(
            &app,
            empty_request("POST", &format!("/api/v1/uploads/{id}/complete")),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "BUSINESS_RULE_VIOLATION");
        assert_eq!(body["details"]["uploaded_parts"], json!([]));
        assert_eq!(body["details"]["total_parts"], 1);
    }

    #[tokio::test]
    async fn test_malformed_completion_body() {
        let (app, _dir) = test_app();
        let id = initiate(&app, 11).await;

        let (status, body) = send(
            &app,
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/uploads/{id}/complete"))
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_presign_on_local_upload_conflicts() {
        let (app, _dir) = test_app();
        let id = initiate(&app, 11).await;

        for uri in [
            format!("/api/v1/uploads/{id}/parts/1/presign"),
            format!("/api/v1/uploads/{id}/presign"),
        ] {
            let (status, body) = send(&app, empty_request("POST", &uri)).await;
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(body["error"], "CONFLICT");
        }
    }

    #[tokio::test]
    async fn test_chunk_index_out_of_range() {
        let (app, _dir) = test_app();
        let id = initiate(&app, 4).await;

        let (status, body) = send(
            &app,
            Request::builder()
                .method("PUT")
                .uri(format!("/api/v1/uploads/{id}/chunks/1"))
                .body(Body::from("data"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_bad_upload_id_renders_json_error() {
        let (app, _dir) = test_app();
        for request in [
            empty_request("GET", "/api/v1/uploads/not-a-uuid"),
            empty_request("DELETE", "/api/v1/uploads/not-a-uuid"),
            empty_request("POST", "/api/v1/uploads/not-a-uuid/parts/x/presign"),
        ] {
            let (status, body) = send(&app, request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "VALIDATION_ERROR");
            assert!(body["message"].is_string());
        }
    }

    #[tokio::test]
    async fn test_malformed_initiate_body_renders_json_error() {
        let (app, _dir) = test_app();
        let requests = [
            Request::builder()
                .method("POST")
                .uri("/api/v1/uploads")
                .header("Content-Type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
            json_request("POST", "/api/v1/uploads", &json!({"project_id": "proj"})),
            Request::builder()
                .method("POST")
                .uri("/api/v1/uploads")
                .body(Body::from("{}"))
                .unwrap(),
        ];
        for request in requests {
            let (status, body) = send(&app, request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "VALIDATION_ERROR");
            assert!(body["message"].is_string());
        }
    }

    #[tokio::test]
    async fn test_abort_returns_no_content() {
        let (app, _dir) = test_app();
        let id = initiate(&app, 11).await;
        let uri = format!("/api/v1/uploads/{id}");

        let (status, _) = send(&app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, empty_request("GET", &uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
