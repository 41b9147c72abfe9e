//! Attachment routes.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use fieldsync_engine::http::UploadResponse;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_download, handle_upload};
use crate::AppState;

/// Largest accepted upload (photos, signatures).
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Create attachment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/attachments/{*path}",
            get(download_handler).put(upload_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// PUT /attachments/{*path} - Upload a blob.
async fn upload_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let response = handle_upload(&state.pool, &state.config, &path, content_type, &body).await?;
    Ok(Json(response))
}

/// GET /attachments/{*path} - Download a blob.
async fn download_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(path): Path<String>,
) -> Result<impl IntoResponse> {
    let (content_type, bytes) = handle_download(&state.pool, &path).await?;
    Ok(([(CONTENT_TYPE, content_type)], bytes))
}
