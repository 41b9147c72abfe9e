//! Attachment handlers - blob upload and download.

use crate::config::Config;
use crate::db;
use crate::error::{AppError, Result};
use fieldsync_engine::http::UploadResponse;
use sqlx::PgPool;

/// Fallback when the client sends no content type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Normalize an attachment path, rejecting traversal and empty segments.
pub fn normalize_path(path: &str) -> Result<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("attachment path is empty".into()));
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(AppError::BadRequest(format!(
                "invalid attachment path: {}",
                path
            )));
        }
    }
    Ok(trimmed.to_string())
}

/// Store uploaded bytes and return their public URL.
pub async fn handle_upload(
    pool: &PgPool,
    config: &Config,
    path: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<UploadResponse> {
    let path = normalize_path(path)?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("attachment body is empty".into()));
    }
    let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);

    db::put_attachment(
        pool,
        &path,
        content_type,
        bytes,
        super::documents::now_millis(),
    )
    .await?;

    tracing::debug!(path = %path, size = bytes.len(), "attachment stored");
    Ok(UploadResponse {
        url: config.attachment_url(&path),
    })
}

/// Load an attachment's content type and bytes.
pub async fn handle_download(pool: &PgPool, path: &str) -> Result<(String, Vec<u8>)> {
    let path = normalize_path(path)?;
    let stored = db::get_attachment(pool, &path)
        .await?
        .ok_or_else(|| AppError::NotFound(path.clone()))?;
    Ok((stored.content_type, stored.bytes))
}
