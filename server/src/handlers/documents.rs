//! Document handlers - the add / update / merge primitives and reads.
//!
//! Timestamps are owned by the server: client-supplied `createdAt` and
//! `updatedAt` fields are dropped and every write stamps `updatedAt` with
//! the current time in milliseconds.

use crate::db;
use crate::error::{AppError, Result};
use fieldsync_engine::http::{AddResponse, DocumentResponse};
use fieldsync_engine::remote::{CREATED_AT_FIELD, UPDATED_AT_FIELD};
use fieldsync_engine::Payload;
use sqlx::PgPool;

/// Address of a collection in a user's namespace.
#[derive(Debug, Clone)]
pub struct CollectionPath {
    pub user_id: String,
    pub collection: String,
}

impl CollectionPath {
    pub fn new(user_id: impl Into<String>, collection: impl Into<String>) -> Result<Self> {
        let path = Self {
            user_id: user_id.into(),
            collection: collection.into(),
        };
        validate_segment("user id", &path.user_id)?;
        validate_segment("collection", &path.collection)?;
        Ok(path)
    }
}

/// Reject empty or path-like identifiers.
pub fn validate_segment(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", what)));
    }
    if value.contains('/') || value == "." || value == ".." {
        return Err(AppError::BadRequest(format!(
            "{} contains invalid characters: {}",
            what, value
        )));
    }
    Ok(())
}

/// Drop fields the server stamps itself.
pub fn strip_server_fields(mut fields: Payload) -> Payload {
    fields.remove(CREATED_AT_FIELD);
    fields.remove(UPDATED_AT_FIELD);
    fields
}

/// Current time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Create a document with a server-assigned id.
pub async fn handle_add(
    pool: &PgPool,
    path: &CollectionPath,
    fields: Payload,
) -> Result<AddResponse> {
    let doc_id = uuid::Uuid::new_v4().simple().to_string();
    db::insert_document(
        pool,
        &path.user_id,
        &path.collection,
        &doc_id,
        strip_server_fields(fields),
        now_millis(),
    )
    .await?;

    tracing::debug!(
        user_id = %path.user_id,
        collection = %path.collection,
        doc_id = %doc_id,
        "document added"
    );
    Ok(AddResponse { id: doc_id })
}

/// Overwrite fields of an existing document.
pub async fn handle_update(
    pool: &PgPool,
    path: &CollectionPath,
    doc_id: &str,
    fields: Payload,
) -> Result<()> {
    validate_segment("document id", doc_id)?;
    let updated = db::update_document(
        pool,
        &path.user_id,
        &path.collection,
        doc_id,
        strip_server_fields(fields),
        now_millis(),
    )
    .await?;

    if !updated {
        return Err(not_found(path, doc_id));
    }
    tracing::debug!(collection = %path.collection, doc_id = %doc_id, "document updated");
    Ok(())
}

/// Merge fields into a document, creating it when absent.
pub async fn handle_merge(
    pool: &PgPool,
    path: &CollectionPath,
    doc_id: &str,
    fields: Payload,
) -> Result<()> {
    validate_segment("document id", doc_id)?;
    db::merge_document(
        pool,
        &path.user_id,
        &path.collection,
        doc_id,
        strip_server_fields(fields),
        now_millis(),
    )
    .await?;

    tracing::debug!(collection = %path.collection, doc_id = %doc_id, "document merged");
    Ok(())
}

/// Read a document.
pub async fn handle_get(
    pool: &PgPool,
    path: &CollectionPath,
    doc_id: &str,
) -> Result<DocumentResponse> {
    validate_segment("document id", doc_id)?;
    db::get_document(pool, &path.user_id, &path.collection, doc_id)
        .await?
        .map(|stored| stored.to_response())
        .ok_or_else(|| not_found(path, doc_id))
}

fn not_found(path: &CollectionPath, doc_id: &str) -> AppError {
    AppError::NotFound(format!("{}/{}", path.collection, doc_id))
}
