//! Database operations for the documents table.

use fieldsync_engine::http::DocumentResponse;
use fieldsync_engine::Payload;
use serde_json::Value;
use sqlx::{PgPool, Row};

/// A stored document row from the database.
#[derive(Debug)]
pub struct StoredDocument {
    pub user_id: String,
    pub collection: String,
    pub doc_id: String,
    pub fields: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredDocument {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredDocument {
            user_id: row.try_get("user_id")?,
            collection: row.try_get("collection")?,
            doc_id: row.try_get("doc_id")?,
            fields: row.try_get("fields")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StoredDocument {
    /// Convert the row into the wire representation.
    pub fn to_response(&self) -> DocumentResponse {
        let fields = match &self.fields {
            Value::Object(map) => map.clone(),
            _ => Payload::new(),
        };
        DocumentResponse {
            id: self.doc_id.clone(),
            fields,
            created_at: self.created_at.max(0) as u64,
            updated_at: self.updated_at.max(0) as u64,
        }
    }
}

/// Insert a new document.
pub async fn insert_document(
    pool: &PgPool,
    user_id: &str,
    collection: &str,
    doc_id: &str,
    fields: Payload,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO documents (user_id, collection, doc_id, fields, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        "#,
    )
    .bind(user_id)
    .bind(collection)
    .bind(doc_id)
    .bind(Value::Object(fields))
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite the given fields of an existing document.
///
/// Returns `false` when the document does not exist.
pub async fn update_document(
    pool: &PgPool,
    user_id: &str,
    collection: &str,
    doc_id: &str,
    fields: Payload,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE documents
        SET fields = fields || $4, updated_at = $5
        WHERE user_id = $1 AND collection = $2 AND doc_id = $3
        "#,
    )
    .bind(user_id)
    .bind(collection)
    .bind(doc_id)
    .bind(Value::Object(fields))
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Shallow-merge fields into a document, creating it when absent.
pub async fn merge_document(
    pool: &PgPool,
    user_id: &str,
    collection: &str,
    doc_id: &str,
    fields: Payload,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO documents (user_id, collection, doc_id, fields, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        ON CONFLICT (user_id, collection, doc_id) DO UPDATE SET
            fields = documents.fields || EXCLUDED.fields,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(user_id)
    .bind(collection)
    .bind(doc_id)
    .bind(Value::Object(fields))
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a document by id.
pub async fn get_document(
    pool: &PgPool,
    user_id: &str,
    collection: &str,
    doc_id: &str,
) -> Result<Option<StoredDocument>, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        SELECT user_id, collection, doc_id, fields, created_at, updated_at
        FROM documents
        WHERE user_id = $1 AND collection = $2 AND doc_id = $3
        "#,
    )
    .bind(user_id)
    .bind(collection)
    .bind(doc_id)
    .fetch_optional(pool)
    .await
}
