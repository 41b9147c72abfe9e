//! Database operations for the attachments table.

use sqlx::{PgPool, Row};

/// A stored attachment blob.
#[derive(Debug)]
pub struct StoredAttachment {
    pub path: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredAttachment {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredAttachment {
            path: row.try_get("path")?,
            content_type: row.try_get("content_type")?,
            bytes: row.try_get("bytes")?,
        })
    }
}

/// Store an attachment, replacing any previous blob at the same path.
pub async fn put_attachment(
    pool: &PgPool,
    path: &str,
    content_type: &str,
    bytes: &[u8],
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO attachments (path, content_type, bytes, uploaded_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (path) DO UPDATE SET
            content_type = EXCLUDED.content_type,
            bytes = EXCLUDED.bytes,
            uploaded_at = EXCLUDED.uploaded_at
        "#,
    )
    .bind(path)
    .bind(content_type)
    .bind(bytes)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get an attachment by path.
pub async fn get_attachment(
    pool: &PgPool,
    path: &str,
) -> Result<Option<StoredAttachment>, sqlx::Error> {
    sqlx::query_as::<_, StoredAttachment>(
        "SELECT path, content_type, bytes FROM attachments WHERE path = $1",
    )
    .bind(path)
    .fetch_optional(pool)
    .await
}
