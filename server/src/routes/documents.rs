//! Document collection routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use fieldsync_engine::http::{AddResponse, DocumentResponse};
use fieldsync_engine::Payload;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_add, handle_get, handle_merge, handle_update, CollectionPath};
use crate::AppState;

/// Create document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{uid}/collections/{collection}", post(add_handler))
        .route(
            "/users/{uid}/collections/{collection}/{doc_id}",
            get(get_handler).put(update_handler).patch(merge_handler),
        )
}

/// POST /users/{uid}/collections/{collection} - Create a document.
async fn add_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((uid, collection)): Path<(String, String)>,
    Json(fields): Json<Payload>,
) -> Result<(StatusCode, Json<AddResponse>)> {
    let path = CollectionPath::new(uid, collection)?;
    let response = handle_add(&state.pool, &path, fields).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// PUT /users/{uid}/collections/{collection}/{doc_id} - Update a document.
async fn update_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((uid, collection, doc_id)): Path<(String, String, String)>,
    Json(fields): Json<Payload>,
) -> Result<StatusCode> {
    let path = CollectionPath::new(uid, collection)?;
    handle_update(&state.pool, &path, &doc_id, fields).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /users/{uid}/collections/{collection}/{doc_id} - Merge into a document.
async fn merge_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((uid, collection, doc_id)): Path<(String, String, String)>,
    Json(fields): Json<Payload>,
) -> Result<StatusCode> {
    let path = CollectionPath::new(uid, collection)?;
    handle_merge(&state.pool, &path, &doc_id, fields).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /users/{uid}/collections/{collection}/{doc_id} - Read a document.
async fn get_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((uid, collection, doc_id)): Path<(String, String, String)>,
) -> Result<Json<DocumentResponse>> {
    let path = CollectionPath::new(uid, collection)?;
    let document = handle_get(&state.pool, &path, &doc_id).await?;
    Ok(Json(document))
}
