//! Fieldsync Server - reference remote store for fieldsync clients.
//!
//! Serves per-user document collections and attachment blobs over HTTP, backed
//! by PostgreSQL. This is the counterpart of the engine's `HttpRemote` and
//! `HttpAttachmentStore` adapters: every write stamps server-side
//! `createdAt`/`updatedAt` timestamps that clients use for the stale-update
//! check.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;

use crate::config::Config;
use crate::db::Pool;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
}

/// Build the application router with all layers applied.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
