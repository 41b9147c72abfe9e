//! HTTP route definitions.

mod attachments;
mod documents;
pub mod health;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(documents::routes())
        .merge(attachments::routes())
}
