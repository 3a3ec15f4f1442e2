//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the archive JSON API and the server-rendered archive
//! page under a single Axum router. Both surfaces share the views held in
//! `AppState`.

pub mod archive;
pub mod page;

use axum::Router;
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::{delete, get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(redirect_root_to_archive))
        .route("/archive", get(page::open))
        .route("/archive/{id}", get(page::show))
        .route("/archive/{id}/search", post(page::search))
        .route("/archive/{id}/delete", post(page::delete))
        .route("/api/archive/views", post(archive::create_view))
        .route("/api/archive/views/{id}", get(archive::get_view).delete(archive::delete_view))
        .route("/api/archive/views/{id}/search", post(archive::search_view))
        .route("/api/archive/views/{id}/records/{record_id}", delete(archive::delete_record))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn redirect_root_to_archive() -> Redirect {
    Redirect::temporary("/archive")
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
