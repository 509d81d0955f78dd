//! HTTP router configuration.
//!
//! This module builds the Axum router with all routes and middleware.

use std::time::Duration;

use axum::Router;
use axum::routing::{delete, get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{
    clear_preview_errors, get_bundle, get_diagnostics, get_pen, get_preview, get_preview_state,
    get_settings, health_check, patch_settings, put_name, put_source, rebuild, report_preview_error,
    reset_preview, share,
};
use crate::state::AppState;

/// Build the application router.
///
/// Routes:
/// - `GET /health` - Health check
/// - `GET /pen`, `PUT /pen/source`, `PUT /pen/name`, `POST /pen/rebuild` - Edit and build
/// - `GET /share` - Share URL
/// - `GET /diagnostics`, `DELETE /diagnostics/preview` - Console
/// - `GET /settings`, `PATCH /settings` - Settings
/// - `GET /bundle` - Current bundle
/// - `GET /preview`, `GET /preview/state`, `POST /preview/reset`, `POST /preview/errors` - Preview
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let pen_routes = Router::new()
        .route("/pen", get(get_pen))
        .route("/pen/source", put(put_source))
        .route("/pen/name", put(put_name))
        .route("/pen/rebuild", post(rebuild))
        .route("/share", get(share))
        .route("/bundle", get(get_bundle));

    let console_routes = Router::new()
        .route("/diagnostics", get(get_diagnostics))
        .route("/diagnostics/preview", delete(clear_preview_errors))
        .route("/settings", get(get_settings).patch(patch_settings));

    let preview_routes = Router::new()
        .route("/preview", get(get_preview))
        .route("/preview/state", get(get_preview_state))
        .route("/preview/reset", post(reset_preview))
        .route("/preview/errors", post(report_preview_error));

    Router::new()
        .route("/health", get(health_check))
        .merge(pen_routes)
        .merge(console_routes)
        .merge(preview_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
