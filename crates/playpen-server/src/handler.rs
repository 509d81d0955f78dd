//! Request handlers.
//!
//! Each handler is a thin adapter over one [`Playground`](playpen_pipeline::Playground)
//! or [`Preview`](playpen_pipeline::Preview) operation.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use playpen_common::{Diagnostics, PreviewError, Settings};
use playpen_pipeline::{ColorScheme, PreviewState};

use crate::response::{ApiError, BundleInfo, RebuildResponse};
use crate::state::AppState;

/// Body of `GET /pen`.
#[derive(Debug, Serialize)]
pub struct PenResponse {
    /// Pen name.
    pub name: String,
    /// Pen source.
    pub source: String,
    /// Version of the most recent build.
    pub version: u64,
    /// The pen still follows the built-in template.
    pub template: bool,
}

/// Query of `GET /preview`.
#[derive(Debug, Default, Deserialize)]
pub struct PreviewQuery {
    /// Color scheme to render with from now on.
    pub scheme: Option<ColorScheme>,
}

/// Health check handler.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Current pen.
pub async fn get_pen(State(state): State<AppState>) -> Json<PenResponse> {
    let playground = state.playground();
    let pen = playground.pen();
    Json(PenResponse {
        name: pen.name,
        source: pen.source,
        version: playground.version(),
        template: playground.is_template(),
    })
}

/// Replace the source; responds with the fresh diagnostics.
#[instrument(skip_all, fields(len = body.len()))]
pub async fn put_source(State(state): State<AppState>, body: String) -> Json<Diagnostics> {
    state.playground().set_source(&body);
    Json(state.playground().diagnostics())
}

/// Rename the pen.
pub async fn put_name(State(state): State<AppState>, body: String) -> StatusCode {
    state.playground().set_name(body.trim());
    StatusCode::NO_CONTENT
}

/// Rebuild now, bypassing the throttle.
#[instrument(skip_all)]
pub async fn rebuild(State(state): State<AppState>) -> Json<RebuildResponse> {
    let report = state.playground().rebuild_now().await;
    info!(version = report.version, errors = report.error_count, "Rebuild requested");
    Json(RebuildResponse::from(report))
}

/// Share URL carrying the current pen.
pub async fn share(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let url = state.playground().share()?;
    Ok(Json(serde_json::json!({ "url": url.as_str() })))
}

/// Compile and preview diagnostics.
pub async fn get_diagnostics(State(state): State<AppState>) -> Json<Diagnostics> {
    Json(state.playground().diagnostics())
}

/// Empty the preview error list.
pub async fn clear_preview_errors(State(state): State<AppState>) -> StatusCode {
    state.playground().clear_preview_errors();
    StatusCode::NO_CONTENT
}

/// Current settings.
pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.playground().settings())
}

/// Merge a partial settings object into the current settings.
#[instrument(skip_all)]
pub async fn patch_settings(
    State(state): State<AppState>,
    Json(patch): Json<Value>,
) -> Result<Json<Settings>, ApiError> {
    let playground = state.playground();
    let merged = merge_settings(&playground.settings(), patch)?;

    if playground.update_settings(|settings| *settings = merged) {
        debug!("Settings updated");
    }
    Ok(Json(playground.settings()))
}

fn merge_settings(current: &Settings, patch: Value) -> Result<Settings, ApiError> {
    let Value::Object(patch) = patch else {
        return Err(ApiError::bad_request("Settings patch must be a JSON object"));
    };

    let mut document = serde_json::to_value(current)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if let Value::Object(fields) = &mut document {
        fields.extend(patch);
    }

    serde_json::from_value(document)
        .map_err(|e| ApiError::bad_request(format!("Invalid settings: {e}")))
}

/// Current bundle, or 404 before the first successful build.
pub async fn get_bundle(State(state): State<AppState>) -> Result<Json<BundleInfo>, ApiError> {
    let playground = state.playground();
    let bundle = playground
        .bundle()
        .ok_or_else(|| ApiError::not_found("No bundle has been built yet"))?;

    let remote_url = playground.remote_url().map(String::from);
    Ok(Json(BundleInfo::new(&bundle).with_remote_url(remote_url)))
}

/// The preview rendered as HTML.
pub async fn get_preview(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Html<String> {
    if let Some(scheme) = query.scheme {
        state.preview().set_color_scheme(scheme);
    }
    Html(state.preview().render().to_html())
}

/// Lifecycle state of the preview.
pub async fn get_preview_state(State(state): State<AppState>) -> Json<Value> {
    let preview = state.preview();
    Json(serde_json::json!({
        "state": preview.state(),
        "view": preview.render(),
    }))
}

/// Reload the current bundle in a fresh session.
#[instrument(skip_all)]
pub async fn reset_preview(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let preview_state: PreviewState = state
        .preview()
        .reset()
        .await
        .ok_or_else(|| ApiError::not_found("Nothing to reset"))?;
    Ok(Json(serde_json::json!({ "state": preview_state })))
}

/// Runtime error reported by the page hosting the preview.
pub async fn report_preview_error(
    State(state): State<AppState>,
    Json(error): Json<PreviewError>,
) -> StatusCode {
    warn!(message = %error.message, "Runtime error reported by host page");
    state.preview().on_runtime_error(error);
    StatusCode::ACCEPTED
}
