//! JSON response bodies and error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use playpen_common::{Hostname, PlaygroundError};
use playpen_core::Bundle;
use playpen_pipeline::RebuildReport;

/// Error returned by a handler, rendered as `{"error": message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code.
    pub status: StatusCode,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    /// Create an error with an explicit status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 404 Not Found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<PlaygroundError> for ApiError {
    fn from(error: PlaygroundError) -> Self {
        let status = match error {
            PlaygroundError::InvalidConfig { .. } => StatusCode::BAD_REQUEST,
            PlaygroundError::Sandbox(_) => StatusCode::SERVICE_UNAVAILABLE,
            PlaygroundError::Storage(_) | PlaygroundError::Codec(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Summary of a bundle.
#[derive(Debug, Clone, Serialize)]
pub struct BundleInfo {
    /// Build identity.
    pub hostname: Hostname,
    /// Hash of the binary.
    pub content_hash: String,
    /// Binary size in bytes.
    pub size: usize,
    /// Where the remote runtime serves it, when publishing is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

impl BundleInfo {
    /// Describe `bundle`.
    pub fn new(bundle: &Bundle) -> Self {
        Self {
            hostname: bundle.hostname().clone(),
            content_hash: bundle.content_hash().to_string(),
            size: bundle.bytes().len(),
            remote_url: None,
        }
    }

    /// Attach the remote runtime address.
    #[must_use]
    pub fn with_remote_url(mut self, url: Option<String>) -> Self {
        self.remote_url = url;
        self
    }
}

/// Outcome of `POST /pen/rebuild`.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildResponse {
    /// Version the build was assigned.
    pub version: u64,
    /// Identity the build was linked under.
    pub hostname: Hostname,
    /// Number of error diagnostics.
    pub error_count: usize,
    /// A newer build committed first.
    pub stale: bool,
    /// The bundle produced, if any.
    pub bundle: Option<BundleInfo>,
}

impl From<RebuildReport> for RebuildResponse {
    fn from(report: RebuildReport) -> Self {
        Self {
            version: report.version,
            hostname: report.hostname,
            error_count: report.error_count,
            stale: report.stale,
            bundle: report.bundle.as_deref().map(BundleInfo::new),
        }
    }
}
