//! Publishing bundles to a remote runtime.
//!
//! The remote runtime exposes the module admin API:
//!
//! ```text
//! POST {origin}/admin/modules        multipart: id, wasm   (X-Admin-Token)
//! GET  {origin}/functions/{hostname}                       (invoke)
//! ```
//!
//! Uploads are fire-and-forget from the pipeline's point of view; errors are
//! returned here so the caller can decide how loudly to log them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use playpen_common::{Hostname, UploadError};
use playpen_core::Bundle;

/// Header carrying the admin token.
pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// Acknowledgement returned by the remote runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ack {
    /// Module identifier the bundle was stored under.
    pub id: String,
    /// Content hash computed by the remote runtime.
    #[serde(default)]
    pub content_hash: String,
    /// Human-readable status.
    #[serde(default)]
    pub message: String,
}

/// Publishes bundles to a remote execution origin.
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Upload `bundle` to the runtime at `origin`.
    async fn upload(&self, origin: &Url, bundle: &Bundle) -> Result<Ack, UploadError>;
}

/// Resolve `path` relative to `origin`, treating the origin as a directory.
fn endpoint(origin: &Url, path: &str) -> Result<Url, UploadError> {
    if origin.cannot_be_a_base() {
        return Err(UploadError::InvalidOrigin {
            origin: origin.to_string(),
        });
    }

    let mut base = origin.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.set_fragment(None);
    base.set_query(None);

    base.join(path).map_err(|_| UploadError::InvalidOrigin {
        origin: origin.to_string(),
    })
}

/// URL at which the remote runtime serves `hostname`.
///
/// # Errors
///
/// Returns an error if `origin` is not a usable base URL.
pub fn function_url(origin: &Url, hostname: &Hostname) -> Result<Url, UploadError> {
    endpoint(origin, &format!("functions/{hostname}"))
}

/// [`BundleStore`] speaking the admin API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBundleStore {
    client: reqwest::Client,
    admin_token: Option<String>,
}

impl HttpBundleStore {
    /// Create a store with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(admin_token: Option<String>, timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("playpen/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::request(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            admin_token,
        })
    }
}

#[async_trait]
impl BundleStore for HttpBundleStore {
    #[instrument(skip(self, bundle), fields(origin = %origin, hostname = %bundle.hostname()))]
    async fn upload(&self, origin: &Url, bundle: &Bundle) -> Result<Ack, UploadError> {
        let url = endpoint(origin, "admin/modules")?;
        let hostname = bundle.hostname().to_string();

        let wasm = Part::bytes(bundle.bytes().to_vec())
            .file_name(format!("{hostname}.wasm"))
            .mime_str("application/wasm")
            .map_err(|e| UploadError::request(e.to_string()))?;
        let form = Form::new().text("id", hostname).part("wasm", wasm);

        let mut request = self.client.post(url).multipart(form);
        if let Some(token) = &self.admin_token {
            request = request.header(ADMIN_TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UploadError::request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
            });
        }

        let ack: Ack = response
            .json()
            .await
            .map_err(|e| UploadError::request(format!("Invalid acknowledgement: {e}")))?;

        debug!(id = %ack.id, content_hash = %ack.content_hash, "Bundle uploaded");
        Ok(ack)
    }
}
