//! User-facing playground settings.
//!
//! Settings are persisted as a versioned document:
//!
//! ```json
//! { "version": 1, "settings": { "openConsole": false, "useLocalRuntime": true } }
//! ```
//!
//! Missing fields take their defaults and unknown fields are ignored, so a
//! document written by an older or newer build always loads into a complete
//! [`Settings`] value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Current settings schema version.
pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// Playground settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Open the console panel on start-up.
    #[serde(default)]
    pub open_console: bool,

    /// Origin of the remote runtime that bundles are published to.
    #[serde(default = "defaults::remote_runtime_origin")]
    pub remote_runtime_origin: String,

    /// Forward guest `log` calls to the host log at debug level.
    #[serde(default)]
    pub runtime_debug_logging: bool,

    /// Run the preview in an isolated sandbox worker.
    #[serde(default = "defaults::sandbox_app")]
    pub sandbox_app: bool,

    /// Enable experimental editor blocks.
    #[serde(default)]
    pub use_experimental_blocks: bool,

    /// Render bundles in the local preview sandbox.
    #[serde(default = "defaults::use_local_runtime")]
    pub use_local_runtime: bool,

    /// Publish bundles to the remote runtime after each rebuild.
    #[serde(default)]
    pub use_remote_runtime: bool,

    /// Enable the UI request surface.
    #[serde(default, rename = "useUIRequest")]
    pub use_ui_request: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            open_console: false,
            remote_runtime_origin: defaults::remote_runtime_origin(),
            runtime_debug_logging: false,
            sandbox_app: defaults::sandbox_app(),
            use_experimental_blocks: false,
            use_local_runtime: defaults::use_local_runtime(),
            use_remote_runtime: false,
            use_ui_request: false,
        }
    }
}

/// On-disk shape of persisted settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VersionedSettings {
    /// Schema version the settings were written with.
    pub version: u32,
    /// The settings object.
    pub settings: Settings,
}

impl VersionedSettings {
    /// Wrap settings with the current schema version.
    pub fn current(settings: Settings) -> Self {
        Self {
            version: SETTINGS_SCHEMA_VERSION,
            settings,
        }
    }
}

impl Settings {
    /// Decode a persisted settings document, migrating older shapes.
    ///
    /// Accepts the versioned document as well as the legacy unversioned
    /// shape (a bare settings object). Anything unreadable yields defaults.
    pub fn from_document(document: Value) -> Self {
        let version = document
            .get("version")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok());

        let body = match (version, document) {
            (Some(version), Value::Object(mut map)) if map.contains_key("settings") => {
                if version > SETTINGS_SCHEMA_VERSION {
                    warn!(
                        version,
                        supported = SETTINGS_SCHEMA_VERSION,
                        "Settings written by a newer schema; unknown fields ignored"
                    );
                }
                map.remove("settings").unwrap_or(Value::Null)
            }
            (_, legacy) => {
                debug!("Migrating unversioned settings document");
                legacy
            }
        };

        serde_json::from_value(body).unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable settings");
            Self::default()
        })
    }
}

/// Default value functions for serde.
mod defaults {
    pub fn remote_runtime_origin() -> String {
        "http://127.0.0.1:8081".to_string()
    }

    pub const fn sandbox_app() -> bool {
        true
    }

    pub const fn use_local_runtime() -> bool {
        true
    }
}
