//! Settings persistence.
//!
//! Settings are stored as a [`VersionedSettings`] JSON document. Reading
//! never fails: missing, unreadable, or legacy documents all produce a
//! complete [`Settings`] value.

use tracing::{debug, warn};

use playpen_common::{Settings, StorageError, VersionedSettings};

use crate::storage::Storage;

/// Storage key the settings document is kept under.
pub const SETTINGS_KEY: &str = "settings";

/// Load settings, falling back to defaults.
pub fn load(storage: &dyn Storage) -> Settings {
    let raw = match storage.get(SETTINGS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("No stored settings, using defaults");
            return Settings::default();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read settings, using defaults");
            return Settings::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(document) => Settings::from_document(document),
        Err(e) => {
            warn!(error = %e, "Stored settings are not JSON, using defaults");
            Settings::default()
        }
    }
}

/// Save the complete settings object with the current schema version.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized or written.
pub fn save(storage: &dyn Storage, settings: &Settings) -> Result<(), StorageError> {
    let document = serde_json::to_string(&VersionedSettings::current(settings.clone()))?;
    storage.set(SETTINGS_KEY, &document)
}
