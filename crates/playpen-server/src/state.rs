//! Shared application state.
//!
//! [`AppState`] holds the playground and its preview; handlers receive a
//! clone per request.

use std::sync::Arc;

use playpen_pipeline::{Playground, Preview};

/// Shared state across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The pipeline controller.
    playground: Arc<Playground>,

    /// The preview bound to the controller's bundles.
    preview: Preview,
}

impl AppState {
    /// Wrap a playground and its preview.
    pub fn new(playground: Arc<Playground>, preview: Preview) -> Self {
        Self {
            playground,
            preview,
        }
    }

    /// The pipeline controller.
    pub fn playground(&self) -> &Playground {
        &self.playground
    }

    /// The preview executor.
    pub fn preview(&self) -> &Preview {
        &self.preview
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("version", &self.playground.version())
            .field("preview", &self.preview.state())
            .finish()
    }
}
