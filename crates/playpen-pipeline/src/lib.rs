//! Rebuild pipeline and preview executor for playpen.
//!
//! - [`Playground`]: owns the pen, diagnostics, settings and the current
//!   bundle; turns edits into throttled trailing-edge rebuilds
//! - [`Preview`]: keeps one sandbox session bound to the current bundle
//! - [`Throttle`]: the trailing-edge scheduler behind rebuilds
//!
//! The two halves only talk through channels: the controller publishes
//! `bundle-changed` on a [`tokio::sync::watch`] channel and receives
//! `runtime-error` reports on an [`playpen_core::ErrorSink`].
//!
//! ```text
//! Playground ──subscribe()──▶ Preview::run ──▶ SandboxClient
//!      ▲                                            │
//!      └────────────── error_sink() ◀───────────────┘
//! ```

pub mod controller;
pub mod preview;
pub mod session;
pub mod template;
pub mod throttle;

pub use controller::{PenOrigin, Playground, RebuildReport};
pub use preview::{ColorScheme, Preview, PreviewState, PreviewView};
pub use session::{BuildSession, BuildTicket, EMPTY_SOURCE_PLACEHOLDER};
pub use template::{TEMPLATE_NAME, TEMPLATE_SOURCE, template_pen};
pub use throttle::Throttle;
