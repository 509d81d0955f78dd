//! Host-side services for playpen.
//!
//! This crate provides everything the pipeline needs from the outside world:
//!
//! - [`linker`]: Host functions (`env::log`, `env::print`) guest programs import
//! - [`logging`]: Console host implementation backing those functions
//! - [`bundle_store`]: Publishing bundles to a remote runtime over HTTP
//! - [`storage`]: Key/value persistence backends
//! - [`pen_codec`]: Compact URL-safe pen tokens
//! - [`settings_store`]: Versioned settings documents

pub mod bundle_store;
pub mod linker;
pub mod logging;
pub mod pen_codec;
pub mod settings_store;
pub mod storage;

pub use bundle_store::{Ack, BundleStore, HttpBundleStore, function_url};
pub use linker::{create_instance_runner, register_all};
pub use logging::LoggingHost;
pub use storage::{FileStorage, MemoryStorage, Storage};
