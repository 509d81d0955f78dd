//! Common types, errors, and configuration for playpen.
//!
//! This crate provides shared functionality used across the playpen workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Sandbox and pipeline configuration, plus the TOML config file
//! - User-facing [`Settings`] with schema versioning
//! - Shared data types: [`Pen`], [`Hostname`], and [`Diagnostics`]

pub mod config;
pub mod config_file;
pub mod diagnostics;
pub mod error;
pub mod pen;
pub mod settings;

pub use config::{EngineConfig, ExecutionConfig, PipelineConfig, SandboxConfig};
pub use diagnostics::{Diagnostic, Diagnostics, PreviewError, Severity, SourceLocation};
pub use error::{
    LinkError, PenCodecError, PlaygroundError, RuntimeError, SandboxError, StorageError,
    UploadError,
};
pub use pen::{Hostname, Pen};
pub use settings::{SETTINGS_SCHEMA_VERSION, Settings, VersionedSettings};
