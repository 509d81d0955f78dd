//! Error types for playpen.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`PlaygroundError`]: Top-level errors surfaced by the pipeline and server
//! - [`RuntimeError`]: Failures while instantiating or running a bundle
//! - [`SandboxError`]: Failures at the sandbox message boundary
//! - [`LinkError`]: A build that produced no bundle
//! - [`StorageError`], [`UploadError`], [`PenCodecError`]: Adapter failures
//!
//! Compile diagnostics are deliberately absent: they are data
//! ([`crate::Diagnostic`]), never errors.

use std::io;

use thiserror::Error;

/// Top-level playground errors.
#[derive(Error, Debug)]
pub enum PlaygroundError {
    /// A storage adapter failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A pen could not be encoded for sharing.
    #[error("Pen codec error: {0}")]
    Codec(#[from] PenCodecError),

    /// The sandbox rejected a request.
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

/// Errors raised while instantiating or executing a bundle.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The bundle could not be turned into an instance.
    #[error("Instantiation failed: {reason}")]
    InstantiationFailed {
        /// Description of the instantiation failure.
        reason: String,
    },

    /// The bundle does not export the expected entry point.
    #[error("Entry point not found: {name}")]
    EntryPointNotFound {
        /// Name of the missing export.
        name: String,
    },

    /// Execution exceeded the configured epoch deadline.
    #[error("Execution timeout after {duration_ms}ms")]
    ExecutionTimeout {
        /// The timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// Execution exhausted the configured fuel limit.
    #[error("Fuel exhausted: CPU limit exceeded")]
    FuelExhausted,

    /// A WebAssembly trap occurred during execution.
    #[error("Wasm trap: {message}")]
    Trap {
        /// Description of the trap.
        message: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

/// Errors at the sandbox request/response boundary.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Loading the bundle failed inside the sandbox.
    #[error("Bundle load failed: {0}")]
    Load(#[from] RuntimeError),

    /// The sandbox worker is gone (quit or crashed) and cannot answer.
    #[error("Sandbox disconnected")]
    Disconnected,
}

/// A build that did not produce a bundle.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Compilation reported errors, so there is no object to link.
    #[error("Nothing to link: compilation reported {count} error(s)")]
    NothingToLink {
        /// Number of error diagnostics.
        count: usize,
    },

    /// The program does not export the entry point.
    #[error("Missing entry point: export a function named `{name}`")]
    MissingEntryPoint {
        /// Expected export name.
        name: String,
    },

    /// The program imports something the host does not provide.
    #[error("Unresolved import: {module}::{name}")]
    UnresolvedImport {
        /// Import module.
        module: String,
        /// Import field.
        name: String,
    },

    /// The compiled object could not be loaded by the engine.
    #[error("Invalid module: {reason}")]
    InvalidModule {
        /// Description of the failure.
        reason: String,
    },
}

/// Storage adapter errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading or writing the backing store failed.
    #[error("Storage I/O failed for '{key}': {source}")]
    Io {
        /// The key being accessed.
        key: String,
        #[source]
        source: io::Error,
    },

    /// The key contains characters the backend cannot represent.
    #[error("Invalid storage key: {key}")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },

    /// A stored value could not be serialized.
    #[error("Storage serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Bundle store upload errors.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The remote runtime origin is not a usable base URL.
    #[error("Invalid remote runtime origin: {origin}")]
    InvalidOrigin {
        /// The configured origin.
        origin: String,
    },

    /// The request could not be sent or its response could not be read.
    #[error("Upload request failed: {reason}")]
    Request {
        /// Description of the failure.
        reason: String,
    },

    /// The remote runtime answered with a non-success status.
    #[error("Upload rejected by remote runtime (status: {status})")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },
}

/// Pen token encoding errors.
#[derive(Error, Debug)]
pub enum PenCodecError {
    /// JSON serialization failed.
    #[error("Failed to serialize pen: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Compression failed.
    #[error("Failed to compress pen: {0}")]
    Compress(#[from] io::Error),
}

impl PlaygroundError {
    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

impl RuntimeError {
    /// Create a new `InstantiationFailed` error.
    pub fn instantiation_failed(reason: impl Into<String>) -> Self {
        Self::InstantiationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `EntryPointNotFound` error.
    pub fn entry_point_not_found(name: impl Into<String>) -> Self {
        Self::EntryPointNotFound { name: name.into() }
    }

    /// Create a new `Trap` error.
    pub fn trap(message: impl Into<String>) -> Self {
        Self::Trap {
            message: message.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates a resource limit was exceeded.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::FuelExhausted | Self::ExecutionTimeout { .. })
    }
}

impl LinkError {
    /// Create a new `InvalidModule` error.
    pub fn invalid_module(reason: impl Into<String>) -> Self {
        Self::InvalidModule {
            reason: reason.into(),
        }
    }
}

impl UploadError {
    /// Create a new `Request` error.
    pub fn request(reason: impl Into<String>) -> Self {
        Self::Request {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::entry_point_not_found("_start");
        assert_eq!(err.to_string(), "Entry point not found: _start");

        let err = LinkError::NothingToLink { count: 2 };
        assert_eq!(
            err.to_string(),
            "Nothing to link: compilation reported 2 error(s)"
        );
    }

    #[test]
    fn test_sandbox_error_from_runtime() {
        let err: SandboxError = RuntimeError::FuelExhausted.into();
        assert!(matches!(err, SandboxError::Load(RuntimeError::FuelExhausted)));

        let top: PlaygroundError = err.into();
        assert!(matches!(top, PlaygroundError::Sandbox(_)));
    }

    #[test]
    fn test_is_resource_limit() {
        assert!(RuntimeError::FuelExhausted.is_resource_limit());
        assert!(RuntimeError::ExecutionTimeout { duration_ms: 100 }.is_resource_limit());
        assert!(!RuntimeError::trap("unreachable").is_resource_limit());
    }

    #[test]
    fn test_storage_error_keeps_key() {
        let err = StorageError::Io {
            key: "pen".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("'pen'"));
    }
}
