//! Linked, immutable program artifacts.
//!
//! A [`Bundle`] is what the toolchain's link step produces and what the
//! preview sandbox and the bundle store consume. It carries both the raw
//! WebAssembly binary (for publishing to a remote runtime) and the compiled
//! Wasmtime [`Module`] (so a preview session never recompiles).

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use wasmtime::Module;

use playpen_common::{Hostname, LinkError};

/// Name of the function every bundle must export.
pub const ENTRY_POINT: &str = "_start";

/// An immutable compiled and linked program.
///
/// Cloning is cheap: the binary and the compiled module are shared.
#[derive(Clone)]
pub struct Bundle {
    hostname: Hostname,
    bytes: Arc<[u8]>,
    module: Module,
    content_hash: String,
}

impl Bundle {
    /// Assemble a bundle from a validated binary and its compiled module.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a WebAssembly binary.
    pub fn new(hostname: Hostname, bytes: Vec<u8>, module: Module) -> Result<Self, LinkError> {
        validate_wasm_header(&bytes)?;

        Ok(Self {
            hostname,
            content_hash: compute_hash(&bytes),
            bytes: bytes.into(),
            module,
        })
    }

    /// A new bundle value with the same identity and contents.
    ///
    /// Used to force a preview reload without a rebuild: consumers comparing
    /// by pointer see a change, consumers comparing by hostname do not.
    #[must_use]
    pub fn shallow_copy(&self) -> Self {
        self.clone()
    }

    /// The unique build identity.
    pub fn hostname(&self) -> &Hostname {
        &self.hostname
    }

    /// The WebAssembly binary.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The compiled module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Hash of the WebAssembly binary.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("hostname", &self.hostname)
            .field("content_hash", &self.content_hash)
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Validate the WebAssembly header (magic number).
fn validate_wasm_header(bytes: &[u8]) -> Result<(), LinkError> {
    if bytes.len() < 8 {
        return Err(LinkError::invalid_module("binary too small"));
    }

    // \0asm
    if &bytes[0..4] != b"\0asm" {
        return Err(LinkError::invalid_module("bad magic number"));
    }

    Ok(())
}

/// Compute a hash of the given bytes.
pub(crate) fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
