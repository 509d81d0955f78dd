//! Compilation and linking of playground programs.
//!
//! The pipeline talks to the compiler through the [`Toolchain`] trait:
//!
//! ```text
//! VirtualEnv ──diagnose──▶ Vec<Diagnostic>                (sync, every edit)
//! VirtualEnv ──compile───▶ CompiledOutput ──link──▶ Bundle (async, per rebuild)
//! ```
//!
//! [`WatToolchain`] implements it for programs written in the WebAssembly
//! text format: compiling parses and validates, linking resolves imports
//! against the host function table and checks the entry point.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use wasmtime::{ExternType, Module};

use playpen_common::{Diagnostic, Hostname, LinkError, SourceLocation};

use crate::bundle::{Bundle, ENTRY_POINT};
use crate::engine::WasmEngine;

/// Path of the single entry-point file in the virtual environment.
pub const ENTRY_FILE: &str = "main.wat";

/// Import module every host function lives in.
pub const HOST_MODULE: &str = "env";

/// Host functions a program may import from [`HOST_MODULE`].
pub const HOST_FUNCTIONS: &[&str] = &["log", "print"];

/// In-memory file system the compiler reads from.
///
/// Writing empty content removes the file, mirroring how editor
/// integrations signal deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualEnv {
    files: BTreeMap<String, String>,
}

impl VirtualEnv {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a file, or delete it when `content` is empty.
    pub fn write(&mut self, path: &str, content: &str) {
        if content.is_empty() {
            self.files.remove(path);
        } else {
            self.files.insert(path.to_string(), content.to_string());
        }
    }

    /// Read a file.
    pub fn read(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Read the entry-point file.
    pub fn entry(&self) -> Option<&str> {
        self.read(ENTRY_FILE)
    }

    /// Number of files present.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if no files are present.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Result of compiling a virtual environment.
///
/// Diagnostics are attached rather than returned as an error: a compile
/// always "succeeds" at producing output.
#[derive(Debug, Clone, Default)]
pub struct CompiledOutput {
    /// WebAssembly binary, present when compilation produced one.
    pub bytes: Option<Vec<u8>>,
    /// Diagnostics reported by the compiler.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledOutput {
    /// Number of error-severity diagnostics.
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    /// Returns `true` if any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// Compiler and linker service used by the pipeline.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Compute diagnostics for the current environment without producing output.
    ///
    /// Called on every edit, so it must be cheap and must not block on I/O.
    fn diagnose(&self, env: &VirtualEnv) -> Vec<Diagnostic>;

    /// Compile the environment.
    async fn compile(&self, env: &VirtualEnv) -> CompiledOutput;

    /// Link compiled output into a bundle identified by `hostname`.
    async fn link(&self, output: CompiledOutput, hostname: &Hostname) -> Result<Bundle, LinkError>;
}

/// Toolchain for WebAssembly text format programs.
#[derive(Debug, Clone)]
pub struct WatToolchain {
    engine: WasmEngine,
}

impl WatToolchain {
    /// Create a toolchain that validates and links against `engine`.
    pub fn new(engine: WasmEngine) -> Self {
        Self { engine }
    }

    /// Parse and validate, returning the binary when it is valid.
    fn compile_blocking(engine: &WasmEngine, env: &VirtualEnv) -> CompiledOutput {
        let Some(text) = env.entry() else {
            return CompiledOutput {
                bytes: None,
                diagnostics: vec![Diagnostic::error(format!(
                    "Entry file `{ENTRY_FILE}` not found"
                ))],
            };
        };

        let bytes = match wat::parse_str(text) {
            Ok(bytes) => bytes,
            Err(e) => {
                return CompiledOutput {
                    bytes: None,
                    diagnostics: vec![parse_error_diagnostic(&e.to_string())],
                };
            }
        };

        if let Err(e) = Module::validate(engine.inner(), &bytes) {
            return CompiledOutput {
                bytes: None,
                diagnostics: vec![Diagnostic::error(format!("{e:#}"))],
            };
        }

        CompiledOutput {
            bytes: Some(bytes),
            diagnostics: Vec::new(),
        }
    }

    /// Compile the binary and resolve it against the host.
    fn link_blocking(
        engine: &WasmEngine,
        bytes: Vec<u8>,
        hostname: Hostname,
    ) -> Result<Bundle, LinkError> {
        let module = Module::new(engine.inner(), &bytes)
            .map_err(|e| LinkError::invalid_module(format!("{e:#}")))?;

        for import in module.imports() {
            let resolved =
                import.module() == HOST_MODULE && HOST_FUNCTIONS.contains(&import.name());
            if !resolved {
                return Err(LinkError::UnresolvedImport {
                    module: import.module().to_string(),
                    name: import.name().to_string(),
                });
            }
        }

        match module.get_export(ENTRY_POINT) {
            Some(ExternType::Func(_)) => {}
            _ => {
                return Err(LinkError::MissingEntryPoint {
                    name: ENTRY_POINT.to_string(),
                });
            }
        }

        Bundle::new(hostname, bytes, module)
    }
}

#[async_trait]
impl Toolchain for WatToolchain {
    fn diagnose(&self, env: &VirtualEnv) -> Vec<Diagnostic> {
        Self::compile_blocking(&self.engine, env).diagnostics
    }

    #[instrument(skip(self, env), fields(files = env.len()))]
    async fn compile(&self, env: &VirtualEnv) -> CompiledOutput {
        let start = Instant::now();
        let engine = self.engine.clone();
        let env = env.clone();

        let output = tokio::task::spawn_blocking(move || Self::compile_blocking(&engine, &env))
            .await
            .unwrap_or_else(|e| CompiledOutput {
                bytes: None,
                diagnostics: vec![Diagnostic::error(format!("Compiler crashed: {e}"))],
            });

        debug!(
            duration_ms = start.elapsed().as_millis(),
            errors = output.error_count(),
            "Compiled"
        );

        output
    }

    #[instrument(skip(self, output), fields(hostname = %hostname))]
    async fn link(&self, output: CompiledOutput, hostname: &Hostname) -> Result<Bundle, LinkError> {
        let count = output.error_count();
        let bytes = match output.bytes {
            Some(bytes) if count == 0 => bytes,
            _ => return Err(LinkError::NothingToLink { count }),
        };

        let start = Instant::now();
        let engine = self.engine.clone();
        let hostname = hostname.clone();

        let bundle = tokio::task::spawn_blocking(move || Self::link_blocking(&engine, bytes, hostname))
            .await
            .map_err(|e| LinkError::invalid_module(format!("Linker crashed: {e}")))?;

        match &bundle {
            Ok(bundle) => info!(
                content_hash = %bundle.content_hash(),
                duration_ms = start.elapsed().as_millis(),
                "Bundle linked"
            ),
            Err(e) => warn!(error = %e, "Link failed"),
        }

        bundle
    }
}

/// Turn a text-format parse error into a diagnostic.
///
/// Parse errors render as a message line followed by a
/// `--> file:line:column` pointer and a source excerpt.
fn parse_error_diagnostic(rendered: &str) -> Diagnostic {
    let message = rendered.lines().next().unwrap_or(rendered).trim();
    let diagnostic = Diagnostic::error(message);

    let location = rendered
        .lines()
        .find_map(|line| line.trim_start().strip_prefix("--> "))
        .and_then(parse_location);

    match location {
        Some(location) => diagnostic.at(location),
        None => diagnostic,
    }
}

/// Parse the `line:column` suffix of `file:line:column`.
fn parse_location(pointer: &str) -> Option<SourceLocation> {
    let mut parts = pointer.trim().rsplitn(3, ':');
    let column = parts.next()?.parse().ok()?;
    let line = parts.next()?.parse().ok()?;
    Some(SourceLocation { line, column })
}
