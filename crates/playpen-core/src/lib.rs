//! Core Wasmtime runtime for playpen.
//!
//! This crate provides the compile and execute halves of the playground:
//! - [`WasmEngine`]: Configured Wasmtime engine shared by everything below
//! - [`Toolchain`] / [`WatToolchain`]: Diagnose, compile and link programs
//! - [`Bundle`]: Immutable linked artifact identified by a hostname
//! - [`SandboxContext`]: Per-session execution context
//! - [`InstanceRunner`]: Instance lifecycle management
//! - [`SandboxClient`] / [`WasmSandbox`]: Message-passing preview session
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WasmEngine                          │
//! │  (Shared by toolchain and sandboxes, thread-safe)       │
//! └─────────────────────────────────────────────────────────┘
//!               │                              │
//!               ▼                              ▼
//! ┌───────────────────────────┐  ┌──────────────────────────┐
//! │       WatToolchain        │  │   WasmSandbox worker     │
//! │  parse + validate + link  │  │  Store<SandboxContext>   │
//! │  ──▶ Bundle               │  │  fuel, memory, output    │
//! └───────────────────────────┘  └──────────────────────────┘
//! ```

pub mod bundle;
pub mod engine;
pub mod instance;
pub mod sandbox;
pub mod store;
pub mod toolchain;

pub use bundle::{Bundle, ENTRY_POINT};
pub use engine::WasmEngine;
pub use instance::{ExecutionResult, InstanceRunner};
pub use sandbox::{
    ErrorSink, Frame, SandboxClient, SandboxFactory, SandboxOptions, WasmSandbox,
    WasmSandboxFactory,
};
pub use store::{ExecutionMetrics, LogEntry, LogLevel, SandboxContext};
pub use toolchain::{CompiledOutput, Toolchain, VirtualEnv, WatToolchain};
