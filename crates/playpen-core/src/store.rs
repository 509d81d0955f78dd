//! Per-session execution context and store management.
//!
//! This module provides:
//! - [`SandboxContext`]: Per-session state accessible from host functions
//! - [`LogEntry`] and [`LogLevel`]: Structured logging from guest code
//! - [`ExecutionMetrics`]: Fuel and wall time of a run

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use wasmtime::{Store, StoreLimits, StoreLimitsBuilder};

use crate::WasmEngine;
use crate::sandbox::Frame;
use playpen_common::{ExecutionConfig, Hostname, RuntimeError};

/// Upper bound on captured program output.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Upper bound on retained guest log text, summed over all messages.
pub const MAX_LOG_BYTES: usize = 256 * 1024;

const TRUNCATION_MARKER: &str = "\n[output truncated]\n";

const LOG_TRUNCATION_MESSAGE: &str = "[logs truncated]";

/// Per-session execution context.
///
/// Holds all state specific to one preview session. Host functions reach it
/// through the [`wasmtime::Caller`] API.
pub struct SandboxContext {
    /// Unique session identifier for tracing.
    pub session_id: String,

    /// Bundle the session is running, once loaded.
    pub hostname: Option<Hostname>,

    /// Logs collected from guest code, capped at [`MAX_LOG_BYTES`].
    pub logs: Vec<LogEntry>,

    /// Text the program printed.
    pub output: String,

    /// Execution metrics.
    pub metrics: ExecutionMetrics,

    /// Forward guest logs to the host log.
    pub debug_logging: bool,

    /// Epoch deadline in milliseconds, when one is armed.
    pub deadline_ms: Option<u64>,

    limits: StoreLimits,
    frame: Option<Arc<watch::Sender<Frame>>>,
    truncated: bool,
    log_bytes: usize,
    logs_truncated: bool,
}

/// A single log entry from guest code.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level (debug, info, warn, error).
    pub level: LogLevel,

    /// Log message content.
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Log level for guest logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug-level messages.
    Debug,
    /// Informational messages.
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Execution metrics, published with the final frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionMetrics {
    /// Fuel consumed during execution.
    pub fuel_consumed: u64,

    /// Total execution duration.
    pub duration: Option<Duration>,
}

impl SandboxContext {
    /// Create a new context for the given session.
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            hostname: None,
            logs: Vec::new(),
            output: String::new(),
            metrics: ExecutionMetrics::default(),
            debug_logging: false,
            deadline_ms: None,
            limits: StoreLimits::default(),
            frame: None,
            truncated: false,
            log_bytes: 0,
            logs_truncated: false,
        }
    }

    /// Publish printed output to `frame` as it arrives.
    pub fn attach_frame(&mut self, frame: Arc<watch::Sender<Frame>>) {
        self.frame = Some(frame);
    }

    /// Add a log entry, enforcing [`MAX_LOG_BYTES`].
    ///
    /// Returns `false` once the budget is spent; the entry is dropped.
    pub fn log(&mut self, level: LogLevel, message: &str) -> bool {
        if self.logs_truncated {
            return false;
        }

        let entry = if self.log_bytes + message.len() <= MAX_LOG_BYTES {
            self.log_bytes += message.len();
            LogEntry {
                level,
                message: message.to_string(),
            }
        } else {
            self.logs_truncated = true;
            LogEntry {
                level: LogLevel::Warn,
                message: LOG_TRUNCATION_MESSAGE.to_string(),
            }
        };

        if let Some(frame) = &self.frame {
            let line = entry.to_string();
            frame.send_modify(|f| f.console.push(line));
        }
        self.logs.push(entry);
        !self.logs_truncated
    }

    /// Bytes of log text retained so far.
    pub fn log_bytes(&self) -> usize {
        self.log_bytes
    }

    /// Append program output, enforcing [`MAX_OUTPUT_BYTES`].
    pub fn print(&mut self, text: &str) {
        if self.truncated {
            return;
        }

        let room = MAX_OUTPUT_BYTES.saturating_sub(self.output.len());
        let chunk = if text.len() <= room {
            text.to_string()
        } else {
            self.truncated = true;
            let mut cut = room;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}{TRUNCATION_MARKER}", &text[..cut])
        };

        self.output.push_str(&chunk);
        if let Some(frame) = &self.frame {
            frame.send_modify(|f| f.output.push_str(&chunk));
        }
    }

    /// Record the metrics of a finished run.
    pub fn record_metrics(&mut self, fuel_consumed: u64, duration: Duration) {
        self.metrics = ExecutionMetrics {
            fuel_consumed,
            duration: Some(duration),
        };
    }
}

/// Create a new Wasmtime store with the given configuration.
///
/// # Errors
///
/// Returns an error if fuel cannot be configured on the store.
pub fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
    session_id: String,
) -> Result<Store<SandboxContext>, RuntimeError> {
    let mut context = SandboxContext::new(session_id);
    context.limits = StoreLimitsBuilder::new()
        .memory_size(config.max_memory_bytes())
        .build();

    let mut store = Store::new(engine.inner(), context);
    store.limiter(|ctx| &mut ctx.limits);

    // The engine always meters fuel; without a budget the store gets all of it.
    let fuel = if config.fuel_metering {
        config.max_fuel
    } else {
        u64::MAX
    };
    store
        .set_fuel(fuel)
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to set fuel: {e}")))?;

    if config.yield_interval > 0 {
        store
            .fuel_async_yield_interval(Some(config.yield_interval))
            .map_err(|e| {
                RuntimeError::invalid_config(format!("Failed to set yield interval: {e}"))
            })?;
    }

    // One epoch tick per `epoch_tick_ms`; the deadline is expressed in ticks.
    if engine.config().epoch_interruption {
        let ticks = config.timeout_ms / engine.config().epoch_tick_ms.max(1);
        store.set_epoch_deadline(ticks.max(1));
        store.data_mut().deadline_ms = Some(config.timeout_ms);
    }

    Ok(store)
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<SandboxContext>) -> Option<u64> {
    store.get_fuel().ok()
}

/// Calculate fuel consumed.
pub fn calculate_fuel_consumed(initial_fuel: u64, store: &Store<SandboxContext>) -> u64 {
    let remaining = get_remaining_fuel(store).unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
}
