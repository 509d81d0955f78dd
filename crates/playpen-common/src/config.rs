//! Configuration structures for playpen.
//!
//! This module defines configuration options for the moving parts:
//! - [`SandboxConfig`]: Preview sandbox settings (engine + execution limits)
//! - [`EngineConfig`]: Wasmtime engine settings
//! - [`ExecutionConfig`]: Per-session execution limits (fuel, memory, timeout)
//! - [`PipelineConfig`]: Rebuild scheduling, sharing and persistence gates

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Preview sandbox configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SandboxConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-session execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Wasmtime engine configuration.
///
/// These settings affect the engine shared by the toolchain and every
/// preview session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable the pooling allocator.
    ///
    /// A playground runs one preview session at a time, so the on-demand
    /// allocator is the default.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,

    /// Maximum concurrent instances in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per instance slot in megabytes.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Enable epoch-based interruption.
    ///
    /// When enabled, a background ticker advances the epoch every
    /// `epoch_tick_ms` and sessions trap once `timeout_ms` ticks elapse.
    #[serde(default = "defaults::epoch_interruption")]
    pub epoch_interruption: bool,

    /// Epoch tick interval in milliseconds.
    #[serde(default = "defaults::epoch_tick_ms")]
    pub epoch_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            epoch_interruption: defaults::epoch_interruption(),
            epoch_tick_ms: defaults::epoch_tick_ms(),
        }
    }
}

impl EngineConfig {
    /// Get the epoch tick interval as a `Duration`.
    pub fn epoch_tick(&self) -> Duration {
        Duration::from_millis(self.epoch_tick_ms.max(1))
    }
}

/// Per-session execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Maximum fuel (CPU instructions) per preview run.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Execution timeout in milliseconds (epoch ticks).
    ///
    /// Only effective when epoch interruption is enabled on the engine.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum linear memory in megabytes.
    #[serde(default = "defaults::max_memory_mb")]
    pub max_memory_mb: u32,

    /// Enable fuel metering.
    #[serde(default = "defaults::fuel_metering")]
    pub fuel_metering: bool,

    /// Fuel consumed between cooperative yields back to the scheduler.
    ///
    /// Yielding lets a long-running guest be torn down promptly when a new
    /// bundle arrives.
    #[serde(default = "defaults::yield_interval")]
    pub yield_interval: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
            timeout_ms: defaults::timeout_ms(),
            max_memory_mb: defaults::max_memory_mb(),
            fuel_metering: defaults::fuel_metering(),
            yield_interval: defaults::yield_interval(),
        }
    }
}

impl ExecutionConfig {
    /// Get the timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the memory limit in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb as usize) * 1024 * 1024
    }
}

/// Pipeline controller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Trailing-edge rebuild window in milliseconds.
    #[serde(default = "defaults::throttle_ms")]
    pub throttle_ms: u64,

    /// Base URL that share links are built on.
    #[serde(default = "defaults::share_base_url")]
    pub share_base_url: String,

    /// Allow a pen encoded in the start-up URL to be loaded.
    #[serde(default = "defaults::allow_url_pen")]
    pub allow_url_pen: bool,

    /// Allow pens and settings to be read from and written to storage.
    #[serde(default = "defaults::allow_storage")]
    pub allow_storage: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            throttle_ms: defaults::throttle_ms(),
            share_base_url: defaults::share_base_url(),
            allow_url_pen: defaults::allow_url_pen(),
            allow_storage: defaults::allow_storage(),
        }
    }
}

impl PipelineConfig {
    /// Get the rebuild window as a `Duration`.
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        false
    }

    pub const fn max_instances() -> u32 {
        16
    }

    pub const fn instance_memory_mb() -> u32 {
        64
    }

    pub const fn epoch_interruption() -> bool {
        false
    }

    pub const fn epoch_tick_ms() -> u64 {
        1
    }

    pub const fn max_fuel() -> u64 {
        50_000_000
    }

    pub const fn timeout_ms() -> u64 {
        5_000
    }

    pub const fn max_memory_mb() -> u32 {
        64
    }

    pub const fn fuel_metering() -> bool {
        true
    }

    pub const fn yield_interval() -> u64 {
        10_000
    }

    pub const fn throttle_ms() -> u64 {
        500
    }

    pub fn share_base_url() -> String {
        "http://127.0.0.1:8080/".to_string()
    }

    pub const fn allow_url_pen() -> bool {
        true
    }

    pub const fn allow_storage() -> bool {
        true
    }
}
