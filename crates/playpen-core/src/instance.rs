//! WebAssembly instance lifecycle management.
//!
//! This module provides [`InstanceRunner`], which drives one bundle through
//! a preview session:
//!
//! 1. Instantiate the bundle against the host function linker
//! 2. Resolve the entry point (this is where "load" ends)
//! 3. Execute the entry point
//! 4. Collect results and metrics

use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use wasmtime::{Linker, Store, Trap, TypedFunc};

use crate::WasmEngine;
use crate::bundle::{Bundle, ENTRY_POINT};
use crate::store::{SandboxContext, calculate_fuel_consumed, get_remaining_fuel};
use playpen_common::RuntimeError;

/// Result of executing a bundle's entry point.
#[derive(Debug)]
pub enum ExecutionResult {
    /// Execution completed successfully.
    Success,

    /// Execution completed with a trap (runtime error).
    Trap {
        /// Description of the trap.
        message: String,
        /// Trap code if available.
        code: Option<String>,
    },
}

impl ExecutionResult {
    /// Returns `true` if execution was successful.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success)
    }

    /// Returns `true` if execution trapped.
    pub fn is_trap(&self) -> bool {
        matches!(self, ExecutionResult::Trap { .. })
    }
}

/// Instance lifecycle manager.
///
/// `InstanceRunner` is shared by every sandbox created from the same
/// factory. Each session uses its own [`Store`] for isolation.
pub struct InstanceRunner {
    engine: WasmEngine,
    linker: Linker<SandboxContext>,
}

impl InstanceRunner {
    /// Create a new instance runner with an empty linker.
    pub fn new(engine: WasmEngine) -> Self {
        let linker = Linker::new(engine.inner());

        Self { engine, linker }
    }

    /// Get a mutable reference to the linker.
    ///
    /// Use this to register host functions.
    pub fn linker_mut(&mut self) -> &mut Linker<SandboxContext> {
        &mut self.linker
    }

    /// Instantiate `bundle` and resolve its entry point.
    ///
    /// # Errors
    ///
    /// Returns an error if instantiation fails or the entry point is missing
    /// or has the wrong signature.
    #[instrument(skip_all, fields(hostname = %bundle.hostname()))]
    pub async fn instantiate(
        &self,
        bundle: &Bundle,
        store: &mut Store<SandboxContext>,
    ) -> Result<TypedFunc<(), ()>, RuntimeError> {
        debug!("Instantiating bundle");

        let instance = self
            .linker
            .instantiate_async(&mut *store, bundle.module())
            .await
            .map_err(|e| RuntimeError::instantiation_failed(format!("{e:#}")))?;

        store.data_mut().hostname = Some(bundle.hostname().clone());

        instance
            .get_typed_func::<(), ()>(&mut *store, ENTRY_POINT)
            .map_err(|_| RuntimeError::entry_point_not_found(ENTRY_POINT))
    }

    /// Execute a resolved entry point.
    ///
    /// Traps are reported as [`ExecutionResult::Trap`]; exhausting a resource
    /// limit is an error.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::FuelExhausted`] or
    /// [`RuntimeError::ExecutionTimeout`] when the program hits a limit.
    #[instrument(skip_all, fields(session_id = %store.data().session_id))]
    pub async fn run(
        &self,
        entry: TypedFunc<(), ()>,
        store: &mut Store<SandboxContext>,
    ) -> Result<ExecutionResult, RuntimeError> {
        let start = Instant::now();
        let initial_fuel = get_remaining_fuel(store).unwrap_or(0);

        debug!("Executing entry point");

        let result = entry.call_async(&mut *store, ()).await;

        let fuel_consumed = calculate_fuel_consumed(initial_fuel, store);
        let duration = start.elapsed();
        store.data_mut().record_metrics(fuel_consumed, duration);

        match result {
            Ok(()) => {
                info!(
                    duration_ms = duration.as_millis(),
                    fuel_consumed = fuel_consumed,
                    "Execution completed successfully"
                );
                Ok(ExecutionResult::Success)
            }
            Err(err) => {
                match err.downcast_ref::<Trap>() {
                    Some(Trap::OutOfFuel) => {
                        warn!(
                            duration_ms = duration.as_millis(),
                            fuel_consumed = fuel_consumed,
                            "Execution terminated: fuel exhausted"
                        );
                        return Err(RuntimeError::FuelExhausted);
                    }
                    Some(Trap::Interrupt) => {
                        let duration_ms = store.data().deadline_ms.unwrap_or_else(|| {
                            u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
                        });
                        warn!(duration_ms, "Execution terminated: deadline reached");
                        return Err(RuntimeError::ExecutionTimeout { duration_ms });
                    }
                    _ => {}
                }

                let (message, code) = extract_trap_info(&err);

                error!(
                    duration_ms = duration.as_millis(),
                    fuel_consumed = fuel_consumed,
                    trap_message = %message,
                    "Execution trapped"
                );

                Ok(ExecutionResult::Trap { message, code })
            }
        }
    }

    /// Get the engine.
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }
}

/// Extract human-readable trap information.
fn extract_trap_info(error: &wasmtime::Error) -> (String, Option<String>) {
    let message = format!("{error:#}");
    let code = error.downcast_ref::<Trap>().map(|trap| format!("{trap:?}"));

    (message, code)
}

impl std::fmt::Debug for InstanceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRunner")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_result_success() {
        let result = ExecutionResult::Success;
        assert!(result.is_success());
        assert!(!result.is_trap());
    }

    #[test]
    fn test_execution_result_trap() {
        let result = ExecutionResult::Trap {
            message: "unreachable".into(),
            code: Some("UnreachableCodeReached".into()),
        };
        assert!(!result.is_success());
        assert!(result.is_trap());
    }
}
