//! Host function registration for Wasmtime linkers.
//!
//! Every function registered here must also be listed in
//! [`playpen_core::toolchain::HOST_FUNCTIONS`], otherwise the toolchain
//! rejects programs importing it at link time.

use playpen_common::RuntimeError;
use playpen_core::store::SandboxContext;
use playpen_core::toolchain::HOST_MODULE;
use playpen_core::{InstanceRunner, WasmEngine};
use tracing::warn;
use wasmtime::{Caller, Linker};

use crate::logging::{LoggingHost, level_from_i32};

/// Register all host functions on a linker.
///
/// - `env::log(level: i32, ptr: i32, len: i32)`
/// - `env::print(ptr: i32, len: i32)`
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(linker: &mut Linker<SandboxContext>) -> Result<(), RuntimeError> {
    register_logging(linker)?;
    register_print(linker)?;
    Ok(())
}

/// Build an [`InstanceRunner`] with every host function registered.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn create_instance_runner(engine: &WasmEngine) -> Result<InstanceRunner, RuntimeError> {
    let mut runner = InstanceRunner::new(engine.clone());
    register_all(runner.linker_mut())?;
    Ok(runner)
}

/// Register `env::log(level, ptr, len)`.
///
/// `level` is 0=debug, 1=info, 2=warn, 3=error; the message is `len` bytes
/// of UTF-8 at `ptr` in the exported `memory`.
pub fn register_logging(linker: &mut Linker<SandboxContext>) -> Result<(), RuntimeError> {
    linker
        .func_wrap(
            HOST_MODULE,
            "log",
            |mut caller: Caller<'_, SandboxContext>, level: i32, ptr: i32, len: i32| {
                let Some(message) = read_guest_str(&mut caller, ptr, len) else {
                    return;
                };
                LoggingHost::log(caller.data_mut(), level_from_i32(level), &message);
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register log function: {e}"))
        })?;

    Ok(())
}

/// Register `env::print(ptr, len)`.
pub fn register_print(linker: &mut Linker<SandboxContext>) -> Result<(), RuntimeError> {
    linker
        .func_wrap(
            HOST_MODULE,
            "print",
            |mut caller: Caller<'_, SandboxContext>, ptr: i32, len: i32| {
                let Some(text) = read_guest_str(&mut caller, ptr, len) else {
                    return;
                };
                LoggingHost::print(caller.data_mut(), &text);
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register print function: {e}"))
        })?;

    Ok(())
}

/// Copy a UTF-8 string out of the guest's exported memory.
///
/// Invalid ranges are logged and yield `None`; invalid UTF-8 is replaced.
fn read_guest_str(caller: &mut Caller<'_, SandboxContext>, ptr: i32, len: i32) -> Option<String> {
    let (Ok(start), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
        warn!(ptr, len, "Invalid pointer or length (negative value)");
        return None;
    };

    let Some(memory) = caller
        .get_export("memory")
        .and_then(wasmtime::Extern::into_memory)
    else {
        warn!("Memory export not found in guest module");
        return None;
    };

    let data = memory.data(&*caller);
    let Some(end) = start.checked_add(len) else {
        warn!(ptr, len, "Pointer + length overflow");
        return None;
    };

    if end > data.len() {
        warn!(
            start,
            end,
            memory_size = data.len(),
            "Memory access out of bounds"
        );
        return None;
    }

    Some(String::from_utf8_lossy(&data[start..end]).into_owned())
}
