//! Integration tests for playpen-core.
//!
//! These tests verify the complete execution pipeline:
//! - WAT compilation and linking into a bundle
//! - Store creation with fuel metering
//! - Host function registration
//! - Instance execution
//! - The message-passing sandbox session

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use playpen_common::{EngineConfig, ExecutionConfig, Hostname, RuntimeError};
use playpen_core::store::{LogLevel, MAX_LOG_BYTES, create_store};
use playpen_core::toolchain::ENTRY_FILE;
use playpen_core::{
    Bundle, ExecutionResult, Frame, InstanceRunner, SandboxClient, SandboxFactory,
    SandboxOptions, Toolchain, VirtualEnv, WasmEngine, WasmSandboxFactory, WatToolchain,
};
use playpen_host::linker::create_instance_runner;

const HELLO: &str = r#"
    (module
        (import "env" "print" (func $print (param i32 i32)))
        (memory (export "memory") 1)
        (data (i32.const 0) "Hello, sandbox!")
        (func (export "_start")
            (call $print (i32.const 0) (i32.const 15))
        )
    )
"#;

fn engine() -> WasmEngine {
    WasmEngine::new(&EngineConfig {
        pooling_allocator: false,
        epoch_interruption: false,
        ..Default::default()
    })
    .unwrap()
}

async fn build(engine: &WasmEngine, source: &str, version: u64) -> Bundle {
    let toolchain = WatToolchain::new(engine.clone());
    let mut env = VirtualEnv::new();
    env.write(ENTRY_FILE, source);

    let output = toolchain.compile(&env).await;
    assert!(!output.has_errors(), "{:?}", output.diagnostics);

    toolchain
        .link(output, &Hostname::derive("test", version, "int"))
        .await
        .unwrap()
}

async fn run(
    runner: &InstanceRunner,
    engine: &WasmEngine,
    bundle: &Bundle,
    config: &ExecutionConfig,
) -> (
    Result<ExecutionResult, RuntimeError>,
    wasmtime::Store<playpen_core::SandboxContext>,
) {
    let mut store = create_store(engine, config, "test".into()).unwrap();
    let entry = runner.instantiate(bundle, &mut store).await.unwrap();
    let result = runner.run(entry, &mut store).await;
    (result, store)
}

async fn wait_finished(client: &dyn SandboxClient) -> Frame {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let frame = client.frame();
            if frame.finished {
                return frame;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sandbox never finished")
}

// ============================================================================
// Test: Basic Execution
// ============================================================================

#[tokio::test]
async fn test_basic_execution() {
    let engine = engine();
    let runner = InstanceRunner::new(engine.clone());
    let bundle = build(&engine, r#"(module (func (export "_start")))"#, 1).await;

    let (result, store) = run(&runner, &engine, &bundle, &ExecutionConfig::default()).await;

    assert!(result.unwrap().is_success());
    assert_eq!(store.data().hostname.as_ref(), Some(bundle.hostname()));
}

// ============================================================================
// Test: Fuel
// ============================================================================

#[tokio::test]
async fn test_fuel_consumption() {
    let wat = r#"
        (module
            (func (export "_start")
                (local $i i32)
                (local.set $i (i32.const 0))
                (block $break
                    (loop $continue
                        (local.set $i (i32.add (local.get $i) (i32.const 1)))
                        (br_if $continue (i32.lt_u (local.get $i) (i32.const 100)))
                    )
                )
            )
        )
    "#;

    let engine = engine();
    let runner = InstanceRunner::new(engine.clone());
    let bundle = build(&engine, wat, 1).await;
    let config = ExecutionConfig {
        max_fuel: 100_000,
        fuel_metering: true,
        ..Default::default()
    };

    let (result, store) = run(&runner, &engine, &bundle, &config).await;

    assert!(result.unwrap().is_success());
    assert!(store.data().metrics.fuel_consumed > 0);
}

#[tokio::test]
async fn test_fuel_exhaustion() {
    let wat = r#"
        (module
            (func (export "_start")
                (loop $forever
                    (br $forever)
                )
            )
        )
    "#;

    let engine = engine();
    let runner = InstanceRunner::new(engine.clone());
    let bundle = build(&engine, wat, 1).await;
    let config = ExecutionConfig {
        max_fuel: 1000,
        fuel_metering: true,
        ..Default::default()
    };

    let (result, _) = run(&runner, &engine, &bundle, &config).await;

    assert!(matches!(result, Err(RuntimeError::FuelExhausted)));
}

// ============================================================================
// Test: Host Functions
// ============================================================================

#[tokio::test]
async fn test_host_logging_and_print() {
    let wat = r#"
        (module
            (import "env" "log" (func $log (param i32 i32 i32)))
            (import "env" "print" (func $print (param i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "First message")
            (data (i32.const 20) "Error message")
            (data (i32.const 40) "printed")

            (func (export "_start")
                (call $log (i32.const 1) (i32.const 0) (i32.const 13))
                (call $log (i32.const 3) (i32.const 20) (i32.const 13))
                (call $print (i32.const 40) (i32.const 7))
            )
        )
    "#;

    let engine = engine();
    let runner = create_instance_runner(&engine).unwrap();
    let bundle = build(&engine, wat, 1).await;

    let (result, store) = run(&runner, &engine, &bundle, &ExecutionConfig::default()).await;

    assert!(result.unwrap().is_success());

    let logs = &store.data().logs;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].message, "First message");
    assert_eq!(logs[0].level, LogLevel::Info);
    assert_eq!(logs[1].level, LogLevel::Error);
    assert_eq!(store.data().output, "printed");
}

#[tokio::test]
async fn test_guest_log_flood_is_capped() {
    let wat = r#"
        (module
            (import "env" "log" (func $log (param i32 i32 i32)))
            (memory (export "memory") 1)
            (func (export "_start")
                (local $i i32)
                (loop $again
                    (call $log (i32.const 1) (i32.const 0) (i32.const 65536))
                    (local.set $i (i32.add (local.get $i) (i32.const 1)))
                    (br_if $again (i32.lt_u (local.get $i) (i32.const 2000)))
                )
            )
        )
    "#;

    let engine = engine();
    let runner = create_instance_runner(&engine).unwrap();
    let bundle = build(&engine, wat, 1).await;

    let (result, store) = run(&runner, &engine, &bundle, &ExecutionConfig::default()).await;

    assert!(result.unwrap().is_success());
    let ctx = store.data();
    let retained: usize = ctx.logs.iter().map(|entry| entry.message.len()).sum();
    assert!(ctx.log_bytes() <= MAX_LOG_BYTES);
    assert!(retained <= MAX_LOG_BYTES + 64);
    assert_eq!(ctx.logs.len(), MAX_LOG_BYTES / 65536 + 1);
    assert_eq!(ctx.logs.last().unwrap().level, LogLevel::Warn);
}

#[tokio::test]
async fn test_out_of_bounds_print_is_ignored() {
    let wat = r#"
        (module
            (import "env" "print" (func $print (param i32 i32)))
            (memory (export "memory") 1)
            (func (export "_start")
                (call $print (i32.const 65530) (i32.const 100))
                (call $print (i32.const -1) (i32.const 1))
            )
        )
    "#;

    let engine = engine();
    let runner = create_instance_runner(&engine).unwrap();
    let bundle = build(&engine, wat, 1).await;

    let (result, store) = run(&runner, &engine, &bundle, &ExecutionConfig::default()).await;

    assert!(result.unwrap().is_success());
    assert!(store.data().output.is_empty());
}

// ============================================================================
// Test: Trap Handling
// ============================================================================

#[tokio::test]
async fn test_trap_unreachable() {
    let engine = engine();
    let runner = InstanceRunner::new(engine.clone());
    let bundle = build(&engine, r#"(module (func (export "_start") unreachable))"#, 1).await;

    let (result, _) = run(&runner, &engine, &bundle, &ExecutionConfig::default()).await;

    let result = result.unwrap();
    assert!(result.is_trap(), "Expected trap, got {result:?}");
    if let ExecutionResult::Trap { code, .. } = result {
        assert_eq!(code.as_deref(), Some("UnreachableCodeReached"));
    }
}

#[tokio::test]
async fn test_instantiate_without_host_functions_fails() {
    let engine = engine();
    let runner = InstanceRunner::new(engine.clone());
    let bundle = build(&engine, HELLO, 1).await;

    let mut store = create_store(&engine, &ExecutionConfig::default(), "t".into()).unwrap();
    let result = runner.instantiate(&bundle, &mut store).await;

    assert!(matches!(
        result,
        Err(RuntimeError::InstantiationFailed { .. })
    ));
}

// ============================================================================
// Test: Sandbox Sessions
// ============================================================================

fn factory(engine: &WasmEngine, execution: ExecutionConfig) -> WasmSandboxFactory {
    WasmSandboxFactory::new(Arc::new(create_instance_runner(engine).unwrap()), execution)
}

#[tokio::test]
async fn test_sandbox_load_and_render() {
    let engine = engine();
    let factory = factory(&engine, ExecutionConfig::default());
    let bundle = Arc::new(build(&engine, HELLO, 1).await);
    let (errors, mut error_rx) = mpsc::unbounded_channel();

    let client = factory.spawn(SandboxOptions::default(), errors);
    client.load_bundle(Arc::clone(&bundle)).await.unwrap();

    let frame = wait_finished(client.as_ref()).await;
    assert_eq!(frame.hostname.as_ref(), Some(bundle.hostname()));
    assert_eq!(frame.output, "Hello, sandbox!");
    assert!(frame.fuel_consumed.is_some_and(|fuel| fuel > 0));
    assert!(frame.duration_ms.is_some());
    assert!(error_rx.try_recv().is_err());

    client.quit();
}

#[tokio::test]
async fn test_sandbox_publishes_guest_logs() {
    let wat = r#"
        (module
            (import "env" "log" (func $log (param i32 i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "booting")
            (func (export "_start")
                (call $log (i32.const 2) (i32.const 0) (i32.const 7))
            )
        )
    "#;

    let engine = engine();
    let factory = factory(&engine, ExecutionConfig::default());
    let bundle = Arc::new(build(&engine, wat, 1).await);
    let (errors, _error_rx) = mpsc::unbounded_channel();

    let client = factory.spawn(SandboxOptions::default(), errors);
    client.load_bundle(bundle).await.unwrap();

    let frame = wait_finished(client.as_ref()).await;
    assert_eq!(frame.console, vec!["[WARN] booting".to_string()]);
    assert!(frame.output.is_empty());

    client.quit();
}

#[tokio::test]
async fn test_sandbox_reports_trap_out_of_band() {
    let engine = engine();
    let factory = factory(&engine, ExecutionConfig::default());
    let bundle = Arc::new(build(&engine, r#"(module (func (export "_start") unreachable))"#, 2).await);
    let (errors, mut error_rx) = mpsc::unbounded_channel();

    let client = factory.spawn(SandboxOptions::default(), errors);
    client.load_bundle(Arc::clone(&bundle)).await.unwrap();

    let error = error_rx.recv().await.unwrap();
    assert_eq!(error.hostname.as_ref(), Some(bundle.hostname()));
    assert_eq!(error.code.as_deref(), Some("UnreachableCodeReached"));
    assert!(wait_finished(client.as_ref()).await.finished);
}

#[tokio::test]
async fn test_sandbox_reports_fuel_exhaustion() {
    let engine = engine();
    let factory = factory(
        &engine,
        ExecutionConfig {
            max_fuel: 10_000,
            ..Default::default()
        },
    );
    let bundle = Arc::new(
        build(&engine, r#"(module (func (export "_start") (loop $l (br $l))))"#, 3).await,
    );
    let (errors, mut error_rx) = mpsc::unbounded_channel();

    let client = factory.spawn(SandboxOptions::default(), errors);
    client.load_bundle(bundle).await.unwrap();

    let error = error_rx.recv().await.unwrap();
    assert_eq!(error.code.as_deref(), Some("FuelExhausted"));
}

#[tokio::test]
async fn test_sandbox_load_failure_rejects() {
    let engine = engine();
    // No host functions registered: instantiating HELLO fails.
    let factory = WasmSandboxFactory::new(
        Arc::new(InstanceRunner::new(engine.clone())),
        ExecutionConfig::default(),
    );
    let bundle = Arc::new(build(&engine, HELLO, 4).await);
    let (errors, _error_rx) = mpsc::unbounded_channel();

    let client = factory.spawn(SandboxOptions::default(), errors);
    let result = client.load_bundle(bundle).await;

    assert!(matches!(
        result,
        Err(playpen_common::SandboxError::Load(RuntimeError::InstantiationFailed { .. }))
    ));
}

#[tokio::test]
async fn test_sandbox_quit_disconnects() {
    let engine = engine();
    let factory = factory(&engine, ExecutionConfig::default());
    let bundle = Arc::new(build(&engine, HELLO, 5).await);
    let (errors, _error_rx) = mpsc::unbounded_channel();

    let client = factory.spawn(SandboxOptions::default(), errors);
    client.quit();

    let result = client.load_bundle(bundle).await;
    assert!(matches!(
        result,
        Err(playpen_common::SandboxError::Disconnected)
    ));
}
