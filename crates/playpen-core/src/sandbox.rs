//! Message-passing preview sandbox.
//!
//! A sandbox session is an isolated execution context reachable only through
//! requests and replies. [`WasmSandbox`] owns nothing but the sending half of
//! a channel and a [`watch`] receiver for the rendered [`Frame`]; the Wasmtime
//! store lives entirely inside a worker task.
//!
//! ```text
//!  Preview ──LoadBundle{reply}──▶ worker ──instantiate──▶ reply Ok/Err
//!          ──Quit──────────────▶        ──run _start──▶ Frame (watch)
//!                                       ──trap──────▶ ErrorSink
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use playpen_common::{ExecutionConfig, Hostname, PreviewError, RuntimeError, SandboxError};

use crate::bundle::Bundle;
use crate::instance::{ExecutionResult, InstanceRunner};
use crate::store::{ExecutionMetrics, create_store};

/// Outbound channel for runtime errors raised inside a session.
pub type ErrorSink = mpsc::UnboundedSender<PreviewError>;

const REQUEST_CAPACITY: usize = 8;

/// What a session currently displays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Bundle the frame was produced by.
    pub hostname: Option<Hostname>,
    /// Program output so far.
    pub output: String,
    /// Guest log lines, formatted as `[LEVEL] message`.
    pub console: Vec<String>,
    /// The entry point returned or trapped.
    pub finished: bool,
    /// Fuel spent by the entry point, once finished.
    pub fuel_consumed: Option<u64>,
    /// Wall time of the entry point in milliseconds, once finished.
    pub duration_ms: Option<u64>,
}

impl Frame {
    fn finish(&mut self, metrics: ExecutionMetrics) {
        self.finished = true;
        self.fuel_consumed = Some(metrics.fuel_consumed);
        self.duration_ms = metrics
            .duration
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
    }
}

/// Per-session switches taken from settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SandboxOptions {
    /// Forward guest `env::log` calls to the host log.
    pub debug_logging: bool,
}

/// Client half of a sandbox session.
#[async_trait]
pub trait SandboxClient: Send + Sync {
    /// Load `bundle` into the session.
    ///
    /// Resolves once the bundle is instantiated; execution continues in the
    /// background and reports through [`SandboxClient::frame`] and the error sink.
    async fn load_bundle(&self, bundle: Arc<Bundle>) -> Result<(), SandboxError>;

    /// Tear the session down. Takes effect immediately.
    fn quit(&self);

    /// Snapshot of the current output.
    fn frame(&self) -> Frame;
}

/// Creates sandbox sessions.
pub trait SandboxFactory: Send + Sync {
    /// Spawn a fresh session reporting runtime errors to `errors`.
    fn spawn(&self, options: SandboxOptions, errors: ErrorSink) -> Box<dyn SandboxClient>;
}

enum SandboxRequest {
    LoadBundle {
        bundle: Arc<Bundle>,
        reply: oneshot::Sender<Result<(), SandboxError>>,
    },
    Quit,
}

/// A sandbox session backed by a Wasmtime worker task.
pub struct WasmSandbox {
    session_id: String,
    requests: mpsc::Sender<SandboxRequest>,
    frame: watch::Receiver<Frame>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WasmSandbox {
    /// Spawn a session on the current tokio runtime.
    pub fn spawn(
        runner: Arc<InstanceRunner>,
        execution: ExecutionConfig,
        options: SandboxOptions,
        errors: ErrorSink,
    ) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let (requests, inbox) = mpsc::channel(REQUEST_CAPACITY);
        let (frame_tx, frame) = watch::channel(Frame::default());

        let worker = Worker {
            session_id: session_id.clone(),
            runner,
            execution,
            options,
            errors,
            frame: Arc::new(frame_tx),
        };
        let handle = tokio::spawn(worker.run(inbox));

        debug!(session_id = %session_id, "Sandbox session spawned");

        Self {
            session_id,
            requests,
            frame,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Unique session identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns `true` once the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.worker.lock().is_none() || self.requests.is_closed()
    }
}

#[async_trait]
impl SandboxClient for WasmSandbox {
    async fn load_bundle(&self, bundle: Arc<Bundle>) -> Result<(), SandboxError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(SandboxRequest::LoadBundle { bundle, reply })
            .await
            .map_err(|_| SandboxError::Disconnected)?;

        response.await.map_err(|_| SandboxError::Disconnected)?
    }

    fn quit(&self) {
        let _ = self.requests.try_send(SandboxRequest::Quit);
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
            debug!(session_id = %self.session_id, "Sandbox session quit");
        }
    }

    fn frame(&self) -> Frame {
        self.frame.borrow().clone()
    }
}

impl Drop for WasmSandbox {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for WasmSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmSandbox")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

struct Worker {
    session_id: String,
    runner: Arc<InstanceRunner>,
    execution: ExecutionConfig,
    options: SandboxOptions,
    errors: ErrorSink,
    frame: Arc<watch::Sender<Frame>>,
}

impl Worker {
    async fn run(self, mut inbox: mpsc::Receiver<SandboxRequest>) {
        while let Some(request) = inbox.recv().await {
            match request {
                SandboxRequest::LoadBundle { bundle, reply } => self.load(bundle, reply).await,
                SandboxRequest::Quit => break,
            }
        }
        debug!(session_id = %self.session_id, "Sandbox worker stopped");
    }

    async fn load(
        &self,
        bundle: Arc<Bundle>,
        reply: oneshot::Sender<Result<(), SandboxError>>,
    ) {
        let hostname = bundle.hostname().clone();
        self.frame.send_replace(Frame {
            hostname: Some(hostname.clone()),
            ..Frame::default()
        });

        let mut store = match create_store(
            self.runner.engine(),
            &self.execution,
            self.session_id.clone(),
        ) {
            Ok(store) => store,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };
        store.data_mut().debug_logging = self.options.debug_logging;
        store.data_mut().attach_frame(Arc::clone(&self.frame));

        let entry = match self.runner.instantiate(&bundle, &mut store).await {
            Ok(entry) => entry,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        if reply.send(Ok(())).is_err() {
            // Nobody is waiting for this session any more.
            return;
        }

        info!(session_id = %self.session_id, hostname = %hostname, "Bundle loaded");

        let outcome = self.runner.run(entry, &mut store).await;
        let metrics = store.data().metrics;
        self.frame.send_modify(|f| f.finish(metrics));

        let error = match outcome {
            Ok(ExecutionResult::Success) => None,
            Ok(ExecutionResult::Trap { message, code }) => {
                let error = PreviewError::new(message).with_hostname(hostname.clone());
                Some(match code {
                    Some(code) => error.with_code(code),
                    None => error,
                })
            }
            Err(e) => Some(
                PreviewError::new(e.to_string())
                    .with_hostname(hostname.clone())
                    .with_code(limit_code(&e)),
            ),
        };

        if let Some(error) = error {
            if self.errors.send(error).is_err() {
                warn!(session_id = %self.session_id, "Runtime error dropped: no listener");
            }
        }
    }
}

fn limit_code(error: &RuntimeError) -> &'static str {
    match error {
        RuntimeError::FuelExhausted => "FuelExhausted",
        RuntimeError::ExecutionTimeout { .. } => "ExecutionTimeout",
        _ => "RuntimeError",
    }
}

/// Spawns [`WasmSandbox`] sessions sharing one instance runner.
#[derive(Debug, Clone)]
pub struct WasmSandboxFactory {
    runner: Arc<InstanceRunner>,
    execution: ExecutionConfig,
}

impl WasmSandboxFactory {
    /// Create a factory.
    pub fn new(runner: Arc<InstanceRunner>, execution: ExecutionConfig) -> Self {
        Self { runner, execution }
    }
}

impl SandboxFactory for WasmSandboxFactory {
    fn spawn(&self, options: SandboxOptions, errors: ErrorSink) -> Box<dyn SandboxClient> {
        Box::new(WasmSandbox::spawn(
            Arc::clone(&self.runner),
            self.execution.clone(),
            options,
            errors,
        ))
    }
}
