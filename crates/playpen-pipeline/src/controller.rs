//! The pipeline controller.
//!
//! [`Playground`] owns the pen, the build session, diagnostics, settings and
//! the current bundle. It turns edits into throttled rebuilds:
//!
//! ```text
//! set_source ──▶ diagnose (sync) ──▶ compile_errors
//!            └─▶ throttle ──(window)──▶ rebuild
//!                                        ├─ version++, hostname
//!                                        ├─ compile + link (snapshot)
//!                                        ├─ commit diagnostics + bundle ──▶ bundle-changed
//!                                        ├─ persist pen
//!                                        └─ upload (fire-and-forget)
//! runtime-error ──▶ preview_errors (append-only)
//! ```

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use playpen_common::{
    Diagnostic, Diagnostics, Hostname, LinkError, Pen, PipelineConfig, PlaygroundError,
    PreviewError, Settings, StorageError,
};
use playpen_core::{Bundle, ErrorSink, Toolchain, VirtualEnv};
use playpen_host::bundle_store::{BundleStore, function_url};
use playpen_host::storage::Storage;
use playpen_host::{pen_codec, settings_store};

use crate::session::BuildSession;
use crate::template::{TEMPLATE_SOURCE, template_pen};
use crate::throttle::Throttle;

/// Where [`Playground::load`] found the pen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PenOrigin {
    /// Decoded from the URL fragment.
    Url,
    /// Read from storage.
    Storage,
    /// The built-in template.
    Template,
}

/// Outcome of one rebuild.
#[derive(Debug, Clone)]
pub struct RebuildReport {
    /// Version assigned to the build.
    pub version: u64,
    /// Identity the build was linked under.
    pub hostname: Hostname,
    /// The new bundle, when compile and link succeeded.
    pub bundle: Option<Arc<Bundle>>,
    /// Error diagnostics the build produced.
    pub error_count: usize,
    /// A newer build had already committed; nothing was applied.
    pub stale: bool,
}

struct Document {
    pen: Pen,
    template: bool,
    template_source: String,
    session: BuildSession,
}

/// Link diagnostics of the last committed rebuild, keyed by the
/// environment that produced them.
#[derive(Default)]
struct LinkOutcome {
    env: VirtualEnv,
    diagnostics: Vec<Diagnostic>,
}

struct Inner {
    document: Mutex<Document>,
    diagnostics: RwLock<Diagnostics>,
    committed: Mutex<u64>,
    linked: Mutex<LinkOutcome>,
    bundle: watch::Sender<Option<Arc<Bundle>>>,
    settings: watch::Sender<Settings>,
    toolchain: Arc<dyn Toolchain>,
    bundle_store: Option<Arc<dyn BundleStore>>,
    storage: Arc<dyn Storage>,
    config: PipelineConfig,
    share_base: Url,
    errors: ErrorSink,
}

/// A playground instance.
///
/// Must be created inside a tokio runtime.
pub struct Playground {
    inner: Arc<Inner>,
    throttle: Throttle<()>,
    error_drain: JoinHandle<()>,
}

impl Playground {
    /// Create a playground with the starter template loaded but not built.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.share_base_url` is not a valid URL.
    pub fn new(
        toolchain: Arc<dyn Toolchain>,
        storage: Arc<dyn Storage>,
        bundle_store: Option<Arc<dyn BundleStore>>,
        config: PipelineConfig,
    ) -> Result<Self, PlaygroundError> {
        let share_base = Url::parse(&config.share_base_url).map_err(|e| {
            PlaygroundError::invalid_config(format!(
                "share_base_url '{}': {e}",
                config.share_base_url
            ))
        })?;

        let mut session = BuildSession::new();
        let pen = template_pen();
        session.write_source(&pen.source);

        let (errors, error_rx) = mpsc::unbounded_channel();
        let (bundle, _) = watch::channel(None);
        let (settings, _) = watch::channel(Settings::default());

        let inner = Arc::new(Inner {
            document: Mutex::new(Document {
                pen,
                template: true,
                template_source: TEMPLATE_SOURCE.to_string(),
                session,
            }),
            diagnostics: RwLock::new(Diagnostics::default()),
            committed: Mutex::new(0),
            linked: Mutex::new(LinkOutcome::default()),
            bundle,
            settings,
            toolchain,
            bundle_store,
            storage,
            config,
            share_base,
            errors,
        });

        let throttle = {
            let weak = Arc::downgrade(&inner);
            Throttle::new(inner.config.throttle(), move |()| {
                let weak = Weak::clone(&weak);
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.rebuild().await;
                    }
                }
            })
        };

        let error_drain = tokio::spawn(drain_runtime_errors(Arc::downgrade(&inner), error_rx));

        Ok(Self {
            inner,
            throttle,
            error_drain,
        })
    }

    /// Replace the source after a user edit.
    ///
    /// Compile diagnostics are recomputed immediately; the rebuild is throttled.
    #[instrument(skip_all, fields(len = text.len()))]
    pub fn set_source(&self, text: &str) {
        let env = {
            let mut doc = self.inner.document.lock();
            doc.template = false;
            doc.pen.source = text.to_string();
            doc.session.write_source(text);
            doc.session.env().clone()
        };
        self.inner.refresh_diagnostics(&env);
        self.rebuild();
    }

    /// The built-in template changed.
    ///
    /// While the pen is still the untouched template it follows the change.
    pub fn update_template(&self, text: &str) {
        let env = {
            let mut doc = self.inner.document.lock();
            doc.template_source = text.to_string();
            if !doc.template {
                return;
            }
            doc.pen.source = text.to_string();
            doc.session.write_source(text);
            doc.session.env().clone()
        };
        debug!("Template changed while in template mode");
        self.inner.refresh_diagnostics(&env);
        self.rebuild();
    }

    /// Rename the pen. Future rebuilds derive hostnames from the new name.
    #[instrument(skip(self))]
    pub fn set_name(&self, name: &str) {
        let pen = {
            let mut doc = self.inner.document.lock();
            doc.pen.name = name.to_string();
            doc.pen.clone()
        };
        self.inner.persist_pen(&pen);
    }

    /// Schedule a throttled, trailing-edge rebuild.
    pub fn rebuild(&self) {
        self.throttle.trigger(());
    }

    /// Rebuild immediately, bypassing the throttle.
    pub async fn rebuild_now(&self) -> RebuildReport {
        self.inner.rebuild().await
    }

    /// URL whose fragment carries the current pen.
    ///
    /// # Errors
    ///
    /// Returns an error if the pen cannot be encoded.
    pub fn share(&self) -> Result<Url, PlaygroundError> {
        let pen = self.pen();
        Ok(pen_codec::share_url(&self.inner.share_base, &pen)?)
    }

    /// Start-up: load settings and resolve the pen, then schedule a build.
    ///
    /// A pen in `url`'s fragment beats a stored pen, which beats the template.
    #[instrument(skip_all, fields(url = url.map(Url::as_str)))]
    pub fn load(&self, url: Option<&Url>) -> PenOrigin {
        let config = &self.inner.config;

        let settings = if config.allow_storage {
            settings_store::load(self.inner.storage.as_ref())
        } else {
            Settings::default()
        };
        self.inner.settings.send_replace(settings);

        let from_url = url
            .filter(|_| config.allow_url_pen)
            .and_then(pen_codec::from_url)
            .map(|pen| (pen, PenOrigin::Url));
        let resolved = from_url.or_else(|| {
            config
                .allow_storage
                .then(|| pen_codec::load_stored(self.inner.storage.as_ref()))
                .flatten()
                .map(|pen| (pen, PenOrigin::Storage))
        });

        let (origin, env) = {
            let mut doc = self.inner.document.lock();
            let origin = match resolved {
                Some((pen, origin)) => {
                    doc.pen = pen;
                    doc.template = false;
                    origin
                }
                None => {
                    doc.pen = Pen::new(template_pen().name, doc.template_source.clone());
                    doc.template = true;
                    PenOrigin::Template
                }
            };
            let source = doc.pen.source.clone();
            doc.session.write_source(&source);
            info!(origin = ?origin, name = %doc.pen.name, "Pen loaded");
            (origin, doc.session.env().clone())
        };

        self.inner.refresh_diagnostics(&env);
        self.rebuild();
        origin
    }

    /// Current settings.
    pub fn settings(&self) -> Settings {
        self.inner.settings.borrow().clone()
    }

    /// Apply `change` to the settings. Persists and notifies subscribers
    /// only if something actually changed.
    pub fn update_settings(&self, change: impl FnOnce(&mut Settings)) -> bool {
        let changed = self.inner.settings.send_if_modified(|settings| {
            let before = settings.clone();
            change(settings);
            *settings != before
        });

        if changed {
            if let Err(e) = self.persist_settings() {
                warn!(error = %e, "Failed to persist settings");
            }
        }
        changed
    }

    /// Write the complete settings object, if storage is allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    pub fn persist_settings(&self) -> Result<(), StorageError> {
        if !self.inner.config.allow_storage {
            return Ok(());
        }
        settings_store::save(self.inner.storage.as_ref(), &self.settings())
    }

    /// Publish the current bundle to the remote runtime, if enabled.
    ///
    /// Returns the background task, or `None` when nothing was sent.
    pub fn upload(&self) -> Option<JoinHandle<()>> {
        self.inner.upload()
    }

    /// Snapshot of the diagnostics.
    pub fn diagnostics(&self) -> Diagnostics {
        self.inner.diagnostics.read().clone()
    }

    /// Empty the preview error list.
    pub fn clear_preview_errors(&self) {
        self.inner.diagnostics.write().clear_preview_errors();
    }

    /// Channel runtime errors are reported on.
    pub fn error_sink(&self) -> ErrorSink {
        self.inner.errors.clone()
    }

    /// Subscribe to bundle changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Bundle>>> {
        self.inner.bundle.subscribe()
    }

    /// Subscribe to settings changes.
    pub fn subscribe_settings(&self) -> watch::Receiver<Settings> {
        self.inner.settings.subscribe()
    }

    /// The current bundle.
    pub fn bundle(&self) -> Option<Arc<Bundle>> {
        self.inner.bundle.borrow().clone()
    }

    /// Version of the most recent build.
    pub fn version(&self) -> u64 {
        self.inner.document.lock().session.version()
    }

    /// The current pen.
    pub fn pen(&self) -> Pen {
        self.inner.document.lock().pen.clone()
    }

    /// Returns `true` while the pen follows the built-in template.
    pub fn is_template(&self) -> bool {
        self.inner.document.lock().template
    }

    /// Where the remote runtime serves the current bundle, if enabled.
    pub fn remote_url(&self) -> Option<Url> {
        let settings = self.settings();
        if !settings.use_remote_runtime {
            return None;
        }
        let bundle = self.bundle()?;
        let origin = Url::parse(&settings.remote_runtime_origin).ok()?;
        function_url(&origin, bundle.hostname()).ok()
    }
}

impl Drop for Playground {
    fn drop(&mut self) {
        self.error_drain.abort();
    }
}

impl std::fmt::Debug for Playground {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playground")
            .field("version", &self.version())
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Recompute compile errors for `env`.
    ///
    /// `diagnose` stops short of linking, so link errors from the last
    /// rebuild are carried over while the environment is unchanged.
    fn refresh_diagnostics(&self, env: &VirtualEnv) {
        let mut diagnostics = self.toolchain.diagnose(env);
        {
            let linked = self.linked.lock();
            if linked.env == *env {
                diagnostics.extend(linked.diagnostics.iter().cloned());
            }
        }
        self.diagnostics.write().replace_compile_errors(diagnostics);
    }

    #[instrument(skip(self))]
    async fn rebuild(self: &Arc<Self>) -> RebuildReport {
        let (ticket, pen) = {
            let mut doc = self.document.lock();
            let name = doc.pen.name.clone();
            (doc.session.next_build(&name), doc.pen.clone())
        };
        let version = ticket.version;
        debug!(version, hostname = %ticket.hostname, "Rebuild started");

        let output = self.toolchain.compile(&ticket.env).await;
        let mut diagnostics = output.diagnostics.clone();
        let mut link_diagnostics = Vec::new();

        let bundle = match self.toolchain.link(output, &ticket.hostname).await {
            Ok(bundle) => Some(Arc::new(bundle)),
            Err(LinkError::NothingToLink { .. }) => None,
            Err(e) => {
                link_diagnostics.push(Diagnostic::error(e.to_string()));
                None
            }
        };
        diagnostics.extend(link_diagnostics.iter().cloned());
        let error_count = diagnostics.iter().filter(|d| d.is_error()).count();

        {
            let mut committed = self.committed.lock();
            if version < *committed {
                debug!(version, committed = *committed, "Discarding stale rebuild");
                return RebuildReport {
                    version,
                    hostname: ticket.hostname,
                    bundle: None,
                    error_count,
                    stale: true,
                };
            }
            *committed = version;

            *self.linked.lock() = LinkOutcome {
                env: ticket.env,
                diagnostics: link_diagnostics,
            };
            self.diagnostics.write().replace_compile_errors(diagnostics);
            if let Some(bundle) = &bundle {
                self.bundle.send_replace(Some(Arc::clone(bundle)));
            }
        }

        match &bundle {
            Some(_) => info!(version, hostname = %ticket.hostname, "Bundle replaced"),
            None => info!(version, error_count, "Build failed, keeping previous bundle"),
        }

        self.persist_pen(&pen);
        if bundle.is_some() {
            self.upload();
        }

        RebuildReport {
            version,
            hostname: ticket.hostname,
            bundle,
            error_count,
            stale: false,
        }
    }

    fn persist_pen(&self, pen: &Pen) {
        if !self.config.allow_storage {
            return;
        }
        if let Err(e) = pen_codec::store(self.storage.as_ref(), pen) {
            warn!(error = %e, "Failed to persist pen");
        }
    }

    fn upload(&self) -> Option<JoinHandle<()>> {
        let settings = self.settings.borrow().clone();
        if !settings.use_remote_runtime {
            return None;
        }
        let bundle = self.bundle.borrow().clone()?;
        let Some(store) = self.bundle_store.clone() else {
            debug!("Remote runtime enabled but no bundle store configured");
            return None;
        };
        let origin = match Url::parse(&settings.remote_runtime_origin) {
            Ok(origin) => origin,
            Err(e) => {
                warn!(origin = %settings.remote_runtime_origin, error = %e, "Invalid remote runtime origin");
                return None;
            }
        };

        Some(tokio::spawn(async move {
            match store.upload(&origin, &bundle).await {
                Ok(ack) => info!(id = %ack.id, origin = %origin, "Bundle published"),
                Err(e) => warn!(hostname = %bundle.hostname(), error = %e, "Bundle upload failed"),
            }
        }))
    }
}

async fn drain_runtime_errors(inner: Weak<Inner>, mut errors: mpsc::UnboundedReceiver<PreviewError>) {
    while let Some(error) = errors.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        debug!(message = %error.message, "Runtime error reported");
        inner.diagnostics.write().push_preview_error(error);
    }
}
