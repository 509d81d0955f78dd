//! The preview executor.
//!
//! [`Preview`] owns at most one sandbox session and keeps it bound to the
//! current bundle:
//!
//! ```text
//!            first bundle          load ok
//!   Idle ─────────────────▶ Loading ───────▶ Ready
//!                              │               │  ▲
//!                     load err │   new bundle  │  │ load ok
//!                              ▼   or reset()  ▼  │
//!                            Error ◀──────── Reloading
//!                              │   load err    ▲
//!                              └───────────────┘
//!                                 new bundle
//! ```
//!
//! The previous session is always told to quit before the next one is
//! spawned, and only a `Ready` session is ever rendered. While following a
//! controller, a newer bundle never waits for an older load to finish.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use playpen_common::{Hostname, PreviewError, Settings};
use playpen_core::{Bundle, ErrorSink, SandboxClient, SandboxFactory, SandboxOptions};

/// Lifecycle state of the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewState {
    /// No bundle assigned yet.
    Idle,
    /// First bundle is loading.
    Loading,
    /// A session is running the current bundle.
    Ready,
    /// A replacement bundle is loading.
    Reloading,
    /// The last load failed; inert until a new bundle arrives.
    Error,
}

/// Color scheme the surface is rendered with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    /// Light background.
    #[default]
    Light,
    /// Dark background.
    Dark,
}

impl ColorScheme {
    fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

/// What the host page should display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PreviewView {
    /// Placeholder shown while nothing is ready.
    Loading,
    /// The embedding surface of a ready session.
    Surface {
        /// Bundle the session runs.
        hostname: Hostname,
        /// Color scheme to render with.
        color_scheme: ColorScheme,
        /// Program output so far.
        output: String,
        /// Guest log lines.
        console: Vec<String>,
        /// The program has stopped.
        finished: bool,
        /// Fuel spent by the finished program.
        #[serde(skip_serializing_if = "Option::is_none")]
        fuel_consumed: Option<u64>,
        /// Wall time of the finished program in milliseconds.
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
}

impl PreviewView {
    /// Returns `true` for the loading placeholder.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Render as a standalone HTML document.
    pub fn to_html(&self) -> String {
        let mut html = String::from("<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>playpen preview</title></head>\n");
        match self {
            Self::Loading => {
                html.push_str(
                    "<body class=\"preview-loading\" aria-busy=\"true\">\n<p>Loading preview\u{2026}</p>\n",
                );
            }
            Self::Surface {
                hostname,
                color_scheme,
                output,
                console,
                finished,
                fuel_consumed,
                duration_ms,
            } => {
                let _ = write!(
                    html,
                    "<body class=\"preview {scheme}\" data-hostname=\"{host}\" data-finished=\"{finished}\"",
                    scheme = color_scheme.as_str(),
                    host = escape_html(hostname.as_str()),
                );
                if let Some(fuel) = fuel_consumed {
                    let _ = write!(html, " data-fuel=\"{fuel}\"");
                }
                if let Some(ms) = duration_ms {
                    let _ = write!(html, " data-duration-ms=\"{ms}\"");
                }
                let _ = write!(
                    html,
                    " style=\"color-scheme: {scheme}\">\n<pre>{out}</pre>\n",
                    scheme = color_scheme.as_str(),
                    out = escape_html(output),
                );
                if !console.is_empty() {
                    html.push_str("<pre class=\"console\">");
                    for line in console {
                        html.push_str(&escape_html(line));
                        html.push('\n');
                    }
                    html.push_str("</pre>\n");
                }
            }
        }
        html.push_str("</body>\n</html>\n");
        html
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

struct Session {
    state: PreviewState,
    bundle: Option<Arc<Bundle>>,
    client: Option<Arc<dyn SandboxClient>>,
}

struct PreviewInner {
    factory: Arc<dyn SandboxFactory>,
    errors: ErrorSink,
    session: Mutex<Session>,
    generation: AtomicU64,
    options: Mutex<SandboxOptions>,
    color_scheme: Mutex<ColorScheme>,
}

impl Drop for PreviewInner {
    fn drop(&mut self) {
        if let Some(client) = self.session.get_mut().client.take() {
            client.quit();
        }
    }
}

/// Handle to the preview executor. Clones share the same session.
#[derive(Clone)]
pub struct Preview {
    inner: Arc<PreviewInner>,
}

impl Preview {
    /// Create an idle preview reporting runtime errors to `errors`.
    pub fn new(factory: Arc<dyn SandboxFactory>, errors: ErrorSink) -> Self {
        Self {
            inner: Arc::new(PreviewInner {
                factory,
                errors,
                session: Mutex::new(Session {
                    state: PreviewState::Idle,
                    bundle: None,
                    client: None,
                }),
                generation: AtomicU64::new(0),
                options: Mutex::new(SandboxOptions::default()),
                color_scheme: Mutex::new(ColorScheme::default()),
            }),
        }
    }

    /// Bind the preview to `bundle`.
    ///
    /// The previous session is quit before the new one is spawned. Load
    /// failures are logged and leave the preview in [`PreviewState::Error`].
    #[instrument(skip_all, fields(hostname = %bundle.hostname()))]
    pub async fn on_bundle_change(&self, bundle: Arc<Bundle>) -> PreviewState {
        let (generation, client) = self.begin_load(&bundle);
        self.finish_load(generation, client, bundle).await
    }

    /// Quit the previous session and spawn the next one bound to `bundle`.
    fn begin_load(&self, bundle: &Arc<Bundle>) -> (u64, Arc<dyn SandboxClient>) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let options = *self.inner.options.lock();

        let client = {
            let mut session = self.inner.session.lock();
            if let Some(previous) = session.client.take() {
                previous.quit();
            }
            session.state = match session.state {
                PreviewState::Idle | PreviewState::Loading => PreviewState::Loading,
                PreviewState::Ready | PreviewState::Reloading | PreviewState::Error => {
                    PreviewState::Reloading
                }
            };
            session.bundle = Some(Arc::clone(bundle));

            let client: Arc<dyn SandboxClient> =
                Arc::from(self.inner.factory.spawn(options, self.inner.errors.clone()));
            session.client = Some(Arc::clone(&client));
            debug!(state = ?session.state, "Preview session spawned");
            client
        };
        (generation, client)
    }

    /// Wait for `client` to load and settle the state, unless superseded.
    async fn finish_load(
        &self,
        generation: u64,
        client: Arc<dyn SandboxClient>,
        bundle: Arc<Bundle>,
    ) -> PreviewState {
        let result = client.load_bundle(bundle).await;

        let mut session = self.inner.session.lock();
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            debug!("Load superseded by a newer bundle");
            return session.state;
        }

        session.state = match result {
            Ok(()) => {
                info!("Preview ready");
                PreviewState::Ready
            }
            Err(e) => {
                warn!(error = %e, "Preview load failed");
                PreviewState::Error
            }
        };
        session.state
    }

    /// What to display right now.
    pub fn render(&self) -> PreviewView {
        let session = self.inner.session.lock();
        let (PreviewState::Ready, Some(bundle), Some(client)) =
            (session.state, &session.bundle, &session.client)
        else {
            return PreviewView::Loading;
        };

        let frame = client.frame();
        if frame.hostname.as_ref() != Some(bundle.hostname()) {
            return PreviewView::Loading;
        }

        PreviewView::Surface {
            hostname: bundle.hostname().clone(),
            color_scheme: *self.inner.color_scheme.lock(),
            output: frame.output,
            console: frame.console,
            finished: frame.finished,
            fuel_consumed: frame.fuel_consumed,
            duration_ms: frame.duration_ms,
        }
    }

    /// Report a runtime error raised by the host page.
    pub fn on_runtime_error(&self, error: PreviewError) {
        if self.inner.errors.send(error).is_err() {
            warn!("Runtime error dropped: controller is gone");
        }
    }

    /// Reload the current bundle in a fresh session without rebuilding.
    ///
    /// Returns `None` when there is no bundle to reload.
    pub async fn reset(&self) -> Option<PreviewState> {
        let bundle = self.inner.session.lock().bundle.clone()?;
        debug!(hostname = %bundle.hostname(), "Preview reset");
        Some(self.on_bundle_change(Arc::new(bundle.shallow_copy())).await)
    }

    /// Quit the active session and return to [`PreviewState::Idle`].
    pub fn unmount(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let mut session = self.inner.session.lock();
        if let Some(client) = session.client.take() {
            client.quit();
        }
        session.bundle = None;
        session.state = PreviewState::Idle;
    }

    /// Follow bundle and settings changes until either channel closes.
    ///
    /// Sessions are only run while `use_local_runtime` is set; guest logs are
    /// forwarded when `runtime_debug_logging` is set. Loads complete in the
    /// background so the next change is picked up while one is in flight.
    pub async fn run(
        &self,
        mut bundles: watch::Receiver<Option<Arc<Bundle>>>,
        mut settings: watch::Receiver<Settings>,
    ) {
        let mut local = self.apply_settings(&settings.borrow_and_update());

        if local {
            let current = bundles.borrow_and_update().clone();
            if let Some(bundle) = current {
                self.follow(bundle);
            }
        }

        loop {
            tokio::select! {
                changed = bundles.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = bundles.borrow_and_update().clone();
                    if let (true, Some(bundle)) = (local, current) {
                        self.follow(bundle);
                    }
                }
                changed = settings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let was_local = local;
                    local = self.apply_settings(&settings.borrow_and_update());

                    if was_local && !local {
                        info!("Local runtime disabled");
                        self.unmount();
                    } else if !was_local && local {
                        let current = bundles.borrow().clone();
                        if let Some(bundle) = current {
                            self.follow(bundle);
                        }
                    }
                }
            }
        }

        debug!("Preview loop stopped");
        self.unmount();
    }

    /// Rebind to `bundle` now and let the load finish on its own task.
    fn follow(&self, bundle: Arc<Bundle>) {
        let (generation, client) = self.begin_load(&bundle);
        let preview = self.clone();
        tokio::spawn(async move { preview.finish_load(generation, client, bundle).await });
    }

    fn apply_settings(&self, settings: &Settings) -> bool {
        self.inner.options.lock().debug_logging = settings.runtime_debug_logging;
        settings.use_local_runtime
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PreviewState {
        self.inner.session.lock().state
    }

    /// The bundle the preview is bound to.
    pub fn bundle(&self) -> Option<Arc<Bundle>> {
        self.inner.session.lock().bundle.clone()
    }

    /// Change the color scheme used by [`Preview::render`].
    pub fn set_color_scheme(&self, scheme: ColorScheme) {
        *self.inner.color_scheme.lock() = scheme;
    }

    /// Current color scheme.
    pub fn color_scheme(&self) -> ColorScheme {
        *self.inner.color_scheme.lock()
    }
}

impl std::fmt::Debug for Preview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preview")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
