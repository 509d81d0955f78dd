//! Trailing-edge throttling.
//!
//! [`Throttle`] holds a pending timer and a "latest arguments" slot. The
//! first trigger in a quiet period arms a timer for one window; triggers that
//! arrive while it is armed only overwrite the slot. When the window elapses
//! the callback fires once with whatever the slot holds at that moment.
//!
//! ```text
//! trigger(a) ─┐  trigger(b)  trigger(c)
//!             ▼
//!             ├──────── window ────────┤ fire(c)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

type Callback<T> = Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Slot<T> {
    latest: Option<T>,
    pending: bool,
}

/// Coalesces bursts of triggers into one trailing call per window.
pub struct Throttle<T> {
    window: Duration,
    slot: Arc<Mutex<Slot<T>>>,
    callback: Callback<T>,
}

impl<T: Send + 'static> Throttle<T> {
    /// Create a throttle firing `callback` at most once per `window`.
    pub fn new<F, Fut>(window: Duration, callback: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            window,
            slot: Arc::new(Mutex::new(Slot {
                latest: None,
                pending: false,
            })),
            callback: Arc::new(move |args| Box::pin(callback(args))),
        }
    }

    /// Record `args` as the latest arguments, arming the timer if idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, args: T) {
        {
            let mut slot = self.slot.lock();
            slot.latest = Some(args);
            if slot.pending {
                trace!("Throttle armed, coalescing");
                return;
            }
            slot.pending = true;
        }

        let window = self.window;
        let slot = Arc::clone(&self.slot);
        let callback = Arc::clone(&self.callback);

        tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let latest = {
                let mut slot = slot.lock();
                slot.pending = false;
                slot.latest.take()
            };

            if let Some(args) = latest {
                trace!("Throttle fired");
                callback(args).await;
            }
        });
    }

    /// Returns `true` while a trailing call is scheduled.
    pub fn is_pending(&self) -> bool {
        self.slot.lock().pending
    }

    /// The coalescing window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl<T> std::fmt::Debug for Throttle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
