//! Flight cancellation token.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Hook run once when a token is cancelled.
pub type CancelCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Listeners {
    reason: Option<String>,
    hooks: Vec<CancelCallback>,
}

/// Signals a running flight that it must stop.
///
/// A token is cancelled at most once; later calls to `cancel` are ignored and
/// the first reason is kept. Retry back-off and provisioning polls wait on
/// `cancelled()` next to their timer.
#[derive(Default)]
pub struct CancellationToken {
    fired: AtomicBool,
    listeners: Mutex<Listeners>,
    notify: Notify,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is cancelled whenever `parent` is.
    ///
    /// Cancelling the child leaves the parent alone.
    #[must_use]
    pub fn child_of(parent: &Self) -> Arc<Self> {
        let child = Arc::new(Self::new());
        let weak: Weak<Self> = Arc::downgrade(&child);
        parent.on_cancel(move || {
            if let Some(child) = weak.upgrade() {
                child.cancel("parent cancelled");
            }
        });
        child
    }

    /// Cancels the token, wakes every waiter and runs the hooks.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }

        let reason = reason.into();
        debug!(reason = %reason, "Cancellation requested");
        let hooks = {
            let mut listeners = self.listeners.lock();
            listeners.reason = Some(reason);
            std::mem::take(&mut listeners.hooks)
        };
        self.notify.notify_waiters();
        for hook in &hooks {
            run_hook(hook.as_ref());
        }
    }

    /// Runs `hook` on cancellation, or right away if already cancelled.
    ///
    /// A panicking hook is logged and does not stop the others.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        {
            let mut listeners = self.listeners.lock();
            if !self.is_cancelled() {
                listeners.hooks.push(Box::new(hook));
                return;
            }
        }
        run_hook(&hook);
    }

    /// Whether the token was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// The reason given to the first `cancel` call.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.listeners.lock().reason.clone()
    }

    /// Completes once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

fn run_hook(hook: &(dyn Fn() + Send + Sync)) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(hook)) {
        warn!(?panic, "Cancellation hook panicked");
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish_non_exhaustive()
    }
}
