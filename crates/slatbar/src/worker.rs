//! Worker lifecycle: named threads, shutdown, and the timed-poll loop.
//!
//! Every widget runs on its own worker thread for the process
//! lifetime. Both suspension points - the event-driven wait and the
//! poll sleep - observe the shared [`ShutdownToken`] so the process
//! can join every worker within a bounded grace period.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::errors::WidgetError;

struct TokenInner {
    triggered: Mutex<bool>,
    wake: Condvar,
}

/// Process-wide shutdown signal shared by all workers.
///
/// Cloning is cheap; all clones observe the same trigger. A blocked
/// [`ShutdownToken::wait_timeout`] wakes early when the token fires,
/// which is what makes the poll sleep interruptible.
#[derive(Clone)]
pub struct ShutdownToken {
    inner: Arc<TokenInner>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                triggered: Mutex::new(false),
                wake: Condvar::new(),
            }),
        }
    }

    /// Fire the signal. All current and future waits return promptly.
    pub fn trigger(&self) {
        let mut triggered = self.inner.triggered.lock();
        *triggered = true;
        self.inner.wake.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.triggered.lock()
    }

    /// Sleep for up to `timeout`, waking early on trigger.
    ///
    /// Returns true when shutdown has been requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut triggered = self.inner.triggered.lock();
        if *triggered {
            return true;
        }
        let _ = self.inner.wake.wait_for(&mut triggered, timeout);
        *triggered
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A running widget worker.
pub struct WorkerHandle {
    name: String,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join the worker thread. Called after the shutdown token fires.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("worker '{}' panicked", self.name);
        } else {
            debug!("worker '{}' joined", self.name);
        }
    }
}

/// Spawn a named worker thread.
pub fn spawn<F>(name: &str, f: F) -> std::io::Result<WorkerHandle>
where
    F: FnOnce() + Send + 'static,
{
    let thread = thread::Builder::new()
        .name(format!("{name}-worker"))
        .spawn(f)?;

    debug!("worker '{}' started", name);
    Ok(WorkerHandle {
        name: name.to_string(),
        thread,
    })
}

/// Run the timed-poll discipline until shutdown.
///
/// One fetch cycle, then an interruptible sleep of `interval`.
/// Failures are logged and the cadence is unchanged - no backoff, no
/// faster retry, and the worker never self-terminates on repeated
/// failures. Only a configuration error ends the loop early, since
/// there is nothing a later cycle could do differently.
pub fn run_polling<F>(name: &str, interval: Duration, shutdown: &ShutdownToken, mut cycle: F)
where
    F: FnMut() -> Result<(), WidgetError>,
{
    loop {
        match cycle() {
            Ok(()) => {}
            Err(err) if err.is_fatal_to_worker() => {
                error!("{}: {}, stopping this widget", name, err);
                return;
            }
            Err(err) => {
                warn!("{}: {}, skipping this cycle", name, err);
            }
        }

        if shutdown.wait_timeout(interval) {
            debug!("{}: shutdown requested, exiting poll loop", name);
            return;
        }
    }
}
