//! Shutdown coordination
//!
//! Runs the shutdown sequence exactly once per instance:
//!
//! ```text
//! guard → arm timeout → freeze state → drain beacons → run handlers → close transport → arm exit watchdog
//! ```
//!
//! The global timeout races every phase. Handlers are never cancelled; when
//! the timeout fires the terminator ends the process underneath them.
//!
//! The timeout is never disarmed, but it only forces an exit while the
//! sequence is still running. Once the transport has been closed it stays
//! quiet even if it lands before the exit watchdog; from that point only the
//! watchdog can force termination.

use crate::config::ShutdownTimeout;
use crate::lifecycle::beacon::BeaconRegistry;
use crate::lifecycle::state::ServiceState;
use crate::lifecycle::terminator::{Terminator, FORCED_EXIT_CODE};
use crate::server::metrics::SharedMetrics;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Delay before forcing exit once the sequence has finished cleanly
pub const EXIT_WATCHDOG_DELAY: Duration = Duration::from_secs(1);

/// A registered cleanup callback
pub type ShutdownHandler = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// The listening transport closed at the end of the sequence
#[async_trait]
pub trait Transport: Send + Sync {
    async fn close(&self) -> std::io::Result<()>;
}

struct Inner {
    state: ServiceState,
    beacons: BeaconRegistry,
    timeout: ShutdownTimeout,
    terminator: Arc<dyn Terminator>,
    metrics: SharedMetrics,
    handlers: Mutex<Vec<ShutdownHandler>>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    started: AtomicBool,
    forced: AtomicBool,
    closed: watch::Sender<bool>,
}

/// Coordinator for graceful shutdown
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ShutdownCoordinator {
    pub fn new(
        state: ServiceState,
        beacons: BeaconRegistry,
        timeout: ShutdownTimeout,
        terminator: Arc<dyn Terminator>,
        metrics: SharedMetrics,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state,
                beacons,
                timeout,
                terminator,
                metrics,
                handlers: Mutex::new(Vec::new()),
                transport: Mutex::new(None),
                started: AtomicBool::new(false),
                forced: AtomicBool::new(false),
                closed,
            }),
        }
    }

    /// Attach the transport to close in the final phase
    pub fn set_transport(&self, transport: Arc<dyn Transport>) {
        *lock(&self.inner.transport) = Some(transport);
    }

    /// Append a shutdown handler.
    ///
    /// Handlers run in registration order. A handler registered once the
    /// handler phase has begun is accepted but never run.
    pub fn register_shutdown_handler<F, Fut>(&self, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.inner.state.is_shutting_down() {
            warn!("shutdown handler registered after shutdown started; it may not run");
        }
        lock(&self.inner.handlers).push(Box::new(move || handler().boxed()));
    }

    /// Whether `shutdown()` has been invoked
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Whether a shutdown timer has requested forced termination
    pub fn is_forced(&self) -> bool {
        self.inner.forced.load(Ordering::SeqCst)
    }

    /// Wait until the sequence has closed the transport
    pub async fn wait_closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Run the shutdown sequence.
    ///
    /// Idempotent: a second call logs and returns immediately. Never fails;
    /// every problem is logged, and the process either finishes the sequence
    /// or is force-terminated by a timer.
    pub async fn shutdown(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("server is already shutting down");
            return;
        }

        info!("received request to shutdown the service");

        if let Some(timeout) = self.inner.timeout.duration() {
            self.arm_timeout(timeout);
        }

        self.inner.state.freeze();

        if !self.inner.beacons.is_empty() {
            self.inner.beacons.wait_until_empty().await;
        }

        self.run_handlers().await;
        if self.is_forced() {
            return;
        }

        debug!("all shutdown handlers have run to completion; proceeding to close the server");

        self.close_transport().await;
        self.arm_exit_watchdog();
        self.inner.closed.send_replace(true);
    }

    fn arm_timeout(&self, timeout: Duration) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if *inner.closed.borrow() {
                return;
            }
            warn!(
                timeout = ?timeout,
                "timeout occurred before all the shutdown handlers could run to completion; forcing termination"
            );
            inner.forced.store(true, Ordering::SeqCst);
            inner.metrics.record_forced_exit();
            inner.terminator.terminate(FORCED_EXIT_CODE);
        });
    }

    async fn run_handlers(&self) {
        // Snapshot: handlers registered from here on are not discovered
        let handlers = std::mem::take(&mut *lock(&self.inner.handlers));
        let total = handlers.len();

        for (index, handler) in handlers.into_iter().enumerate() {
            if self.is_forced() {
                return;
            }

            // Spawned so a panicking handler is reported like an error
            match tokio::spawn(async move { handler().await }).await {
                Ok(Ok(())) => {
                    debug!(handler = index, total = total, "shutdown handler completed");
                }
                Ok(Err(e)) => {
                    error!(handler = index, error = ?e, "shutdown handler produced an error");
                    self.inner.metrics.record_handler_failure();
                }
                Err(e) => {
                    error!(handler = index, error = %e, "shutdown handler panicked");
                    self.inner.metrics.record_handler_failure();
                }
            }
        }
    }

    async fn close_transport(&self) {
        let transport = lock(&self.inner.transport).take();
        let Some(transport) = transport else {
            return;
        };
        if let Err(e) = transport.close().await {
            error!(error = %e, "server was terminated with an error");
        }
    }

    /// Force exit if the process is still alive shortly after a clean close.
    ///
    /// Runs on a detached OS thread: it never keeps the process alive and it
    /// still fires if the async runtime itself is wedged.
    fn arm_exit_watchdog(&self) {
        let inner = self.inner.clone();
        let spawned = std::thread::Builder::new()
            .name("lightship-exit-watchdog".to_string())
            .spawn(move || {
                std::thread::sleep(EXIT_WATCHDOG_DELAY);
                warn!("process did not exit on its own; investigate what is keeping it alive");
                inner.forced.store(true, Ordering::SeqCst);
                inner.metrics.record_forced_exit();
                inner.terminator.terminate(FORCED_EXIT_CODE);
            });
        if let Err(e) = spawned {
            error!(error = %e, "Failed to arm exit watchdog");
        }
    }
}
