//! Graceful shutdown coordination.
//!
//! Four sources can end a run: a local signal, a `Shutdown` frame from the
//! controller, the control stream ending, and the run itself finishing.
//! The coordinator fans these into one watch channel. A signal requests a
//! hard stop (drop in-flight work); everything else requests a graceful
//! stop (let the current step drain first). A hard stop may override an
//! in-progress graceful stop, never the other way around.

use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// How the runner should come down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopMode {
    /// No stop requested yet.
    Running,
    /// Await the in-flight step, flush, then exit.
    Graceful,
    /// Drop in-flight work and exit.
    Hard,
}

/// Waits for a shutdown signal (Ctrl-C or SIGTERM).
#[allow(clippy::expect_used)]
pub async fn shutdown_signal() {
    let ctrl_c = async {
        // If signal handlers cannot be installed the process cannot come
        // down cleanly at all, so panicking here is the right call.
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
    }
}

/// Fans shutdown requests out to every subscriber.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    notify: watch::Sender<StopMode>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator in the running state.
    #[must_use]
    pub fn new() -> Self {
        let (notify, _) = watch::channel(StopMode::Running);
        Self { notify }
    }

    /// Subscribes to stop-mode changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StopMode> {
        self.notify.subscribe()
    }

    /// Requests a stop. Repeated requests are no-ops unless they escalate
    /// from graceful to hard.
    pub fn request(&self, mode: StopMode) {
        self.notify.send_if_modified(|current| {
            if mode > *current {
                *current = mode;
                true
            } else {
                false
            }
        });
    }

    /// Current stop mode.
    #[must_use]
    pub fn mode(&self) -> StopMode {
        *self.notify.borrow()
    }

    /// True once any stop has been requested.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.mode() != StopMode::Running
    }

    /// Resolves once any stop has been requested.
    pub async fn stopped(&self) {
        let mut rx = self.subscribe();
        while *rx.borrow() == StopMode::Running {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Awaits Ctrl-C or SIGTERM, then requests a hard stop.
    pub async fn wait_for_signal(&self) {
        shutdown_signal().await;
        self.request(StopMode::Hard);
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
