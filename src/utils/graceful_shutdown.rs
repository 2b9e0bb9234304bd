use std::sync::OnceLock;

use eyre::{Result, WrapErr};
use tokio::{
    signal,
    sync::{broadcast, mpsc},
};

/// Why the process is being asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGTERM or SIGINT
    Graceful,
    /// Requested in-process through [`GracefulShutdown::trigger_shutdown`]
    Requested,
}

/// Fans OS signals out to the rest of the process.
///
/// Shutdown signals are broadcast once; SIGHUP is forwarded as a reload
/// request on the channel returned by [`GracefulShutdown::reload_requests`].
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    /// Set once by the first trigger
    reason: OnceLock<ShutdownReason>,
    reload_tx: mpsc::Sender<()>,
    reload_rx: parking_lot::Mutex<Option<mpsc::Receiver<()>>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        let (reload_tx, reload_rx) = mpsc::channel(1);
        Self {
            shutdown_tx,
            reason: OnceLock::new(),
            reload_tx,
            reload_rx: parking_lot::Mutex::new(Some(reload_rx)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    /// Only the first call receives the channel.
    pub fn reload_requests(&self) -> Option<mpsc::Receiver<()>> {
        self.reload_rx.lock().take()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Returns false if shutdown was already under way.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) -> bool {
        if self.reason.set(reason).is_err() {
            tracing::warn!(?reason, "Shutdown already initiated, ignoring");
            return false;
        }
        tracing::info!(?reason, "Shutdown initiated");
        // No subscribers just means nothing is waiting yet
        let _ = self.shutdown_tx.send(reason);
        true
    }

    /// Listen for OS signals until a shutdown signal arrives.
    pub async fn run_signal_handler(&self) -> Result<()> {
        tracing::info!("Listening for SIGTERM, SIGINT (shutdown) and SIGHUP (reload)");

        let mut hangups = Hangups::register()?;
        let terminate = wait_for_sigterm()?;
        tokio::pin!(terminate);

        loop {
            tokio::select! {
                res = signal::ctrl_c() => {
                    res.wrap_err("Failed to listen for Ctrl+C")?;
                    tracing::info!("Received SIGINT, shutting down");
                    break;
                }
                _ = &mut terminate => {
                    tracing::info!("Received SIGTERM, shutting down");
                    break;
                }
                _ = hangups.recv() => {
                    tracing::info!("Received SIGHUP, requesting configuration reload");
                    let _ = self.reload_tx.try_send(());
                }
            }
        }

        self.trigger_shutdown(ShutdownReason::Graceful);
        Ok(())
    }

    /// Wait until shutdown is triggered and return the reason given by the
    /// first trigger. Returns immediately if it already was.
    pub async fn wait_for_shutdown_signal(&self) -> ShutdownReason {
        let mut receiver = self.subscribe();
        if let Some(reason) = self.reason.get() {
            return *reason;
        }
        match receiver.recv().await {
            Ok(reason) => reason,
            Err(e) => {
                tracing::warn!("Shutdown channel failed: {}", e);
                self.reason.get().copied().unwrap_or(ShutdownReason::Requested)
            }
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn wait_for_sigterm() -> Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("Failed to register SIGTERM handler")?;
    Ok(async move {
        sigterm.recv().await;
    })
}

#[cfg(not(unix))]
fn wait_for_sigterm() -> Result<impl std::future::Future<Output = ()>> {
    Ok(std::future::pending::<()>())
}

#[cfg(unix)]
struct Hangups(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Hangups {
    fn register() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        signal(SignalKind::hangup())
            .map(Self)
            .wrap_err("Failed to register SIGHUP handler")
    }

    async fn recv(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

#[cfg(not(unix))]
struct Hangups;

#[cfg(not(unix))]
impl Hangups {
    fn register() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}
