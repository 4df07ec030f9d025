//! Journal Vault - Auto-Save
//!
//! Periodic background checkpoints while a vault is unlocked, and the
//! graceful-shutdown path that saves and locks the vault before exit.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::engine::StorageEngine;
use crate::error::{VaultError, VaultResult};
use crate::session::VaultSession;

/// Background checkpoint timer for one session
pub struct AutoSaver {
    stop: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl AutoSaver {
    /// Start checkpointing `session` every `period`, first tick one full
    /// period from now. Must be called inside a tokio runtime.
    pub fn spawn<E: StorageEngine>(session: Arc<VaultSession<E>>, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let stop = Arc::new(Notify::new());
        let stop_signal = Arc::clone(&stop);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_signal.notified() => break,
                    _ = ticker.tick() => {
                        let target = Arc::clone(&session);
                        match tokio::task::spawn_blocking(move || target.checkpoint()).await {
                            Ok(Ok(())) => {
                                tracing::debug!(vault = session.name(), "auto-save checkpoint");
                            }
                            Ok(Err(VaultError::Locked)) => {
                                tracing::debug!(vault = session.name(), "session locked, auto-save stopping");
                                break;
                            }
                            Ok(Err(e)) => {
                                tracing::warn!(vault = session.name(), error = %e, "auto-save checkpoint failed");
                            }
                            Err(e) => {
                                tracing::warn!(vault = session.name(), error = %e, "auto-save task panicked");
                            }
                        }
                    }
                }
            }
        });

        Self { stop, handle }
    }

    /// Stop the timer, waiting for an in-flight checkpoint to finish.
    pub async fn stop(self) {
        self.stop.notify_one();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "auto-save task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Auto-save `session` until `shutdown` resolves, then close it.
///
/// Returns the result of the final close, so a failed last checkpoint is
/// reported to the caller.
pub async fn run_until_shutdown<E, F>(
    session: Arc<VaultSession<E>>,
    period: Duration,
    shutdown: F,
) -> VaultResult<()>
where
    E: StorageEngine,
    F: Future<Output = ()>,
{
    let saver = AutoSaver::spawn(Arc::clone(&session), period);

    shutdown.await;
    tracing::info!(vault = session.name(), "shutdown requested, locking vault");

    saver.stop().await;
    tokio::task::spawn_blocking(move || session.close())
        .await
        .map_err(|e| VaultError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => log_signal_error(res),
                    _ = term.recv() => tracing::info!("received SIGTERM"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C only");
                log_signal_error(tokio::signal::ctrl_c().await);
            }
        }
    }

    #[cfg(not(unix))]
    log_signal_error(tokio::signal::ctrl_c().await);
}

fn log_signal_error(res: io::Result<()>) {
    match res {
        Ok(()) => tracing::info!("received Ctrl-C"),
        Err(e) => tracing::warn!(error = %e, "Ctrl-C handler failed, shutting down"),
    }
}
