//! # OS signal handling.
//!
//! Pools accept an external shutdown [`CancellationToken`]; [`cancel_on_signal`]
//! wires process termination signals to such a token.
//!
//! ## Signals
//! **Unix platforms:** `SIGINT`, `SIGTERM`, `SIGQUIT`.
//!
//! **Other platforms:** `Ctrl-C` via [`tokio::signal::ctrl_c`].
//!
//! ## Example
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use verivisor::{PoolConfig, QueuePool, shutdown};
//!
//! # async fn demo() {
//! let token = CancellationToken::new();
//! let _watch = shutdown::cancel_on_signal(token.clone());
//! let pool = QueuePool::new(PoolConfig::default()).with_shutdown(token);
//! # }
//! ```

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Waits for a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancels `token` on the first termination signal.
///
/// The watcher also ends, without cancelling, once `token` is cancelled by
/// someone else.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = wait_for_shutdown_signal() => match res {
                Ok(()) => {
                    info!("termination signal received; shutting down");
                    token.cancel();
                }
                Err(e) => warn!(error = %e, "signal handlers unavailable"),
            },
            _ = token.cancelled() => {}
        }
    })
}
