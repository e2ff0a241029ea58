// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process signals to a [`CancellationToken`].
//!
//! The returned token is the root that `serve` hands down to ingress, the
//! scheduler and every worker pool; cancelling it starts the drain.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cancels the returned token on SIGINT or SIGTERM.
///
/// Cancelling the token from elsewhere stops the listener task.
pub fn install_signal_handler() -> CancellationToken {
    let root = CancellationToken::new();
    let trigger = root.clone();

    tokio::spawn(async move {
        tokio::select! {
            signal = wait_for_signal() => {
                info!(signal, "draining workers and stopping ingress");
                trigger.cancel();
            }
            _ = trigger.cancelled() => debug!("signal listener released"),
        }
    });

    root
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "SIGTERM unavailable, only Ctrl+C stops waflow");
            return ctrl_c().await;
        }
    };
    tokio::select! {
        name = ctrl_c() => name,
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
