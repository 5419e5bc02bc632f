//! Daemon bootstrap helpers
//!
//! The entrypoint that wires a concrete engine and election client is a
//! deployment concern; the pieces it composes live here: the coarse
//! leader wait loop, the shutdown-signal future and the startup exit
//! policy.

use crate::coordinator::{CoordinatorState, LeadershipCoordinator};
use crate::error::ClusterError;
use std::time::Duration;
use tracing::error;

/// Interval the bootstrap loop polls the leader flag on. Leadership
/// acquisition is not latency-sensitive at startup, so a sleep loop is
/// preferred over a condition variable.
pub const LEADER_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Block until the coordinator becomes leader (or is stopped).
pub async fn wait_for_leadership(coordinator: &LeadershipCoordinator) {
    loop {
        match coordinator.state().await {
            CoordinatorState::Leader | CoordinatorState::Stopped => return,
            _ => tokio::time::sleep(LEADER_POLL_INTERVAL).await,
        }
    }
}

/// Log a startup failure and return the process exit code.
///
/// Configuration, connection-string and storage problems get one concise
/// line the operator can act on; anything else gets full diagnostic
/// detail. Either way the daemon exits non-zero.
pub fn startup_exit_code(err: &ClusterError) -> i32 {
    if err.is_fatal_at_startup() {
        error!("{err}");
    } else {
        error!(error = ?err, "startup failed");
    }
    1
}

/// Wait for shutdown signals (Ctrl+C or SIGTERM).
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
