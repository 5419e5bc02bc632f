//! Replication engine seam
//!
//! The engine owns the actual stream-consumption loop and is opaque to the
//! coordinator: all the coordinator needs is to run it for the duration of
//! a leadership term and to stop it from another task.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// The payload a leadership term runs.
#[async_trait]
pub trait ReplicationEngine: Send + Sync {
    /// Consume the replication stream until terminated.
    ///
    /// Blocks for the engine's entire active lifetime. Returning `Ok` means
    /// the engine was stopped; an error is a fatal engine failure. Either
    /// way the current leadership term ends.
    async fn run(&self) -> Result<()>;

    /// Signal the engine to stop.
    ///
    /// Idempotent, non-blocking, and safe to call from another task while
    /// `run` is in flight; it does not wait for the engine to drain.
    fn terminate(&self);
}

/// Builds a fresh engine from the original configuration.
///
/// Used on every hard reset so no residual engine state survives a
/// coordination-service connection loss.
pub trait EngineFactory: Send + Sync {
    fn build(&self) -> Result<Arc<dyn ReplicationEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Result<Arc<dyn ReplicationEngine>> + Send + Sync,
{
    fn build(&self) -> Result<Arc<dyn ReplicationEngine>> {
        self()
    }
}
