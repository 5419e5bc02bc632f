//! # rowcast-cluster - Leadership coordination for the rowcast CDC daemon
//!
//! Guarantees that, across a fleet of redundant daemon instances sharing
//! one logical CDC identity, exactly one instance consumes the replication
//! stream at any time, with automatic fail-over and safe restart.
//!
//! ```text
//! ┌──────────────────────┐   grants    ┌────────────────────────┐
//! │ ElectionClient       │ ──────────▶ │ LeadershipCoordinator  │
//! │ (coordination svc /  │   conn      │  run engine while      │
//! │  in-process)         │   events    │  leading; reset on     │
//! └──────────────────────┘ ──────────▶ │  connection loss       │
//!                                      └───────────┬────────────┘
//!                                                  │ run()/terminate()
//!                                      ┌───────────▼────────────┐
//!                                      │ ReplicationEngine      │
//!                                      │ (external collaborator)│
//!                                      └────────────────────────┘
//! ```
//!
//! The hard correctness requirement: a participant that loses connectivity
//! to the coordination service stops its engine, discards it, rebuilds a
//! fresh one and forfeits leadership immediately, so two instances can
//! never both act as leader beyond the service's own fail-over detection
//! window.

mod bootstrap;
mod config;
mod coordinator;
mod election;
mod engine;
mod error;

pub use bootstrap::{
    startup_exit_code, wait_for_leadership, wait_for_shutdown_signal, LEADER_POLL_INTERVAL,
};
pub use config::{CoordinationConfig, RetryConfig, DEFAULT_CLIENT_ID, DEFAULT_CLUSTER_ROOT};
pub use coordinator::{CoordinatorState, LeadershipCoordinator};
pub use election::{ConnectionState, ElectionClient, InProcessElection, LeadershipGrant};
pub use engine::{EngineFactory, ReplicationEngine};
pub use error::{ClusterError, Result};
