//! Leadership coordinator
//!
//! Guarantees that the wrapped replication engine runs on at most one
//! participant of the logical cluster at any instant. Becoming leader is a
//! blocking affair: the grant task runs the engine for the whole term, so
//! "holding leadership" and "the engine being active" stay synchronized by
//! construction. Losing coordination-service connectivity is handled
//! asynchronously while that term is still in flight: the engine is
//! terminated, discarded and rebuilt from scratch, and leadership is
//! forfeited before the participant may lead again.

use crate::config::CoordinationConfig;
use crate::election::{ConnectionState, ElectionClient, LeadershipGrant};
use crate::engine::{EngineFactory, ReplicationEngine};
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Coordinator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Enrolled, waiting for a leadership grant
    Candidate,
    /// Grant received, engine not yet running
    BecomingLeader,
    /// Engine active; this participant is the acting leader
    Leader,
    /// Shut down; no further grants are acted on
    Stopped,
}

struct Shared {
    candidate_id: String,
    client: Arc<dyn ElectionClient>,
    factory: Arc<dyn EngineFactory>,
    /// Exclusive engine slot: replaced wholesale on reset, never mutated
    /// in place. The lock is the handoff point between the run path and
    /// the reset path; terminate wins over run.
    engine: Mutex<Arc<dyn ReplicationEngine>>,
    state: RwLock<CoordinatorState>,
}

impl Shared {
    /// Run one leadership term: blocks until the engine stops or fails.
    async fn lead(&self, grant: LeadershipGrant) {
        {
            let mut state = self.state.write().await;
            if *state == CoordinatorState::Stopped {
                grant.complete();
                return;
            }
            *state = CoordinatorState::BecomingLeader;
        }
        info!(candidate = %self.candidate_id, "leadership acquired");

        let engine = self.engine.lock().await.clone();
        *self.state.write().await = CoordinatorState::Leader;

        match engine.run().await {
            Ok(()) => {
                info!(candidate = %self.candidate_id, "engine stopped, relinquishing leadership")
            }
            Err(e) => {
                // a failed engine ends the term, never the process
                warn!(candidate = %self.candidate_id, error = %e, "engine failed, relinquishing leadership")
            }
        }

        {
            let mut state = self.state.write().await;
            if *state != CoordinatorState::Stopped {
                *state = CoordinatorState::Candidate;
            }
        }
        grant.complete();
    }

    async fn handle_connection_state(&self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => info!("coordination service connected"),
            ConnectionState::Suspended => {
                warn!("coordination service suspended; leadership ambiguous")
            }
            ConnectionState::Reconnected => info!("coordination service reconnected"),
            ConnectionState::ReadOnly => info!("coordination service read-only"),
            ConnectionState::Lost => {
                warn!(
                    candidate = %self.candidate_id,
                    "coordination service connection lost; forfeiting leadership"
                );
                self.reset_engine().await;
                if let Err(e) = self.client.resign(&self.candidate_id).await {
                    warn!(error = %e, "resign after connection loss failed");
                }
            }
        }
    }

    /// Tear down and rebuild the engine after a hard connectivity loss.
    ///
    /// Failures are absorbed: this coordinator is the only thing able to
    /// re-enter the election queue, so a reset must never take it down.
    async fn reset_engine(&self) {
        {
            let mut slot = self.engine.lock().await;
            slot.terminate();
            match self.factory.build() {
                Ok(engine) => *slot = engine,
                Err(e) => {
                    warn!(error = %e, "engine rebuild failed; keeping terminated engine")
                }
            }
        }
        let mut state = self.state.write().await;
        if *state != CoordinatorState::Stopped {
            *state = CoordinatorState::Candidate;
        }
        info!(candidate = %self.candidate_id, "engine rebuilt after connection loss");
    }
}

/// Participates in the cluster's leader election and runs the replication
/// engine exactly while holding leadership.
pub struct LeadershipCoordinator {
    config: CoordinationConfig,
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LeadershipCoordinator {
    /// Create a coordinator bound to one engine lineage.
    ///
    /// Validates the configuration and builds the initial engine; both
    /// failure classes are startup errors.
    pub fn new(
        config: CoordinationConfig,
        client: Arc<dyn ElectionClient>,
        factory: Arc<dyn EngineFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = factory.build()?;
        let candidate_id = config.candidate_id();
        Ok(Self {
            config,
            shared: Arc::new(Shared {
                candidate_id,
                client,
                factory,
                engine: Mutex::new(engine),
                state: RwLock::new(CoordinatorState::Candidate),
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Register as a leadership candidate and return immediately.
    ///
    /// Leadership acquisition happens asynchronously on the grant task;
    /// connectivity transitions are watched on their own task so a loss is
    /// acted on even while a term is in flight.
    pub async fn start(&self) -> Result<()> {
        let mut grants = self.shared.client.enroll(&self.shared.candidate_id).await?;
        let mut events = self.shared.client.connection_events();
        info!(
            candidate = %self.shared.candidate_id,
            path = %self.config.election_path(),
            "registered for leader election"
        );

        let shared = self.shared.clone();
        let grant_task = tokio::spawn(async move {
            while let Some(grant) = grants.recv().await {
                shared.lead(grant).await;
            }
            debug!("grant channel closed");
        });

        let shared = self.shared.clone();
        let watch_task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(state) => shared.handle_connection_state(state).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "connection events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(grant_task);
        tasks.push(watch_task);
        Ok(())
    }

    /// Current lifecycle state; cheap enough for the bootstrap poll loop.
    pub async fn state(&self) -> CoordinatorState {
        *self.shared.state.read().await
    }

    pub async fn is_leader(&self) -> bool {
        self.state().await == CoordinatorState::Leader
    }

    pub fn candidate_id(&self) -> &str {
        &self.shared.candidate_id
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    /// Shut down: engine first, then the coordination-service connection
    /// and election registration, then the background tasks.
    pub async fn stop(&self) {
        {
            let mut state = self.shared.state.write().await;
            if *state == CoordinatorState::Stopped {
                return;
            }
            *state = CoordinatorState::Stopped;
        }
        info!(candidate = %self.shared.candidate_id, "coordinator stopping");

        self.shared.engine.lock().await.terminate();
        if let Err(e) = self.shared.client.close().await {
            warn!(error = %e, "closing election client failed");
        }

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}
