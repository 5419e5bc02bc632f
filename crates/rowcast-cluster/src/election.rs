//! Leader-election seam
//!
//! The coordinator does not inherit from an election framework; it holds an
//! [`ElectionClient`] and consumes two independent signal streams from it:
//! leadership grants and connection-state transitions. Relinquishing
//! leadership is an explicit call ([`ElectionClient::resign`]), not an
//! error thrown through the callback stack.
//!
//! [`InProcessElection`] is a real single-process implementation of the
//! seam: one leader at a time, FIFO candidate queue, automatic requeue when
//! a term completes. It backs the tests and single-participant
//! deployments; a coordination-service-backed client (ZooKeeper ensemble or
//! equivalent) implements the same trait out of tree.

use crate::error::{ClusterError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::debug;

/// Connectivity transitions of the coordination service, delivered
/// asynchronously with respect to any in-flight leadership term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Session established
    Connected,
    /// Connectivity interrupted; leadership status ambiguous but not yet
    /// revoked
    Suspended,
    /// Session lost; any held leadership must be forfeited immediately
    Lost,
    /// Session re-established after an interruption
    Reconnected,
    /// Connected to a read-only ensemble member
    ReadOnly,
}

/// One leadership term handed to a candidate.
///
/// The term ends when the grant is completed (or dropped); the election
/// client then re-enters the candidate into the queue automatically.
#[derive(Debug)]
pub struct LeadershipGrant {
    candidate_id: String,
    completed: Option<oneshot::Sender<()>>,
}

impl LeadershipGrant {
    fn new(candidate_id: &str) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                candidate_id: candidate_id.to_string(),
                completed: Some(tx),
            },
            rx,
        )
    }

    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    /// End this leadership term. Dropping the grant has the same effect.
    pub fn complete(mut self) {
        if let Some(tx) = self.completed.take() {
            let _ = tx.send(());
        }
    }
}

/// Client-side view of a distributed leader election.
#[async_trait]
pub trait ElectionClient: Send + Sync {
    /// Register as a leadership candidate.
    ///
    /// Non-blocking: returns immediately with the channel leadership grants
    /// arrive on. A candidate whose term ends is requeued automatically.
    async fn enroll(&self, candidate_id: &str) -> Result<mpsc::Receiver<LeadershipGrant>>;

    /// Subscribe to connection-state transitions.
    fn connection_events(&self) -> broadcast::Receiver<ConnectionState>;

    /// Forfeit any currently held leadership immediately and re-enter the
    /// candidate queue.
    async fn resign(&self, candidate_id: &str) -> Result<()>;

    /// Close the coordination-service connection and the election
    /// registration. No grants are issued afterwards.
    async fn close(&self) -> Result<()>;
}

#[derive(Default)]
struct ElectionState {
    candidates: HashMap<String, mpsc::Sender<LeadershipGrant>>,
    queue: VecDeque<String>,
    /// Currently granted (candidate, term). The term counter distinguishes
    /// a stale grant completion from the current one after a resign.
    leader: Option<(String, u64)>,
    next_term: u64,
    closed: bool,
}

/// Single-process election: one leader at a time, FIFO queue, auto-requeue.
pub struct InProcessElection {
    state: Arc<Mutex<ElectionState>>,
    conn_tx: broadcast::Sender<ConnectionState>,
}

impl InProcessElection {
    pub fn new() -> Self {
        let (conn_tx, _) = broadcast::channel(16);
        Self {
            state: Arc::new(Mutex::new(ElectionState::default())),
            conn_tx,
        }
    }

    /// Deliver a connection-state transition to all subscribers.
    ///
    /// In a service-backed client these come from the session watcher; here
    /// the harness (or test) drives them.
    pub fn emit_connection_state(&self, state: ConnectionState) {
        let _ = self.conn_tx.send(state);
    }

    /// The candidate currently holding a term, if any.
    pub async fn current_leader(&self) -> Option<String> {
        self.state.lock().await.leader.as_ref().map(|(id, _)| id.clone())
    }

    /// Whether a candidate is registered (queued or leading).
    pub async fn is_enrolled(&self, candidate_id: &str) -> bool {
        self.state.lock().await.candidates.contains_key(candidate_id)
    }

    fn schedule_grant(state: Arc<Mutex<ElectionState>>) {
        tokio::spawn(async move {
            Self::grant_next(state).await;
        });
    }

    async fn grant_next(state: Arc<Mutex<ElectionState>>) {
        loop {
            let granted = {
                let mut st = state.lock().await;
                if st.closed || st.leader.is_some() {
                    return;
                }
                let Some(id) = st.queue.pop_front() else {
                    return;
                };
                let Some(tx) = st.candidates.get(&id).cloned() else {
                    continue;
                };
                let term = st.next_term;
                st.next_term += 1;
                let (grant, done) = LeadershipGrant::new(&id);
                match tx.try_send(grant) {
                    Ok(()) => {
                        st.leader = Some((id.clone(), term));
                        Some((id, term, done))
                    }
                    Err(_) => {
                        // receiver gone: the candidate left without
                        // resigning; drop its registration and move on
                        st.candidates.remove(&id);
                        None
                    }
                }
            };

            let Some((id, term, done)) = granted else {
                continue;
            };
            debug!(candidate = %id, term, "leadership granted");

            let state = state.clone();
            tokio::spawn(async move {
                // resolves when the grant is completed or dropped
                let _ = done.await;
                let mut st = state.lock().await;
                let current = st
                    .leader
                    .as_ref()
                    .map(|(l, t)| l == &id && *t == term)
                    .unwrap_or(false);
                if current {
                    st.leader = None;
                    if st.candidates.contains_key(&id) && !st.queue.iter().any(|c| c == &id) {
                        st.queue.push_back(id);
                    }
                }
                let reschedule = !st.closed;
                drop(st);
                if reschedule {
                    Self::schedule_grant(state);
                }
            });
            return;
        }
    }
}

impl Default for InProcessElection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ElectionClient for InProcessElection {
    async fn enroll(&self, candidate_id: &str) -> Result<mpsc::Receiver<LeadershipGrant>> {
        let (tx, rx) = mpsc::channel(4);
        {
            let mut st = self.state.lock().await;
            if st.closed {
                return Err(ClusterError::ShuttingDown);
            }
            if st.candidates.contains_key(candidate_id) {
                return Err(ClusterError::election(format!(
                    "candidate '{candidate_id}' already enrolled"
                )));
            }
            st.candidates.insert(candidate_id.to_string(), tx);
            st.queue.push_back(candidate_id.to_string());
        }
        debug!(candidate = %candidate_id, "candidate enrolled");
        Self::schedule_grant(self.state.clone());
        Ok(rx)
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionState> {
        self.conn_tx.subscribe()
    }

    async fn resign(&self, candidate_id: &str) -> Result<()> {
        {
            let mut st = self.state.lock().await;
            if st.closed {
                return Err(ClusterError::ShuttingDown);
            }
            let holds = st
                .leader
                .as_ref()
                .map(|(l, _)| l == candidate_id)
                .unwrap_or(false);
            if holds {
                st.leader = None;
                if st.candidates.contains_key(candidate_id)
                    && !st.queue.iter().any(|c| c == candidate_id)
                {
                    st.queue.push_back(candidate_id.to_string());
                }
                debug!(candidate = %candidate_id, "leadership resigned");
            }
        }
        Self::schedule_grant(self.state.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut st = self.state.lock().await;
        st.closed = true;
        st.candidates.clear();
        st.queue.clear();
        st.leader = None;
        Ok(())
    }
}
