//! Coordination configuration
//!
//! Everything a coordination-service client needs to run one logical CDC
//! cluster: the cluster identity, the ensemble endpoints, the namespaced
//! election path and the connection retry policy.

use crate::error::{ClusterError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reserved default client id; running a cluster under it is refused so
/// that two unconfigured deployments can never share an election path.
pub const DEFAULT_CLIENT_ID: &str = "rowcast";

/// Root path under which per-cluster election nodes are created.
pub const DEFAULT_CLUSTER_ROOT: &str = "/rowcast/leader";

/// Bounded exponential backoff for coordination-service connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Retry attempts before giving up
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_retries: 5,
        }
    }
}

impl RetryConfig {
    /// Delay before the given retry attempt (0-indexed), doubling each
    /// time; `None` once the attempt budget is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        Some(self.base_delay * 2u32.saturating_pow(attempt))
    }
}

/// Configuration for participation in one logical CDC cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Logical cluster identity; all redundant instances of one CDC
    /// deployment share it
    pub client_id: String,
    /// Coordination-service ensemble endpoints (`host:port`)
    pub servers: Vec<String>,
    /// Root path for election nodes
    pub cluster_root: String,
    /// Connection retry policy
    pub retry: RetryConfig,
    /// Log level the daemon applies at startup, when set
    pub log_level: Option<String>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            servers: vec!["localhost:2181".to_string()],
            cluster_root: DEFAULT_CLUSTER_ROOT.to_string(),
            retry: RetryConfig::default(),
            log_level: None,
        }
    }
}

impl CoordinationConfig {
    /// Create a configuration for the given cluster identity.
    pub fn new(client_id: impl Into<String>, servers: Vec<String>) -> Self {
        Self {
            client_id: client_id.into(),
            servers,
            ..Default::default()
        }
    }

    pub fn with_cluster_root(mut self, root: impl Into<String>) -> Self {
        self.cluster_root = root.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Validate the configuration.
    ///
    /// The reserved default client id is a startup error: it must never
    /// identify a real cluster.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(ClusterError::invalid_config("client_id must not be empty"));
        }
        if self.client_id == DEFAULT_CLIENT_ID {
            return Err(ClusterError::ReservedClientId(self.client_id.clone()));
        }
        if self.servers.is_empty() {
            return Err(ClusterError::invalid_config(
                "at least one coordination server is required",
            ));
        }
        for server in &self.servers {
            if server.is_empty() || !server.contains(':') {
                return Err(ClusterError::connection_string(format!(
                    "expected host:port, got '{server}'"
                )));
            }
        }
        Ok(())
    }

    /// Election path for this cluster: `<root>/<client_id>`. All
    /// participants of one logical cluster must use the same path.
    pub fn election_path(&self) -> String {
        format!(
            "{}/{}",
            self.cluster_root.trim_end_matches('/'),
            self.client_id
        )
    }

    /// Candidate identity registered with the election:
    /// `<client_id>:<host>`.
    pub fn candidate_id(&self) -> String {
        format!("{}:{}", self.client_id, hostname())
    }
}

/// Get system hostname via the `hostname` command, falling back to
/// "unknown".
fn hostname() -> String {
    std::process::Command::new("hostname")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_owned())
        .unwrap_or_else(|| "unknown".to_owned())
}
