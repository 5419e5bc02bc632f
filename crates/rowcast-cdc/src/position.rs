//! Resumable replication-stream positions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque cursor into the replication stream.
///
/// Identifies the next unprocessed change as a log file plus byte offset,
/// optionally carrying the global transaction id of the source when the
/// server runs with GTIDs enabled. An event holds the position to resume
/// from *after* that event has been processed, so a consumer that persists
/// the position of its last acknowledged event can fail over without
/// replaying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPosition {
    /// Log file name (e.g. `mysql-bin.000003`)
    pub file: String,
    /// Byte offset within the file
    pub offset: u64,
    /// Global transaction id, when the source provides one
    pub gtid: Option<String>,
}

impl StreamPosition {
    /// Create a new position without a GTID.
    pub fn new(file: impl Into<String>, offset: u64) -> Self {
        Self {
            file: file.into(),
            offset,
            gtid: None,
        }
    }

    /// Attach a global transaction id.
    pub fn with_gtid(mut self, gtid: impl Into<String>) -> Self {
        self.gtid = Some(gtid.into());
        self
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.offset)
    }
}
