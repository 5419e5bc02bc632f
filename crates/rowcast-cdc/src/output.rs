//! Output configuration for record encoding.

use crate::error::{EventError, Result};
use serde::{Deserialize, Serialize};

/// Case transform applied to column names in the data blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnCase {
    /// Emit column names exactly as captured
    #[default]
    AsIs,
    Lower,
    Upper,
}

/// Confidentiality mode applied to serialized records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionMode {
    /// Plaintext output
    #[default]
    None,
    /// Encrypt only the data/old-data blocks; metadata stays plaintext
    EncryptData,
    /// Encrypt the entire serialized record
    EncryptAll,
}

impl EncryptionMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, EncryptionMode::None)
    }
}

/// Controls which metadata fields a serialized record carries and which
/// confidentiality mode applies.
///
/// Defaults produce the minimal record: database, table, type, timestamp
/// and column data, everything else opt-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Include the originating SQL statement when captured
    #[serde(default)]
    pub include_row_query: bool,
    /// Include transaction id and commit flag
    #[serde(default)]
    pub include_commit_metadata: bool,
    /// Include the resumable `file:offset` position
    #[serde(default)]
    pub include_position: bool,
    /// Include the global transaction id read from the position
    #[serde(default)]
    pub include_gtid: bool,
    /// Include the originating server id
    #[serde(default)]
    pub include_server_id: bool,
    /// Include the originating connection's thread id
    #[serde(default)]
    pub include_thread_id: bool,
    /// Emit null-valued columns instead of dropping them
    #[serde(default)]
    pub include_nulls: bool,
    /// Case transform for column names
    #[serde(default)]
    pub column_case: ColumnCase,
    /// Anchored regex patterns; matching columns are removed from events
    #[serde(default)]
    pub exclude_columns: Vec<String>,
    /// Confidentiality mode
    #[serde(default)]
    pub encryption: EncryptionMode,
    /// Secret for key derivation; required whenever encryption is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            include_row_query: false,
            include_commit_metadata: false,
            include_position: false,
            include_gtid: false,
            include_server_id: false,
            include_thread_id: false,
            include_nulls: false,
            column_case: ColumnCase::AsIs,
            exclude_columns: Vec::new(),
            encryption: EncryptionMode::None,
            secret_key: None,
        }
    }
}

impl OutputConfig {
    pub fn builder() -> OutputConfigBuilder {
        OutputConfigBuilder::default()
    }

    /// Check internal consistency. Encryption without a secret key is a
    /// configuration error, surfaced here rather than per record.
    pub fn validate(&self) -> Result<()> {
        if self.encryption.is_enabled() && self.secret_key.is_none() {
            return Err(EventError::config(
                "encryption enabled but no secret key configured",
            ));
        }
        Ok(())
    }
}

/// Builder for [`OutputConfig`].
#[derive(Debug, Default)]
pub struct OutputConfigBuilder {
    config: OutputConfig,
}

impl OutputConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_row_query(mut self, include: bool) -> Self {
        self.config.include_row_query = include;
        self
    }

    pub fn include_commit_metadata(mut self, include: bool) -> Self {
        self.config.include_commit_metadata = include;
        self
    }

    pub fn include_position(mut self, include: bool) -> Self {
        self.config.include_position = include;
        self
    }

    pub fn include_gtid(mut self, include: bool) -> Self {
        self.config.include_gtid = include;
        self
    }

    pub fn include_server_id(mut self, include: bool) -> Self {
        self.config.include_server_id = include;
        self
    }

    pub fn include_thread_id(mut self, include: bool) -> Self {
        self.config.include_thread_id = include;
        self
    }

    pub fn include_nulls(mut self, include: bool) -> Self {
        self.config.include_nulls = include;
        self
    }

    pub fn column_case(mut self, case: ColumnCase) -> Self {
        self.config.column_case = case;
        self
    }

    /// Add an exclude pattern, matched anchored against column names.
    pub fn exclude_column(mut self, pattern: impl Into<String>) -> Self {
        self.config.exclude_columns.push(pattern.into());
        self
    }

    pub fn encryption(mut self, mode: EncryptionMode) -> Self {
        self.config.encryption = mode;
        self
    }

    pub fn secret_key(mut self, secret: impl Into<String>) -> Self {
        self.config.secret_key = Some(secret.into());
        self
    }

    pub fn build(self) -> OutputConfig {
        self.config
    }
}
