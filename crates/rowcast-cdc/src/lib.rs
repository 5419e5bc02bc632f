//! # rowcast-cdc - Change-event model and record encoding
//!
//! The in-memory representation of one captured row mutation and its
//! serialization into output records.
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ Replication     │ ──▶ │  RowEvent        │ ──▶ │ EventEncoder │ ──▶ producer
//! │ engine          │     │  data / old /    │     │ plaintext or │
//! │ (external)      │     │  position / pk   │     │ encrypted    │
//! └─────────────────┘     └──────────────────┘     └──────────────┘
//! ```
//!
//! - [`RowEvent`] - one row change: ordered column data, pre-change values,
//!   producer attributes, primary-key material and the resumable
//!   [`StreamPosition`] to continue from after it
//! - [`EventEncoder`] - stateless serialization against an [`OutputConfig`],
//!   with plaintext, data-only-encrypted and whole-record-encrypted modes
//! - [`EncodeBuffer`] - per-worker scratch space, passed explicitly into
//!   every encode call
//!
//! ## Quick Start
//!
//! ```
//! use rowcast_cdc::{EncodeBuffer, EventEncoder, EventType, OutputConfig, RowEvent, StreamPosition};
//!
//! # fn main() -> rowcast_cdc::Result<()> {
//! let mut event = RowEvent::new(
//!     EventType::Insert,
//!     "app",
//!     "users",
//!     1_696_000_000_000,
//!     vec!["id".to_string()],
//!     StreamPosition::new("mysql-bin.000001", 4),
//! );
//! event.put_data("id", serde_json::json!(5));
//! event.put_data("name", serde_json::json!("a"));
//!
//! let encoder = EventEncoder::new(OutputConfig::default())?;
//! let mut buf = EncodeBuffer::new();
//! let record = encoder.encode(&mut event, &mut buf)?;
//! assert!(record.starts_with(r#"{"database":"app","table":"users""#));
//! # Ok(())
//! # }
//! ```

mod encoder;
mod encryption;
mod error;
pub mod fields;
mod event;
mod output;
mod position;

pub use encoder::{EncodeBuffer, EventEncoder};
pub use encryption::{EncryptedBlob, RecordCipher};
pub use error::{EventError, Result};
pub use event::{ColumnValue, EventType, KeyFormat, RowEvent};
pub use output::{ColumnCase, EncryptionMode, OutputConfig, OutputConfigBuilder};
pub use position::StreamPosition;
