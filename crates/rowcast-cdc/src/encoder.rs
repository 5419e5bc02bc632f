//! Serialization of change events into output records.
//!
//! Field order is part of the output contract: downstream consumers may
//! depend on it. Metadata comes first (identity, type tag, timestamp,
//! transaction and position details, producer attributes), the column data
//! blocks come last so the selective-encryption mode can replace exactly
//! them with one ciphertext field.
//!
//! Encoding writes into a caller-owned [`EncodeBuffer`]. Workers hold one
//! buffer each and pass it explicitly; the encoder resets it between uses
//! and a buffer must never be shared across concurrent encodings.

use crate::encryption::RecordCipher;
use crate::error::{EventError, Result};
use crate::event::{ColumnValue, RowEvent};
use crate::fields;
use crate::output::{ColumnCase, EncryptionMode, OutputConfig};
use indexmap::IndexMap;
use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Reusable per-worker scratch space for encoding.
///
/// Holds the output bytes plus a second scratch area used when a data
/// section or whole record has to be assembled before encryption.
#[derive(Debug)]
pub struct EncodeBuffer {
    out: Vec<u8>,
    section: Vec<u8>,
}

impl EncodeBuffer {
    pub fn new() -> Self {
        Self {
            out: Vec::with_capacity(1024),
            section: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.out.clear();
        self.section.clear();
    }
}

impl Default for EncodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless record encoder for one output configuration.
///
/// Exclude patterns are compiled and the cipher key derived once at
/// construction, so configuration mistakes fail here instead of per record.
pub struct EventEncoder {
    config: OutputConfig,
    exclude: Vec<Regex>,
    cipher: Option<RecordCipher>,
}

impl EventEncoder {
    pub fn new(config: OutputConfig) -> Result<Self> {
        config.validate()?;

        let exclude = config
            .exclude_columns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{p})$"))
                    .map_err(|e| EventError::config(format!("invalid exclude pattern '{p}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let cipher = match &config.secret_key {
            Some(secret) if config.encryption.is_enabled() => Some(RecordCipher::new(secret)?),
            _ => None,
        };

        Ok(Self {
            config,
            exclude,
            cipher,
        })
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Serialize one event into an output record.
    ///
    /// Mutates the event in one documented way: columns matching an exclude
    /// pattern are permanently removed from both data and old-data, so
    /// re-encoding the same event yields the filtered result again.
    pub fn encode(&self, event: &mut RowEvent, buf: &mut EncodeBuffer) -> Result<String> {
        buf.reset();
        self.apply_column_excludes(event);

        let EncodeBuffer { out, section } = buf;
        if self.config.encryption == EncryptionMode::EncryptAll {
            // the full plaintext record is assembled first, then the whole
            // of it becomes the ciphertext of a one-field envelope
            self.write_record(event, section, out)?;
            out.clear();
            let blob = self.cipher()?.encrypt(section)?;
            let mut ser = serde_json::Serializer::new(&mut *out);
            let mut rec = ser.serialize_map(Some(1))?;
            rec.serialize_entry(fields::ENCRYPTED, &blob)?;
            rec.end()?;
        } else {
            self.write_record(event, out, section)?;
        }

        std::str::from_utf8(out)
            .map(str::to_owned)
            .map_err(|e| EventError::serialization(e.to_string()))
    }

    fn cipher(&self) -> Result<&RecordCipher> {
        self.cipher
            .as_ref()
            .ok_or_else(|| EventError::config("encryption enabled but no secret key configured"))
    }

    /// Drop excluded columns from the event. The removal is permanent;
    /// encoding the same event again is idempotent.
    fn apply_column_excludes(&self, event: &mut RowEvent) {
        if self.exclude.is_empty() {
            return;
        }
        // collect keys up front; data and old-data may both hold the column
        let mut keys: HashSet<String> = event.data_map().keys().cloned().collect();
        keys.extend(event.old_data_map().keys().cloned());

        for pattern in &self.exclude {
            for key in &keys {
                if pattern.is_match(key) {
                    debug!(column = %key, "removing excluded column");
                    event.remove_column(key);
                }
            }
        }
    }

    fn write_record(
        &self,
        event: &RowEvent,
        out: &mut Vec<u8>,
        section: &mut Vec<u8>,
    ) -> Result<()> {
        let mut ser = serde_json::Serializer::new(&mut *out);
        let mut rec = ser.serialize_map(None)?;

        rec.serialize_entry(fields::DATABASE, event.database())?;
        rec.serialize_entry(fields::TABLE, event.table())?;

        if self.config.include_row_query {
            if let Some(query) = event.row_query() {
                rec.serialize_entry(fields::QUERY, query)?;
            }
        }

        rec.serialize_entry(fields::TYPE, event.event_type().as_str())?;
        rec.serialize_entry(fields::TIMESTAMP, &event.timestamp())?;

        if self.config.include_commit_metadata {
            if let Some(xid) = event.xid() {
                rec.serialize_entry(fields::TRANSACTION_ID, &xid)?;
            }
            if event.is_tx_commit() {
                rec.serialize_entry(fields::COMMIT, &true)?;
            }
        }

        let position = event.position();
        if self.config.include_position {
            rec.serialize_entry(fields::POSITION, &position.to_string())?;
        }
        if self.config.include_gtid {
            // read from the position unconditionally once the flag is set;
            // an absent gtid is emitted as null
            rec.serialize_entry(fields::GTID, &position.gtid)?;
        }

        if self.config.include_server_id {
            if let Some(server_id) = event.server_id() {
                rec.serialize_entry(fields::SERVER_ID, &server_id)?;
            }
        }
        if self.config.include_thread_id {
            if let Some(thread_id) = event.thread_id() {
                rec.serialize_entry(fields::THREAD_ID, &thread_id)?;
            }
        }

        for (key, value) in event.extra_attributes_map() {
            rec.serialize_entry(key, value)?;
        }

        if self.config.encryption == EncryptionMode::EncryptData {
            section.clear();
            {
                let mut inner_ser = serde_json::Serializer::new(&mut *section);
                let mut blocks = inner_ser.serialize_map(None)?;
                self.write_data_blocks(event, &mut blocks)?;
                blocks.end()?;
            }
            let blob = self.cipher()?.encrypt(section)?;
            rec.serialize_entry(fields::ENCRYPTED, &blob)?;
        } else {
            self.write_data_blocks(event, &mut rec)?;
        }

        rec.end()?;
        Ok(())
    }

    fn write_data_blocks<M>(&self, event: &RowEvent, map: &mut M) -> Result<()>
    where
        M: SerializeMap<Error = serde_json::Error>,
    {
        map.serialize_entry(
            fields::DATA,
            &DataBlock {
                columns: event.data_map(),
                case: self.config.column_case,
                include_nulls: self.config.include_nulls,
            },
        )?;
        if !event.old_data_map().is_empty() {
            map.serialize_entry(
                fields::OLD,
                &DataBlock {
                    columns: event.old_data_map(),
                    case: self.config.column_case,
                    include_nulls: self.config.include_nulls,
                },
            )?;
        }
        Ok(())
    }
}

/// One nested column block (`data` or `old`), serialized with the
/// configured key case and null handling. Raw column values pass through
/// verbatim.
struct DataBlock<'a> {
    columns: &'a IndexMap<String, ColumnValue>,
    case: ColumnCase,
    include_nulls: bool,
}

impl Serialize for DataBlock<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in self.columns {
            if value.is_null() && !self.include_nulls {
                continue;
            }
            match self.case {
                ColumnCase::AsIs => map.serialize_entry(key, value)?,
                ColumnCase::Lower => map.serialize_entry(&key.to_lowercase(), value)?,
                ColumnCase::Upper => map.serialize_entry(&key.to_uppercase(), value)?,
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::position::StreamPosition;
    use serde_json::{json, Value};

    fn insert_event() -> RowEvent {
        let mut event = RowEvent::new(
            EventType::Insert,
            "app",
            "users",
            1000,
            vec!["id".to_string()],
            StreamPosition::new("mysql-bin.000001", 4),
        );
        event.put_data("id", json!(5));
        event.put_data("name", json!("a"));
        event
    }

    fn encode(config: OutputConfig, event: &mut RowEvent) -> String {
        let encoder = EventEncoder::new(config).unwrap();
        let mut buf = EncodeBuffer::new();
        encoder.encode(event, &mut buf).unwrap()
    }

    fn parse(json: &str) -> serde_json::Map<String, Value> {
        match serde_json::from_str(json).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_default_record() {
        let mut event = insert_event();
        let json = encode(OutputConfig::default(), &mut event);
        assert_eq!(
            json,
            r#"{"database":"app","table":"users","type":"insert","ts":1,"data":{"id":5,"name":"a"}}"#
        );
    }

    #[test]
    fn test_field_order() {
        let mut event = insert_event();
        event.set_xid(777);
        event.set_tx_commit();
        event.set_server_id(11);
        event.set_thread_id(22);
        event.put_extra_attribute("origin", json!("east")).unwrap();
        event.put_old_data("name", json!("b"));

        let config = OutputConfig::builder()
            .include_commit_metadata(true)
            .include_position(true)
            .include_gtid(true)
            .include_server_id(true)
            .include_thread_id(true)
            .build();
        let json = encode(config, &mut event);
        let keys: Vec<_> = parse(&json).keys().cloned().collect();
        assert_eq!(
            keys,
            [
                "database",
                "table",
                "type",
                "ts",
                "xid",
                "commit",
                "position",
                "gtid",
                "server_id",
                "thread_id",
                "origin",
                "data",
                "old"
            ]
        );
    }

    #[test]
    fn test_row_query() {
        let mut event = insert_event().with_row_query("INSERT INTO users VALUES (5, 'a')");
        let config = OutputConfig::builder().include_row_query(true).build();
        let record = parse(&encode(config, &mut event));
        assert_eq!(
            record.get("query").and_then(Value::as_str),
            Some("INSERT INTO users VALUES (5, 'a')")
        );

        // configured but not captured: the field is simply absent
        let mut without = insert_event();
        let config = OutputConfig::builder().include_row_query(true).build();
        assert!(!parse(&encode(config, &mut without)).contains_key("query"));
    }

    #[test]
    fn test_position_and_absent_gtid() {
        let mut event = insert_event();
        let config = OutputConfig::builder()
            .include_position(true)
            .include_gtid(true)
            .build();
        let record = parse(&encode(config, &mut event));
        assert_eq!(
            record.get("position").and_then(Value::as_str),
            Some("mysql-bin.000001:4")
        );
        // gtid is read from the position unconditionally; absent means null
        assert_eq!(record.get("gtid"), Some(&Value::Null));
    }

    #[test]
    fn test_gtid_present() {
        let mut event = insert_event();
        event.set_position(StreamPosition::new("mysql-bin.000001", 4).with_gtid("uuid:1-5"));
        let config = OutputConfig::builder().include_gtid(true).build();
        let record = parse(&encode(config, &mut event));
        assert_eq!(record.get("gtid").and_then(Value::as_str), Some("uuid:1-5"));
    }

    #[test]
    fn test_commit_metadata_suppressed_by_default() {
        let mut event = insert_event();
        event.set_xid(777);
        event.set_tx_commit();
        let record = parse(&encode(OutputConfig::default(), &mut event));
        assert!(!record.contains_key("xid"));
        assert!(!record.contains_key("commit"));
    }

    #[test]
    fn test_old_data_block() {
        let mut event = insert_event();
        event.put_old_data("name", json!("before"));
        let record = parse(&encode(OutputConfig::default(), &mut event));
        assert_eq!(record.get("old"), Some(&json!({"name": "before"})));
    }

    #[test]
    fn test_null_columns_dropped_by_default() {
        let mut event = insert_event();
        event.put_data("nickname", json!(null));
        let record = parse(&encode(OutputConfig::default(), &mut event));
        assert_eq!(record.get("data"), Some(&json!({"id": 5, "name": "a"})));

        let mut event = insert_event();
        event.put_data("nickname", json!(null));
        let config = OutputConfig::builder().include_nulls(true).build();
        let record = parse(&encode(config, &mut event));
        assert_eq!(
            record.get("data"),
            Some(&json!({"id": 5, "name": "a", "nickname": null}))
        );
    }

    #[test]
    fn test_column_case() {
        let mut event = insert_event();
        let config = OutputConfig::builder().column_case(ColumnCase::Upper).build();
        let record = parse(&encode(config, &mut event));
        assert_eq!(record.get("data"), Some(&json!({"ID": 5, "NAME": "a"})));
        // metadata fields are untouched by the case transform
        assert_eq!(record.get("table").and_then(Value::as_str), Some("users"));
    }

    #[test]
    fn test_list_value_as_nested_array() {
        let mut event = insert_event();
        event.put_data("tags", json!(["a", "b"]));
        let record = parse(&encode(OutputConfig::default(), &mut event));
        assert_eq!(
            record.get("data"),
            Some(&json!({"id": 5, "name": "a", "tags": ["a", "b"]}))
        );
    }

    #[test]
    fn test_raw_value_verbatim() {
        let mut event = insert_event();
        event.put_data("profile", ColumnValue::raw(r#"{"theme":"dark"}"#).unwrap());
        let json = encode(OutputConfig::default(), &mut event);
        // emitted as nested JSON, not as an escaped string
        assert!(json.contains(r#""profile":{"theme":"dark"}"#));
    }

    #[test]
    fn test_exclude_columns_idempotent() {
        let mut event = insert_event();
        event.put_old_data("name", json!("b"));
        event.put_old_data("secret", json!("old"));
        event.put_data("secret", json!("new"));

        let config = OutputConfig::builder().exclude_column("secret").build();
        let encoder = EventEncoder::new(config).unwrap();
        let mut buf = EncodeBuffer::new();

        let first = encoder.encode(&mut event, &mut buf).unwrap();
        let second = encoder.encode(&mut event, &mut buf).unwrap();
        assert_eq!(first, second);
        assert!(!first.contains("secret"));
        // the removal is observable on the event itself
        assert!(event.data("secret").is_none());
        assert!(event.old_data("secret").is_none());
    }

    #[test]
    fn test_exclude_pattern_is_anchored() {
        let mut event = insert_event();
        event.put_data("password_hash", json!("x"));
        let config = OutputConfig::builder().exclude_column("password").build();
        let record = parse(&encode(config, &mut event));
        // "password" must not match "password_hash"
        assert_eq!(
            record.get("data"),
            Some(&json!({"id": 5, "name": "a", "password_hash": "x"}))
        );

        let mut event = insert_event();
        event.put_data("password_hash", json!("x"));
        let config = OutputConfig::builder().exclude_column("password.*").build();
        let record = parse(&encode(config, &mut event));
        assert_eq!(record.get("data"), Some(&json!({"id": 5, "name": "a"})));
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let config = OutputConfig::builder().exclude_column("(unclosed").build();
        assert!(matches!(
            EventEncoder::new(config),
            Err(EventError::Config(_))
        ));
    }

    #[test]
    fn test_extra_attributes_in_output() {
        let mut event = insert_event();
        event.put_extra_attribute("origin", json!("east")).unwrap();
        event.put_extra_attribute("replica", json!(2)).unwrap();
        let record = parse(&encode(OutputConfig::default(), &mut event));
        assert_eq!(record.get("origin"), Some(&json!("east")));
        assert_eq!(record.get("replica"), Some(&json!(2)));
    }

    #[test]
    fn test_roundtrip_plaintext() {
        let mut event = insert_event();
        let record = parse(&encode(OutputConfig::default(), &mut event));
        assert_eq!(record.get("database").and_then(Value::as_str), Some("app"));
        assert_eq!(record.get("table").and_then(Value::as_str), Some("users"));
        assert_eq!(record.get("type").and_then(Value::as_str), Some("insert"));
        assert_eq!(record.get("ts").and_then(Value::as_i64), Some(1));
        assert_eq!(record.get("data"), Some(&json!({"id": 5, "name": "a"})));
    }

    #[test]
    fn test_encrypt_data_only() {
        let mut event = insert_event();
        event.put_old_data("name", json!("before"));
        let config = OutputConfig::builder()
            .encryption(EncryptionMode::EncryptData)
            .secret_key("s3cret")
            .build();
        let record = parse(&encode(config, &mut event));

        // metadata stays plaintext
        assert_eq!(record.get("database").and_then(Value::as_str), Some("app"));
        assert_eq!(record.get("type").and_then(Value::as_str), Some("insert"));
        // the data blocks are replaced by one ciphertext field
        assert!(!record.contains_key("data"));
        assert!(!record.contains_key("old"));
        let blob: crate::encryption::EncryptedBlob =
            serde_json::from_value(record.get("encrypted").unwrap().clone()).unwrap();

        let cipher = RecordCipher::new("s3cret").unwrap();
        let plaintext = cipher.decrypt(&blob).unwrap();
        let blocks: Value = serde_json::from_slice(&plaintext).unwrap();
        assert_eq!(
            blocks,
            json!({"data": {"id": 5, "name": "a"}, "old": {"name": "before"}})
        );
    }

    #[test]
    fn test_encrypt_whole_record() {
        let mut event = insert_event();
        let config = OutputConfig::builder()
            .encryption(EncryptionMode::EncryptAll)
            .secret_key("s3cret")
            .build();
        let json = encode(config, &mut event);

        // nothing but the ciphertext envelope, no plaintext names or values
        let record = parse(&json);
        assert_eq!(record.len(), 1);
        assert!(!json.contains("users"));
        assert!(!json.contains("name"));
        let blob: crate::encryption::EncryptedBlob =
            serde_json::from_value(record.get("encrypted").unwrap().clone()).unwrap();

        let cipher = RecordCipher::new("s3cret").unwrap();
        let plaintext = String::from_utf8(cipher.decrypt(&blob).unwrap()).unwrap();
        let mut reference = insert_event();
        assert_eq!(plaintext, encode(OutputConfig::default(), &mut reference));
    }

    #[test]
    fn test_encryption_requires_secret_at_construction() {
        for mode in [EncryptionMode::EncryptData, EncryptionMode::EncryptAll] {
            let config = OutputConfig::builder().encryption(mode).build();
            assert!(matches!(
                EventEncoder::new(config),
                Err(EventError::Config(_))
            ));
        }
    }

    #[test]
    fn test_buffer_reuse() {
        let encoder = EventEncoder::new(OutputConfig::default()).unwrap();
        let mut buf = EncodeBuffer::new();

        let mut first = insert_event();
        let long = encoder.encode(&mut first, &mut buf).unwrap();

        let mut second = RowEvent::new(
            EventType::Delete,
            "app",
            "u",
            2000,
            vec![],
            StreamPosition::new("f", 0),
        );
        let short = encoder.encode(&mut second, &mut buf).unwrap();
        assert_eq!(short, r#"{"database":"app","table":"u","type":"delete","ts":2,"data":{}}"#);
        assert!(long.len() > short.len());
    }
}
