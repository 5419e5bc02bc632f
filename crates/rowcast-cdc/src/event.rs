//! Row change-event representation.
//!
//! One [`RowEvent`] is built per row mutation by the replication engine,
//! then handed to the encoder for serialization. Column data keeps its
//! insertion order end-to-end: the order columns are `put` in is the order
//! they appear in serialized output.
//!
//! ## Size accounting
//!
//! Events carry a running byte-size estimate so producers can make
//! batching and backpressure decisions without serializing first. The
//! estimate starts at a fixed per-row overhead and grows with every column
//! or attribute added; it never decreases.

use crate::error::{EventError, Result};
use crate::fields;
use crate::position::StreamPosition;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Fixed per-row overhead used to seed the size estimate, in bytes.
const BASE_OVERHEAD: u64 = 100;

/// Per-entry fixed overhead in the size estimate, in bytes.
const ENTRY_OVERHEAD: u64 = 40;

/// Flat estimate for non-string values, in bytes.
const NON_STRING_ESTIMATE: u64 = 64;

/// Kind of row mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// Row inserted
    Insert,
    /// Row updated
    Update,
    /// Row deleted
    Delete,
    /// Row emitted by an initial bootstrap scan
    BootstrapInsert,
    /// Bootstrap scan started
    BootstrapStart,
    /// Bootstrap scan finished
    BootstrapComplete,
}

impl EventType {
    /// The wire form of the type tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Insert => "insert",
            EventType::Update => "update",
            EventType::Delete => "delete",
            EventType::BootstrapInsert => "bootstrap-insert",
            EventType::BootstrapStart => "bootstrap-start",
            EventType::BootstrapComplete => "bootstrap-complete",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column value carried by an event.
///
/// Most values are plain JSON. Database-native JSON columns arrive from the
/// replication stream already serialized; those are carried as raw text and
/// written through verbatim instead of being re-escaped into a string.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    /// An ordinary JSON value (scalars, arrays, nested objects)
    Json(Value),
    /// Pre-formatted JSON text, emitted without re-escaping
    Raw(Box<RawValue>),
}

impl ColumnValue {
    /// Wrap pre-formatted JSON text. Fails if the text is not valid JSON.
    pub fn raw(json: impl Into<String>) -> Result<Self> {
        Ok(ColumnValue::Raw(RawValue::from_string(json.into())?))
    }

    /// True for a plain JSON null.
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Json(Value::Null))
    }

    /// Convert to a plain [`Value`], parsing raw text if necessary.
    pub fn to_plain_value(&self) -> Value {
        match self {
            ColumnValue::Json(v) => v.clone(),
            ColumnValue::Raw(r) => serde_json::from_str(r.get()).unwrap_or(Value::Null),
        }
    }

    /// String form used for concatenated keys: bare text for strings,
    /// JSON rendering for everything else, `None` for nulls.
    fn concat_fragment(&self) -> Option<String> {
        match self {
            ColumnValue::Json(Value::Null) => None,
            ColumnValue::Json(Value::String(s)) => Some(s.clone()),
            ColumnValue::Json(v) => Some(v.to_string()),
            ColumnValue::Raw(r) => Some(r.get().to_string()),
        }
    }

    /// Marginal contribution of one `key -> value` entry to the size
    /// estimate: fixed overhead plus two bytes per character of the key,
    /// plus two bytes per character for string values or a flat estimate
    /// for anything else.
    fn entry_size(key: &str, value: &ColumnValue) -> u64 {
        let mut len = ENTRY_OVERHEAD + 2 * key.len() as u64;
        match value {
            ColumnValue::Json(Value::String(s)) => len += 2 * s.len() as u64,
            _ => len += NON_STRING_ESTIMATE,
        }
        len
    }
}

impl From<Value> for ColumnValue {
    fn from(v: Value) -> Self {
        ColumnValue::Json(v)
    }
}

/// Rendering of the primary-key material of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// `{database, table, pk.<name>: <value>, ...}`
    Hash,
    /// `[database, table, [{<name>: <value>}, ...]]`
    Array,
}

/// One captured row mutation plus its stream metadata.
///
/// Built incrementally by the replication engine (`put_*` calls), then
/// treated as immutable once handed to the encoder — with the exception of
/// the encoder's documented column-exclusion side effect.
#[derive(Debug, Clone)]
pub struct RowEvent {
    event_type: EventType,
    database: String,
    table: String,
    timestamp_millis: i64,
    timestamp_seconds: i64,
    position: StreamPosition,
    row_query: Option<String>,
    xid: Option<u64>,
    tx_commit: bool,
    server_id: Option<u64>,
    thread_id: Option<u64>,
    data: IndexMap<String, ColumnValue>,
    old_data: IndexMap<String, ColumnValue>,
    extra_attributes: IndexMap<String, ColumnValue>,
    pk_columns: Vec<String>,
    approximate_size: u64,
}

impl RowEvent {
    /// Create a new event positioned at the cursor to resume from after it.
    pub fn new(
        event_type: EventType,
        database: impl Into<String>,
        table: impl Into<String>,
        timestamp_millis: i64,
        pk_columns: Vec<String>,
        position: StreamPosition,
    ) -> Self {
        Self {
            event_type,
            database: database.into(),
            table: table.into(),
            timestamp_millis,
            timestamp_seconds: timestamp_millis.div_euclid(1000),
            position,
            row_query: None,
            xid: None,
            tx_commit: false,
            server_id: None,
            thread_id: None,
            data: IndexMap::new(),
            old_data: IndexMap::new(),
            extra_attributes: IndexMap::new(),
            pk_columns,
            approximate_size: BASE_OVERHEAD,
        }
    }

    /// Attach the SQL statement that produced this row, when captured.
    pub fn with_row_query(mut self, query: impl Into<String>) -> Self {
        self.row_query = Some(query.into());
        self
    }

    /// Add a column value. Insertion order is preserved into output.
    pub fn put_data(&mut self, key: impl Into<String>, value: impl Into<ColumnValue>) {
        let key = key.into();
        let value = value.into();
        self.approximate_size += ColumnValue::entry_size(&key, &value);
        self.data.insert(key, value);
    }

    /// Add a pre-change column value (updates only).
    pub fn put_old_data(&mut self, key: impl Into<String>, value: impl Into<ColumnValue>) {
        let key = key.into();
        let value = value.into();
        self.approximate_size += ColumnValue::entry_size(&key, &value);
        self.old_data.insert(key, value);
    }

    /// Add a producer-injected top-level field.
    ///
    /// Fails with [`EventError::ProtectedAttributeName`] when the key would
    /// shadow a field the encoder writes itself; the event is unchanged in
    /// that case.
    pub fn put_extra_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ColumnValue>,
    ) -> Result<()> {
        let key = key.into();
        if fields::is_protected(&key) {
            return Err(EventError::ProtectedAttributeName(key));
        }
        let value = value.into();
        self.approximate_size += ColumnValue::entry_size(&key, &value);
        self.extra_attributes.insert(key, value);
        Ok(())
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Source timestamp truncated to unix seconds (the wire form).
    pub fn timestamp(&self) -> i64 {
        self.timestamp_seconds
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }

    pub fn position(&self) -> &StreamPosition {
        &self.position
    }

    /// Replace the resumable cursor (the engine advances it as the
    /// transaction completes).
    pub fn set_position(&mut self, position: StreamPosition) {
        self.position = position;
    }

    pub fn row_query(&self) -> Option<&str> {
        self.row_query.as_deref()
    }

    pub fn xid(&self) -> Option<u64> {
        self.xid
    }

    pub fn set_xid(&mut self, xid: u64) {
        self.xid = Some(xid);
    }

    /// Mark this event as the final one of its transaction.
    pub fn set_tx_commit(&mut self) {
        self.tx_commit = true;
    }

    pub fn is_tx_commit(&self) -> bool {
        self.tx_commit
    }

    pub fn server_id(&self) -> Option<u64> {
        self.server_id
    }

    pub fn set_server_id(&mut self, server_id: u64) {
        self.server_id = Some(server_id);
    }

    pub fn thread_id(&self) -> Option<u64> {
        self.thread_id
    }

    pub fn set_thread_id(&mut self, thread_id: u64) {
        self.thread_id = Some(thread_id);
    }

    pub fn data(&self, key: &str) -> Option<&ColumnValue> {
        self.data.get(key)
    }

    pub fn has_data(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn old_data(&self, key: &str) -> Option<&ColumnValue> {
        self.old_data.get(key)
    }

    pub fn extra_attribute(&self, key: &str) -> Option<&ColumnValue> {
        self.extra_attributes.get(key)
    }

    pub fn pk_columns(&self) -> &[String] {
        &self.pk_columns
    }

    /// Running byte-size estimate for batching decisions.
    pub fn approximate_size(&self) -> u64 {
        self.approximate_size
    }

    /// Whether the producer should emit this event at all. Control rows
    /// (bootstrap boundaries) carry no column data but are still output.
    pub fn should_output(&self, _output: &crate::output::OutputConfig) -> bool {
        true
    }

    pub(crate) fn data_map(&self) -> &IndexMap<String, ColumnValue> {
        &self.data
    }

    pub(crate) fn old_data_map(&self) -> &IndexMap<String, ColumnValue> {
        &self.old_data
    }

    pub(crate) fn extra_attributes_map(&self) -> &IndexMap<String, ColumnValue> {
        &self.extra_attributes
    }

    /// Permanently drop a column from both data and old-data, keeping the
    /// relative order of the remaining columns.
    pub(crate) fn remove_column(&mut self, key: &str) {
        self.data.shift_remove(key);
        self.old_data.shift_remove(key);
    }

    /// Serialize the primary-key material of this event.
    ///
    /// Hash form substitutes a freshly generated `_uuid` field when the
    /// table declares no key; array form preserves the key list as given,
    /// empty or not.
    pub fn key_json(&self, format: KeyFormat) -> Result<String> {
        match format {
            KeyFormat::Hash => self.key_json_hash(),
            KeyFormat::Array => self.key_json_array(),
        }
    }

    fn key_json_hash(&self) -> Result<String> {
        let mut obj = serde_json::Map::new();
        obj.insert(fields::DATABASE.to_string(), Value::String(self.database.clone()));
        obj.insert(fields::TABLE.to_string(), Value::String(self.table.clone()));

        if self.pk_columns.is_empty() {
            obj.insert(
                fields::UUID.to_string(),
                Value::String(Uuid::new_v4().to_string()),
            );
        } else {
            for pk in &self.pk_columns {
                let value = self
                    .data
                    .get(pk)
                    .map(ColumnValue::to_plain_value)
                    .unwrap_or(Value::Null);
                obj.insert(format!("pk.{}", pk.to_lowercase()), value);
            }
        }

        Ok(serde_json::to_string(&Value::Object(obj))?)
    }

    fn key_json_array(&self) -> Result<String> {
        let mut columns = Vec::with_capacity(self.pk_columns.len());
        for pk in &self.pk_columns {
            let value = self
                .data
                .get(pk)
                .map(ColumnValue::to_plain_value)
                .unwrap_or(Value::Null);
            let mut entry = serde_json::Map::new();
            entry.insert(pk.to_lowercase(), value);
            columns.push(Value::Object(entry));
        }
        let key = Value::Array(vec![
            Value::String(self.database.clone()),
            Value::String(self.table.clone()),
            Value::Array(columns),
        ]);
        Ok(serde_json::to_string(&key)?)
    }

    /// Primary-key values concatenated in column order with no separator.
    ///
    /// Falls back to `database + table` when no key columns are declared,
    /// and to the literal `"None"` when the declared key's values are all
    /// absent or null.
    pub fn key_concat(&self) -> String {
        if self.pk_columns.is_empty() {
            return format!("{}{}", self.database, self.table);
        }
        let mut key = String::new();
        for pk in &self.pk_columns {
            if let Some(fragment) = self.data.get(pk).and_then(ColumnValue::concat_fragment) {
                key.push_str(&fragment);
            }
        }
        if key.is_empty() {
            return "None".to_string();
        }
        key
    }

    /// Concatenate the named columns' string forms for partition routing,
    /// skipping absent and null values.
    pub fn partition_key(&self, partition_columns: &[String]) -> String {
        let mut key = String::new();
        for column in partition_columns {
            if let Some(fragment) = self.data.get(column).and_then(ColumnValue::concat_fragment) {
                key.push_str(&fragment);
            }
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn event() -> RowEvent {
        RowEvent::new(
            EventType::Insert,
            "app",
            "users",
            1000,
            vec!["id".to_string()],
            StreamPosition::new("mysql-bin.000001", 4),
        )
    }

    #[test]
    fn test_timestamp_floor() {
        let e = RowEvent::new(
            EventType::Insert,
            "db",
            "t",
            1999,
            vec![],
            StreamPosition::new("f", 0),
        );
        assert_eq!(e.timestamp(), 1);
        assert_eq!(e.timestamp_millis(), 1999);
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(EventType::Insert.as_str(), "insert");
        assert_eq!(EventType::BootstrapInsert.as_str(), "bootstrap-insert");
        assert_eq!(EventType::Delete.to_string(), "delete");
    }

    #[test]
    fn test_put_data_preserves_order() {
        let mut e = event();
        e.put_data("zeta", json!(1));
        e.put_data("alpha", json!(2));
        e.put_data("mid", json!(3));
        let keys: Vec<_> = e.data_map().keys().cloned().collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_approximate_size_base() {
        assert_eq!(event().approximate_size(), 100);
    }

    #[test]
    fn test_approximate_size_string_value() {
        let mut e = event();
        e.put_data("name", json!("ab"));
        // 100 + 40 + 2*4 + 2*2
        assert_eq!(e.approximate_size(), 152);
    }

    #[test]
    fn test_approximate_size_non_string_value() {
        let mut e = event();
        e.put_data("id", json!(42));
        // 100 + 40 + 2*2 + 64
        assert_eq!(e.approximate_size(), 208);
    }

    #[test]
    fn test_protected_attribute_rejected() {
        let mut e = event();
        let before = e.approximate_size();
        let err = e.put_extra_attribute("table", json!("nope")).unwrap_err();
        assert!(matches!(err, EventError::ProtectedAttributeName(_)));
        assert!(e.extra_attribute("table").is_none());
        assert_eq!(e.approximate_size(), before);
    }

    #[test]
    fn test_extra_attribute_accepted() {
        let mut e = event();
        e.put_extra_attribute("source_cluster", json!("east")).unwrap();
        assert!(e.extra_attribute("source_cluster").is_some());
    }

    #[test]
    fn test_key_json_hash() {
        let mut e = event();
        e.put_data("id", json!(5));
        e.put_data("name", json!("a"));
        let key = e.key_json(KeyFormat::Hash).unwrap();
        assert_eq!(key, r#"{"database":"app","table":"users","pk.id":5}"#);
    }

    #[test]
    fn test_key_json_hash_lowercases_column() {
        let mut e = RowEvent::new(
            EventType::Insert,
            "app",
            "users",
            1000,
            vec!["ID".to_string()],
            StreamPosition::new("f", 0),
        );
        e.put_data("ID", json!(7));
        let key = e.key_json(KeyFormat::Hash).unwrap();
        assert_eq!(key, r#"{"database":"app","table":"users","pk.id":7}"#);
    }

    #[test]
    fn test_key_json_hash_uuid_fallback() {
        let e = RowEvent::new(
            EventType::Insert,
            "app",
            "logs",
            0,
            vec![],
            StreamPosition::new("f", 0),
        );
        let first: serde_json::Value =
            serde_json::from_str(&e.key_json(KeyFormat::Hash).unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&e.key_json(KeyFormat::Hash).unwrap()).unwrap();
        let a = first.get("_uuid").and_then(|v| v.as_str()).unwrap();
        let b = second.get("_uuid").and_then(|v| v.as_str()).unwrap();
        assert!(!a.is_empty());
        assert_ne!(a, b, "fallback identifiers must differ across calls");
    }

    #[test]
    fn test_key_json_array() {
        let mut e = event();
        e.put_data("id", json!(5));
        let key = e.key_json(KeyFormat::Array).unwrap();
        assert_eq!(key, r#"["app","users",[{"id":5}]]"#);
    }

    #[test]
    fn test_key_json_array_empty_pk() {
        let e = RowEvent::new(
            EventType::Insert,
            "app",
            "logs",
            0,
            vec![],
            StreamPosition::new("f", 0),
        );
        // array form has no identifier fallback; the key list stays empty
        assert_eq!(e.key_json(KeyFormat::Array).unwrap(), r#"["app","logs",[]]"#);
    }

    #[test]
    fn test_key_concat() {
        let mut e = RowEvent::new(
            EventType::Insert,
            "app",
            "orders",
            0,
            vec!["region".to_string(), "id".to_string()],
            StreamPosition::new("f", 0),
        );
        e.put_data("region", json!("eu"));
        e.put_data("id", json!(12));
        assert_eq!(e.key_concat(), "eu12");
    }

    #[test]
    fn test_key_concat_no_declared_key() {
        let e = RowEvent::new(
            EventType::Insert,
            "app",
            "logs",
            0,
            vec![],
            StreamPosition::new("f", 0),
        );
        assert_eq!(e.key_concat(), "applogs");
    }

    #[test]
    fn test_key_concat_all_null_sentinel() {
        let mut e = event();
        e.put_data("id", json!(null));
        assert_eq!(e.key_concat(), "None");
    }

    #[test]
    fn test_key_concat_absent_values_sentinel() {
        // declared key but no corresponding column data at all
        assert_eq!(event().key_concat(), "None");
    }

    #[test]
    fn test_partition_key() {
        let mut e = event();
        e.put_data("tenant", json!("acme"));
        e.put_data("shard", json!(3));
        e.put_data("skipped", json!(null));
        let cols = vec![
            "tenant".to_string(),
            "skipped".to_string(),
            "shard".to_string(),
        ];
        assert_eq!(e.partition_key(&cols), "acme3");
    }

    #[test]
    fn test_raw_column_value() {
        let v = ColumnValue::raw(r#"{"a":[1,2]}"#).unwrap();
        assert!(!v.is_null());
        assert_eq!(v.to_plain_value(), json!({"a": [1, 2]}));
        assert!(ColumnValue::raw("{not json").is_err());
    }

    proptest! {
        #[test]
        fn approximate_size_monotonic(
            entries in proptest::collection::vec(("[a-z]{1,12}", "[a-z0-9]{0,24}"), 0..24)
        ) {
            let mut e = event();
            let mut last = e.approximate_size();
            prop_assert!(last >= 100);
            for (key, value) in entries {
                e.put_data(key, json!(value));
                let size = e.approximate_size();
                prop_assert!(size >= last);
                last = size;
            }
        }
    }
}
