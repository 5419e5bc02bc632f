//! Wire names of the fields a serialized change record may carry.
//!
//! Producers inject extra attributes as top-level fields, so every name
//! below that the encoder itself writes is protected against shadowing.

pub const DATABASE: &str = "database";
pub const TABLE: &str = "table";
pub const TYPE: &str = "type";
pub const TIMESTAMP: &str = "ts";
pub const QUERY: &str = "query";
pub const POSITION: &str = "position";
pub const GTID: &str = "gtid";
pub const SERVER_ID: &str = "server_id";
pub const THREAD_ID: &str = "thread_id";
pub const COMMIT: &str = "commit";
pub const TRANSACTION_ID: &str = "xid";
pub const DATA: &str = "data";
pub const OLD: &str = "old";
pub const UUID: &str = "_uuid";
pub const ENCRYPTED: &str = "encrypted";

const PROTECTED: [&str; 11] = [
    DATABASE,
    TABLE,
    TYPE,
    TIMESTAMP,
    QUERY,
    POSITION,
    GTID,
    SERVER_ID,
    THREAD_ID,
    COMMIT,
    TRANSACTION_ID,
];

/// Check whether a field name is reserved for the encoder.
pub fn is_protected(name: &str) -> bool {
    PROTECTED.contains(&name)
}

/// The reserved field names, for error messages.
pub fn protected_names() -> Vec<&'static str> {
    PROTECTED.to_vec()
}
