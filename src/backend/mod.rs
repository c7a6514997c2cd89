//! Backend Adapters
//!
//! Concrete repository implementations per storage technology. Relational
//! backends persist each record type as a document table keyed by the record
//! identifier; the key-value backend persists a serialized document under a
//! namespaced key. Shared record translation lives here so every adapter and
//! both disciplines use the same code path.

pub mod postgres;
pub mod redis;
pub mod sqlite;

use crate::error::{StorageError, StorageResult};
use crate::record::StorageRecord;

pub use postgres::{PostgresProvider, PostgresRepository};
pub use redis::{RedisProvider, RedisRepository};
pub use sqlite::{SqliteProvider, SqliteRepository};

/// Serialize a record into its stored JSON document.
pub(crate) fn encode_record<T: StorageRecord>(record: &T) -> StorageResult<String> {
    serde_json::to_string(record)
        .map_err(|e| StorageError::Serialization(format!("encoding {}: {e}", T::KIND)))
}

/// Deserialize a stored JSON document back into the record type.
pub(crate) fn decode_record<T: StorageRecord>(raw: &str) -> StorageResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("decoding {}: {e}", T::KIND)))
}

/// Record kinds become SQL table names and Redis key prefixes, so they are
/// restricted to lowercase snake_case identifiers.
pub(crate) fn validate_kind(kind: &str) -> StorageResult<()> {
    let mut chars = kind.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let tail_ok =
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if head_ok && tail_ok {
        Ok(())
    } else {
        Err(StorageError::Configuration(format!(
            "record kind {kind:?} is not a valid storage identifier"
        )))
    }
}
