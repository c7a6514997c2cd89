//! Storage Error Types
//!
//! Unified error handling for all storage operations. Backend-native errors
//! are translated into this taxonomy at the adapter boundary.

use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Bad or missing backend configuration. Raised before any connection
    /// is attempted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Backend unreachable or connection lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// Uniqueness or constraint violation on create.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Update targeted an identifier that does not exist. `get` and `delete`
    /// treat missing records as a normal empty result, never as this error.
    #[error("not found: {0}")]
    NotFound(String),

    /// Record could not be translated to or from its backend representation.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Residual backend failure that fits no other bucket.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation => {
                    StorageError::Conflict(db.message().to_string())
                }
                _ => StorageError::Backend(db.to_string()),
            },
            sqlx::Error::Configuration(e) => StorageError::Configuration(e.to_string()),
            sqlx::Error::Io(e) => StorageError::Connection(e.to_string()),
            sqlx::Error::Tls(e) => StorageError::Connection(e.to_string()),
            sqlx::Error::Protocol(e) => StorageError::Connection(e),
            sqlx::Error::PoolTimedOut => {
                StorageError::Connection("connection pool timed out".to_string())
            }
            sqlx::Error::PoolClosed => {
                StorageError::Connection("connection pool is closed".to_string())
            }
            sqlx::Error::WorkerCrashed => {
                StorageError::Connection("database worker crashed".to_string())
            }
            sqlx::Error::ColumnDecode { source, .. } => {
                StorageError::Serialization(source.to_string())
            }
            sqlx::Error::Decode(e) => StorageError::Serialization(e.to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

impl From<deadpool_redis::redis::RedisError> for StorageError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            StorageError::Connection(err.to_string())
        } else {
            StorageError::Backend(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for StorageError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StorageError::Connection(err.to_string())
    }
}

impl From<deadpool_redis::CreatePoolError> for StorageError {
    fn from(err: deadpool_redis::CreatePoolError) -> Self {
        StorageError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_errors_map_to_serialization() {
        let err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let storage_err: StorageError = err.into();
        assert!(matches!(storage_err, StorageError::Serialization(_)));
    }

    #[test]
    fn pool_exhaustion_maps_to_connection() {
        let storage_err: StorageError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(storage_err, StorageError::Connection(_)));
        let storage_err: StorageError = sqlx::Error::PoolClosed.into();
        assert!(matches!(storage_err, StorageError::Connection(_)));
    }

    #[test]
    fn error_display_includes_detail() {
        let err = StorageError::Configuration("REDIS_URL must be set".to_string());
        assert_eq!(err.to_string(), "configuration error: REDIS_URL must be set");

        let err = StorageError::NotFound("control_execution 42".to_string());
        assert_eq!(err.to_string(), "not found: control_execution 42");
    }
}
