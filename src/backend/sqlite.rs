//! SQLite Backend
//!
//! Same document-table mapping as the PostgreSQL backend, expressed with
//! SQLite's JSON1 functions and TEXT storage. Suited to single-node
//! deployments and hermetic tests.

use super::{decode_record, encode_record, validate_kind};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::record::StorageRecord;
use crate::repository::Repository;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Connection owner for the SQLite backend.
#[derive(Clone, Debug)]
pub struct SqliteProvider {
    pool: SqlitePool,
    ensured: Arc<Mutex<HashSet<&'static str>>>,
}

impl SqliteProvider {
    /// Establish the connection pool for this scope.
    pub async fn connect(config: &StorageConfig, url: &str) -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(url)
            .await?;

        Ok(Self {
            pool,
            ensured: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Repository for one record type, backed by this provider's pool.
    pub async fn repository<T: StorageRecord>(&self) -> StorageResult<SqliteRepository<T>> {
        validate_kind(T::KIND)?;
        self.ensure_schema(T::KIND).await?;
        Ok(SqliteRepository {
            pool: self.pool.clone(),
            _record: PhantomData,
        })
    }

    async fn ensure_schema(&self, kind: &'static str) -> StorageResult<()> {
        let known = self
            .ensured
            .lock()
            .map_err(|_| StorageError::Backend("schema registry poisoned".to_string()))?
            .contains(kind);
        if known {
            return Ok(());
        }

        tracing::debug!(table = kind, "ensuring sqlite table");
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {kind} (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
            )"
        );
        sqlx::query(&ddl).execute(&self.pool).await?;

        self.ensured
            .lock()
            .map_err(|_| StorageError::Backend("schema registry poisoned".to_string()))?
            .insert(kind);
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// SQLite repository for one record type.
pub struct SqliteRepository<T: StorageRecord> {
    pool: SqlitePool,
    _record: PhantomData<T>,
}

#[async_trait]
impl<T: StorageRecord> Repository<T> for SqliteRepository<T> {
    async fn get(&self, id: Uuid) -> StorageResult<Option<T>> {
        let sql = format!("SELECT data FROM {} WHERE id = ?1", T::KIND);
        let raw: Option<String> = sqlx::query_scalar(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        raw.as_deref().map(decode_record).transpose()
    }

    async fn get_many(&self, ids: &[Uuid]) -> StorageResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT data FROM {} WHERE id IN (", T::KIND));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        builder.push(")");

        let rows: Vec<String> = builder.build_query_scalar().fetch_all(&self.pool).await?;
        rows.iter().map(|raw| decode_record(raw)).collect()
    }

    async fn create(&self, record: &T) -> StorageResult<T> {
        let sql = format!(
            "INSERT INTO {} (id, data, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            T::KIND
        );
        sqlx::query(&sql)
            .bind(record.id().to_string())
            .bind(encode_record(record)?)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(record.clone())
    }

    async fn update(&self, record: &T) -> StorageResult<T> {
        let sql = format!(
            "UPDATE {} SET data = ?2, updated_at = ?3 WHERE id = ?1",
            T::KIND
        );
        let result = sqlx::query(&sql)
            .bind(record.id().to_string())
            .bind(encode_record(record)?)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "{} {}",
                T::KIND,
                record.id()
            )));
        }
        Ok(record.clone())
    }

    async fn delete(&self, id: Uuid) -> StorageResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", T::KIND);
        let result = sqlx::query(&sql)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> StorageResult<Vec<T>> {
        let sql = format!("SELECT data FROM {} ORDER BY created_at", T::KIND);
        let rows: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(|raw| decode_record(raw)).collect()
    }

    async fn append_json_field(
        &self,
        id: Uuid,
        field: &str,
        value: &Value,
    ) -> StorageResult<bool> {
        // One UPDATE; json_insert with the '[#]' path appends in place.
        let sql = format!(
            "UPDATE {} SET data = CASE
                WHEN json_extract(data, ?2) IS NULL
                    THEN json_set(data, ?2, json_array(json(?3)))
                ELSE json_insert(data, ?2 || '[#]', json(?3))
            END, updated_at = ?4 WHERE id = ?1",
            T::KIND
        );
        let result = sqlx::query(&sql)
            .bind(id.to_string())
            .bind(format!("$.{field}"))
            .bind(serde_json::to_string(value)?)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
