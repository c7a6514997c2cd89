//! PostgreSQL Backend
//!
//! Stores each record type in its own document table
//! (`id UUID PRIMARY KEY, data JSONB, created_at, updated_at`). The table is
//! created on first repository acquisition for a record type; uniqueness of
//! the identifier is enforced by the primary key.

use super::{decode_record, encode_record, validate_kind};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::record::StorageRecord;
use crate::repository::Repository;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Connection owner for the PostgreSQL backend.
#[derive(Clone, Debug)]
pub struct PostgresProvider {
    pool: PgPool,
    ensured: Arc<Mutex<HashSet<&'static str>>>,
}

impl PostgresProvider {
    /// Establish the connection pool for this scope.
    pub async fn connect(config: &StorageConfig, url: &str) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
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
    pub async fn repository<T: StorageRecord>(&self) -> StorageResult<PostgresRepository<T>> {
        validate_kind(T::KIND)?;
        self.ensure_schema(T::KIND).await?;
        Ok(PostgresRepository {
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

        tracing::debug!(table = kind, "ensuring postgres table");
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {kind} (
                id UUID PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ
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

/// PostgreSQL repository for one record type.
pub struct PostgresRepository<T: StorageRecord> {
    pool: PgPool,
    _record: PhantomData<T>,
}

#[async_trait]
impl<T: StorageRecord> Repository<T> for PostgresRepository<T> {
    async fn get(&self, id: Uuid) -> StorageResult<Option<T>> {
        let sql = format!("SELECT data::text FROM {} WHERE id = $1", T::KIND);
        let raw: Option<String> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        raw.as_deref().map(decode_record).transpose()
    }

    async fn get_many(&self, ids: &[Uuid]) -> StorageResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT data::text FROM {} WHERE id = ANY($1)", T::KIND);
        let rows: Vec<String> = sqlx::query_scalar(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|raw| decode_record(raw)).collect()
    }

    async fn create(&self, record: &T) -> StorageResult<T> {
        let sql = format!(
            "INSERT INTO {} (id, data, created_at, updated_at) VALUES ($1, $2::jsonb, $3, $3)",
            T::KIND
        );
        sqlx::query(&sql)
            .bind(record.id())
            .bind(encode_record(record)?)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(record.clone())
    }

    async fn update(&self, record: &T) -> StorageResult<T> {
        let sql = format!(
            "UPDATE {} SET data = $2::jsonb, updated_at = $3 WHERE id = $1",
            T::KIND
        );
        let result = sqlx::query(&sql)
            .bind(record.id())
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
        let sql = format!("DELETE FROM {} WHERE id = $1", T::KIND);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> StorageResult<Vec<T>> {
        let sql = format!("SELECT data::text FROM {} ORDER BY created_at", T::KIND);
        let rows: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(|raw| decode_record(raw)).collect()
    }

    async fn append_json_field(
        &self,
        id: Uuid,
        field: &str,
        value: &Value,
    ) -> StorageResult<bool> {
        // One UPDATE; jsonb concatenation makes the append atomic.
        let sql = format!(
            "UPDATE {} SET data = jsonb_set(
                data,
                $2::text[],
                COALESCE(data #> $2::text[], '[]'::jsonb) || jsonb_build_array($3::jsonb)
            ), updated_at = $4 WHERE id = $1",
            T::KIND
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(vec![field.to_string()])
            .bind(serde_json::to_string(value)?)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
