//! Redis Backend
//!
//! Stores each record as a serialized JSON document under a namespaced key
//! (`{kind}:{id}`). Redis has no uniqueness constraint, so `create` relies on
//! the atomic `SET NX` primitive and `update` on `SET XX`; there is no
//! check-then-set window. `list` scans the record type's namespace, which is
//! an O(keyspace) operation and priced accordingly.

use super::{decode_record, encode_record, validate_kind};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::record::StorageRecord;
use crate::repository::Repository;
use async_trait::async_trait;
use deadpool_redis::redis::{cmd, AsyncCommands};
use deadpool_redis::{Config as RedisPoolConfig, Pool, PoolConfig, Runtime};
use serde_json::Value;
use std::marker::PhantomData;
use uuid::Uuid;

/// Server-side append to a JSON array field of a stored document. Runs as a
/// script so concurrent appends to the same record cannot lose updates.
const APPEND_JSON_FIELD_SCRIPT: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local doc = cjson.decode(raw)
local current = doc[ARGV[1]]
if type(current) ~= 'table' then current = {} end
table.insert(current, cjson.decode(ARGV[2]))
doc[ARGV[1]] = current
redis.call('SET', KEYS[1], cjson.encode(doc))
return 1
";

fn record_key<T: StorageRecord>(id: Uuid) -> String {
    format!("{}:{id}", T::KIND)
}

/// Connection owner for the Redis backend.
#[derive(Clone, Debug)]
pub struct RedisProvider {
    pool: Pool,
}

impl RedisProvider {
    /// Establish the connection pool for this scope and verify the server
    /// is reachable.
    pub async fn connect(config: &StorageConfig, url: &str) -> StorageResult<Self> {
        let mut cfg = RedisPoolConfig::from_url(url);
        let mut pool_cfg = PoolConfig::new(config.max_connections as usize);
        pool_cfg.timeouts.create = Some(config.connect_timeout);
        pool_cfg.timeouts.wait = Some(config.connect_timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;

        let mut conn = pool.get().await?;
        let _: String = cmd("PING").query_async(&mut conn).await?;

        Ok(Self { pool })
    }

    /// Repository for one record type, backed by this provider's pool.
    pub fn repository<T: StorageRecord>(&self) -> StorageResult<RedisRepository<T>> {
        validate_kind(T::KIND)?;
        Ok(RedisRepository {
            pool: self.pool.clone(),
            _record: PhantomData,
        })
    }

    pub fn close(&self) {
        self.pool.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Redis repository for one record type.
pub struct RedisRepository<T: StorageRecord> {
    pool: Pool,
    _record: PhantomData<T>,
}

impl<T: StorageRecord> RedisRepository<T> {
    async fn fetch_by_keys(
        &self,
        conn: &mut deadpool_redis::Connection,
        keys: &[String],
    ) -> StorageResult<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let raws: Vec<Option<String>> = conn.mget(keys).await?;
        raws.iter()
            .flatten()
            .map(|raw| decode_record(raw))
            .collect()
    }
}

#[async_trait]
impl<T: StorageRecord> Repository<T> for RedisRepository<T> {
    async fn get(&self, id: Uuid) -> StorageResult<Option<T>> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.get(record_key::<T>(id)).await?;
        raw.as_deref().map(decode_record).transpose()
    }

    async fn get_many(&self, ids: &[Uuid]) -> StorageResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| record_key::<T>(*id)).collect();
        let mut conn = self.pool.get().await?;
        self.fetch_by_keys(&mut conn, &keys).await
    }

    async fn create(&self, record: &T) -> StorageResult<T> {
        let payload = encode_record(record)?;
        let mut conn = self.pool.get().await?;
        let reply: Option<String> = cmd("SET")
            .arg(record_key::<T>(record.id()))
            .arg(&payload)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        if reply.is_none() {
            return Err(StorageError::Conflict(format!(
                "{} {} already exists",
                T::KIND,
                record.id()
            )));
        }
        Ok(record.clone())
    }

    async fn update(&self, record: &T) -> StorageResult<T> {
        let payload = encode_record(record)?;
        let mut conn = self.pool.get().await?;
        let reply: Option<String> = cmd("SET")
            .arg(record_key::<T>(record.id()))
            .arg(&payload)
            .arg("XX")
            .query_async(&mut conn)
            .await?;
        if reply.is_none() {
            return Err(StorageError::NotFound(format!(
                "{} {}",
                T::KIND,
                record.id()
            )));
        }
        Ok(record.clone())
    }

    async fn delete(&self, id: Uuid) -> StorageResult<bool> {
        let mut conn = self.pool.get().await?;
        let removed: u32 = conn.del(record_key::<T>(id)).await?;
        Ok(removed > 0)
    }

    async fn list(&self) -> StorageResult<Vec<T>> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{}:*", T::KIND);
        let keys: Vec<String> = {
            let mut iter = conn.scan_match::<_, String>(&pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };
        self.fetch_by_keys(&mut conn, &keys).await
    }

    async fn append_json_field(
        &self,
        id: Uuid,
        field: &str,
        value: &Value,
    ) -> StorageResult<bool> {
        let mut conn = self.pool.get().await?;
        let updated: i64 = cmd("EVAL")
            .arg(APPEND_JSON_FIELD_SCRIPT)
            .arg(1)
            .arg(record_key::<T>(id))
            .arg(field)
            .arg(serde_json::to_string(value)?)
            .query_async(&mut conn)
            .await?;
        Ok(updated > 0)
    }
}
