//! Repository Contracts
//!
//! One generic CRUD contract over a record type, instantiated for two
//! execution disciplines: a suspendable (async) trait implemented by each
//! backend adapter, and a blocking trait served by a facade that drives the
//! async adapters on a dedicated runtime. The two disciplines must not be
//! mixed within one logical operation.
//!
//! Every operation is a single statement or command against the backend, so
//! a suspendable operation that is cancelled mid-flight has either fully
//! applied or not executed at all.

use crate::error::StorageResult;
use crate::record::StorageRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Runtime;
use uuid::Uuid;

/// Suspendable repository contract over a record type.
#[async_trait]
pub trait Repository<T: StorageRecord>: Send + Sync {
    /// Retrieve a record by identifier. A missing record is `Ok(None)`.
    async fn get(&self, id: Uuid) -> StorageResult<Option<T>>;

    /// Retrieve multiple records by identifier, skipping absent ids.
    async fn get_many(&self, ids: &[Uuid]) -> StorageResult<Vec<T>>;

    /// Persist a new record and return the stored value. A duplicate
    /// identifier yields [`StorageError::Conflict`](crate::StorageError).
    async fn create(&self, record: &T) -> StorageResult<T>;

    /// Replace an existing record. Yields
    /// [`StorageError::NotFound`](crate::StorageError) when the identifier
    /// does not exist.
    async fn update(&self, record: &T) -> StorageResult<T>;

    /// Remove a record. Returns whether anything was removed; absence is not
    /// an error.
    async fn delete(&self, id: Uuid) -> StorageResult<bool>;

    /// All records of this type visible to the current scope.
    async fn list(&self) -> StorageResult<Vec<T>>;

    /// Atomically append a value to a JSON array field of the stored record.
    /// Returns false when the record is absent.
    async fn append_json_field(&self, id: Uuid, field: &str, value: &Value)
        -> StorageResult<bool>;
}

/// Blocking repository contract, mirroring [`Repository`].
pub trait SyncRepository<T: StorageRecord>: Send + Sync {
    fn get(&self, id: Uuid) -> StorageResult<Option<T>>;
    fn get_many(&self, ids: &[Uuid]) -> StorageResult<Vec<T>>;
    fn create(&self, record: &T) -> StorageResult<T>;
    fn update(&self, record: &T) -> StorageResult<T>;
    fn delete(&self, id: Uuid) -> StorageResult<bool>;
    fn list(&self) -> StorageResult<Vec<T>>;
    fn append_json_field(&self, id: Uuid, field: &str, value: &Value) -> StorageResult<bool>;
}

/// Blocking facade over an async repository.
///
/// Runs each operation to completion on the caller's thread via a runtime
/// owned by the enclosing [`SyncStorageProvider`](crate::SyncStorageProvider).
/// Both disciplines therefore share one set of adapters; the translation and
/// validation logic is never duplicated. Must not be used from within an
/// async context.
pub struct BlockingRepository<T: StorageRecord> {
    inner: Box<dyn Repository<T>>,
    runtime: Arc<Runtime>,
}

impl<T: StorageRecord> BlockingRepository<T> {
    pub(crate) fn new(inner: Box<dyn Repository<T>>, runtime: Arc<Runtime>) -> Self {
        Self { inner, runtime }
    }
}

impl<T: StorageRecord> SyncRepository<T> for BlockingRepository<T> {
    fn get(&self, id: Uuid) -> StorageResult<Option<T>> {
        self.runtime.block_on(self.inner.get(id))
    }

    fn get_many(&self, ids: &[Uuid]) -> StorageResult<Vec<T>> {
        self.runtime.block_on(self.inner.get_many(ids))
    }

    fn create(&self, record: &T) -> StorageResult<T> {
        self.runtime.block_on(self.inner.create(record))
    }

    fn update(&self, record: &T) -> StorageResult<T> {
        self.runtime.block_on(self.inner.update(record))
    }

    fn delete(&self, id: Uuid) -> StorageResult<bool> {
        self.runtime.block_on(self.inner.delete(id))
    }

    fn list(&self) -> StorageResult<Vec<T>> {
        self.runtime.block_on(self.inner.list())
    }

    fn append_json_field(&self, id: Uuid, field: &str, value: &Value) -> StorageResult<bool> {
        self.runtime
            .block_on(self.inner.append_json_field(id, field, value))
    }
}
