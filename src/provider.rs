//! Repository Providers and Scoped Acquisition
//!
//! A provider owns the connection resource for one selected backend and
//! hands out repositories for any number of record types over that single
//! resource. The scoped acquisition helpers establish the connection on
//! entry and release it on every exit path; errors from the caller's block
//! are never swallowed.

use crate::backend::{PostgresProvider, RedisProvider, SqliteProvider};
use crate::config::{StorageBackend, StorageConfig};
use crate::error::{StorageError, StorageResult};
use crate::record::StorageRecord;
use crate::repository::{BlockingRepository, Repository};
use std::future::Future;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Suspendable repository provider, bound to one backend.
///
/// Cloning is cheap and shares the underlying connection resource; closing
/// any clone closes the resource for all of them.
#[derive(Clone, Debug)]
pub enum StorageProvider {
    Postgres(PostgresProvider),
    Sqlite(SqliteProvider),
    Redis(RedisProvider),
}

impl StorageProvider {
    /// Validate the configuration and establish the backend connection.
    ///
    /// Configuration problems (unsupported backend, missing or malformed
    /// URL) are reported before any connection is attempted; an unreachable
    /// backend is reported as a connection error.
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        config.validate()?;
        let url = config.backend_url()?;

        tracing::info!(backend = %config.backend, "connecting storage provider");
        let provider = match config.backend {
            StorageBackend::Postgres => {
                Self::Postgres(PostgresProvider::connect(config, url).await?)
            }
            StorageBackend::Sqlite => {
                Self::Sqlite(SqliteProvider::connect(config, url).await?)
            }
            StorageBackend::Redis => Self::Redis(RedisProvider::connect(config, url).await?),
        };
        Ok(provider)
    }

    /// The backend this provider is bound to.
    pub fn backend(&self) -> StorageBackend {
        match self {
            Self::Postgres(_) => StorageBackend::Postgres,
            Self::Sqlite(_) => StorageBackend::Sqlite,
            Self::Redis(_) => StorageBackend::Redis,
        }
    }

    /// Repository for one record type, reusing this provider's connection.
    /// Relational backends ensure the record type's table here.
    pub async fn repository<T: StorageRecord>(&self) -> StorageResult<Box<dyn Repository<T>>> {
        match self {
            Self::Postgres(p) => Ok(Box::new(p.repository::<T>().await?)),
            Self::Sqlite(p) => Ok(Box::new(p.repository::<T>().await?)),
            Self::Redis(p) => Ok(Box::new(p.repository::<T>()?)),
        }
    }

    /// Release the underlying connection resource. Idempotent.
    pub async fn close(&self) {
        tracing::info!(backend = %self.backend(), "closing storage provider");
        match self {
            Self::Postgres(p) => p.close().await,
            Self::Sqlite(p) => p.close().await,
            Self::Redis(p) => p.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Postgres(p) => p.is_closed(),
            Self::Sqlite(p) => p.is_closed(),
            Self::Redis(p) => p.is_closed(),
        }
    }
}

/// Blocking repository provider, bound to one backend.
///
/// Owns a dedicated single-threaded runtime that drives the shared adapters
/// to completion on the calling thread. Must not be constructed or used from
/// within an async context.
#[derive(Debug)]
pub struct SyncStorageProvider {
    runtime: Arc<Runtime>,
    inner: StorageProvider,
}

impl SyncStorageProvider {
    /// Validate the configuration and establish the backend connection.
    pub fn connect(config: &StorageConfig) -> StorageResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                StorageError::Backend(format!("failed to start blocking runtime: {e}"))
            })?;
        let runtime = Arc::new(runtime);
        let inner = runtime.block_on(StorageProvider::connect(config))?;
        Ok(Self { runtime, inner })
    }

    /// The backend this provider is bound to.
    pub fn backend(&self) -> StorageBackend {
        self.inner.backend()
    }

    /// Blocking repository for one record type, reusing this provider's
    /// connection.
    pub fn repository<T: StorageRecord>(&self) -> StorageResult<BlockingRepository<T>> {
        let inner = self.runtime.block_on(self.inner.repository::<T>())?;
        Ok(BlockingRepository::new(inner, Arc::clone(&self.runtime)))
    }

    /// Release the underlying connection resource. Idempotent.
    pub fn close(&self) {
        self.runtime.block_on(self.inner.close());
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Run `f` with a connected suspendable provider, releasing the connection
/// on every exit path and propagating the block's outcome unchanged.
pub async fn with_provider<F, Fut, R>(config: &StorageConfig, f: F) -> StorageResult<R>
where
    F: FnOnce(StorageProvider) -> Fut,
    Fut: Future<Output = StorageResult<R>>,
{
    let provider = StorageProvider::connect(config).await?;
    let result = f(provider.clone()).await;
    if result.is_err() {
        tracing::warn!(backend = %provider.backend(), "releasing storage provider after error");
    }
    provider.close().await;
    result
}

/// Run `f` with a connected blocking provider, releasing the connection on
/// every exit path (including a panic unwinding out of `f`) and propagating
/// the block's outcome unchanged.
pub fn with_sync_provider<F, R>(config: &StorageConfig, f: F) -> StorageResult<R>
where
    F: FnOnce(&SyncStorageProvider) -> StorageResult<R>,
{
    let provider = SyncStorageProvider::connect(config)?;
    let outcome = catch_unwind(AssertUnwindSafe(|| f(&provider)));
    if !matches!(outcome, Ok(Ok(_))) {
        tracing::warn!(backend = %provider.backend(), "releasing storage provider after error");
    }
    provider.close();
    match outcome {
        Ok(result) => result,
        Err(panic) => resume_unwind(panic),
    }
}
