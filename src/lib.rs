#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, future_incompatible)]
//! Unified storage repositories for agent workflow state
//!
//! This crate persists the workflow engine's control and action execution
//! records behind one CRUD contract with three interchangeable backends:
//! PostgreSQL, SQLite, and Redis. The backend is selected by configuration;
//! repositories for any record type are handed out by a provider that owns
//! the connection resource for its scope.
//!
//! Two execution disciplines are supported end-to-end and must not be mixed
//! within one logical operation: a suspendable (async) discipline for the
//! service path, and a blocking discipline for worker processes without a
//! surrounding runtime.
//!
//! ```no_run
//! use agent_storage::{with_provider, ControlExecution, StorageConfig};
//! use uuid::Uuid;
//!
//! # async fn run() -> agent_storage::StorageResult<()> {
//! let config = StorageConfig::from_env()?;
//! with_provider(&config, |provider| async move {
//!     let repo = provider.repository::<ControlExecution>().await?;
//!     let exec = ControlExecution::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
//!     repo.create(&exec).await?;
//!     Ok(())
//! })
//! .await
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod provider;
pub mod record;
pub mod repository;

pub use config::{StorageBackend, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use provider::{with_provider, with_sync_provider, StorageProvider, SyncStorageProvider};
pub use record::{
    ActionExecution, ActionExecutionStatus, ComplianceStatus, ControlExecution,
    ControlExecutionStatus, StorageRecord,
};
pub use repository::{BlockingRepository, Repository, SyncRepository};
