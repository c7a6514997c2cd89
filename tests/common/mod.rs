//! Shared fixtures for the repository integration tests.

#![allow(dead_code)]

use agent_storage::{ControlExecution, StorageBackend, StorageConfig};
use std::path::PathBuf;
use uuid::Uuid;

/// Config pointing at a unique throwaway SQLite database file.
pub fn sqlite_test_config() -> (StorageConfig, PathBuf) {
    let path = std::env::temp_dir().join(format!("agent_storage_test_{}.db", Uuid::new_v4()));
    let config = StorageConfig::for_backend(
        StorageBackend::Sqlite,
        format!("sqlite://{}?mode=rwc", path.display()),
    );
    (config, path)
}

/// Best-effort removal of a throwaway database file.
pub fn remove_db_file(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
}

pub fn sample_control() -> ControlExecution {
    ControlExecution::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
}
