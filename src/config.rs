//! Storage Configuration
//!
//! Explicit configuration for backend selection and connection settings.
//! A config value is passed to provider constructors directly; there is no
//! process-wide registry. Construction fails fast on an unsupported backend
//! name or a missing/malformed URL, before any connection is attempted.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default SQLite database file, created on first use.
const DEFAULT_SQLITE_URL: &str = "sqlite://agent_storage.db?mode=rwc";

/// Supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Sqlite,
    Redis,
}

impl StorageBackend {
    /// All recognized backend names, for error messages.
    pub const NAMES: [&'static str; 3] = ["postgres", "sqlite", "redis"];
}

impl FromStr for StorageBackend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            "redis" => Ok(Self::Redis),
            other => Err(StorageError::Configuration(format!(
                "unsupported storage backend {other:?}, expected one of: {}",
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::Redis => "redis",
        };
        f.write_str(name)
    }
}

/// Storage connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Selected backend for this provider
    pub backend: StorageBackend,

    /// PostgreSQL connection URL
    pub postgres_url: Option<String>,

    /// SQLite connection URL
    pub sqlite_url: Option<String>,

    /// Redis connection URL
    pub redis_url: Option<String>,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Connection acquisition timeout. Timeouts are a connection-level
    /// setting, not a per-call parameter.
    pub connect_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            postgres_url: None,
            sqlite_url: Some(DEFAULT_SQLITE_URL.to_string()),
            redis_url: None,
            max_connections: 10,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl StorageConfig {
    /// Build a config for one backend from its URL, with default pool settings.
    pub fn for_backend(backend: StorageBackend, url: impl Into<String>) -> Self {
        let url = url.into();
        let mut config = Self {
            backend,
            sqlite_url: None,
            ..Self::default()
        };
        match backend {
            StorageBackend::Postgres => config.postgres_url = Some(url),
            StorageBackend::Sqlite => config.sqlite_url = Some(url),
            StorageBackend::Redis => config.redis_url = Some(url),
        }
        config
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `STORAGE_BACKEND` (defaults to `sqlite`), the per-backend URLs
    /// `POSTGRES_DATABASE_URL`, `SQLITE_DATABASE_URL`, `REDIS_URL`, and the
    /// pool settings `STORAGE_MAX_CONNECTIONS` and
    /// `STORAGE_CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> StorageResult<Self> {
        let mut config = Self::default();

        if let Ok(backend) = env::var("STORAGE_BACKEND") {
            config.backend = backend.parse()?;
        }

        if let Ok(url) = env::var("POSTGRES_DATABASE_URL") {
            config.postgres_url = Some(url);
        }
        if let Ok(url) = env::var("SQLITE_DATABASE_URL") {
            config.sqlite_url = Some(url);
        }
        if let Ok(url) = env::var("REDIS_URL") {
            config.redis_url = Some(url);
        }

        if let Ok(max) = env::var("STORAGE_MAX_CONNECTIONS") {
            config.max_connections = max.parse().map_err(|_| {
                StorageError::Configuration("invalid STORAGE_MAX_CONNECTIONS".to_string())
            })?;
        }
        if let Ok(secs) = env::var("STORAGE_CONNECT_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                StorageError::Configuration("invalid STORAGE_CONNECT_TIMEOUT_SECS".to_string())
            })?;
            config.connect_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate that the selected backend has a URL with a matching scheme.
    pub fn validate(&self) -> StorageResult<()> {
        if self.max_connections == 0 {
            return Err(StorageError::Configuration(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        let url = self.backend_url()?;
        let parsed = Url::parse(url).map_err(|e| {
            StorageError::Configuration(format!("invalid {} URL: {e}", self.backend))
        })?;

        let scheme_ok = match self.backend {
            StorageBackend::Postgres => {
                matches!(parsed.scheme(), "postgres" | "postgresql")
            }
            StorageBackend::Sqlite => parsed.scheme() == "sqlite",
            StorageBackend::Redis => matches!(parsed.scheme(), "redis" | "rediss"),
        };
        if !scheme_ok {
            return Err(StorageError::Configuration(format!(
                "{} URL has unexpected scheme {:?}",
                self.backend,
                parsed.scheme()
            )));
        }

        Ok(())
    }

    /// The connection URL for the selected backend.
    pub(crate) fn backend_url(&self) -> StorageResult<&str> {
        let (url, var) = match self.backend {
            StorageBackend::Postgres => (&self.postgres_url, "POSTGRES_DATABASE_URL"),
            StorageBackend::Sqlite => (&self.sqlite_url, "SQLITE_DATABASE_URL"),
            StorageBackend::Redis => (&self.redis_url, "REDIS_URL"),
        };
        url.as_deref().ok_or_else(|| {
            StorageError::Configuration(format!(
                "{var} must be set for the {} backend",
                self.backend
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_recognized_names() {
        assert_eq!(
            "postgres".parse::<StorageBackend>().unwrap(),
            StorageBackend::Postgres
        );
        assert_eq!(
            "sqlite".parse::<StorageBackend>().unwrap(),
            StorageBackend::Sqlite
        );
        assert_eq!(
            "redis".parse::<StorageBackend>().unwrap(),
            StorageBackend::Redis
        );
    }

    #[test]
    fn backend_rejects_unknown_name() {
        let err = "mongodb".parse::<StorageBackend>().unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
        assert!(err.to_string().contains("mongodb"));
    }

    #[test]
    fn default_config_targets_sqlite() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageBackend::Sqlite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_url_for_selected_backend_is_rejected() {
        let config = StorageConfig {
            backend: StorageBackend::Postgres,
            postgres_url: None,
            ..StorageConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
        assert!(err.to_string().contains("POSTGRES_DATABASE_URL"));
    }

    #[test]
    fn mismatched_scheme_is_rejected() {
        let config =
            StorageConfig::for_backend(StorageBackend::Redis, "http://localhost:6379");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[test]
    fn for_backend_sets_only_the_selected_url() {
        let config =
            StorageConfig::for_backend(StorageBackend::Redis, "redis://localhost:6379");
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert!(config.postgres_url.is_none());
        assert!(config.sqlite_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_max_connections_is_rejected() {
        let config = StorageConfig {
            max_connections: 0,
            ..StorageConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(StorageError::Configuration(_))
        ));
    }
}
