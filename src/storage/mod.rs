//! Trait-based storage abstractions with in-memory, SQLite, Redis and file backends.

pub mod files;
pub mod housekeeping;
pub mod inmemory;
pub mod traits;

// Feature-gated storage implementations
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "redis")]
pub mod redis;

// Re-export commonly used types and traits
pub use files::FileKeyPersistence;
pub use housekeeping::{CleanupReport, cleanup_expired_credentials};
pub use inmemory::{MemoryAccountStorage, MemoryOAuthStorage, MemorySessionStorage};
pub use traits::*;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteOAuthStorage;

#[cfg(feature = "redis")]
pub use redis::RedisSessionStorage;

use crate::errors::StorageError;
use std::sync::Arc;

/// Storage backend configuration and factory
#[derive(Clone)]
pub enum StorageBackend {
    Memory,
    #[cfg(feature = "sqlite")]
    Sqlite(String), // Connection string/path
}

/// Session backend configuration
#[derive(Clone)]
pub enum SessionBackend {
    Memory,
    #[cfg(feature = "redis")]
    Redis(String),
}

/// Every persistence collaborator the engines use, resolved for one backend
#[derive(Clone)]
pub struct Storage {
    pub oauth: Arc<dyn OAuthStorage>,
    pub scopes: Arc<dyn ScopeStore>,
    pub keys: Arc<dyn KeyPersistence>,
    pub users: Arc<dyn UserDirectory>,
    pub consents: Arc<dyn ConsentOracle>,
}

impl Storage {
    /// Memory storage for everything, with keys in memory as well
    pub fn memory() -> Self {
        let oauth = Arc::new(MemoryOAuthStorage::new());
        let accounts = Arc::new(MemoryAccountStorage::new());
        Self {
            oauth: oauth.clone(),
            scopes: oauth.clone(),
            keys: oauth,
            users: accounts.clone(),
            consents: accounts,
        }
    }
}

/// Create a storage backend based on configuration.
///
/// The memory backend keeps signing keys on disk under `keys_path` so they
/// survive restarts; the SQLite backend stores them in the database.
pub async fn create_storage_backend(
    backend: StorageBackend,
    keys_path: &str,
) -> std::result::Result<Storage, StorageError> {
    match backend {
        StorageBackend::Memory => {
            let mut storage = Storage::memory();
            storage.keys = Arc::new(FileKeyPersistence::new(keys_path));
            Ok(storage)
        }
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite(database_url) => {
            let options = database_url
                .parse::<sqlx::sqlite::SqliteConnectOptions>()
                .map_err(|e| {
                    StorageError::ConnectionFailed(format!("Invalid SQLite URL: {}", e))
                })?
                .create_if_missing(true);
            let pool = sqlx::SqlitePool::connect_with(options)
                .await
                .map_err(|e| {
                    StorageError::ConnectionFailed(format!("SQLite connection failed: {}", e))
                })?;

            let storage = Arc::new(sqlite::SqliteOAuthStorage::new(pool));

            // Run migrations
            storage.migrate().await?;

            let accounts = storage.account_store();
            Ok(Storage {
                oauth: storage.clone(),
                scopes: storage.clone(),
                keys: storage,
                users: accounts.clone(),
                consents: accounts,
            })
        }
    }
}

/// Parse storage backend from configuration string
pub fn parse_storage_backend(
    backend_name: &str,
    database_url: Option<&str>,
) -> std::result::Result<StorageBackend, StorageError> {
    match backend_name {
        "memory" => Ok(StorageBackend::Memory),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let url = database_url.unwrap_or("sqlite:oaks.db");
            Ok(StorageBackend::Sqlite(url.to_string()))
        }
        _ => {
            let _ = database_url;
            Err(StorageError::InvalidData(format!(
                "Unknown storage backend: {}",
                backend_name
            )))
        }
    }
}

/// Create the session oracle
pub fn create_session_backend(
    backend: SessionBackend,
) -> std::result::Result<Arc<dyn SessionOracle>, StorageError> {
    match backend {
        SessionBackend::Memory => Ok(Arc::new(MemorySessionStorage::new())),
        #[cfg(feature = "redis")]
        SessionBackend::Redis(redis_url) => Ok(Arc::new(RedisSessionStorage::new(&redis_url)?)),
    }
}

/// Parse session backend from configuration string
pub fn parse_session_backend(
    backend_name: &str,
    redis_url: Option<&str>,
) -> std::result::Result<SessionBackend, StorageError> {
    match backend_name {
        "memory" => Ok(SessionBackend::Memory),
        #[cfg(feature = "redis")]
        "redis" => {
            let url = redis_url.ok_or_else(|| {
                StorageError::InvalidData("REDIS_URL required for redis sessions".to_string())
            })?;
            Ok(SessionBackend::Redis(url.to_string()))
        }
        _ => {
            let _ = redis_url;
            Err(StorageError::InvalidData(format!(
                "Unknown session backend: {}",
                backend_name
            )))
        }
    }
}
