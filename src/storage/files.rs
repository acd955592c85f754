//! File-backed key persistence.
//!
//! The key pair lives in `private_key.pem` and `public_key.pem` inside a
//! configured directory.

use crate::errors::StorageError;
use crate::storage::traits::{KeyPersistence, PemKeyPair, Result};
use async_trait::async_trait;
use std::path::PathBuf;

pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";

/// Key pair stored as two PEM files
pub struct FileKeyPersistence {
    directory: PathBuf,
}

impl FileKeyPersistence {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn private_key_path(&self) -> PathBuf {
        self.directory.join(PRIVATE_KEY_FILE)
    }

    fn public_key_path(&self) -> PathBuf {
        self.directory.join(PUBLIC_KEY_FILE)
    }
}

async fn read_optional(path: &PathBuf) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::QueryFailed(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

#[async_trait]
impl KeyPersistence for FileKeyPersistence {
    async fn load(&self) -> Result<Option<PemKeyPair>> {
        let private_key_pem = read_optional(&self.private_key_path()).await?;
        let public_key_pem = read_optional(&self.public_key_path()).await?;

        match (private_key_pem, public_key_pem) {
            (Some(private_key_pem), Some(public_key_pem)) => Ok(Some(PemKeyPair {
                private_key_pem,
                public_key_pem,
            })),
            (None, None) => Ok(None),
            _ => Err(StorageError::InvalidData(
                "only one half of the key pair is present".to_string(),
            )),
        }
    }

    async fn save(&self, keys: &PemKeyPair) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| {
                StorageError::QueryFailed(format!(
                    "Failed to create {}: {}",
                    self.directory.display(),
                    e
                ))
            })?;

        for (path, contents) in [
            (self.private_key_path(), &keys.private_key_pem),
            (self.public_key_path(), &keys.public_key_pem),
        ] {
            tokio::fs::write(&path, contents.as_bytes())
                .await
                .map_err(|e| {
                    StorageError::QueryFailed(format!("Failed to write {}: {}", path.display(), e))
                })?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(self.private_key_path(), permissions)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("Failed to chmod key: {}", e)))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("oaks-keys-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_missing_directory_loads_nothing() {
        let persistence = FileKeyPersistence::new(temp_dir());
        assert!(persistence.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let directory = temp_dir();
        let persistence = FileKeyPersistence::new(&directory);
        let keys = PemKeyPair {
            private_key_pem: "private".to_string(),
            public_key_pem: "public".to_string(),
        };
        persistence.save(&keys).await.unwrap();

        let loaded = persistence.load().await.unwrap().unwrap();
        assert_eq!(loaded.private_key_pem, "private");
        assert_eq!(loaded.public_key_pem, "public");

        tokio::fs::remove_file(directory.join(PUBLIC_KEY_FILE))
            .await
            .unwrap();
        assert!(persistence.load().await.is_err());

        let _ = tokio::fs::remove_dir_all(directory).await;
    }
}
