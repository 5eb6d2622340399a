//! Artifact storage for finished reports.

use async_trait::async_trait;
use service_core::error::AppError;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError>;
    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError>;
    /// Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

/// Storage key of the artifact produced for a report token.
pub fn artifact_key(token: &str) -> String {
    format!("reports/{}.json", token)
}

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await.map_err(|e| {
            AppError::StorageError(anyhow::anyhow!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(Self { base_path })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, AppError> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
            return Err(AppError::StorageError(anyhow::anyhow!(
                "Invalid storage key: {}",
                key
            )));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write next to the target and rename so readers never see a partial file.
        let staging = path.with_extension("partial");
        fs::write(&staging, data).await.map_err(|e| {
            AppError::StorageError(anyhow::anyhow!("Failed to write {}: {}", key, e))
        })?;
        fs::rename(&staging, &path).await.map_err(|e| {
            AppError::StorageError(anyhow::anyhow!("Failed to publish {}: {}", key, e))
        })?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.resolve(key)?;
        fs::read(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::NotFound(anyhow::anyhow!("Artifact {} not found", key)),
            _ => AppError::StorageError(anyhow::anyhow!("Failed to read {}: {}", key, e)),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.resolve(key)?;
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::StorageError(anyhow::anyhow!(
                "Failed to delete {}: {}",
                key,
                e
            ))),
        }
    }
}
