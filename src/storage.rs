use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use url::Url;

use crate::error::HarvestError;

/// Persists small binary artifacts such as cover images
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return a durable reference to them
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, HarvestError>;
}

/// Stores blobs as files below a root directory and hands out `file://` URLs
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn storage_error(e: std::io::Error) -> HarvestError {
    HarvestError::Internal(format!("blob storage failed: {}", e))
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, HarvestError> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') {
            return Err(HarvestError::Internal(format!("invalid blob key '{}'", key)));
        }

        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage_error)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(storage_error)?;

        let absolute = tokio::fs::canonicalize(&path).await.map_err(storage_error)?;
        let reference = Url::from_file_path(&absolute)
            .map(String::from)
            .map_err(|_| HarvestError::Internal(format!("no URL for {}", absolute.display())))?;

        debug!("Stored {} ({} bytes, {})", reference, bytes.len(), content_type);
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let reference = store.put("covers/job-1.jpg", b"\xff\xd8jpeg", "image/jpeg").await.unwrap();

        assert!(reference.starts_with("file://"));
        assert!(reference.ends_with("covers/job-1.jpg"));
        let path = Url::parse(&reference).unwrap().to_file_path().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"\xff\xd8jpeg");
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        assert!(store.put("../outside.jpg", b"x", "image/jpeg").await.is_err());
        assert!(store.put("/etc/passwd", b"x", "text/plain").await.is_err());
    }
}
