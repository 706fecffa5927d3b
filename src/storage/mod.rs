//! Image storage for school and user photos.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::AppError;

/// Placeholder served when a school has no photo; never destroyed.
pub const DEFAULT_SCHOOL_IMAGE: &str = "/uploads/no-photo-school.jpg";
/// Placeholder served when a user has no photo; never destroyed.
pub const DEFAULT_USER_IMAGE: &str = "/uploads/no-photo-user.jpg";

#[derive(Debug, Clone)]
pub struct StoredImage {
    /// Public URL for rendering.
    pub url: String,
    /// Opaque handle used to destroy the object later.
    pub handle: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn store(&self, bytes: &[u8], original_filename: &str) -> Result<StoredImage, AppError>;
    async fn destroy(&self, handle: &str) -> Result<(), AppError>;
}

/// Whether an image URL points at one of the bundled placeholders.
pub fn is_placeholder(url: &str) -> bool {
    url == DEFAULT_SCHOOL_IMAGE || url == DEFAULT_USER_IMAGE
}

/// Stores uploads as uuid-named files under the local uploads directory.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn store(&self, bytes: &[u8], original_filename: &str) -> Result<StoredImage, AppError> {
        let extension = PathBuf::from(original_filename)
            .extension()
            .and_then(|e| e.to_str().map(|s| s.to_string()))
            .or_else(|| {
                mime_guess::from_path(original_filename)
                    .first()
                    .and_then(|m| mime_guess::get_mime_extensions(&m).and_then(|e| e.first()))
                    .map(|e| e.to_string())
            })
            .unwrap_or_else(|| "bin".to_string());

        let filename = format!("{}.{}", uuid::Uuid::now_v7(), extension);
        let path = self.root.join(&filename);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::Internal(format!("create uploads dir: {}", e)))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Internal(format!("write upload: {}", e)))?;

        Ok(StoredImage {
            url: format!("/uploads/{}", filename),
            handle: filename,
        })
    }

    async fn destroy(&self, handle: &str) -> Result<(), AppError> {
        // handles are bare filenames; refuse anything that escapes the root
        if handle.contains('/') || handle.contains("..") {
            return Err(AppError::BadRequest("invalid image handle".into()));
        }
        let path = self.root.join(handle);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Internal(format!("destroy upload: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_writes_file_and_returns_url() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path().to_path_buf());

        let stored = storage.store(b"fake image bytes", "photo.jpg").await.unwrap();
        assert!(stored.url.starts_with("/uploads/"));
        assert!(stored.url.ends_with(".jpg"));
        assert!(tmp.path().join(&stored.handle).exists());
    }

    #[tokio::test]
    async fn destroy_removes_file_and_tolerates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path().to_path_buf());

        let stored = storage.store(b"bytes", "photo.png").await.unwrap();
        storage.destroy(&stored.handle).await.unwrap();
        assert!(!tmp.path().join(&stored.handle).exists());

        // second destroy is a no-op
        storage.destroy(&stored.handle).await.unwrap();
    }

    #[tokio::test]
    async fn destroy_rejects_path_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path().to_path_buf());

        assert!(storage.destroy("../etc/passwd").await.is_err());
    }

    #[test]
    fn placeholders_are_recognized() {
        assert!(is_placeholder(DEFAULT_SCHOOL_IMAGE));
        assert!(is_placeholder(DEFAULT_USER_IMAGE));
        assert!(!is_placeholder("/uploads/123.jpg"));
    }
}
