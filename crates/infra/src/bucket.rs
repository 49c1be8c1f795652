//! Filesystem-backed file bucket.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("file {0} not found")]
    NotFound(String),

    #[error("invalid file key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Named storage areas within the bucket root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketArea {
    Attachments,
    Covers,
}

impl BucketArea {
    pub fn as_str(self) -> &'static str {
        match self {
            BucketArea::Attachments => "attachments",
            BucketArea::Covers => "covers",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attachments" => Some(BucketArea::Attachments),
            "covers" => Some(BucketArea::Covers),
            _ => None,
        }
    }
}

/// Opaque-key file storage rooted at a configured directory.
#[derive(Clone)]
pub struct FileBucket {
    root: PathBuf,
}

impl FileBucket {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store bytes under a fresh random key; returns the key.
    pub async fn upload_file(
        &self,
        area: BucketArea,
        bytes: &[u8],
        extension: &str,
    ) -> Result<String, BucketError> {
        let key = format!("{}.{}", Uuid::now_v7(), extension.trim_start_matches('.'));
        self.write(area, &key, bytes).await?;
        Ok(key)
    }

    /// Store a cover under a caller-chosen key (covers are addressed by
    /// name from the catalog).
    pub async fn upload_cover(&self, key: &str, bytes: &[u8]) -> Result<String, BucketError> {
        self.write(BucketArea::Covers, key, bytes).await?;
        Ok(key.to_string())
    }

    /// Absolute path for a stored key; not-found when absent.
    pub async fn path_for(&self, area: BucketArea, key: &str) -> Result<PathBuf, BucketError> {
        let path = self.resolve(area, key)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(BucketError::NotFound(key.to_string()));
        }
        Ok(path)
    }

    pub async fn read(&self, area: BucketArea, key: &str) -> Result<Vec<u8>, BucketError> {
        let path = self.path_for(area, key).await?;
        Ok(tokio::fs::read(path).await?)
    }

    pub async fn exists(&self, area: BucketArea, key: &str) -> bool {
        self.path_for(area, key).await.is_ok()
    }

    pub async fn delete(&self, area: BucketArea, key: &str) -> Result<(), BucketError> {
        let path = self.path_for(area, key).await?;
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    async fn write(&self, area: BucketArea, key: &str, bytes: &[u8]) -> Result<(), BucketError> {
        let path = self.resolve(area, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    /// Keys are opaque single-segment names; anything that could walk out
    /// of the area is rejected.
    fn resolve(&self, area: BucketArea, key: &str) -> Result<PathBuf, BucketError> {
        if key.is_empty() || key.contains('/') || key.contains("..") || key.contains('\\') {
            return Err(BucketError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(area.as_str()).join(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(name: &str) -> FileBucket {
        FileBucket::new(std::env::temp_dir().join(format!("coffer-bucket-test-{name}")))
    }

    #[tokio::test]
    async fn upload_read_delete_roundtrip() {
        let bucket = bucket("roundtrip");

        let key = bucket
            .upload_file(BucketArea::Attachments, b"contract bytes", "pdf")
            .await
            .unwrap();
        assert!(key.ends_with(".pdf"));

        let bytes = bucket.read(BucketArea::Attachments, &key).await.unwrap();
        assert_eq!(bytes, b"contract bytes");
        assert!(bucket.exists(BucketArea::Attachments, &key).await);

        bucket.delete(BucketArea::Attachments, &key).await.unwrap();
        assert!(!bucket.exists(BucketArea::Attachments, &key).await);
    }

    #[tokio::test]
    async fn missing_keys_are_not_found() {
        let bucket = bucket("missing");
        let err = bucket
            .read(BucketArea::Covers, "nope.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, BucketError::NotFound(_)));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let bucket = bucket("traversal");
        let err = bucket
            .path_for(BucketArea::Attachments, "../outside")
            .await
            .unwrap_err();
        assert!(matches!(err, BucketError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn covers_keep_their_caller_chosen_key() {
        let bucket = bucket("covers");
        let key = bucket.upload_cover("book-1.jpg", b"jpeg").await.unwrap();
        assert_eq!(key, "book-1.jpg");
        assert!(bucket.exists(BucketArea::Covers, &key).await);
    }
}
