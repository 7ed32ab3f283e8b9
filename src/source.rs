//! Access to uploaded document bytes.
//!
//! The storage layer announces uploads with a [`StorageEvent`]; the
//! ingestion pipeline then pulls the object through a [`DocumentSource`].
//! [`FsDocumentSource`] serves buckets laid out as directories under
//! `[storage].root`.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::error::PipelineError;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, bucket: &str, name: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Buckets as directories: object `name` in `bucket` lives at
/// `<root>/<bucket>/<name>`.
pub struct FsDocumentSource {
    root: PathBuf,
}

impl FsDocumentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an object path, refusing anything that would escape the root.
    pub fn resolve(&self, bucket: &str, name: &str) -> Result<PathBuf, PipelineError> {
        for part in [bucket, name] {
            if part.is_empty() || !is_contained(Path::new(part)) {
                return Err(PipelineError::SourceUnavailable(format!(
                    "invalid object path: {}/{}",
                    bucket, name
                )));
            }
        }
        Ok(self.root.join(bucket).join(name))
    }
}

fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn fetch(&self, bucket: &str, name: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.resolve(bucket, name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_rejects_traversal() {
        let src = FsDocumentSource::new("/srv/buckets");
        assert!(src.resolve("manuals", "../../etc/passwd").is_err());
        assert!(src.resolve("..", "x.pdf").is_err());
        assert!(src.resolve("manuals", "/etc/passwd").is_err());
        assert!(src.resolve("", "x.pdf").is_err());
        let ok = src.resolve("manuals", "uploads/a.pdf").unwrap();
        assert_eq!(ok, PathBuf::from("/srv/buckets/manuals/uploads/a.pdf"));
    }

    #[tokio::test]
    async fn test_fetch_reads_object() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("manuals").join("uploads");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.pdf"), b"%PDF-1.4").unwrap();

        let src = FsDocumentSource::new(tmp.path());
        let bytes = src.fetch("manuals", "uploads/a.pdf").await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4");

        let err = src.fetch("manuals", "uploads/missing.pdf").await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    }
}
