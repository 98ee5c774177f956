//! Local filesystem adapter

use super::StorageAdapter;
use crate::config::StorageKind;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

/// Treats every path as a filesystem path
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorageAdapter;

impl LocalStorageAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageAdapter for LocalStorageAdapter {
    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    #[instrument(skip(self))]
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        if !tokio::fs::try_exists(remote_path).await? {
            return Err(IngestError::NotFound(PathBuf::from(remote_path)));
        }
        info!("Copying local file {} -> {}", remote_path, local_path.display());
        let bytes = tokio::fs::copy(remote_path, local_path).await?;
        debug!(bytes, "Copied local file");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let parent = Path::new(remote_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            tokio::fs::create_dir_all(parent).await?;
        }
        info!("Writing local file {} -> {}", local_path.display(), remote_path);
        let bytes = tokio::fs::copy(local_path, remote_path).await?;
        debug!(bytes, "Wrote local file");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = Path::new(prefix);
        if root.is_file() {
            return Ok(vec![prefix.to_string()]);
        }
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() {
                files.push(entry.path().to_string_lossy().into_owned());
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn path_str(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[tokio::test]
    async fn test_download_missing_source() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.csv");
        let err = LocalStorageAdapter
            .download(path_str(&missing), &dir.path().join("staged.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NotFound(p) if p == missing));
    }

    #[tokio::test]
    async fn test_download_copies_bytes() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("input.csv");
        std::fs::write(&source, b"id\n1\n").unwrap();
        let staged = dir.path().join("staged.csv");

        LocalStorageAdapter
            .download(path_str(&source), &staged)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&staged).unwrap(), b"id\n1\n");
    }

    #[tokio::test]
    async fn test_upload_creates_parents() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("out.parquet");
        std::fs::write(&local, b"PAR1").unwrap();
        let remote = dir.path().join("a/b/c/out.parquet");

        let adapter = LocalStorageAdapter::new();
        assert!(!adapter.exists(path_str(&remote)).await.unwrap());
        adapter.upload(&local, path_str(&remote)).await.unwrap();
        assert!(adapter.exists(path_str(&remote)).await.unwrap());
        assert_eq!(std::fs::read(&remote).unwrap(), b"PAR1");
    }

    #[tokio::test]
    async fn test_list_directory_file_and_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.csv"), b"").unwrap();
        std::fs::write(dir.path().join("a.csv"), b"").unwrap();
        std::fs::write(dir.path().join("nested/c.csv"), b"").unwrap();

        let adapter = LocalStorageAdapter;
        let listed = adapter.list(path_str(dir.path())).await.unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|p| p.strip_prefix(path_str(dir.path())).unwrap().to_string())
            .collect();
        let sep = std::path::MAIN_SEPARATOR;
        assert_eq!(
            names,
            vec![
                format!("{sep}a.csv"),
                format!("{sep}b.csv"),
                format!("{sep}nested{sep}c.csv"),
            ]
        );

        let single = dir.path().join("a.csv");
        assert_eq!(
            adapter.list(path_str(&single)).await.unwrap(),
            vec![path_str(&single).to_string()]
        );

        let missing = dir.path().join("nope");
        assert!(adapter.list(path_str(&missing)).await.unwrap().is_empty());
    }
}
