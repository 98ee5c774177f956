//! S3-compatible object storage adapter
//!
//! The adapter owns path handling, pagination and retries; the wire calls go
//! through an [`ObjectClient`], so any S3-compatible client (or an in-memory
//! fake) can be plugged in.

use super::StorageAdapter;
use crate::config::StorageKind;
use crate::error::{BoxError, IngestError, Result};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

pub const DEFAULT_SCHEME: &str = "s3";

/// One page of a prefix listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,

    /// Token for the next page; `None` on the last page
    pub next_token: Option<String>,
}

/// Raw object-storage operations
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Metadata-only probe. `Ok(false)` when the backend reports not-found
    /// (404 / `NoSuchKey` / `NotFound`); any other failure is an error.
    async fn head_object(&self, bucket: &str, key: &str) -> std::result::Result<bool, BoxError>;

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
    ) -> std::result::Result<(), BoxError>;

    async fn put_object_from_file(
        &self,
        src: &Path,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<(), BoxError>;

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> std::result::Result<ListPage, BoxError>;
}

/// `scheme://bucket/key`, split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath {
    pub scheme: String,
    pub bucket: String,
    pub key: String,
}

impl ObjectPath {
    /// Accepts `scheme://bucket/key` or a bare `bucket/key`. Without a `/`
    /// the whole string is the bucket and the key is empty.
    pub fn parse(path: &str) -> Result<Self> {
        let (scheme, rest) = match path.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => (DEFAULT_SCHEME, path),
        };
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(IngestError::config(format!(
                "object path {path:?} has no bucket"
            )));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            scheme: self.scheme.clone(),
            bucket: self.bucket.clone(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

/// Adapter over an injected [`ObjectClient`]; transfers are retried.
#[derive(Clone)]
pub struct ObjectStorageAdapter {
    client: Arc<dyn ObjectClient>,
    retry: RetryPolicy,
}

impl ObjectStorageAdapter {
    pub fn new(client: Arc<dyn ObjectClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

#[async_trait]
impl StorageAdapter for ObjectStorageAdapter {
    fn kind(&self) -> StorageKind {
        StorageKind::ObjectStorage
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let object = ObjectPath::parse(path)?;
        self.client
            .head_object(&object.bucket, &object.key)
            .await
            .map_err(|e| IngestError::backend(object.to_string(), e))
    }

    #[instrument(skip(self))]
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let object = ObjectPath::parse(remote_path)?;
        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        info!("Downloading {} -> {}", object, local_path.display());

        let client = self.client.as_ref();
        let (bucket, key) = (object.bucket.as_str(), object.key.as_str());
        self.retry
            .run("download", move || async move {
                client.get_object_to_file(bucket, key, local_path).await
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Object download failed for {}", object);
                IngestError::backend(object.to_string(), e)
            })
    }

    #[instrument(skip(self))]
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let object = ObjectPath::parse(remote_path)?;
        info!("Uploading {} -> {}", local_path.display(), object);

        let client = self.client.as_ref();
        let (bucket, key) = (object.bucket.as_str(), object.key.as_str());
        self.retry
            .run("upload", move || async move {
                client.put_object_from_file(local_path, bucket, key).await
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Object upload failed for {}", object);
                IngestError::backend(object.to_string(), e)
            })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = ObjectPath::parse(prefix)?;
        let mut results = Vec::new();
        let mut token = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .list_objects_page(&root.bucket, &root.key, token.take())
                .await
                .map_err(|e| IngestError::backend(root.to_string(), e))?;
            pages += 1;
            results.extend(page.keys.into_iter().map(|key| root.with_key(key).to_string()));
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!(pages, objects = results.len(), "Listed {}", root);
        Ok(results)
    }
}
