//! Storage adapters
//!
//! A [`StorageAdapter`] moves whole files between a backend and the local
//! staging area. Backends are chosen once, from the pipeline's `type` field,
//! when the runner is built:
//!
//! - [`LocalStorageAdapter`]: paths are filesystem paths
//! - [`ObjectStorageAdapter`]: paths are `s3://bucket/key` strings, served by
//!   an injected [`ObjectClient`]
//!
//! Adapters hold no per-call state and can be reused; nothing locks a remote
//! path against concurrent writers.

use crate::config::StorageKind;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub mod local;
pub mod object;
#[cfg(feature = "s3")]
pub mod s3;

pub use local::LocalStorageAdapter;
pub use object::{ListPage, ObjectClient, ObjectPath, ObjectStorageAdapter};
#[cfg(feature = "s3")]
pub use s3::S3ObjectClient;

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Backend this adapter talks to
    fn kind(&self) -> StorageKind;

    /// Whether `path` currently exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Copy `remote_path` into the local file `local_path`
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()>;

    /// Copy the local file `local_path` to `remote_path`
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Every file path under `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// S3 client configured from the environment (see
/// [`ObjectStoreConfig::from_env`](crate::config::ObjectStoreConfig::from_env)).
#[cfg(feature = "s3")]
pub async fn object_client_from_env() -> Result<Arc<dyn ObjectClient>> {
    let config = crate::config::ObjectStoreConfig::from_env();
    Ok(Arc::new(S3ObjectClient::connect(&config).await))
}

#[cfg(not(feature = "s3"))]
pub async fn object_client_from_env() -> Result<Arc<dyn ObjectClient>> {
    Err(crate::error::IngestError::config(
        "object storage support is not compiled in (enable the `s3` feature)",
    ))
}
