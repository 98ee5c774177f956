//! Shared fixtures for datamcp-ingest integration tests
//!
//! - [`InMemoryObjectClient`]: an [`ObjectClient`] over a map, with failure
//!   injection and call counters
//! - [`CountingAdapter`]: a local adapter that counts transfers
//! - CSV fixtures and small filesystem helpers

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use datamcp_ingest::config::StorageKind;
use datamcp_ingest::error::{BoxError, Result};
use datamcp_ingest::storage::{ListPage, LocalStorageAdapter, ObjectClient, StorageAdapter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const SAMPLE_CSV: &str = "id,name,amount\n1,Alice,10\n2,Bob,15\n3,Carol,20\n";

/// Write `contents` to `dir/relative`, creating parents
pub fn write_file(dir: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = dir.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn path_str(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

/// In-memory object store keyed by `(bucket, key)`
#[derive(Default)]
pub struct InMemoryObjectClient {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    page_size: usize,
    get_failures: AtomicU32,
    put_failures: AtomicU32,
    heads: AtomicU32,
    gets: AtomicU32,
    puts: AtomicU32,
    list_calls: AtomicU32,
}

impl InMemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listing returns at most `page_size` keys per page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Fail the next `n` downloads
    pub fn fail_next_gets(&self, n: u32) {
        self.get_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` uploads
    pub fn fail_next_puts(&self, n: u32) {
        self.put_failures.store(n, Ordering::SeqCst);
    }

    pub fn heads(&self) -> u32 {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectClient for InMemoryObjectClient {
    async fn head_object(&self, bucket: &str, key: &str) -> std::result::Result<bool, BoxError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(bucket, key).is_some())
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
    ) -> std::result::Result<(), BoxError> {
        let attempt = self.gets.fetch_add(1, Ordering::SeqCst) + 1;
        if Self::take_failure(&self.get_failures) {
            return Err(format!("connection reset (attempt {attempt})").into());
        }
        let body = self
            .get(bucket, key)
            .ok_or_else(|| format!("NoSuchKey: {bucket}/{key}"))?;
        tokio::fs::write(dest, body).await?;
        Ok(())
    }

    async fn put_object_from_file(
        &self,
        src: &Path,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<(), BoxError> {
        let attempt = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if Self::take_failure(&self.put_failures) {
            return Err(format!("slow down (attempt {attempt})").into());
        }
        let body = tokio::fs::read(src).await?;
        self.insert(bucket, key, body);
        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> std::result::Result<ListPage, BoxError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect();

        let start = match continuation {
            Some(token) => token.parse::<usize>()?,
            None => 0,
        };
        let end = if self.page_size == 0 {
            keys.len()
        } else {
            (start + self.page_size).min(keys.len())
        };
        let next_token = (end < keys.len()).then(|| end.to_string());

        Ok(ListPage {
            keys: keys[start..end].to_vec(),
            next_token,
        })
    }
}

/// Local adapter that counts transfers
#[derive(Clone, Default)]
pub struct CountingAdapter {
    inner: LocalStorageAdapter,
    pub downloads: Arc<AtomicU32>,
    pub uploads: Arc<AtomicU32>,
}

impl CountingAdapter {
    pub fn downloads(&self) -> u32 {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageAdapter for CountingAdapter {
    fn kind(&self) -> StorageKind {
        self.inner.kind()
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.inner.download(remote_path, local_path).await
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.inner.upload(local_path, remote_path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }
}
