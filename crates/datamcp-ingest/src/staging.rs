//! Scoped staging files
//!
//! A [`StagingFile`] is a uniquely named local file removed when the guard is
//! dropped, whichever way the owning scope exits. Removal failures are logged
//! and swallowed: a leftover temp file never fails an ingestion run.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempPath};
use tracing::{debug, warn};

const PREFIX: &str = "datamcp-";

#[derive(Debug)]
pub struct StagingFile {
    path: Option<TempPath>,
}

impl StagingFile {
    /// Create an empty staging file in `dir` (the OS temp dir when `None`)
    /// whose name ends with `suffix`.
    pub fn create(dir: Option<&Path>, suffix: &str) -> io::Result<Self> {
        let mut builder = Builder::new();
        builder.prefix(PREFIX).suffix(suffix);
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let path = file.into_temp_path();
        debug!(path = %path.display(), "Created staging file");
        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }

    /// Remove the file now, logging instead of failing.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let shown: PathBuf = path.to_path_buf();
        match path.close() {
            Ok(()) => debug!(path = %shown.display(), "Removed staging file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => warn!(
                path = %shown.display(),
                error = %e,
                "Failed to cleanup temp file"
            ),
        }
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        self.remove();
    }
}

impl AsRef<Path> for StagingFile {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}
