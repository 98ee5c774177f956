//! Single-shot batch ingestion
//!
//! [`BatchIngestionRunner::run_once`] moves one source file through
//! download, transform and upload:
//!
//! 1. resolve the source path and derive the destination path
//! 2. skip when the destination exists and `overwrite` is off
//! 3. download into a staging file
//! 4. transform on the blocking pool
//! 5. upload
//!
//! Staging files are removed on every exit path.

use crate::config::{PipelineConfig, StorageKind, StorageSpec};
use crate::error::{IngestError, Result};
use crate::retry::RetryPolicy;
use crate::staging::StagingFile;
use crate::storage::{
    object_client_from_env, LocalStorageAdapter, ObjectClient, ObjectStorageAdapter,
    StorageAdapter,
};
use crate::transform::{OutputFormat, Transformer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Skipped,
    Failed,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub dest: String,
}

impl RunResult {
    pub fn success(dest: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            dest: dest.into(),
        }
    }

    pub fn skipped(dest: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Skipped,
            dest: dest.into(),
        }
    }
}

/// Destination path for `source_path` written as `format`.
///
/// The source base name keeps its stem and takes the output extension. Local
/// destinations join it onto `local_path` (the working directory when
/// unset); object-storage destinations become
/// `s3://<s3_bucket>/<s3_key_prefix>/<name>`, with `local_path` standing in
/// for a missing `s3_key_prefix`.
pub fn derive_destination(
    source_path: &str,
    destination: &StorageSpec,
    format: OutputFormat,
) -> Result<String> {
    let stem = Path::new(source_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            IngestError::config(format!("source path {source_path:?} has no file name"))
        })?;
    let name = format!("{stem}{}", format.extension());

    match destination.storage_kind()? {
        StorageKind::Local => {
            let base = destination
                .local_path
                .as_deref()
                .filter(|p| !p.is_empty())
                .unwrap_or(".");
            Ok(Path::new(base).join(name).to_string_lossy().into_owned())
        },
        StorageKind::ObjectStorage => {
            let bucket = destination
                .s3_bucket
                .as_deref()
                .filter(|b| !b.is_empty())
                .ok_or_else(|| IngestError::config("s3 destination requires s3_bucket"))?;
            let mut prefix = destination
                .s3_key_prefix
                .clone()
                .or_else(|| destination.local_path.clone())
                .unwrap_or_default();
            if !prefix.is_empty() && !prefix.ends_with('/') {
                prefix.push('/');
            }
            Ok(format!("s3://{bucket}/{prefix}{name}"))
        },
    }
}

pub struct BatchIngestionRunner {
    config: PipelineConfig,
    source: Box<dyn StorageAdapter>,
    destination: Box<dyn StorageAdapter>,
    transformer: Transformer,
    span: Span,
}

impl BatchIngestionRunner {
    /// Build a runner, choosing adapters from each side's `type`.
    ///
    /// `object_client` serves whichever sides use object storage; it is
    /// required when either does.
    pub fn new(config: PipelineConfig, object_client: Option<Arc<dyn ObjectClient>>) -> Result<Self> {
        let retry = config.options.retry_policy()?;
        let source = build_adapter("source", &config.source, object_client.clone(), retry)?;
        let destination =
            build_adapter("destination", &config.destination, object_client, retry)?;
        let transformer = Transformer::from_spec(&config.transform)?
            .with_staging_dir(config.options.staging_dir.clone());
        let span = info_span!("pipeline", name = %config.name);

        Ok(Self {
            config,
            source,
            destination,
            transformer,
            span,
        })
    }

    /// Like [`new`](Self::new), creating the S3 client from the environment
    /// when either side needs one.
    pub async fn connect(config: PipelineConfig) -> Result<Self> {
        let needs_object_storage = config.source.storage_kind()? == StorageKind::ObjectStorage
            || config.destination.storage_kind()? == StorageKind::ObjectStorage;
        let client = if needs_object_storage {
            Some(object_client_from_env().await?)
        } else {
            None
        };
        Self::new(config, client)
    }

    pub fn with_source_adapter(mut self, adapter: Box<dyn StorageAdapter>) -> Self {
        self.source = adapter;
        self
    }

    pub fn with_destination_adapter(mut self, adapter: Box<dyn StorageAdapter>) -> Self {
        self.destination = adapter;
        self
    }

    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    /// Where this job's output lands
    pub fn destination_path(&self) -> Result<String> {
        let source_path = self.config.source_path()?;
        derive_destination(
            &source_path,
            &self.config.destination,
            self.transformer.preferred_format(),
        )
    }

    /// Run the job once.
    pub async fn run_once(&self) -> Result<RunResult> {
        self.execute().instrument(self.span.clone()).await
    }

    async fn execute(&self) -> Result<RunResult> {
        let source_path = self
            .config
            .source_path()
            .inspect_err(|e| error!(error = %e, "Failed to resolve source path"))?;
        let dest = derive_destination(
            &source_path,
            &self.config.destination,
            self.transformer.preferred_format(),
        )
        .inspect_err(|e| error!(error = %e, "Failed to derive destination for {}", source_path))?;

        info!(
            source = %source_path,
            dest = %dest,
            source_kind = %self.source.kind(),
            dest_kind = %self.destination.kind(),
            "Starting ingestion"
        );

        if !self.config.options.overwrite {
            let exists = self
                .destination
                .exists(&dest)
                .await
                .inspect_err(|e| error!(error = %e, "Failed to check destination {}", dest))?;
            if exists {
                info!("Destination {} already exists, skipping", dest);
                return Ok(RunResult::skipped(dest));
            }
        }

        let staged = StagingFile::create(
            self.config.options.staging_dir.as_deref(),
            &extension_suffix(&source_path),
        )
        .inspect_err(|e| error!(error = %e, "Failed to stage {}", source_path))?;
        self.source
            .download(&source_path, staged.path())
            .await
            .inspect_err(|e| error!(error = %e, "Failed to download {}", source_path))?;

        let transformer = self.transformer.clone();
        let input = staged.path().to_path_buf();
        let transformed = tokio::task::spawn_blocking(move || transformer.transform(&input))
            .await
            .map_err(|e| IngestError::transform("transform task", e))?
            .inspect_err(|e| error!(error = %e, "Failed to transform {}", source_path))?;

        if transformed.format != self.transformer.preferred_format() {
            warn!(
                format = %transformed.format,
                "Output fell back from the preferred format; destination name is unchanged"
            );
        }

        self.destination
            .upload(transformed.file.path(), &dest)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to upload to {}", dest))?;

        let format = transformed.format;
        transformed.file.release();
        staged.release();

        info!(dest = %dest, format = %format, "Ingestion complete");
        Ok(RunResult::success(dest))
    }
}

fn build_adapter(
    side: &str,
    spec: &StorageSpec,
    client: Option<Arc<dyn ObjectClient>>,
    retry: RetryPolicy,
) -> Result<Box<dyn StorageAdapter>> {
    match spec.storage_kind()? {
        StorageKind::Local => Ok(Box::new(LocalStorageAdapter::new())),
        StorageKind::ObjectStorage => {
            let client = client.ok_or_else(|| {
                IngestError::config(format!("{side} uses object storage but no client is available"))
            })?;
            Ok(Box::new(
                ObjectStorageAdapter::new(client).with_retry_policy(retry),
            ))
        },
    }
}

/// `.csv` for `dir/input.csv`, empty without an extension
fn extension_suffix(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}
