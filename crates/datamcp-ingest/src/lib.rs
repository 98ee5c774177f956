//! DataMCP Ingest Library
//!
//! Batch ingestion of CSV files between local disk and S3-compatible object
//! storage.
//!
//! # Pipeline
//!
//! One run moves one file:
//!
//! - **Stage**: download the source into a local staging file
//! - **Transform**: parquet, falling back to gzipped CSV (or a gzip of the
//!   raw bytes when table parsing is off)
//! - **Publish**: upload under a destination name derived from the source
//!
//! A run is skipped when its destination already exists, unless
//! `overwrite` is set.
//!
//! # Example
//!
//! ```no_run
//! use datamcp_ingest::{BatchIngestionRunner, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load("pipelines/daily-orders.yaml")?;
//!     let runner = BatchIngestionRunner::connect(config).await?;
//!     let result = runner.run_once().await?;
//!     println!("{:?} -> {}", result.status, result.dest);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod retry;
pub mod runner;
pub mod staging;
pub mod storage;
pub mod transform;

pub use config::{ObjectStoreConfig, PipelineConfig, PipelineOptions, StorageKind, StorageSpec};
pub use error::{IngestError, Result};
pub use retry::RetryPolicy;
pub use runner::{derive_destination, BatchIngestionRunner, RunResult, RunStatus};
pub use storage::{LocalStorageAdapter, ObjectClient, ObjectStorageAdapter, StorageAdapter};
pub use transform::{OutputFormat, Transformer};
