//! Pipeline and object-store configuration
//!
//! A pipeline document describes one ingestion job:
//!
//! ```yaml
//! name: daily-orders
//! source:
//!   type: s3
//!   s3_bucket: raw-zone
//!   s3_key: orders/2026-10-19.csv
//! transform:
//!   csv:
//!     delimiter: ","
//! destination:
//!   type: local
//!   local_path: ./out
//! options:
//!   max_retries: 3
//!   overwrite: false
//! ```
//!
//! Every section is optional at parse time. Fields a run actually needs are
//! checked when the runner resolves them, so the error names the missing
//! field rather than failing the whole document.

use crate::error::{IngestError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_JOB_NAME: &str = "batch";

/// Immutable description of one ingestion job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Job identifier, informational only
    #[serde(deserialize_with = "null_as_job_name")]
    pub name: String,

    #[serde(deserialize_with = "null_as_default")]
    pub source: StorageSpec,

    #[serde(deserialize_with = "null_as_default")]
    pub transform: TransformSpec,

    #[serde(deserialize_with = "null_as_default")]
    pub destination: StorageSpec,

    #[serde(deserialize_with = "null_as_default")]
    pub options: PipelineOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_JOB_NAME.to_string(),
            source: StorageSpec::default(),
            transform: TransformSpec::default(),
            destination: StorageSpec::default(),
            options: PipelineOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Build a config from an already-parsed document, filling defaults.
    pub fn from_value(document: serde_yaml::Value) -> Result<Self> {
        if document.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(document)
            .map_err(|e| IngestError::config(format!("invalid pipeline document: {e}")))
    }

    /// Parse a YAML (or JSON) pipeline document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| IngestError::config(format!("invalid pipeline document: {e}")))?;
        Self::from_value(document)
    }

    /// Read and parse a pipeline file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| IngestError::Document {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: serde_yaml::Value =
            serde_yaml::from_str(&text).map_err(|e| IngestError::Document {
                path: path.to_path_buf(),
                source: e.into(),
            })?;
        Self::from_value(document)
    }

    /// Fully qualified path of the object this job ingests.
    pub fn source_path(&self) -> Result<String> {
        match self.source.storage_kind()? {
            StorageKind::ObjectStorage => {
                match (
                    non_empty(&self.source.s3_bucket),
                    non_empty(&self.source.s3_key),
                ) {
                    (Some(bucket), Some(key)) => Ok(format!("s3://{bucket}/{key}")),
                    _ => Err(IngestError::config(
                        "s3 source requires s3_bucket and s3_key",
                    )),
                }
            },
            StorageKind::Local => non_empty(&self.source.local_path)
                .map(str::to_string)
                .ok_or_else(|| IngestError::config("local source requires local_path")),
        }
    }
}

/// Location of a source or destination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSpec {
    /// Backend name; absent means local
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_bucket: Option<String>,

    /// Object key (sources)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,

    /// Key prefix (destinations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_key_prefix: Option<String>,

    /// Backend-specific keys this crate does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl StorageSpec {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            kind: Some(StorageKind::Local.to_string()),
            local_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn s3_object(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: Some(StorageKind::ObjectStorage.to_string()),
            s3_bucket: Some(bucket.into()),
            s3_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn s3_prefix(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            kind: Some(StorageKind::ObjectStorage.to_string()),
            s3_bucket: Some(bucket.into()),
            s3_key_prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Resolve `type`. Unknown names are rejected rather than treated as
    /// local, so a typo cannot turn an S3 job into a filesystem job.
    pub fn storage_kind(&self) -> Result<StorageKind> {
        match self.kind.as_deref() {
            None => Ok(StorageKind::Local),
            Some(name) => name.parse(),
        }
    }
}

/// Storage backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Local,
    ObjectStorage,
}

impl std::str::FromStr for StorageKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageKind::Local),
            "s3" | "object-storage" | "object_storage" => Ok(StorageKind::ObjectStorage),
            other => Err(IngestError::config(format!(
                "unknown storage type {other:?} (expected one of: local, s3)"
            ))),
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::Local => write!(f, "local"),
            StorageKind::ObjectStorage => write!(f, "s3"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSpec {
    #[serde(deserialize_with = "null_as_default")]
    pub csv: CsvSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvSpec {
    pub delimiter: String,
}

impl Default for CsvSpec {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
        }
    }
}

impl CsvSpec {
    /// The delimiter as the single byte the CSV reader needs
    pub fn delimiter_byte(&self) -> Result<u8> {
        match self.delimiter.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(IngestError::config(format!(
                "csv delimiter must be a single byte, got {:?}",
                self.delimiter
            ))),
        }
    }
}

/// Job-level knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Retries after the first failed object-storage transfer
    pub max_retries: u32,

    /// Re-ingest even when the destination already exists
    pub overwrite: bool,

    /// Sleep before the first retry, in seconds
    pub retry_delay_secs: f64,

    /// Multiplier applied to the sleep after each retry
    pub retry_backoff: f64,

    /// Where staging files are created; the OS temp dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            overwrite: false,
            retry_delay_secs: 1.0,
            retry_backoff: 2.0,
            staging_dir: None,
        }
    }
}

impl PipelineOptions {
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let delay = Duration::try_from_secs_f64(self.retry_delay_secs).map_err(|_| {
            IngestError::config(format!(
                "retry_delay_secs must be a non-negative number, got {}",
                self.retry_delay_secs
            ))
        })?;
        if !self.retry_backoff.is_finite() || self.retry_backoff < 0.0 {
            return Err(IngestError::config(format!(
                "retry_backoff must be a non-negative number, got {}",
                self.retry_backoff
            )));
        }
        Ok(RetryPolicy::new(self.max_retries, delay, self.retry_backoff))
    }
}

/// Connection settings for S3-compatible storage, read from the environment.
///
/// Credentials are optional; without them the AWS SDK default credential
/// chain applies.
#[derive(Clone, Default, PartialEq)]
pub struct ObjectStoreConfig {
    /// Custom endpoint, e.g. a MinIO server
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub path_style: bool,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl ObjectStoreConfig {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            endpoint: var("S3_ENDPOINT"),
            region: var("S3_REGION").or_else(|| var("AWS_REGION")),
            path_style: var("S3_PATH_STYLE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            access_key: var("S3_ACCESS_KEY"),
            secret_key: var("S3_SECRET_KEY"),
        }
    }

    /// Static credentials, when both halves are configured
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) => Some((access.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("path_style", &self.path_style)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn null_as_job_name<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .unwrap_or_else(|| DEFAULT_JOB_NAME.to_string()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const FULL_DOCUMENT: &str = r#"
name: test-batch-local
source:
  type: local
  local_path: data/input.csv
transform:
  csv:
    delimiter: ";"
destination:
  type: s3
  s3_bucket: curated
  s3_key_prefix: orders
  storage_class: STANDARD_IA
options:
  overwrite: true
  max_retries: 1
"#;

    #[test]
    fn test_parse_full_document() {
        let config = PipelineConfig::from_yaml_str(FULL_DOCUMENT).unwrap();
        assert_eq!(config.name, "test-batch-local");
        assert_eq!(config.source.local_path.as_deref(), Some("data/input.csv"));
        assert_eq!(config.transform.csv.delimiter_byte().unwrap(), b';');
        assert_eq!(
            config.destination.storage_kind().unwrap(),
            StorageKind::ObjectStorage
        );
        assert_eq!(config.destination.s3_key_prefix.as_deref(), Some("orders"));
        assert_eq!(
            config.destination.extra.get("storage_class"),
            Some(&serde_yaml::Value::from("STANDARD_IA"))
        );
        assert!(config.options.overwrite);
        assert_eq!(config.options.max_retries, 1);
        assert_eq!(config.options.retry_backoff, 2.0);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PipelineConfig::from_yaml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.name, DEFAULT_JOB_NAME);
        assert_eq!(config.options.max_retries, 3);
        assert!(!config.options.overwrite);
        assert_eq!(config.transform.csv.delimiter, ",");
    }

    #[test]
    fn test_null_sections_use_defaults() {
        let config = PipelineConfig::from_yaml_str("name: x\nsource:\noptions:\n").unwrap();
        assert_eq!(config.name, "x");
        assert_eq!(config.source, StorageSpec::default());
        assert_eq!(config.options, PipelineOptions::default());
    }

    #[test]
    fn test_null_name_uses_default() {
        let config = PipelineConfig::from_yaml_str("name:\nsource:\n  local_path: in.csv\n").unwrap();
        assert_eq!(config.name, DEFAULT_JOB_NAME);
        assert_eq!(config.source.local_path.as_deref(), Some("in.csv"));

        let json = PipelineConfig::from_yaml_str(r#"{"name": null}"#).unwrap();
        assert_eq!(json.name, DEFAULT_JOB_NAME);
    }

    #[test]
    fn test_json_document() {
        let config = PipelineConfig::from_yaml_str(
            r#"{"source": {"type": "s3", "s3_bucket": "b", "s3_key": "k/in.csv"}}"#,
        )
        .unwrap();
        assert_eq!(config.source_path().unwrap(), "s3://b/k/in.csv");
    }

    #[test]
    fn test_not_a_mapping_is_rejected() {
        let err = PipelineConfig::from_yaml_str("42").unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[test]
    fn test_storage_kind_resolution() {
        assert_eq!(StorageSpec::default().storage_kind().unwrap(), StorageKind::Local);
        assert_eq!("S3".parse::<StorageKind>().unwrap(), StorageKind::ObjectStorage);
        assert_eq!(
            "object-storage".parse::<StorageKind>().unwrap(),
            StorageKind::ObjectStorage
        );

        let typo = StorageSpec {
            kind: Some("s4".to_string()),
            ..StorageSpec::default()
        };
        let err = typo.storage_kind().unwrap_err();
        assert!(err.to_string().contains("\"s4\""));
    }

    #[test]
    fn test_source_path_requires_fields() {
        let mut config = PipelineConfig::default();
        let err = config.source_path().unwrap_err();
        assert!(err.to_string().contains("local_path"));

        config.source = StorageSpec {
            kind: Some("s3".to_string()),
            s3_bucket: Some("bucket".to_string()),
            ..StorageSpec::default()
        };
        let err = config.source_path().unwrap_err();
        assert!(err.to_string().contains("s3_bucket and s3_key"));

        config.source.s3_key = Some(String::new());
        assert!(config.source_path().is_err());

        config.source.s3_key = Some("raw/input.csv".to_string());
        assert_eq!(config.source_path().unwrap(), "s3://bucket/raw/input.csv");
    }

    #[test]
    fn test_delimiter_must_be_one_byte() {
        let tab = CsvSpec {
            delimiter: "\t".to_string(),
        };
        assert_eq!(tab.delimiter_byte().unwrap(), b'\t');

        for bad in ["", "||", "é"] {
            let spec = CsvSpec {
                delimiter: bad.to_string(),
            };
            assert!(spec.delimiter_byte().is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_retry_policy_from_options() {
        let options = PipelineOptions {
            max_retries: 5,
            retry_delay_secs: 0.5,
            retry_backoff: 3.0,
            ..PipelineOptions::default()
        };
        let policy = options.retry_policy().unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.delay, Duration::from_millis(500));
        assert_eq!(policy.backoff, 3.0);

        let negative = PipelineOptions {
            retry_delay_secs: -1.0,
            ..PipelineOptions::default()
        };
        assert!(negative.retry_policy().is_err());

        let nan = PipelineOptions {
            retry_backoff: f64::NAN,
            ..PipelineOptions::default()
        };
        assert!(nan.retry_policy().is_err());
    }

    #[test]
    fn test_object_store_config_redacts_secret() {
        let config = ObjectStoreConfig {
            access_key: Some("AKIA".to_string()),
            secret_key: Some("hunter2".to_string()),
            ..ObjectStoreConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert_eq!(config.static_credentials(), Some(("AKIA", "hunter2")));
        assert_eq!(ObjectStoreConfig::default().static_credentials(), None);
    }
}
