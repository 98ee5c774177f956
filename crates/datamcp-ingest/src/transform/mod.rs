//! CSV transform with format fallback
//!
//! The transform turns a staged CSV file into the upload artifact, trying
//! each output format in order until one works:
//!
//! 1. **Parquet**, when a [`ColumnarWriter`] is available
//! 2. **gzip CSV** re-serialized from the parsed table
//! 3. **gzip passthrough** of the raw bytes, when table parsing is disabled
//!
//! A columnar failure only logs and falls through. A CSV parse failure is
//! fatal: without a table there is nothing to serialize.

use crate::config::TransformSpec;
use crate::error::{IngestError, Result};
use crate::staging::StagingFile;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(feature = "parquet")]
mod parquet;

#[cfg(feature = "parquet")]
pub use self::parquet::ParquetWriter;

/// Output format actually produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Parquet,
    GzipCsv,
    GzipRaw,
}

impl OutputFormat {
    /// File extension, including the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Parquet => ".parquet",
            OutputFormat::GzipCsv => ".csv.gz",
            OutputFormat::GzipRaw => ".gz",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Parquet => write!(f, "parquet"),
            OutputFormat::GzipCsv => write!(f, "gzip-csv"),
            OutputFormat::GzipRaw => write!(f, "gzip-raw"),
        }
    }
}

/// Parsed CSV: a header row plus string records.
///
/// Values are kept as text; typing is left to the columnar writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: csv::StringRecord,
    pub rows: Vec<csv::StringRecord>,
}

impl Table {
    /// Read a CSV file with a header row.
    ///
    /// Rows shorter than the header are padded with empty fields (nulls once
    /// typed); longer rows and inputs without any column are errors.
    pub fn read(path: &Path, delimiter: u8) -> Result<Self> {
        let context = || format!("reading CSV {}", path.display());
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| IngestError::transform(context(), e))?;

        let headers = reader
            .headers()
            .map_err(|e| IngestError::transform(context(), e))?
            .clone();
        if headers.is_empty() {
            return Err(IngestError::transform(
                context(),
                "no columns to parse from file",
            ));
        }

        let width = headers.len();
        let mut rows = Vec::new();
        for record in reader.records() {
            let mut record = record.map_err(|e| IngestError::transform(context(), e))?;
            if record.len() > width {
                let line = record.position().map_or(0, |p| p.line());
                return Err(IngestError::transform(
                    context(),
                    format!("expected {width} fields in line {line}, saw {}", record.len()),
                ));
            }
            while record.len() < width {
                record.push_field("");
            }
            rows.push(record);
        }

        Ok(Self { headers, rows })
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.headers.iter().collect()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Write as comma-separated CSV with a header row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        let mut write = || -> std::result::Result<(), csv::Error> {
            csv_writer.write_record(&self.headers)?;
            for row in &self.rows {
                csv_writer.write_record(row)?;
            }
            csv_writer.flush()?;
            Ok(())
        };
        write().map_err(|e| IngestError::transform("serializing CSV", e))
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        Ok(buffer)
    }
}

/// Serializes a [`Table`] into a column-oriented file
pub trait ColumnarWriter: Send + Sync {
    fn name(&self) -> &'static str;

    fn write(&self, table: &Table, out: &Path) -> Result<()>;
}

/// The transform result: a staging file holding the output and the format
/// that produced it
#[derive(Debug)]
pub struct Transformed {
    pub file: StagingFile,
    pub format: OutputFormat,
}

#[derive(Clone)]
pub struct Transformer {
    delimiter: u8,
    parse_tables: bool,
    columnar: Option<Arc<dyn ColumnarWriter>>,
    staging_dir: Option<PathBuf>,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("delimiter", &(self.delimiter as char))
            .field("parse_tables", &self.parse_tables)
            .field("columnar", &self.columnar.as_ref().map(|w| w.name()))
            .field("staging_dir", &self.staging_dir)
            .finish()
    }
}

impl Transformer {
    /// Transformer for `spec`, using every output format compiled in.
    pub fn from_spec(spec: &TransformSpec) -> Result<Self> {
        Ok(Self {
            delimiter: spec.csv.delimiter_byte()?,
            parse_tables: true,
            columnar: default_columnar_writer(),
            staging_dir: None,
        })
    }

    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    pub fn with_columnar_writer(mut self, writer: Arc<dyn ColumnarWriter>) -> Self {
        self.columnar = Some(writer);
        self
    }

    pub fn without_columnar_writer(mut self) -> Self {
        self.columnar = None;
        self
    }

    /// Skip CSV parsing entirely; output becomes a gzip of the raw bytes.
    pub fn without_table_parsing(mut self) -> Self {
        self.parse_tables = false;
        self
    }

    /// The format a run produces when nothing fails
    pub fn preferred_format(&self) -> OutputFormat {
        if !self.parse_tables {
            OutputFormat::GzipRaw
        } else if self.columnar.is_some() {
            OutputFormat::Parquet
        } else {
            OutputFormat::GzipCsv
        }
    }

    /// Transform the CSV at `input` into a new staging file.
    pub fn transform(&self, input: &Path) -> Result<Transformed> {
        if !self.parse_tables {
            warn!("Table parsing disabled; performing passthrough copy (gz)");
            let file = self.stage(OutputFormat::GzipRaw)?;
            gzip_file(input, file.path())?;
            return Ok(Transformed {
                file,
                format: OutputFormat::GzipRaw,
            });
        }

        info!("Reading CSV {}", input.display());
        let table = Table::read(input, self.delimiter)?;
        info!(
            rows = table.num_rows(),
            columns = table.headers.len(),
            "Parsed CSV"
        );

        if let Some(writer) = &self.columnar {
            let file = self.stage(OutputFormat::Parquet)?;
            info!(writer = writer.name(), "Writing columnar output to {}", file.path().display());
            match writer.write(&table, file.path()) {
                Ok(()) => {
                    return Ok(Transformed {
                        file,
                        format: OutputFormat::Parquet,
                    })
                },
                Err(e) => {
                    warn!(error = %e, "Failed to write columnar output, falling back to gz CSV");
                    file.release();
                },
            }
        }

        let file = self.stage(OutputFormat::GzipCsv)?;
        info!("Writing gzipped CSV to {}", file.path().display());
        let out = File::create(file.path())?;
        let mut encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
        table.write_csv(&mut encoder)?;
        encoder.finish()?.flush()?;

        Ok(Transformed {
            file,
            format: OutputFormat::GzipCsv,
        })
    }

    fn stage(&self, format: OutputFormat) -> Result<StagingFile> {
        Ok(StagingFile::create(
            self.staging_dir.as_deref(),
            format.extension(),
        )?)
    }
}

#[cfg(feature = "parquet")]
fn default_columnar_writer() -> Option<Arc<dyn ColumnarWriter>> {
    Some(Arc::new(ParquetWriter::default()))
}

#[cfg(not(feature = "parquet"))]
fn default_columnar_writer() -> Option<Arc<dyn ColumnarWriter>> {
    None
}

fn gzip_file(input: &Path, output: &Path) -> Result<()> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(output)?), Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(())
}
