//! Parquet output via arrow
//!
//! Column types are inferred from the CSV text, the same way arrow's CSV
//! reader does it; columns that do not parse uniformly stay Utf8.

use super::{ColumnarWriter, Table};
use crate::error::{IngestError, Result};
use ::arrow::csv::reader::Format;
use ::arrow::csv::ReaderBuilder;
use ::parquet::arrow::ArrowWriter;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_BATCH_SIZE: usize = 8192;

#[derive(Debug, Clone)]
pub struct ParquetWriter {
    batch_size: usize,
    /// Rows sampled for type inference; `None` reads the whole table
    infer_rows: Option<usize>,
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            infer_rows: None,
        }
    }
}

impl ParquetWriter {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_infer_rows(mut self, rows: Option<usize>) -> Self {
        self.infer_rows = rows;
        self
    }
}

impl ColumnarWriter for ParquetWriter {
    fn name(&self) -> &'static str {
        "parquet"
    }

    fn write(&self, table: &Table, out: &Path) -> Result<()> {
        let csv_bytes = table.to_csv_bytes()?;
        let format = Format::default().with_header(true);

        let (schema, _) = format
            .infer_schema(Cursor::new(&csv_bytes), self.infer_rows)
            .map_err(|e| IngestError::transform("inferring arrow schema", e))?;
        let schema = Arc::new(schema);

        let reader = ReaderBuilder::new(schema.clone())
            .with_format(format)
            .with_batch_size(self.batch_size)
            .build(Cursor::new(&csv_bytes))
            .map_err(|e| IngestError::transform("building arrow reader", e))?;

        let file = File::create(out)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)
            .map_err(|e| IngestError::transform("opening parquet writer", e))?;

        let mut rows = 0usize;
        for batch in reader {
            let batch = batch.map_err(|e| IngestError::transform("decoding CSV batch", e))?;
            rows += batch.num_rows();
            writer
                .write(&batch)
                .map_err(|e| IngestError::transform("writing parquet", e))?;
        }
        writer
            .close()
            .map_err(|e| IngestError::transform("finalizing parquet", e))?;

        debug!(rows, path = %out.display(), "Wrote parquet file");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ::arrow::datatypes::DataType;
    use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    fn table(text: &str) -> Table {
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        Table {
            headers: reader.headers().unwrap().clone(),
            rows: reader.records().map(|r| r.unwrap()).collect(),
        }
    }

    #[test]
    fn test_inferred_types() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.parquet");
        let table = table("id,name,amount\n1,Alice,10.5\n2,Bob,15\n");

        ParquetWriter::default().write(&table, &out).unwrap();

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&out).unwrap()).unwrap();
        let schema = builder.schema().clone();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
    }

    #[test]
    fn test_small_batches() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.parquet");
        let text: String = std::iter::once("n\n".to_string())
            .chain((0..25).map(|i| format!("{i}\n")))
            .collect();

        ParquetWriter::default()
            .with_batch_size(10)
            .write(&table(&text), &out)
            .unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&out).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 25);
    }
}
