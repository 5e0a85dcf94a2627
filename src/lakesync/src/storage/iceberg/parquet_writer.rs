use crate::error::{Error, ErrorDetail, Result};
use crate::row::{ColumnArrayBuilder, DataRow};
use crate::storage::iceberg::schema::IcebergSchema;
use arrow::record_batch::RecordBatch;
use arrow_schema::Schema as ArrowSchema;
use parquet::arrow::AsyncArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Rows buffered before a row group is flushed to disk.
const DEFAULT_ROW_GROUP_ROWS: usize = 1000;

/// Per-column statistics carried in a manifest entry. Not populated by this
/// writer revision; the field keeps the manifest shape ready for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnStats {
    pub value_counts: BTreeMap<i32, u64>,
    pub null_value_counts: BTreeMap<i32, u64>,
}

/// What the writer knows about a closed data file.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFileMetadata {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub record_count: u64,
    /// Empty for the unpartitioned default spec.
    pub partition_values: BTreeMap<String, String>,
    pub column_stats: Option<ColumnStats>,
}

#[derive(Debug, Clone, Copy)]
pub struct ParquetWriterConfig {
    /// Rows buffered in memory before a row group is flushed.
    pub row_group_rows: usize,
    /// Dictionary-encode columns. Worth disabling for high-cardinality data.
    pub dictionary_enabled: bool,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            row_group_rows: DEFAULT_ROW_GROUP_ROWS,
            dictionary_enabled: true,
        }
    }
}

/// Data files are always Snappy-compressed; only the encoding knobs come
/// from the writer configuration.
fn writer_properties(config: &ParquetWriterConfig) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_dictionary_enabled(config.dictionary_enabled)
        .build()
}

/// Streams rows into a Parquet data file whose schema carries the Iceberg
/// field ids.
///
/// Rows are buffered up to the configured row-group target and emitted as one
/// Parquet row group per flush, Snappy-compressed. The output file is owned
/// exclusively by this writer until [`close`](Self::close) returns; a writer
/// dropped or cancelled before then leaves an orphaned partial file that is
/// never registered in a manifest.
pub struct IcebergParquetWriter {
    path: PathBuf,
    schema: IcebergSchema,
    arrow_schema: Arc<ArrowSchema>,
    writer: AsyncArrowWriter<tokio::fs::File>,
    builders: Vec<ColumnArrayBuilder>,
    buffered_rows: usize,
    total_rows: u64,
    row_group_rows: usize,
    cancel: CancellationToken,
}

impl IcebergParquetWriter {
    pub async fn open(
        path: impl AsRef<Path>,
        schema: &IcebergSchema,
        config: ParquetWriterConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let arrow_schema = Arc::new(schema.to_arrow_schema()?);
        let file = tokio::fs::File::create(&path).await?;
        let writer =
            AsyncArrowWriter::try_new(file, arrow_schema.clone(), Some(writer_properties(&config)))?;
        let builders = new_builders(&arrow_schema, config.row_group_rows);
        Ok(Self {
            path,
            schema: schema.clone(),
            arrow_schema,
            writer,
            builders,
            buffered_rows: 0,
            total_rows: 0,
            row_group_rows: config.row_group_rows,
            cancel,
        })
    }

    /// Buffer one row, flushing a row group when the target is reached.
    /// Offering a null to a required field is a caller bug and fails fast.
    pub async fn write_row(&mut self, row: DataRow) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if row.len() != self.schema.fields.len() {
            return Err(Error::Parquet(ErrorDetail::permanent(format!(
                "row has {} values but the schema has {} fields",
                row.len(),
                self.schema.fields.len()
            ))));
        }
        for ((field, builder), value) in self
            .schema
            .fields
            .iter()
            .zip(self.builders.iter_mut())
            .zip(row.values.iter())
        {
            if field.required && value.is_null() {
                return Err(Error::RequiredColumnNull(field.name.clone()));
            }
            builder.append_value(value)?;
        }
        self.buffered_rows += 1;
        self.total_rows += 1;
        if self.buffered_rows >= self.row_group_rows {
            self.flush().await?;
        }
        Ok(())
    }

    /// Emit the buffered rows as one Parquet row group.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffered_rows == 0 {
            return Ok(());
        }
        let arrays = self
            .builders
            .iter_mut()
            .map(|builder| builder.finish())
            .collect::<Vec<_>>();
        let batch = RecordBatch::try_new(self.arrow_schema.clone(), arrays)?;
        self.writer.write(&batch).await?;
        self.writer.flush().await?;
        self.buffered_rows = 0;
        Ok(())
    }

    /// Flush the remaining buffer, finalize the file, and report its metadata.
    pub async fn close(mut self) -> Result<DataFileMetadata> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.flush().await?;
        self.writer.close().await?;
        let size_bytes = tokio::fs::metadata(&self.path).await?.len();
        Ok(DataFileMetadata {
            path: self.path,
            size_bytes,
            record_count: self.total_rows,
            partition_values: BTreeMap::new(),
            column_stats: None,
        })
    }

    pub fn rows_written(&self) -> u64 {
        self.total_rows
    }
}

fn new_builders(arrow_schema: &ArrowSchema, capacity: usize) -> Vec<ColumnArrayBuilder> {
    arrow_schema
        .fields()
        .iter()
        .map(|field| ColumnArrayBuilder::new(field.data_type(), capacity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowValue;
    use crate::storage::iceberg::schema::{IcebergType, SchemaBuilder};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn test_schema() -> IcebergSchema {
        SchemaBuilder::new()
            .add_field("id", IcebergType::Int, true)
            .add_field("name", IcebergType::String, false)
            .build()
    }

    #[tokio::test]
    async fn test_row_groups_follow_flush_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grouped.parquet");
        let config = ParquetWriterConfig {
            row_group_rows: 2,
            dictionary_enabled: false,
        };
        let mut writer = IcebergParquetWriter::open(
            &path,
            &test_schema(),
            config,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        for i in 0..5 {
            writer
                .write_row(DataRow::new(vec![
                    RowValue::Int32(i),
                    RowValue::String(format!("row-{i}")),
                ]))
                .await
                .unwrap();
        }
        let metadata = writer.close().await.unwrap();
        assert_eq!(metadata.record_count, 5);
        assert!(metadata.size_bytes > 0);

        let file = std::fs::File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        // 2 + 2 + 1 rows over three groups.
        assert_eq!(reader.metadata().num_row_groups(), 3);
    }

    #[tokio::test]
    async fn test_required_null_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strict.parquet");
        let mut writer = IcebergParquetWriter::open(
            &path,
            &test_schema(),
            ParquetWriterConfig::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let err = writer
            .write_row(DataRow::new(vec![
                RowValue::Null,
                RowValue::String("x".to_string()),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequiredColumnNull(column) if column == "id"));
    }

    #[tokio::test]
    async fn test_cancelled_writer_returns_no_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cancelled.parquet");
        let cancel = CancellationToken::new();
        let mut writer = IcebergParquetWriter::open(
            &path,
            &test_schema(),
            ParquetWriterConfig::default(),
            cancel.clone(),
        )
        .await
        .unwrap();
        writer
            .write_row(DataRow::new(vec![
                RowValue::Int32(1),
                RowValue::Null,
            ]))
            .await
            .unwrap();
        cancel.cancel();
        let err = writer
            .write_row(DataRow::new(vec![
                RowValue::Int32(2),
                RowValue::Null,
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
