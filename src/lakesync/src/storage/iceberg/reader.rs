use crate::error::{Error, ErrorDetail, Result};
use crate::row::{DataRow, RowValue};
use crate::storage::iceberg::file_catalog::FileCatalog;
use crate::storage::iceberg::manifest::{ManifestListWriter, ManifestStatus, ManifestWriter};
use crate::storage::iceberg::schema::{
    arrow_field_id, IcebergField, IcebergSchema, IcebergType,
};
use crate::storage::iceberg::table_metadata::TableMetadata;
use arrow::array::{
    Array, BinaryArray, BooleanArray, Date32Array, Decimal128Array, FixedSizeBinaryArray,
    Float32Array, Float64Array, Int32Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, TimeUnit};
use futures::TryStreamExt;
use parquet::arrow::ParquetRecordBatchStreamBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reads Iceberg tables back into rows.
///
/// Resolution follows the commit chain in reverse: version hint → metadata →
/// snapshot → manifest-list → manifests → Parquet files. Each snapshot's
/// manifest-list references only the files added by that snapshot, so a read
/// at snapshot `s` accumulates the manifest-lists of every snapshot up to and
/// including `s`. Parquet columns are matched to schema fields by their
/// embedded field id, not by name.
pub struct IcebergTableReader {
    catalog: Arc<FileCatalog>,
}

impl IcebergTableReader {
    pub fn new(catalog: Arc<FileCatalog>) -> Self {
        Self { catalog }
    }

    /// Schema of the table's current metadata.
    pub async fn table_schema(&self, table: &str) -> Result<IcebergSchema> {
        let metadata = self.load_metadata(table).await?;
        metadata
            .current_schema()
            .cloned()
            .ok_or_else(|| shape_error(format!("table {table} metadata has no current schema")))
    }

    /// All rows of the current snapshot, in append order.
    pub async fn read_table(&self, table: &str) -> Result<Vec<DataRow>> {
        let metadata = self.load_metadata(table).await?;
        match metadata.current_snapshot_id {
            None => Ok(Vec::new()),
            Some(snapshot_id) => self.read_up_to(table, &metadata, snapshot_id).await,
        }
    }

    /// Time-travel read: all rows visible at the given snapshot.
    pub async fn read_snapshot(&self, table: &str, snapshot_id: i64) -> Result<Vec<DataRow>> {
        let metadata = self.load_metadata(table).await?;
        if metadata.snapshot(snapshot_id).is_none() {
            return Err(Error::SnapshotNotFound(snapshot_id));
        }
        self.read_up_to(table, &metadata, snapshot_id).await
    }

    async fn load_metadata(&self, table: &str) -> Result<TableMetadata> {
        self.catalog
            .load_table(table)
            .await?
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }

    async fn read_up_to(
        &self,
        table: &str,
        metadata: &TableMetadata,
        snapshot_id: i64,
    ) -> Result<Vec<DataRow>> {
        let schema = metadata
            .current_schema()
            .ok_or_else(|| shape_error(format!("table {table} metadata has no current schema")))?;
        let table_path = self.catalog.table_path(table);

        let mut rows = Vec::new();
        for snapshot in &metadata.snapshots {
            let manifest_list_path = resolve(&table_path, &snapshot.manifest_list);
            for list_entry in ManifestListWriter::read(&manifest_list_path).await? {
                let manifest_path = resolve(&table_path, &list_entry.manifest_path);
                for entry in ManifestWriter::read(&manifest_path).await? {
                    if entry.status == ManifestStatus::Deleted {
                        continue;
                    }
                    let data_path = resolve(&table_path, &entry.file_path);
                    rows.extend(read_file_rows(&data_path, schema).await?);
                }
            }
            if snapshot.snapshot_id == snapshot_id {
                break;
            }
        }
        Ok(rows)
    }
}

fn resolve(table_path: &Path, stored: &str) -> PathBuf {
    let stored_path = Path::new(stored);
    if stored_path.is_absolute() {
        stored_path.to_path_buf()
    } else {
        table_path.join(stored_path)
    }
}

/// Read one Parquet data file in the order and types of `schema`, matching
/// columns by field id.
pub(crate) async fn read_file_rows(
    path: &Path,
    schema: &IcebergSchema,
) -> Result<Vec<DataRow>> {
    let file = tokio::fs::File::open(path).await?;
    let builder = ParquetRecordBatchStreamBuilder::new(file).await?;
    let stream = builder.build()?;
    let batches: Vec<RecordBatch> = stream.try_collect().await?;

    let mut rows = Vec::new();
    for batch in batches {
        let columns = schema
            .fields
            .iter()
            .map(|field| locate_column(&batch, field))
            .collect::<Result<Vec<_>>>()?;
        for row_idx in 0..batch.num_rows() {
            let values = schema
                .fields
                .iter()
                .zip(columns.iter())
                .map(|(field, column)| column_value(column, &field.field_type, row_idx))
                .collect::<Result<Vec<_>>>()?;
            rows.push(DataRow::new(values));
        }
    }
    Ok(rows)
}

/// Derive an Iceberg schema from a standalone Parquet file and read its rows.
/// Field ids come from the embedded annotations when present, positional
/// otherwise.
pub async fn read_parquet_file(path: &Path) -> Result<(IcebergSchema, Vec<DataRow>)> {
    let file = tokio::fs::File::open(path).await?;
    let builder = ParquetRecordBatchStreamBuilder::new(file).await?;
    let arrow_schema = builder.schema().clone();

    let mut fields = Vec::with_capacity(arrow_schema.fields().len());
    for (index, arrow_field) in arrow_schema.fields().iter().enumerate() {
        fields.push(IcebergField {
            id: arrow_field_id(arrow_field).unwrap_or(index as i32 + 1),
            name: arrow_field.name().clone(),
            required: !arrow_field.is_nullable(),
            field_type: arrow_to_iceberg_type(arrow_field.data_type())?,
        });
    }
    let schema = IcebergSchema {
        struct_type: "struct".to_string(),
        schema_id: 0,
        fields,
    };

    let stream = builder.build()?;
    let batches: Vec<RecordBatch> = stream.try_collect().await?;
    let mut rows = Vec::new();
    for batch in batches {
        for row_idx in 0..batch.num_rows() {
            let values = schema
                .fields
                .iter()
                .zip(batch.columns())
                .map(|(field, column)| column_value(column, &field.field_type, row_idx))
                .collect::<Result<Vec<_>>>()?;
            rows.push(DataRow::new(values));
        }
    }
    Ok((schema, rows))
}

fn arrow_to_iceberg_type(data_type: &DataType) -> Result<IcebergType> {
    let iceberg_type = match data_type {
        DataType::Boolean => IcebergType::Boolean,
        DataType::Int32 => IcebergType::Int,
        DataType::Int64 => IcebergType::Long,
        DataType::Float32 => IcebergType::Float,
        DataType::Float64 => IcebergType::Double,
        DataType::Utf8 => IcebergType::String,
        DataType::Binary => IcebergType::Binary,
        DataType::FixedSizeBinary(16) => IcebergType::Uuid,
        DataType::Date32 => IcebergType::Date,
        DataType::Timestamp(TimeUnit::Microsecond, _) => IcebergType::Timestamptz,
        DataType::Decimal128(precision, scale) => IcebergType::Decimal {
            precision: *precision,
            scale: *scale as u8,
        },
        other => {
            return Err(Error::unsupported_type(format!(
                "Parquet column type {other:?} has no Iceberg mapping"
            )))
        }
    };
    Ok(iceberg_type)
}

fn locate_column<'a>(
    batch: &'a RecordBatch,
    field: &IcebergField,
) -> Result<&'a arrow::array::ArrayRef> {
    let batch_schema = batch.schema_ref();
    for (index, arrow_field) in batch_schema.fields().iter().enumerate() {
        if arrow_field_id(arrow_field) == Some(field.id) {
            return Ok(batch.column(index));
        }
    }
    // Files written before ids were annotated can only be matched by name.
    batch_schema
        .fields()
        .iter()
        .position(|arrow_field| arrow_field.name() == &field.name)
        .map(|index| batch.column(index))
        .ok_or_else(|| {
            shape_error(format!(
                "no Parquet column carries field id {} (column {})",
                field.id, field.name
            ))
        })
}

fn column_value(
    column: &arrow::array::ArrayRef,
    iceberg_type: &IcebergType,
    row_idx: usize,
) -> Result<RowValue> {
    if column.is_null(row_idx) {
        return Ok(RowValue::Null);
    }
    let value = match iceberg_type {
        IcebergType::Boolean => {
            RowValue::Bool(downcast::<BooleanArray>(column)?.value(row_idx))
        }
        IcebergType::Int => RowValue::Int32(downcast::<Int32Array>(column)?.value(row_idx)),
        IcebergType::Long => RowValue::Int64(downcast::<Int64Array>(column)?.value(row_idx)),
        IcebergType::Float => {
            RowValue::Float32(downcast::<Float32Array>(column)?.value(row_idx))
        }
        IcebergType::Double => {
            RowValue::Float64(downcast::<Float64Array>(column)?.value(row_idx))
        }
        IcebergType::String => {
            RowValue::String(downcast::<StringArray>(column)?.value(row_idx).to_string())
        }
        IcebergType::Binary => {
            RowValue::Bytes(downcast::<BinaryArray>(column)?.value(row_idx).to_vec())
        }
        IcebergType::Uuid => {
            let bytes = downcast::<FixedSizeBinaryArray>(column)?.value(row_idx);
            let bytes: [u8; 16] = bytes
                .try_into()
                .map_err(|_| shape_error("uuid column is not 16 bytes wide".to_string()))?;
            RowValue::Uuid(bytes)
        }
        IcebergType::Date => RowValue::Date(downcast::<Date32Array>(column)?.value(row_idx)),
        IcebergType::Timestamp | IcebergType::Timestamptz => RowValue::Timestamp(
            downcast::<TimestampMicrosecondArray>(column)?.value(row_idx),
        ),
        IcebergType::Decimal { .. } => {
            RowValue::Decimal(downcast::<Decimal128Array>(column)?.value(row_idx))
        }
    };
    Ok(value)
}

fn downcast<T: 'static>(column: &arrow::array::ArrayRef) -> Result<&T> {
    column.as_any().downcast_ref::<T>().ok_or_else(|| {
        shape_error(format!(
            "Parquet column has unexpected Arrow type {:?}",
            column.data_type()
        ))
    })
}

#[track_caller]
fn shape_error(message: String) -> Error {
    Error::Parquet(ErrorDetail::permanent(message))
}
