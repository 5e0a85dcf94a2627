use crate::error::{Error, ErrorDetail, Result};
use crate::row::DataRow;
use crate::storage::iceberg::file_catalog::{FileCatalog, METADATA_DIRECTORY};
use crate::storage::iceberg::manifest::{
    ManifestListEntry, ManifestListWriter, ManifestStatus, ManifestWriter,
};
use crate::storage::iceberg::parquet_writer::{
    DataFileMetadata, IcebergParquetWriter, ParquetWriterConfig,
};
use crate::storage::iceberg::schema::IcebergSchema;
use crate::storage::iceberg::table_metadata::{generate_snapshot_id, Snapshot, TableMetadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of a table write or append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendResult {
    /// Snapshot created by this operation; none when nothing was written.
    pub new_snapshot_id: Option<i64>,
    pub rows_appended: u64,
    pub data_file_count: u32,
}

impl AppendResult {
    fn no_op() -> Self {
        Self {
            new_snapshot_id: None,
            rows_appended: 0,
            data_file_count: 0,
        }
    }
}

/// Orchestrates the write path: schema → Parquet data file → manifest →
/// manifest-list → metadata → catalog commit.
///
/// Every intermediate file name derives from the snapshot id and fresh UUIDs
/// so a replayed operation cannot collide with an earlier attempt. Failure
/// before the commit leaves unreferenced files on disk; readers cannot
/// observe them.
pub struct IcebergTableWriter {
    catalog: Arc<FileCatalog>,
    parquet_config: ParquetWriterConfig,
}

impl IcebergTableWriter {
    pub fn new(catalog: Arc<FileCatalog>) -> Self {
        Self {
            catalog,
            parquet_config: ParquetWriterConfig::default(),
        }
    }

    pub fn with_parquet_config(mut self, parquet_config: ParquetWriterConfig) -> Self {
        self.parquet_config = parquet_config;
        self
    }

    pub fn catalog(&self) -> &Arc<FileCatalog> {
        &self.catalog
    }

    /// Create (or fully overwrite) a table from a row stream.
    ///
    /// An empty stream commits an empty table whose `current-snapshot-id` is
    /// null.
    pub async fn write_table(
        &self,
        table: &str,
        schema: &IcebergSchema,
        mut rows: mpsc::Receiver<DataRow>,
        cancel: &CancellationToken,
    ) -> Result<AppendResult> {
        let table_path = self.catalog.initialize_table(table).await?;

        let first_row = rows.recv().await;
        let snapshot = match first_row {
            None => None,
            Some(first_row) => {
                let snapshot_id = generate_snapshot_id();
                let data_file = self
                    .write_data_file(table, schema, first_row, &mut rows, cancel)
                    .await?;
                let rows_appended = data_file.record_count;
                let snapshot = self
                    .write_snapshot_files(table, snapshot_id, &data_file, cancel)
                    .await?;
                Some((snapshot, rows_appended))
            }
        };

        let location = table_path.to_string_lossy().to_string();
        let (metadata, result) = match snapshot {
            None => (
                TableMetadata::create_initial(schema.clone(), location, None),
                AppendResult::no_op(),
            ),
            Some((snapshot, rows_appended)) => {
                let result = AppendResult {
                    new_snapshot_id: Some(snapshot.snapshot_id),
                    rows_appended,
                    data_file_count: 1,
                };
                (
                    TableMetadata::create_initial(schema.clone(), location, Some(snapshot)),
                    result,
                )
            }
        };
        let version = self.catalog.commit(table, &metadata, cancel).await?;
        info!(
            table,
            version,
            rows = result.rows_appended,
            "created table"
        );
        Ok(result)
    }

    /// Append a row stream to an existing table as one new snapshot.
    ///
    /// The new manifest-list references only this snapshot's manifest; prior
    /// snapshots stay addressable through their own manifest-lists. An empty
    /// stream is a no-op: no files are written and no version is committed.
    pub async fn append(
        &self,
        table: &str,
        mut rows: mpsc::Receiver<DataRow>,
        cancel: &CancellationToken,
    ) -> Result<AppendResult> {
        let metadata = self
            .catalog
            .load_table(table)
            .await?
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;
        let schema = metadata
            .current_schema()
            .cloned()
            .ok_or_else(|| metadata_corruption(table))?;

        let first_row = match rows.recv().await {
            Some(first_row) => first_row,
            None => {
                debug!(table, "empty append, leaving table untouched");
                return Ok(AppendResult::no_op());
            }
        };

        let snapshot_id = generate_snapshot_id();
        let data_file = self
            .write_data_file(table, &schema, first_row, &mut rows, cancel)
            .await?;
        let rows_appended = data_file.record_count;
        let snapshot = self
            .write_snapshot_files(table, snapshot_id, &data_file, cancel)
            .await?;

        let next_metadata = metadata.add_snapshot(snapshot);
        let version = self.catalog.commit(table, &next_metadata, cancel).await?;
        info!(
            table,
            version,
            snapshot_id,
            rows = rows_appended,
            "appended snapshot"
        );
        Ok(AppendResult {
            new_snapshot_id: Some(snapshot_id),
            rows_appended,
            data_file_count: 1,
        })
    }

    async fn write_data_file(
        &self,
        table: &str,
        schema: &IcebergSchema,
        first_row: DataRow,
        rows: &mut mpsc::Receiver<DataRow>,
        cancel: &CancellationToken,
    ) -> Result<DataFileMetadata> {
        let data_path = random_data_file_path(&self.catalog.data_dir(table));
        let mut writer =
            IcebergParquetWriter::open(&data_path, schema, self.parquet_config, cancel.clone())
                .await?;
        writer.write_row(first_row).await?;
        while let Some(row) = rows.recv().await {
            writer.write_row(row).await?;
        }
        writer.close().await
    }

    /// Write the manifest and manifest-list for a single-data-file snapshot
    /// and return the snapshot record pointing at them.
    async fn write_snapshot_files(
        &self,
        table: &str,
        snapshot_id: i64,
        data_file: &DataFileMetadata,
        cancel: &CancellationToken,
    ) -> Result<Snapshot> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let metadata_dir = self.catalog.metadata_dir(table);

        let manifest_name = format!("{}-m0.avro", Uuid::new_v4());
        let manifest_length = ManifestWriter::write(
            metadata_dir.join(&manifest_name),
            snapshot_id,
            ManifestStatus::Added,
            std::slice::from_ref(data_file),
        )
        .await?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let manifest_list_name = format!("snap-{}-1-{}.avro", snapshot_id, Uuid::new_v4());
        ManifestListWriter::write(
            metadata_dir.join(&manifest_list_name),
            &[ManifestListEntry {
                manifest_path: format!("{METADATA_DIRECTORY}/{manifest_name}"),
                manifest_length,
                added_files_count: 1,
                existing_files_count: 0,
                deleted_files_count: 0,
            }],
        )
        .await?;

        Ok(Snapshot {
            snapshot_id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            manifest_list: format!("{METADATA_DIRECTORY}/{manifest_list_name}"),
        })
    }
}

/// Fresh data-file path inside a table's data directory; replays never
/// collide.
fn random_data_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(format!("{}.parquet", Uuid::new_v4()))
}

#[track_caller]
fn metadata_corruption(table: &str) -> Error {
    Error::Json(ErrorDetail::permanent(format!(
        "metadata for table {table} does not contain its current schema"
    )))
}
