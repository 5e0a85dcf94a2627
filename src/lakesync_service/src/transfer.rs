use crate::config::{TransferConfig, TransferType};
use crate::error::{Error, Result};
use lakesync::row::DataRow;
use lakesync::source::{ExtractOptions, Extractor, Loader, TableSchema};
use lakesync::sync::{IncrementalSyncConfig, SyncCoordinator, WatermarkStore};
use lakesync::{
    build_iceberg_schema, read_parquet_file, FileCatalog, IcebergParquetWriter,
    IcebergTableReader, IcebergTableWriter, ParquetWriterConfig,
};
use lakesync_connectors::{table_schema_from_iceberg, SqliteDatabase};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const PIPE_CAPACITY: usize = 256;

/// What a finished transfer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub transfer_type: TransferType,
    pub rows: u64,
    pub new_snapshot_id: Option<i64>,
}

/// Validate and execute one transfer, honoring the configured deadline.
pub async fn run_transfer(config: &TransferConfig) -> Result<TransferReport> {
    config.ensure_valid()?;
    let cancel = CancellationToken::new();
    match config.timeout_seconds {
        None => dispatch(config, &cancel).await,
        Some(seconds) => {
            match tokio::time::timeout(Duration::from_secs(seconds), dispatch(config, &cancel))
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    Err(Error::Timeout(seconds))
                }
            }
        }
    }
}

async fn dispatch(config: &TransferConfig, cancel: &CancellationToken) -> Result<TransferReport> {
    let report = match config.transfer_type {
        TransferType::SqlToSql => sql_to_sql(config).await?,
        TransferType::SqlToParquet => sql_to_parquet(config, cancel).await?,
        TransferType::ParquetToSql => parquet_to_sql(config).await?,
        TransferType::SqlToIceberg => sql_to_iceberg(config, cancel).await?,
        TransferType::IcebergToSql => iceberg_to_sql(config).await?,
        TransferType::SqlToIcebergIncremental => sql_to_iceberg_incremental(config, cancel).await?,
    };
    info!(
        transfer_type = report.transfer_type.as_str(),
        rows = report.rows,
        snapshot = ?report.new_snapshot_id,
        "transfer complete"
    );
    Ok(report)
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| Error::Config(vec![format!("{field} is required")]))
}

fn extract_options(config: &TransferConfig) -> ExtractOptions {
    ExtractOptions {
        predicate: None,
        where_clause: config.where_clause.clone(),
        row_limit: config.row_limit.map(|limit| limit as u64),
    }
}

/// Pull the configured slice of the source table into memory, surfacing
/// extraction failures before anything is written downstream.
async fn extract_rows(
    source: &SqliteDatabase,
    table: &str,
    options: ExtractOptions,
) -> Result<(TableSchema, Vec<DataRow>)> {
    let schema = source.table_schema(table).await?;
    let (tx, mut rx) = mpsc::channel(PIPE_CAPACITY);
    let mut rows = Vec::new();
    let (extracted, ()) = tokio::join!(source.extract(table, &options, tx), async {
        while let Some(row) = rx.recv().await {
            rows.push(row);
        }
    });
    extracted?;
    Ok((schema, rows))
}

fn feed_rows(rows: Vec<DataRow>) -> mpsc::Receiver<DataRow> {
    let (tx, rx) = mpsc::channel(PIPE_CAPACITY.max(rows.len().max(1)));
    for row in rows {
        // Capacity covers the whole vector.
        let _ = tx.try_send(row);
    }
    rx
}

async fn sql_to_sql(config: &TransferConfig) -> Result<TransferReport> {
    let source =
        SqliteDatabase::connect(required(&config.source.connection, "source.connection")?).await?;
    let source_table = required(&config.source.table, "source.table")?;
    let (schema, rows) = extract_rows(&source, source_table, extract_options(config)).await?;

    let destination = SqliteDatabase::connect(required(
        &config.destination.connection,
        "destination.connection",
    )?)
    .await?;
    let destination_table = required(&config.destination.table, "destination.table")?;
    let loaded = destination
        .load(destination_table, &schema, feed_rows(rows))
        .await?;
    Ok(TransferReport {
        transfer_type: config.transfer_type,
        rows: loaded,
        new_snapshot_id: None,
    })
}

async fn sql_to_parquet(
    config: &TransferConfig,
    cancel: &CancellationToken,
) -> Result<TransferReport> {
    let source =
        SqliteDatabase::connect(required(&config.source.connection, "source.connection")?).await?;
    let source_table = required(&config.source.table, "source.table")?;
    let (schema, rows) = extract_rows(&source, source_table, extract_options(config)).await?;

    let parquet_path = required(&config.destination.parquet_path, "destination.parquet_path")?;
    let iceberg_schema = build_iceberg_schema(&schema)?;
    let mut writer = IcebergParquetWriter::open(
        parquet_path,
        &iceberg_schema,
        ParquetWriterConfig::default(),
        cancel.clone(),
    )
    .await?;
    for row in rows {
        writer.write_row(row).await?;
    }
    let data_file = writer.close().await?;
    Ok(TransferReport {
        transfer_type: config.transfer_type,
        rows: data_file.record_count,
        new_snapshot_id: None,
    })
}

async fn parquet_to_sql(config: &TransferConfig) -> Result<TransferReport> {
    let parquet_path = required(&config.source.parquet_path, "source.parquet_path")?;
    let (iceberg_schema, rows) = read_parquet_file(Path::new(parquet_path)).await?;

    let destination = SqliteDatabase::connect(required(
        &config.destination.connection,
        "destination.connection",
    )?)
    .await?;
    let destination_table = required(&config.destination.table, "destination.table")?;
    let schema = table_schema_from_iceberg(destination_table, &iceberg_schema);
    let loaded = destination
        .load(destination_table, &schema, feed_rows(rows))
        .await?;
    Ok(TransferReport {
        transfer_type: config.transfer_type,
        rows: loaded,
        new_snapshot_id: None,
    })
}

async fn sql_to_iceberg(
    config: &TransferConfig,
    cancel: &CancellationToken,
) -> Result<TransferReport> {
    let source =
        SqliteDatabase::connect(required(&config.source.connection, "source.connection")?).await?;
    let source_table = required(&config.source.table, "source.table")?;
    let (schema, rows) = extract_rows(&source, source_table, extract_options(config)).await?;

    let iceberg = config
        .destination
        .iceberg
        .as_ref()
        .ok_or_else(|| Error::Config(vec!["destination.iceberg is required".to_string()]))?;
    let table_name = required(&iceberg.table_name, "destination.iceberg.table_name")?;

    let catalog = Arc::new(FileCatalog::new(&config.warehouse_path));
    let writer = IcebergTableWriter::new(catalog);
    let iceberg_schema = build_iceberg_schema(&schema)?;
    let result = writer
        .write_table(table_name, &iceberg_schema, feed_rows(rows), cancel)
        .await?;
    Ok(TransferReport {
        transfer_type: config.transfer_type,
        rows: result.rows_appended,
        new_snapshot_id: result.new_snapshot_id,
    })
}

async fn iceberg_to_sql(config: &TransferConfig) -> Result<TransferReport> {
    let iceberg = config
        .source
        .iceberg
        .as_ref()
        .ok_or_else(|| Error::Config(vec!["source.iceberg is required".to_string()]))?;
    let table_name = required(&iceberg.table_name, "source.iceberg.table_name")?;

    let catalog = Arc::new(FileCatalog::new(&config.warehouse_path));
    let reader = IcebergTableReader::new(catalog);
    let iceberg_schema = reader.table_schema(table_name).await?;
    let rows = reader.read_table(table_name).await?;

    let destination = SqliteDatabase::connect(required(
        &config.destination.connection,
        "destination.connection",
    )?)
    .await?;
    let destination_table = required(&config.destination.table, "destination.table")?;
    let schema = table_schema_from_iceberg(destination_table, &iceberg_schema);
    let loaded = destination
        .load(destination_table, &schema, feed_rows(rows))
        .await?;
    Ok(TransferReport {
        transfer_type: config.transfer_type,
        rows: loaded,
        new_snapshot_id: None,
    })
}

async fn sql_to_iceberg_incremental(
    config: &TransferConfig,
    cancel: &CancellationToken,
) -> Result<TransferReport> {
    let source = Arc::new(
        SqliteDatabase::connect(required(&config.source.connection, "source.connection")?).await?,
    );
    let source_table = required(&config.source.table, "source.table")?;
    let iceberg = config
        .destination
        .iceberg
        .as_ref()
        .ok_or_else(|| Error::Config(vec!["destination.iceberg is required".to_string()]))?;
    let table_name = required(&iceberg.table_name, "destination.iceberg.table_name")?;
    let incremental = iceberg.incremental.as_ref().ok_or_else(|| {
        Error::Config(vec!["destination.iceberg.incremental is required".to_string()])
    })?;

    let catalog = Arc::new(FileCatalog::new(&config.warehouse_path));
    let watermark_store = Arc::new(WatermarkStore::new(config.state_path()));
    let coordinator = SyncCoordinator::new(
        source,
        IcebergTableWriter::new(catalog),
        watermark_store,
    );
    let sync_config = IncrementalSyncConfig {
        source_table: source_table.to_string(),
        iceberg_table: table_name.to_string(),
        primary_key_column: required(
            &incremental.primary_key_column,
            "destination.iceberg.incremental.primary_key_column",
        )?
        .to_string(),
        watermark_column: required(
            &incremental.watermark_column,
            "destination.iceberg.incremental.watermark_column",
        )?
        .to_string(),
        watermark_type: incremental.watermark_type,
        merge_strategy: incremental.merge_strategy,
        where_clause: config.where_clause.clone(),
        row_limit: config.row_limit.map(|limit| limit as u64),
        target_table: None,
    };
    let outcome = coordinator.run(&sync_config, cancel).await?;
    Ok(TransferReport {
        transfer_type: config.transfer_type,
        rows: outcome.rows_synced,
        new_snapshot_id: outcome.new_snapshot_id,
    })
}
