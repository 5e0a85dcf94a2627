use crate::error::{Error, ErrorDetail, Result};
use crate::row::DataRow;
use crate::source::{ExtractOptions, Extractor};
use crate::storage::iceberg::{build_iceberg_schema, IcebergTableWriter};
use crate::sync::change_detection::{build_delta_predicate, WatermarkTracker};
use crate::sync::merge::{MergeOutcome, MergeStrategy, MergeTarget};
use crate::sync::watermark::{Watermark, WatermarkStore, WatermarkType};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const EXTRACT_CHANNEL_CAPACITY: usize = 256;

/// One table's incremental sync description.
#[derive(Debug, Clone)]
pub struct IncrementalSyncConfig {
    pub source_table: String,
    pub iceberg_table: String,
    pub primary_key_column: String,
    pub watermark_column: String,
    pub watermark_type: WatermarkType,
    pub merge_strategy: MergeStrategy,
    pub where_clause: Option<String>,
    pub row_limit: Option<u64>,
    /// Relational mirror to merge the delta into, when the destination side
    /// is relational as well as Iceberg.
    pub target_table: Option<String>,
}

/// What one sync run did.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub rows_synced: u64,
    pub new_snapshot_id: Option<i64>,
    pub merge: Option<MergeOutcome>,
    pub watermark: Option<Watermark>,
}

/// Drives one table through a sync cycle: watermark → delta extraction →
/// Iceberg append → optional relational merge → watermark persist.
///
/// The watermark is persisted strictly last. A crash after the Iceberg commit
/// but before the persist leaves a stale cursor; the next run re-reads that
/// delta and the primary-key merge absorbs the duplicates, which is why
/// upsert is the default strategy. A failed run never advances the cursor.
pub struct SyncCoordinator {
    extractor: Arc<dyn Extractor>,
    writer: IcebergTableWriter,
    watermark_store: Arc<WatermarkStore>,
    merge_target: Option<Arc<dyn MergeTarget>>,
}

impl SyncCoordinator {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        writer: IcebergTableWriter,
        watermark_store: Arc<WatermarkStore>,
    ) -> Self {
        Self {
            extractor,
            writer,
            watermark_store,
            merge_target: None,
        }
    }

    pub fn with_merge_target(mut self, merge_target: Arc<dyn MergeTarget>) -> Self {
        self.merge_target = Some(merge_target);
        self
    }

    pub async fn run(
        &self,
        config: &IncrementalSyncConfig,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let previous = self.watermark_store.get(&config.iceberg_table).await?;
        let schema = self.extractor.table_schema(&config.source_table).await?;
        let mut tracker =
            WatermarkTracker::new(&schema, &config.watermark_column, config.watermark_type)?;

        let options = ExtractOptions {
            predicate: build_delta_predicate(
                &config.watermark_column,
                config.watermark_type,
                previous.as_ref(),
            ),
            where_clause: config.where_clause.clone(),
            row_limit: config.row_limit,
        };
        let rows = self
            .extract_delta(&config.source_table, options, cancel)
            .await?;

        if rows.is_empty() {
            // Empty delta: no snapshot, and the cursor stays where it was.
            debug!(table = %config.iceberg_table, "no new rows, sync is a no-op");
            return Ok(SyncOutcome {
                rows_synced: 0,
                new_snapshot_id: None,
                merge: None,
                watermark: previous,
            });
        }
        for row in &rows {
            tracker.observe(row);
        }

        let append_result = self
            .append_to_iceberg(config, &schema, &rows, cancel)
            .await?;

        let merge = match &config.target_table {
            None => None,
            Some(target_table) => {
                let merge_target = self.merge_target.as_ref().ok_or_else(|| {
                    configuration_error(format!(
                        "sync of {} names target table {target_table} but no merge target is wired",
                        config.iceberg_table
                    ))
                })?;
                Some(
                    merge_target
                        .merge(
                            target_table,
                            &schema,
                            &config.primary_key_column,
                            config.merge_strategy,
                            &rows,
                        )
                        .await?,
                )
            }
        };

        let observed = tracker.observed_max();
        let cursor = observed.or_else(|| {
            previous
                .as_ref()
                .and_then(|w| w.value(config.watermark_type))
        });
        let watermark = match cursor {
            None => previous,
            Some(cursor) => {
                let row_count =
                    previous.as_ref().map(|w| w.row_count).unwrap_or(0) + rows.len() as u64;
                let watermark = Watermark::new(
                    &config.iceberg_table,
                    cursor,
                    append_result.new_snapshot_id,
                    row_count,
                );
                self.watermark_store
                    .set(&config.iceberg_table, &watermark)
                    .await?;
                Some(watermark)
            }
        };

        info!(
            table = %config.iceberg_table,
            rows = rows.len(),
            snapshot = ?append_result.new_snapshot_id,
            "sync run complete"
        );
        Ok(SyncOutcome {
            rows_synced: rows.len() as u64,
            new_snapshot_id: append_result.new_snapshot_id,
            merge,
            watermark,
        })
    }

    async fn extract_delta(
        &self,
        source_table: &str,
        options: ExtractOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<DataRow>> {
        let (tx, mut rx) = mpsc::channel(EXTRACT_CHANNEL_CAPACITY);
        let extractor = self.extractor.clone();
        let table = source_table.to_string();
        let extraction =
            tokio::spawn(async move { extractor.extract(&table, &options, tx).await });

        let mut rows = Vec::new();
        let mut cancelled = false;
        while let Some(row) = rx.recv().await {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            rows.push(row);
        }
        if cancelled {
            // Dropping the receiver tears the extraction down.
            drop(rx);
            extraction.abort();
            return Err(Error::Cancelled);
        }
        let extracted = extraction.await.map_err(|err| {
            Error::Io(ErrorDetail::permanent("extraction task failed").with_source(err))
        })??;
        debug_assert_eq!(extracted as usize, rows.len());
        Ok(rows)
    }

    async fn append_to_iceberg(
        &self,
        config: &IncrementalSyncConfig,
        schema: &crate::source::TableSchema,
        rows: &[DataRow],
        cancel: &CancellationToken,
    ) -> Result<crate::storage::iceberg::AppendResult> {
        let (tx, rx) = mpsc::channel(EXTRACT_CHANNEL_CAPACITY);
        let feed_rows = rows.to_vec();
        let feeder = tokio::spawn(async move {
            for row in feed_rows {
                if tx.send(row).await.is_err() {
                    break;
                }
            }
        });

        let table_exists = self
            .writer
            .catalog()
            .load_table(&config.iceberg_table)
            .await?
            .is_some();
        let result = if table_exists {
            self.writer.append(&config.iceberg_table, rx, cancel).await
        } else {
            // First run materializes the table from the mapped source schema.
            let iceberg_schema = build_iceberg_schema(schema)?;
            self.writer
                .write_table(&config.iceberg_table, &iceberg_schema, rx, cancel)
                .await
        };
        let _ = feeder.await;
        result
    }
}

#[track_caller]
fn configuration_error(message: String) -> Error {
    Error::Json(ErrorDetail::permanent(message))
}
