/// In-memory extractor and merge target used by coordinator tests here and by
/// dependent crates through the `test-utils` feature.
use crate::error::{Error, Result};
use crate::row::DataRow;
use crate::source::{ExtractOptions, Extractor, TableSchema};
use crate::sync::merge::{MergeOutcome, MergeStrategy, MergeTarget};
use crate::sync::watermark::WatermarkType;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// A relational source backed by a vector of rows.
pub struct MemoryExtractor {
    schema: TableSchema,
    rows: Mutex<Vec<DataRow>>,
}

impl MemoryExtractor {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Mutex::new(Vec::new()),
        }
    }

    /// Simulate source-side inserts.
    pub async fn push_rows(&self, rows: Vec<DataRow>) {
        self.rows.lock().await.extend(rows);
    }
}

#[async_trait]
impl Extractor for MemoryExtractor {
    async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        if table == self.schema.table {
            Ok(self.schema.clone())
        } else {
            Err(Error::TableNotFound(table.to_string()))
        }
    }

    async fn extract(
        &self,
        table: &str,
        options: &ExtractOptions,
        tx: mpsc::Sender<DataRow>,
    ) -> Result<u64> {
        if table != self.schema.table {
            return Err(Error::TableNotFound(table.to_string()));
        }
        let rows = self.rows.lock().await.clone();
        let delta = options.predicate.as_ref().and_then(|predicate| {
            let watermark_type = match predicate.lower_bound {
                crate::sync::watermark::WatermarkValue::Timestamp(_) => WatermarkType::Timestamp,
                crate::sync::watermark::WatermarkValue::Integer(_) => WatermarkType::Integer,
            };
            self.schema
                .column_index(&predicate.column)
                .map(|index| (predicate, index, watermark_type))
        });

        let mut count = 0u64;
        for row in rows {
            if let Some((predicate, index, watermark_type)) = &delta {
                if !predicate.matches(&row, *index, *watermark_type) {
                    continue;
                }
            }
            if let Some(limit) = options.row_limit {
                if count >= limit {
                    break;
                }
            }
            if tx.send(row).await.is_err() {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}

/// A relational destination holding tables in memory, merging by primary key.
#[derive(Default)]
pub struct MemoryMergeTarget {
    tables: Mutex<HashMap<String, Vec<DataRow>>>,
}

impl MemoryMergeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows(&self, table: &str) -> Vec<DataRow> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MergeTarget for MemoryMergeTarget {
    async fn merge(
        &self,
        target_table: &str,
        schema: &TableSchema,
        primary_key_column: &str,
        strategy: MergeStrategy,
        rows: &[DataRow],
    ) -> Result<MergeOutcome> {
        let key_index = schema.column_index(primary_key_column).ok_or_else(|| {
            Error::unsupported_type(format!(
                "primary key column {primary_key_column} does not exist in table {}",
                schema.table
            ))
        })?;

        let mut tables = self.tables.lock().await;
        let target = tables.entry(target_table.to_string()).or_default();
        let mut outcome = MergeOutcome::default();
        for row in rows {
            let key = row.value(key_index);
            let existing = target
                .iter()
                .position(|candidate| candidate.value(key_index) == key);
            match (existing, strategy) {
                (Some(position), MergeStrategy::Upsert) => {
                    target[position] = row.clone();
                    outcome.updated += 1;
                }
                (Some(_), MergeStrategy::Append) => {}
                (None, _) => {
                    target.push(row.clone());
                    outcome.inserted += 1;
                }
            }
        }
        Ok(outcome)
    }
}
