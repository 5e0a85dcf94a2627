use crate::error::Result;
use crate::row::RowValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Which cursor a table's change detection runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkType {
    #[default]
    Timestamp,
    Integer,
}

/// A single observed cursor position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatermarkValue {
    Timestamp(DateTime<Utc>),
    Integer(i64),
}

impl WatermarkValue {
    /// Lift a row cell into a cursor value of the configured kind. Date cells
    /// become midnight UTC; null and foreign-typed cells yield none.
    pub fn from_row_value(value: &RowValue, watermark_type: WatermarkType) -> Option<Self> {
        match (watermark_type, value) {
            (WatermarkType::Timestamp, RowValue::Timestamp(micros)) => {
                DateTime::<Utc>::from_timestamp_micros(*micros).map(WatermarkValue::Timestamp)
            }
            (WatermarkType::Timestamp, RowValue::Date(days)) => {
                DateTime::<Utc>::from_timestamp(i64::from(*days) * 86_400, 0)
                    .map(WatermarkValue::Timestamp)
            }
            (WatermarkType::Integer, RowValue::Int32(v)) => {
                Some(WatermarkValue::Integer(i64::from(*v)))
            }
            (WatermarkType::Integer, RowValue::Int64(v)) => Some(WatermarkValue::Integer(*v)),
            _ => None,
        }
    }
}

impl PartialOrd for WatermarkValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (WatermarkValue::Timestamp(a), WatermarkValue::Timestamp(b)) => a.partial_cmp(b),
            (WatermarkValue::Integer(a), WatermarkValue::Integer(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Persistent per-table sync cursor. Exactly one of the two cursor fields is
/// populated, per the configured watermark type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    pub table_name: String,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub last_sync_id: Option<i64>,
    pub last_iceberg_snapshot: Option<i64>,
    pub row_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Watermark {
    pub fn new(
        table_name: impl Into<String>,
        value: WatermarkValue,
        last_iceberg_snapshot: Option<i64>,
        row_count: u64,
    ) -> Self {
        let (last_sync_timestamp, last_sync_id) = match value {
            WatermarkValue::Timestamp(ts) => (Some(ts), None),
            WatermarkValue::Integer(id) => (None, Some(id)),
        };
        Self {
            table_name: table_name.into(),
            last_sync_timestamp,
            last_sync_id,
            last_iceberg_snapshot,
            row_count,
            created_at: Utc::now(),
        }
    }

    /// The cursor position, in the representation the watermark type calls
    /// for.
    pub fn value(&self, watermark_type: WatermarkType) -> Option<WatermarkValue> {
        match watermark_type {
            WatermarkType::Timestamp => self.last_sync_timestamp.map(WatermarkValue::Timestamp),
            WatermarkType::Integer => self.last_sync_id.map(WatermarkValue::Integer),
        }
    }
}

/// One JSON document per table under the state directory.
///
/// Writes are not atomic: a torn watermark costs at most a re-sync of one
/// delta, which the primary-key merge downstream absorbs. A per-table mutex
/// keeps writers within this process from interleaving.
pub struct WatermarkStore {
    state_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WatermarkStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, table: &str) -> Result<Option<Watermark>> {
        let lock = self.table_lock(table).await;
        let _guard = lock.lock().await;
        let path = self.watermark_path(table);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub async fn set(&self, table: &str, watermark: &Watermark) -> Result<()> {
        let lock = self.table_lock(table).await;
        let _guard = lock.lock().await;
        tokio::fs::create_dir_all(&self.state_dir).await?;
        let json = serde_json::to_vec_pretty(watermark)?;
        tokio::fs::write(self.watermark_path(table), json).await?;
        Ok(())
    }

    fn watermark_path(&self, table: &str) -> PathBuf {
        self.state_dir.join(format!("{table}.watermark.json"))
    }

    async fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
