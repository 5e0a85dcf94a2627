use crate::storage::iceberg::schema::IcebergSchema;
use serde::{Deserialize, Serialize};

/// Iceberg format version this writer emits.
const FORMAT_VERSION: u8 = 2;

/// An atomically committed table state. The manifest-list path is stored
/// relative to the table directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    pub snapshot_id: i64,
    pub timestamp_ms: i64,
    pub manifest_list: String,
}

/// The unpartitioned default spec; this writer never emits another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpec {
    pub spec_id: i32,
    pub fields: Vec<serde_json::Value>,
}

impl PartitionSpec {
    fn unpartitioned() -> Self {
        Self {
            spec_id: 0,
            fields: Vec::new(),
        }
    }
}

/// The root `v{N}.metadata.json` document, Iceberg v2 shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    pub format_version: u8,
    pub table_uuid: String,
    pub location: String,
    pub last_updated_ms: i64,
    pub last_column_id: i32,
    pub schemas: Vec<IcebergSchema>,
    pub current_schema_id: i32,
    pub partition_specs: Vec<PartitionSpec>,
    pub default_spec_id: i32,
    pub last_partition_id: i32,
    pub snapshots: Vec<Snapshot>,
    // Emitted as JSON null for a table with no committed data.
    pub current_snapshot_id: Option<i64>,
}

impl TableMetadata {
    /// Metadata for a freshly created table. `snapshot` is absent only for an
    /// empty table with no committed data.
    pub fn create_initial(
        schema: IcebergSchema,
        location: impl Into<String>,
        snapshot: Option<Snapshot>,
    ) -> Self {
        let last_column_id = schema.last_column_id();
        let current_snapshot_id = snapshot.as_ref().map(|s| s.snapshot_id);
        TableMetadata {
            format_version: FORMAT_VERSION,
            table_uuid: uuid::Uuid::new_v4().to_string(),
            location: location.into(),
            last_updated_ms: chrono::Utc::now().timestamp_millis(),
            last_column_id,
            schemas: vec![schema],
            current_schema_id: 0,
            partition_specs: vec![PartitionSpec::unpartitioned()],
            default_spec_id: 0,
            last_partition_id: 0,
            snapshots: snapshot.into_iter().collect(),
            current_snapshot_id,
        }
    }

    /// A new metadata value with the snapshot appended and made current.
    /// Schema, uuid, and location are preserved verbatim; history is never
    /// dropped.
    pub fn add_snapshot(&self, snapshot: Snapshot) -> Self {
        let mut next = self.clone();
        next.current_snapshot_id = Some(snapshot.snapshot_id);
        next.snapshots.push(snapshot);
        next.last_updated_ms = chrono::Utc::now().timestamp_millis();
        next
    }

    pub fn current_schema(&self) -> Option<&IcebergSchema> {
        self.schemas
            .iter()
            .find(|s| s.schema_id == self.current_schema_id)
    }

    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        let current_id = self.current_snapshot_id?;
        self.snapshots.iter().find(|s| s.snapshot_id == current_id)
    }

    pub fn snapshot(&self, snapshot_id: i64) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.snapshot_id == snapshot_id)
    }
}

/// A 63-bit snapshot id: current millis in the high bits with random low
/// bits, unique within a table's lifetime.
pub fn generate_snapshot_id() -> i64 {
    let millis = chrono::Utc::now().timestamp_millis();
    let entropy = rand::random::<u64>() & 0xFFFFF;
    (((millis as u64) << 20) | entropy) as i64 & i64::MAX
}
