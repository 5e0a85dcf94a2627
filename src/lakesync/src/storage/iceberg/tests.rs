/// End-to-end tests for the Iceberg write path: write → commit → read-back,
/// append and time-travel, and the Parquet schema annotations readers rely
/// on.
use crate::row::{DataRow, RowValue};
use crate::storage::iceberg::file_catalog::{FileCatalog, VERSION_HINT_FILENAME};
use crate::storage::iceberg::reader::IcebergTableReader;
use crate::storage::iceberg::schema::{IcebergSchema, IcebergType, SchemaBuilder};
use crate::storage::iceberg::table_writer::IcebergTableWriter;
use crate::error::Error;

use std::path::PathBuf;
use std::sync::Arc;

use more_asserts::assert_ge;
use parquet::basic::{LogicalType, Type as PhysicalType};
use parquet::file::reader::FileReader;
use parquet::file::serialized_reader::SerializedFileReader;
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// ================================
/// Test utils
/// ================================
///
fn orders_schema() -> IcebergSchema {
    SchemaBuilder::new()
        .add_field("id", IcebergType::Int, true)
        .add_field("name", IcebergType::String, false)
        .add_field("amount", IcebergType::Double, true)
        .build()
}

fn order_row(id: i32, name: Option<&str>, amount: f64) -> DataRow {
    DataRow::new(vec![
        RowValue::Int32(id),
        name.map(|n| RowValue::String(n.to_string()))
            .unwrap_or(RowValue::Null),
        RowValue::Float64(amount),
    ])
}

fn initial_orders() -> Vec<DataRow> {
    vec![
        order_row(1, Some("Alice"), 99.99),
        order_row(2, Some("Bob"), 149.50),
        order_row(3, None, 0.00),
    ]
}

fn rows_channel(rows: Vec<DataRow>) -> mpsc::Receiver<DataRow> {
    let (tx, rx) = mpsc::channel(rows.len().max(1));
    for row in rows {
        tx.try_send(row).unwrap();
    }
    rx
}

struct TestTable {
    _dir: tempfile::TempDir,
    catalog: Arc<FileCatalog>,
    writer: IcebergTableWriter,
    reader: IcebergTableReader,
}

fn test_table() -> TestTable {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(FileCatalog::new(dir.path()));
    let writer = IcebergTableWriter::new(catalog.clone());
    let reader = IcebergTableReader::new(catalog.clone());
    TestTable {
        _dir: dir,
        catalog,
        writer,
        reader,
    }
}

async fn read_hint(catalog: &FileCatalog, table: &str) -> String {
    tokio::fs::read_to_string(catalog.metadata_dir(table).join(VERSION_HINT_FILENAME))
        .await
        .unwrap()
        .trim()
        .to_string()
}

async fn single_data_file(catalog: &FileCatalog, table: &str) -> PathBuf {
    let mut entries = tokio::fs::read_dir(catalog.data_dir(table)).await.unwrap();
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        files.push(entry.path());
    }
    assert_eq!(files.len(), 1);
    files.pop().unwrap()
}

/// ================================
/// Scenario: initial write and read-back
/// ================================
///
#[tokio::test]
async fn test_initial_write_then_read_back() {
    let table = test_table();
    let cancel = CancellationToken::new();

    let result = table
        .writer
        .write_table(
            "orders",
            &orders_schema(),
            rows_channel(initial_orders()),
            &cancel,
        )
        .await
        .unwrap();
    assert!(result.new_snapshot_id.is_some());
    assert_eq!(result.rows_appended, 3);
    assert_eq!(result.data_file_count, 1);

    assert!(table
        .catalog
        .metadata_dir("orders")
        .join("v1.metadata.json")
        .exists());
    assert_eq!(read_hint(&table.catalog, "orders").await, "1");

    let metadata = table.catalog.load_table("orders").await.unwrap().unwrap();
    assert_eq!(metadata.current_snapshot_id, result.new_snapshot_id);
    assert_eq!(metadata.last_column_id, 3);

    let rows = table.reader.read_table("orders").await.unwrap();
    assert_eq!(rows, initial_orders());
}

/// ================================
/// Scenario: append, then read current and historical snapshots
/// ================================
///
#[tokio::test]
async fn test_append_then_read_both_snapshots() {
    let table = test_table();
    let cancel = CancellationToken::new();

    let first = table
        .writer
        .write_table(
            "orders",
            &orders_schema(),
            rows_channel(initial_orders()),
            &cancel,
        )
        .await
        .unwrap();
    let second = table
        .writer
        .append(
            "orders",
            rows_channel(vec![order_row(4, Some("Dana"), 10.00)]),
            &cancel,
        )
        .await
        .unwrap();
    assert_ne!(first.new_snapshot_id, second.new_snapshot_id);

    assert_eq!(read_hint(&table.catalog, "orders").await, "2");
    assert!(table
        .catalog
        .metadata_dir("orders")
        .join("v1.metadata.json")
        .exists());
    assert!(table
        .catalog
        .metadata_dir("orders")
        .join("v2.metadata.json")
        .exists());

    let current = table.reader.read_table("orders").await.unwrap();
    assert_eq!(current.len(), 4);
    assert_eq!(current[3], order_row(4, Some("Dana"), 10.00));

    let historical = table
        .reader
        .read_snapshot("orders", first.new_snapshot_id.unwrap())
        .await
        .unwrap();
    assert_eq!(historical, initial_orders());

    let err = table
        .reader
        .read_snapshot("orders", 123456789)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SnapshotNotFound(123456789)));
}

/// ================================
/// Scenario: empty append is a no-op
/// ================================
///
#[tokio::test]
async fn test_empty_append_is_no_op() {
    let table = test_table();
    let cancel = CancellationToken::new();

    table
        .writer
        .write_table(
            "orders",
            &orders_schema(),
            rows_channel(initial_orders()),
            &cancel,
        )
        .await
        .unwrap();

    let metadata_files_before =
        std::fs::read_dir(table.catalog.metadata_dir("orders")).unwrap().count();
    let result = table
        .writer
        .append("orders", rows_channel(Vec::new()), &cancel)
        .await
        .unwrap();
    assert_eq!(result.new_snapshot_id, None);
    assert_eq!(result.rows_appended, 0);
    assert_eq!(result.data_file_count, 0);

    assert_eq!(read_hint(&table.catalog, "orders").await, "1");
    let metadata_files_after =
        std::fs::read_dir(table.catalog.metadata_dir("orders")).unwrap().count();
    assert_eq!(metadata_files_before, metadata_files_after);
    assert_eq!(table.reader.read_table("orders").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_append_to_missing_table_is_rejected() {
    let table = test_table();
    let err = table
        .writer
        .append(
            "ghost",
            rows_channel(vec![order_row(1, None, 0.0)]),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TableNotFound(name) if name == "ghost"));
}

/// ================================
/// Scenario: empty table commits with a null current snapshot
/// ================================
///
#[tokio::test]
async fn test_empty_table_has_null_current_snapshot() {
    let table = test_table();
    table
        .writer
        .write_table(
            "empty",
            &orders_schema(),
            rows_channel(Vec::new()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let json = tokio::fs::read_to_string(
        table.catalog.metadata_dir("empty").join("v1.metadata.json"),
    )
    .await
    .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value["current-snapshot-id"].is_null());

    assert!(table.reader.read_table("empty").await.unwrap().is_empty());
}

/// ================================
/// Scenario: snapshot history is append-only and additive
/// ================================
///
#[tokio::test]
async fn test_snapshot_monotonicity_and_additivity() {
    let table = test_table();
    let cancel = CancellationToken::new();

    table
        .writer
        .write_table(
            "orders",
            &orders_schema(),
            rows_channel(initial_orders()),
            &cancel,
        )
        .await
        .unwrap();
    let mut snapshot_ids = vec![
        table
            .catalog
            .load_table("orders")
            .await
            .unwrap()
            .unwrap()
            .current_snapshot_id
            .unwrap(),
    ];
    let mut last_updated = 0;
    for batch in 0..2 {
        let result = table
            .writer
            .append(
                "orders",
                rows_channel(vec![order_row(10 + batch, None, batch as f64)]),
                &cancel,
            )
            .await
            .unwrap();
        snapshot_ids.push(result.new_snapshot_id.unwrap());

        let metadata = table.catalog.load_table("orders").await.unwrap().unwrap();
        assert_eq!(metadata.snapshots.len(), snapshot_ids.len());
        assert_eq!(metadata.current_snapshot_id, snapshot_ids.last().copied());
        assert!(metadata
            .snapshots
            .iter()
            .any(|s| Some(s.snapshot_id) == metadata.current_snapshot_id));
        assert_ge!(metadata.last_updated_ms, last_updated);
        last_updated = metadata.last_updated_ms;
    }

    // Reading snapshot i yields the multiset-sum of rows appended so far.
    for (index, snapshot_id) in snapshot_ids.iter().enumerate() {
        let rows = table
            .reader
            .read_snapshot("orders", *snapshot_id)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3 + index);
    }
}

/// ================================
/// Scenario: every supported type maps onto the documented Parquet shape
/// ================================
///
fn all_types_schema() -> IcebergSchema {
    SchemaBuilder::new()
        .add_field("flag", IcebergType::Boolean, true)
        .add_field("small", IcebergType::Int, true)
        .add_field("big", IcebergType::Long, true)
        .add_field("ratio", IcebergType::Float, true)
        .add_field("precise", IcebergType::Double, true)
        .add_field("label", IcebergType::String, false)
        .add_field("payload", IcebergType::Binary, false)
        .add_field("token", IcebergType::Uuid, false)
        .add_field("day", IcebergType::Date, false)
        .add_field("seen_at", IcebergType::Timestamp, false)
        .add_field("seen_at_tz", IcebergType::Timestamptz, false)
        .add_field(
            "price",
            IcebergType::Decimal {
                precision: 9,
                scale: 2,
            },
            false,
        )
        .add_field(
            "balance",
            IcebergType::Decimal {
                precision: 18,
                scale: 4,
            },
            false,
        )
        .add_field(
            "volume",
            IcebergType::Decimal {
                precision: 30,
                scale: 6,
            },
            false,
        )
        .build()
}

fn all_types_row() -> DataRow {
    DataRow::new(vec![
        RowValue::Bool(true),
        RowValue::Int32(7),
        RowValue::Int64(7_000_000_000),
        RowValue::Float32(1.5),
        RowValue::Float64(2.25),
        RowValue::String("widget".to_string()),
        RowValue::Bytes(vec![0xDE, 0xAD]),
        RowValue::Uuid([9; 16]),
        RowValue::Date(19_723),
        RowValue::Timestamp(1_700_000_000_000_000),
        RowValue::Timestamp(1_700_000_000_000_001),
        RowValue::Decimal(12_345),
        RowValue::Decimal(98_765_432_101_234),
        RowValue::Decimal(123_456_789_012_345_678_901_234),
    ])
}

#[tokio::test]
async fn test_type_mapping_round_trip_and_parquet_annotations() {
    let table = test_table();
    let cancel = CancellationToken::new();
    let schema = all_types_schema();

    let nulls = DataRow::new(
        std::iter::once(RowValue::Bool(false))
            .chain([
                RowValue::Int32(0),
                RowValue::Int64(0),
                RowValue::Float32(0.0),
                RowValue::Float64(0.0),
            ])
            .chain(std::iter::repeat(RowValue::Null).take(9))
            .collect(),
    );
    table
        .writer
        .write_table(
            "typed",
            &schema,
            rows_channel(vec![all_types_row(), nulls.clone()]),
            &cancel,
        )
        .await
        .unwrap();

    let rows = table.reader.read_table("typed").await.unwrap();
    assert_eq!(rows, vec![all_types_row(), nulls]);

    // Crack the Parquet file open and verify the schema annotations.
    let data_path = single_data_file(&table.catalog, "typed").await;
    let file = std::fs::File::open(&data_path).unwrap();
    let reader = SerializedFileReader::new(file).unwrap();
    let descr = reader.metadata().file_metadata().schema_descr();
    assert_eq!(descr.num_columns(), schema.fields.len());

    for (column, field) in descr.columns().iter().zip(&schema.fields) {
        let basic_info = column.self_type().get_basic_info();
        assert!(basic_info.has_id(), "column {} lacks a field id", field.name);
        assert_eq!(basic_info.id(), field.id, "column {}", field.name);
    }

    let physical: Vec<PhysicalType> = descr
        .columns()
        .iter()
        .map(|c| c.physical_type())
        .collect();
    assert_eq!(
        physical,
        vec![
            PhysicalType::BOOLEAN,
            PhysicalType::INT32,
            PhysicalType::INT64,
            PhysicalType::FLOAT,
            PhysicalType::DOUBLE,
            PhysicalType::BYTE_ARRAY,
            PhysicalType::BYTE_ARRAY,
            PhysicalType::FIXED_LEN_BYTE_ARRAY,
            PhysicalType::INT32,
            PhysicalType::INT64,
            PhysicalType::INT64,
            // decimal(9,2) packs into INT32, decimal(18,4) into INT64,
            // decimal(30,6) into a fixed-length byte array.
            PhysicalType::INT32,
            PhysicalType::INT64,
            PhysicalType::FIXED_LEN_BYTE_ARRAY,
        ]
    );

    let logical: Vec<Option<LogicalType>> = descr
        .columns()
        .iter()
        .map(|c| c.logical_type())
        .collect();
    assert_eq!(logical[5], Some(LogicalType::String));
    assert_eq!(logical[7], Some(LogicalType::Uuid));
    assert_eq!(logical[8], Some(LogicalType::Date));
    for index in [9, 10] {
        match &logical[index] {
            Some(LogicalType::Timestamp {
                is_adjusted_to_u_t_c,
                unit,
            }) => {
                assert!(*is_adjusted_to_u_t_c);
                assert_eq!(unit, &parquet::basic::TimeUnit::MICROS);
            }
            other => panic!("column {index} has logical type {other:?}"),
        }
    }
    for (index, precision, scale) in [(11, 9, 2), (12, 18, 4), (13, 30, 6)] {
        match &logical[index] {
            Some(LogicalType::Decimal {
                precision: actual_precision,
                scale: actual_scale,
            }) => {
                assert_eq!(*actual_precision, precision);
                assert_eq!(*actual_scale, scale);
            }
            other => panic!("column {index} has logical type {other:?}"),
        }
    }
}

/// ================================
/// Scenario: the manifest chain records the written file faithfully
/// ================================
///
#[tokio::test]
async fn test_manifest_chain_references_data_file() {
    use crate::storage::iceberg::manifest::{ManifestListWriter, ManifestStatus, ManifestWriter};

    let table = test_table();
    let result = table
        .writer
        .write_table(
            "orders",
            &orders_schema(),
            rows_channel(initial_orders()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let metadata = table.catalog.load_table("orders").await.unwrap().unwrap();
    let snapshot = metadata.current_snapshot().unwrap();
    assert!(!snapshot.manifest_list.starts_with('/'));

    let table_path = table.catalog.table_path("orders");
    let list_entries = ManifestListWriter::read(table_path.join(&snapshot.manifest_list))
        .await
        .unwrap();
    assert_eq!(list_entries.len(), 1);
    assert_eq!(list_entries[0].added_files_count, 1);
    assert_eq!(list_entries[0].deleted_files_count, 0);

    let manifest_entries = ManifestWriter::read(table_path.join(&list_entries[0].manifest_path))
        .await
        .unwrap();
    assert_eq!(manifest_entries.len(), 1);
    assert_eq!(manifest_entries[0].status, ManifestStatus::Added);
    assert_eq!(
        Some(manifest_entries[0].snapshot_id),
        result.new_snapshot_id
    );
    assert_eq!(manifest_entries[0].record_count, 3);
    assert!(manifest_entries[0].file_path.ends_with(".parquet"));
}
