use crate::error::{Error, ErrorDetail, Result};
use crate::storage::iceberg::parquet_writer::DataFileMetadata;
use apache_avro::types::Value as AvroValue;
use apache_avro::{Reader as AvroReader, Schema as AvroSchema, Writer as AvroWriter};
use std::collections::HashMap;
use std::path::Path;

/// Avro writer schema for manifest entries.
///
/// Kept as literal JSON so the `field-id` attributes Iceberg readers expect
/// reach the container header exactly as written here, independent of any
/// library round-trip of the parsed schema.
const MANIFEST_ENTRY_SCHEMA: &str = r#"{
  "type": "record",
  "name": "manifest_entry",
  "fields": [
    {"name": "status", "type": "int", "field-id": 0},
    {"name": "snapshot_id", "type": ["null", "long"], "default": null, "field-id": 1},
    {"name": "data_file", "field-id": 2, "type": {
      "type": "record",
      "name": "r2",
      "fields": [
        {"name": "file_path", "type": "string", "field-id": 100},
        {"name": "file_format", "type": "string", "field-id": 101},
        {"name": "partition", "type": {"type": "map", "values": "string"}, "field-id": 102},
        {"name": "record_count", "type": "long", "field-id": 103},
        {"name": "file_size_in_bytes", "type": "long", "field-id": 104}
      ]
    }}
  ]
}"#;

/// Avro writer schema for manifest-list entries.
const MANIFEST_LIST_SCHEMA: &str = r#"{
  "type": "record",
  "name": "manifest_file",
  "fields": [
    {"name": "manifest_path", "type": "string", "field-id": 500},
    {"name": "manifest_length", "type": "long", "field-id": 501},
    {"name": "partition_spec_id", "type": "int", "field-id": 502},
    {"name": "added_files_count", "type": "int", "field-id": 512},
    {"name": "existing_files_count", "type": "int", "field-id": 513},
    {"name": "deleted_files_count", "type": "int", "field-id": 514}
  ]
}"#;

/// Manifest entry status per the Iceberg spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestStatus {
    Existing = 0,
    Added = 1,
    Deleted = 2,
}

impl ManifestStatus {
    fn from_i32(value: i32) -> Result<Self> {
        match value {
            0 => Ok(ManifestStatus::Existing),
            1 => Ok(ManifestStatus::Added),
            2 => Ok(ManifestStatus::Deleted),
            other => Err(avro_shape_error(format!(
                "unknown manifest entry status {other}"
            ))),
        }
    }
}

/// A data file reference read back out of a manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDataFile {
    pub status: ManifestStatus,
    pub snapshot_id: i64,
    pub file_path: String,
    pub record_count: u64,
    pub file_size_in_bytes: u64,
}

/// One manifest referenced from a manifest-list. The path is relative to the
/// table directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestListEntry {
    pub manifest_path: String,
    pub manifest_length: u64,
    pub added_files_count: u32,
    pub existing_files_count: u32,
    pub deleted_files_count: u32,
}

/// Writes a snapshot's manifest: one record per data file, uncompressed Avro.
pub struct ManifestWriter;

impl ManifestWriter {
    /// Write the manifest to `path` and return its length in bytes.
    pub async fn write(
        path: impl AsRef<Path>,
        snapshot_id: i64,
        status: ManifestStatus,
        data_files: &[DataFileMetadata],
    ) -> Result<u64> {
        let schema = AvroSchema::parse_str(MANIFEST_ENTRY_SCHEMA)?;
        let mut writer = AvroWriter::new(&schema, Vec::new());
        for data_file in data_files {
            writer.append(data_file_to_avro(data_file, snapshot_id, status))?;
        }
        let bytes = writer.into_inner()?;
        let length = bytes.len() as u64;
        tokio::fs::write(path.as_ref(), bytes).await?;
        Ok(length)
    }

    /// Read every entry of a manifest written by [`ManifestWriter::write`].
    pub async fn read(path: impl AsRef<Path>) -> Result<Vec<ManifestDataFile>> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let reader = AvroReader::new(&bytes[..])?;
        let mut entries = Vec::new();
        for value in reader {
            entries.push(data_file_from_avro(value?)?);
        }
        Ok(entries)
    }
}

/// Writes a snapshot's manifest-list: one record per manifest.
pub struct ManifestListWriter;

impl ManifestListWriter {
    /// Write the manifest-list to `path` and return its length in bytes.
    pub async fn write(path: impl AsRef<Path>, entries: &[ManifestListEntry]) -> Result<u64> {
        let schema = AvroSchema::parse_str(MANIFEST_LIST_SCHEMA)?;
        let mut writer = AvroWriter::new(&schema, Vec::new());
        for entry in entries {
            writer.append(AvroValue::Record(vec![
                (
                    "manifest_path".to_string(),
                    AvroValue::String(entry.manifest_path.clone()),
                ),
                (
                    "manifest_length".to_string(),
                    AvroValue::Long(entry.manifest_length as i64),
                ),
                // Unpartitioned default spec.
                ("partition_spec_id".to_string(), AvroValue::Int(0)),
                (
                    "added_files_count".to_string(),
                    AvroValue::Int(entry.added_files_count as i32),
                ),
                (
                    "existing_files_count".to_string(),
                    AvroValue::Int(entry.existing_files_count as i32),
                ),
                (
                    "deleted_files_count".to_string(),
                    AvroValue::Int(entry.deleted_files_count as i32),
                ),
            ]))?;
        }
        let bytes = writer.into_inner()?;
        let length = bytes.len() as u64;
        tokio::fs::write(path.as_ref(), bytes).await?;
        Ok(length)
    }

    /// Read every entry of a manifest-list written by
    /// [`ManifestListWriter::write`].
    pub async fn read(path: impl AsRef<Path>) -> Result<Vec<ManifestListEntry>> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let reader = AvroReader::new(&bytes[..])?;
        let mut entries = Vec::new();
        for value in reader {
            entries.push(manifest_list_entry_from_avro(value?)?);
        }
        Ok(entries)
    }
}

fn data_file_to_avro(
    data_file: &DataFileMetadata,
    snapshot_id: i64,
    status: ManifestStatus,
) -> AvroValue {
    let partition: HashMap<String, AvroValue> = data_file
        .partition_values
        .iter()
        .map(|(k, v)| (k.clone(), AvroValue::String(v.clone())))
        .collect();
    let data_file_record = AvroValue::Record(vec![
        (
            "file_path".to_string(),
            AvroValue::String(data_file.path.to_string_lossy().to_string()),
        ),
        (
            "file_format".to_string(),
            AvroValue::String("PARQUET".to_string()),
        ),
        ("partition".to_string(), AvroValue::Map(partition)),
        (
            "record_count".to_string(),
            AvroValue::Long(data_file.record_count as i64),
        ),
        (
            "file_size_in_bytes".to_string(),
            AvroValue::Long(data_file.size_bytes as i64),
        ),
    ]);
    AvroValue::Record(vec![
        ("status".to_string(), AvroValue::Int(status as i32)),
        (
            "snapshot_id".to_string(),
            AvroValue::Union(1, Box::new(AvroValue::Long(snapshot_id))),
        ),
        ("data_file".to_string(), data_file_record),
    ])
}

fn data_file_from_avro(value: AvroValue) -> Result<ManifestDataFile> {
    let fields = record_fields(value)?;
    let mut status = None;
    let mut snapshot_id = 0;
    let mut file_path = None;
    let mut record_count = 0;
    let mut file_size_in_bytes = 0;
    for (name, field_value) in fields {
        match (name.as_str(), field_value) {
            ("status", AvroValue::Int(v)) => status = Some(ManifestStatus::from_i32(v)?),
            ("snapshot_id", AvroValue::Union(_, boxed)) => {
                if let AvroValue::Long(v) = *boxed {
                    snapshot_id = v;
                }
            }
            ("data_file", data_file) => {
                for (inner_name, inner_value) in record_fields(data_file)? {
                    match (inner_name.as_str(), inner_value) {
                        ("file_path", AvroValue::String(v)) => file_path = Some(v),
                        ("record_count", AvroValue::Long(v)) => record_count = v as u64,
                        ("file_size_in_bytes", AvroValue::Long(v)) => {
                            file_size_in_bytes = v as u64
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    match (status, file_path) {
        (Some(status), Some(file_path)) => Ok(ManifestDataFile {
            status,
            snapshot_id,
            file_path,
            record_count,
            file_size_in_bytes,
        }),
        _ => Err(avro_shape_error(
            "manifest entry is missing status or file_path".to_string(),
        )),
    }
}

fn manifest_list_entry_from_avro(value: AvroValue) -> Result<ManifestListEntry> {
    let fields = record_fields(value)?;
    let mut entry = ManifestListEntry {
        manifest_path: String::new(),
        manifest_length: 0,
        added_files_count: 0,
        existing_files_count: 0,
        deleted_files_count: 0,
    };
    for (name, field_value) in fields {
        match (name.as_str(), field_value) {
            ("manifest_path", AvroValue::String(v)) => entry.manifest_path = v,
            ("manifest_length", AvroValue::Long(v)) => entry.manifest_length = v as u64,
            ("added_files_count", AvroValue::Int(v)) => entry.added_files_count = v as u32,
            ("existing_files_count", AvroValue::Int(v)) => entry.existing_files_count = v as u32,
            ("deleted_files_count", AvroValue::Int(v)) => entry.deleted_files_count = v as u32,
            _ => {}
        }
    }
    if entry.manifest_path.is_empty() {
        return Err(avro_shape_error(
            "manifest-list entry is missing manifest_path".to_string(),
        ));
    }
    Ok(entry)
}

fn record_fields(value: AvroValue) -> Result<Vec<(String, AvroValue)>> {
    match value {
        AvroValue::Record(fields) => Ok(fields),
        other => Err(avro_shape_error(format!(
            "expected an Avro record, found {other:?}"
        ))),
    }
}

#[track_caller]
fn avro_shape_error(message: String) -> Error {
    Error::Avro(ErrorDetail::permanent(message))
}
