mod file_catalog;
mod manifest;
mod parquet_writer;
mod reader;
mod schema;
mod table_metadata;
mod table_writer;
mod type_mapper;

#[cfg(test)]
mod tests;

pub use file_catalog::{FileCatalog, DATA_DIRECTORY, METADATA_DIRECTORY, VERSION_HINT_FILENAME};
pub use manifest::{ManifestListEntry, ManifestListWriter, ManifestStatus, ManifestWriter};
pub use parquet_writer::{DataFileMetadata, IcebergParquetWriter, ParquetWriterConfig};
pub use reader::{read_parquet_file, IcebergTableReader};
pub use schema::{IcebergField, IcebergSchema, IcebergType, SchemaBuilder, PARQUET_FIELD_ID_KEY};
pub use table_metadata::{generate_snapshot_id, Snapshot, TableMetadata};
pub use table_writer::{AppendResult, IcebergTableWriter};
pub use type_mapper::{build_iceberg_schema, map_column_type};
