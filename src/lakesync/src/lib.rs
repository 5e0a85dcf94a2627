pub mod error;
pub mod row;
pub mod source;
mod storage;
pub mod sync;

pub use error::*;
pub use storage::iceberg::{
    build_iceberg_schema, map_column_type, read_parquet_file, AppendResult, DataFileMetadata,
    FileCatalog, IcebergField, IcebergParquetWriter, IcebergSchema, IcebergTableReader,
    IcebergTableWriter, IcebergType, ParquetWriterConfig, SchemaBuilder, Snapshot, TableMetadata,
};
