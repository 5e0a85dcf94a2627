use crate::error::{Error, Result};
use crate::source::{ColumnType, TableSchema};
use crate::storage::iceberg::schema::{IcebergSchema, IcebergType, SchemaBuilder};

/// Maps a relational column type onto its Iceberg counterpart.
///
/// The match is total over the supported set: fixed-point types keep their
/// declared precision and scale, currency types get their fixed decimal
/// shapes, and every character flavor lands on `string`. Types with no
/// faithful Iceberg rendition are rejected rather than widened to `string`.
pub fn map_column_type(column_type: ColumnType, column_name: &str) -> Result<IcebergType> {
    let mapped = match column_type {
        ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Int => IcebergType::Int,
        ColumnType::BigInt => IcebergType::Long,
        ColumnType::Bit => IcebergType::Boolean,
        ColumnType::Real => IcebergType::Float,
        ColumnType::Float => IcebergType::Double,
        ColumnType::Decimal { precision, scale } | ColumnType::Numeric { precision, scale } => {
            IcebergType::Decimal { precision, scale }
        }
        ColumnType::Money => IcebergType::Decimal {
            precision: 19,
            scale: 4,
        },
        ColumnType::SmallMoney => IcebergType::Decimal {
            precision: 10,
            scale: 4,
        },
        ColumnType::Char
        | ColumnType::VarChar
        | ColumnType::NChar
        | ColumnType::NVarChar
        | ColumnType::Text => IcebergType::String,
        ColumnType::Binary | ColumnType::VarBinary => IcebergType::Binary,
        ColumnType::UniqueIdentifier => IcebergType::Uuid,
        ColumnType::Date => IcebergType::Date,
        ColumnType::DateTime | ColumnType::SmallDateTime | ColumnType::DateTime2 => {
            IcebergType::Timestamp
        }
        ColumnType::DateTimeOffset => IcebergType::Timestamptz,
        ColumnType::Xml
        | ColumnType::Variant
        | ColumnType::Udt
        | ColumnType::TableType
        | ColumnType::RowVersion => {
            return Err(Error::unsupported_type(format!(
                "column {column_name} has type {column_type:?}, which has no Iceberg mapping"
            )))
        }
    };
    Ok(mapped)
}

/// Maps a discovered relational table shape to an Iceberg schema with field
/// ids assigned 1..N in column order.
pub fn build_iceberg_schema(table_schema: &TableSchema) -> Result<IcebergSchema> {
    let mut builder = SchemaBuilder::new();
    for column in &table_schema.columns {
        let mapped = map_column_type(column.column_type, &column.name)?;
        builder = builder.add_field(column.name.clone(), mapped, !column.nullable);
    }
    Ok(builder.build())
}
