use crate::error::{Error, Result};
use crate::row::DataRow;
use crate::sync::DeltaPredicate;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Relational source column types lakesync understands.
///
/// Parametrized character and binary lengths are not retained; Iceberg has no
/// bounded string/binary types and the values travel as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Bit,
    Real,
    Float,
    Decimal { precision: u8, scale: u8 },
    Numeric { precision: u8, scale: u8 },
    Money,
    SmallMoney,
    Char,
    VarChar,
    NChar,
    NVarChar,
    Text,
    Binary,
    VarBinary,
    UniqueIdentifier,
    Date,
    DateTime,
    SmallDateTime,
    DateTime2,
    DateTimeOffset,
    // Recognized but rejected by the type mapper.
    Xml,
    Variant,
    Udt,
    TableType,
    RowVersion,
}

impl ColumnType {
    /// Parse a declared SQL type, e.g. `DECIMAL(18,2)`, `nvarchar(50)`,
    /// `datetime2`. Length arguments on character and binary types are
    /// accepted and ignored; precision and scale on decimals are kept.
    pub fn parse(declared: &str) -> Result<ColumnType> {
        let trimmed = declared.trim();
        let (base, args) = match trimmed.find('(') {
            Some(open) => {
                let close = trimmed.rfind(')').unwrap_or(trimmed.len());
                (&trimmed[..open], Some(&trimmed[open + 1..close]))
            }
            None => (trimmed, None),
        };
        let base = base.trim().to_ascii_lowercase();

        let parse_precision_scale = |args: Option<&str>| -> Result<(u8, u8)> {
            let args = args.unwrap_or("18,0");
            let mut parts = args.splitn(2, ',');
            let precision = parts
                .next()
                .unwrap_or("18")
                .trim()
                .parse::<u8>()
                .map_err(|_| {
                    Error::unsupported_type(format!("invalid decimal precision in {trimmed}"))
                })?;
            let scale = match parts.next() {
                Some(scale) => scale.trim().parse::<u8>().map_err(|_| {
                    Error::unsupported_type(format!("invalid decimal scale in {trimmed}"))
                })?,
                None => 0,
            };
            Ok((precision, scale))
        };

        let column_type = match base.as_str() {
            "tinyint" => ColumnType::TinyInt,
            "smallint" | "int2" => ColumnType::SmallInt,
            "int" | "integer" | "int4" | "mediumint" => ColumnType::Int,
            "bigint" | "int8" => ColumnType::BigInt,
            "bit" | "boolean" | "bool" => ColumnType::Bit,
            "real" | "float4" => ColumnType::Real,
            "float" | "double" | "double precision" | "float8" => ColumnType::Float,
            "decimal" | "dec" => {
                let (precision, scale) = parse_precision_scale(args)?;
                ColumnType::Decimal { precision, scale }
            }
            "numeric" => {
                let (precision, scale) = parse_precision_scale(args)?;
                ColumnType::Numeric { precision, scale }
            }
            "money" => ColumnType::Money,
            "smallmoney" => ColumnType::SmallMoney,
            "char" | "character" => ColumnType::Char,
            "varchar" | "character varying" => ColumnType::VarChar,
            "nchar" => ColumnType::NChar,
            "nvarchar" => ColumnType::NVarChar,
            "text" | "ntext" | "clob" => ColumnType::Text,
            "binary" => ColumnType::Binary,
            "varbinary" | "blob" | "image" | "bytea" => ColumnType::VarBinary,
            "uniqueidentifier" | "uuid" | "guid" => ColumnType::UniqueIdentifier,
            "date" => ColumnType::Date,
            "datetime" => ColumnType::DateTime,
            "smalldatetime" => ColumnType::SmallDateTime,
            "datetime2" => ColumnType::DateTime2,
            "datetimeoffset" | "timestamptz" | "timestamp with time zone" => {
                ColumnType::DateTimeOffset
            }
            "xml" => ColumnType::Xml,
            "sql_variant" | "variant" => ColumnType::Variant,
            "udt" | "hierarchyid" | "geometry" | "geography" => ColumnType::Udt,
            "table type" | "table" => ColumnType::TableType,
            // SQL Server spells its opaque row-version counter "timestamp".
            "rowversion" | "timestamp" => ColumnType::RowVersion,
            _ => {
                return Err(Error::unsupported_type(format!(
                    "unrecognized column type {trimmed}"
                )))
            }
        };
        Ok(column_type)
    }
}

/// One column of a relational source or destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}

/// Discovered shape of a relational table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<SourceColumn>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<SourceColumn>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&SourceColumn> {
        self.columns.iter().find(|c| c.primary_key)
    }
}

/// Row-selection options for an extraction pass.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Delta filter from change detection; absent for a full load.
    pub predicate: Option<DeltaPredicate>,
    /// Validated user-supplied filter fragment, appended verbatim.
    pub where_clause: Option<String>,
    pub row_limit: Option<u64>,
}

/// Streams rows out of a relational source.
///
/// Implementations send rows through the provided channel in source order and
/// return the total row count once the stream is exhausted. Dropping the
/// receiver cancels the extraction.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn table_schema(&self, table: &str) -> Result<TableSchema>;

    async fn extract(
        &self,
        table: &str,
        options: &ExtractOptions,
        tx: mpsc::Sender<DataRow>,
    ) -> Result<u64>;
}

/// Bulk-inserts a stream of rows into a destination table sharing the column
/// names of the stream. Creates the table when it does not exist.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(
        &self,
        target_table: &str,
        schema: &TableSchema,
        rx: mpsc::Receiver<DataRow>,
    ) -> Result<u64>;
}
