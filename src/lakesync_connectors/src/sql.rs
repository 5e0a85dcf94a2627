use crate::value::render_watermark_literal;
use lakesync::source::{ColumnType, SourceColumn, TableSchema};
use lakesync::sync::DeltaPredicate;
use lakesync::{IcebergSchema, IcebergType};

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Declared SQL type text for a column, readable back by
/// [`ColumnType::parse`].
pub fn column_decl(column_type: ColumnType) -> String {
    match column_type {
        ColumnType::TinyInt => "TINYINT".to_string(),
        ColumnType::SmallInt => "SMALLINT".to_string(),
        ColumnType::Int => "INT".to_string(),
        ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::Bit => "BIT".to_string(),
        ColumnType::Real => "REAL".to_string(),
        ColumnType::Float => "FLOAT".to_string(),
        ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
        ColumnType::Numeric { precision, scale } => format!("NUMERIC({precision},{scale})"),
        ColumnType::Money => "MONEY".to_string(),
        ColumnType::SmallMoney => "SMALLMONEY".to_string(),
        ColumnType::Char => "CHAR".to_string(),
        ColumnType::VarChar => "VARCHAR".to_string(),
        ColumnType::NChar => "NCHAR".to_string(),
        ColumnType::NVarChar => "NVARCHAR".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Binary => "BINARY".to_string(),
        ColumnType::VarBinary => "VARBINARY".to_string(),
        ColumnType::UniqueIdentifier => "UNIQUEIDENTIFIER".to_string(),
        ColumnType::Date => "DATE".to_string(),
        ColumnType::DateTime => "DATETIME".to_string(),
        ColumnType::SmallDateTime => "SMALLDATETIME".to_string(),
        ColumnType::DateTime2 => "DATETIME2".to_string(),
        ColumnType::DateTimeOffset => "DATETIMEOFFSET".to_string(),
        ColumnType::Xml => "XML".to_string(),
        ColumnType::Variant => "SQL_VARIANT".to_string(),
        ColumnType::Udt => "UDT".to_string(),
        ColumnType::TableType => "TABLE".to_string(),
        ColumnType::RowVersion => "ROWVERSION".to_string(),
    }
}

/// Relational column descriptors for a table mirrored out of an Iceberg
/// schema, used when the destination side is a database.
pub fn table_schema_from_iceberg(table: &str, schema: &IcebergSchema) -> TableSchema {
    let columns = schema
        .fields
        .iter()
        .map(|field| SourceColumn {
            name: field.name.clone(),
            column_type: match field.field_type {
                IcebergType::Boolean => ColumnType::Bit,
                IcebergType::Int => ColumnType::Int,
                IcebergType::Long => ColumnType::BigInt,
                IcebergType::Float => ColumnType::Real,
                IcebergType::Double => ColumnType::Float,
                IcebergType::String => ColumnType::NVarChar,
                IcebergType::Binary => ColumnType::VarBinary,
                IcebergType::Uuid => ColumnType::UniqueIdentifier,
                IcebergType::Date => ColumnType::Date,
                IcebergType::Timestamp => ColumnType::DateTime2,
                IcebergType::Timestamptz => ColumnType::DateTimeOffset,
                IcebergType::Decimal { precision, scale } => {
                    ColumnType::Decimal { precision, scale }
                }
            },
            nullable: !field.required,
            primary_key: false,
        })
        .collect();
    TableSchema::new(table, columns)
}

/// Renders the SELECT for an extraction pass: explicit quoted column list,
/// optional delta predicate and validated user filter, optional LIMIT.
#[derive(Debug, Default)]
pub struct SelectBuilder {
    predicate: Option<String>,
    where_clause: Option<String>,
    row_limit: Option<u64>,
}

impl SelectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delta_predicate(mut self, predicate: Option<&DeltaPredicate>) -> Self {
        self.predicate = predicate.map(|p| {
            format!(
                "{} > {}",
                quote_ident(&p.column),
                render_watermark_literal(&p.lower_bound)
            )
        });
        self
    }

    /// The fragment was vetted by configuration validation; it is appended
    /// verbatim.
    pub fn where_clause(mut self, where_clause: Option<&str>) -> Self {
        self.where_clause = where_clause.map(str::to_string);
        self
    }

    pub fn row_limit(mut self, row_limit: Option<u64>) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn build(self, schema: &TableSchema) -> String {
        let columns = schema
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {columns} FROM {}", quote_ident(&schema.table));
        let conditions: Vec<String> = self
            .predicate
            .into_iter()
            .chain(self.where_clause.into_iter().map(|w| format!("({w})")))
            .collect();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        if let Some(limit) = self.row_limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql
    }
}

/// `CREATE TABLE IF NOT EXISTS` with the declared types the schema parser
/// reads back.
pub(crate) fn build_create_table(target_table: &str, schema: &TableSchema) -> String {
    let mut parts: Vec<String> = schema
        .columns
        .iter()
        .map(|column| {
            let mut decl = format!(
                "{} {}",
                quote_ident(&column.name),
                column_decl(column.column_type)
            );
            if !column.nullable {
                decl.push_str(" NOT NULL");
            }
            decl
        })
        .collect();
    let keys: Vec<String> = schema
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| quote_ident(&c.name))
        .collect();
    if !keys.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(target_table),
        parts.join(", ")
    )
}

pub(crate) fn build_insert(target_table: &str, schema: &TableSchema) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; schema.columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders})",
        quote_ident(target_table)
    )
}

pub(crate) fn build_update_by_key(
    target_table: &str,
    schema: &TableSchema,
    primary_key_column: &str,
) -> String {
    let assignments = schema
        .columns
        .iter()
        .filter(|c| c.name != primary_key_column)
        .map(|c| format!("{} = ?", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {assignments} WHERE {} = ?",
        quote_ident(target_table),
        quote_ident(primary_key_column)
    )
}

pub(crate) fn build_exists_by_key(target_table: &str, primary_key_column: &str) -> String {
    format!(
        "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
        quote_ident(target_table),
        quote_ident(primary_key_column)
    )
}
