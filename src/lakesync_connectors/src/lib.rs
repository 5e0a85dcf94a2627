mod error;
mod sql;
mod sqlite;
mod value;

pub use sql::{column_decl, quote_ident, table_schema_from_iceberg, SelectBuilder};
pub use sqlite::SqliteDatabase;
pub use value::{format_decimal, parse_decimal};
