use crate::error::sqlx_error;
use crate::sql::{
    build_create_table, build_exists_by_key, build_insert, build_update_by_key, quote_ident,
    SelectBuilder,
};
use crate::value::{bind_value, decode_column};
use async_trait::async_trait;
use futures::TryStreamExt;
use lakesync::error::{Error, Result};
use lakesync::row::DataRow;
use lakesync::source::{ColumnType, ExtractOptions, Extractor, Loader, SourceColumn, TableSchema};
use lakesync::sync::{MergeOutcome, MergeStrategy, MergeTarget};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::debug;

/// SQLite-backed relational endpoint: schema discovery, extraction, bulk
/// load, and primary-key merge over one `sqlx` pool.
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (and create, if missing) the database at a `sqlite:` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(sqlx_error)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(sqlx_error)?;
        Ok(Self { pool })
    }

    /// Run one administrative statement (DDL, seed data).
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error)?;
        Ok(())
    }

    async fn discover_schema(&self, table: &str) -> Result<TableSchema> {
        let pragma = format!("PRAGMA table_info({})", quote_ident(table));
        let rows = sqlx::query(&pragma)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error)?;
        if rows.is_empty() {
            return Err(Error::TableNotFound(table.to_string()));
        }
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name").map_err(sqlx_error)?;
            let declared: String = row.try_get("type").map_err(sqlx_error)?;
            let not_null: i64 = row.try_get("notnull").map_err(sqlx_error)?;
            let pk: i64 = row.try_get("pk").map_err(sqlx_error)?;
            columns.push(SourceColumn {
                name,
                column_type: ColumnType::parse(&declared)?,
                nullable: not_null == 0 && pk == 0,
                primary_key: pk > 0,
            });
        }
        Ok(TableSchema::new(table, columns))
    }

    async fn ensure_table(&self, target_table: &str, schema: &TableSchema) -> Result<()> {
        self.execute(&build_create_table(target_table, schema)).await
    }
}

#[async_trait]
impl Extractor for SqliteDatabase {
    async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        self.discover_schema(table).await
    }

    async fn extract(
        &self,
        table: &str,
        options: &ExtractOptions,
        tx: mpsc::Sender<DataRow>,
    ) -> Result<u64> {
        let schema = self.discover_schema(table).await?;
        let sql = SelectBuilder::new()
            .delta_predicate(options.predicate.as_ref())
            .where_clause(options.where_clause.as_deref())
            .row_limit(options.row_limit)
            .build(&schema);
        debug!(table, %sql, "extracting");

        let mut stream = sqlx::query(&sql).fetch(&self.pool);
        let mut count = 0u64;
        while let Some(row) = stream.try_next().await.map_err(sqlx_error)? {
            let values = schema
                .columns
                .iter()
                .enumerate()
                .map(|(index, column)| decode_column(&row, index, column))
                .collect::<Result<Vec<_>>>()?;
            if tx.send(DataRow::new(values)).await.is_err() {
                // Receiver dropped: the caller tore the extraction down.
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl Loader for SqliteDatabase {
    async fn load(
        &self,
        target_table: &str,
        schema: &TableSchema,
        mut rx: mpsc::Receiver<DataRow>,
    ) -> Result<u64> {
        self.ensure_table(target_table, schema).await?;
        let insert_sql = build_insert(target_table, schema);

        let mut tx = self.pool.begin().await.map_err(sqlx_error)?;
        let mut count = 0u64;
        while let Some(row) = rx.recv().await {
            let mut query = sqlx::query(&insert_sql);
            for (value, column) in row.values.iter().zip(&schema.columns) {
                query = bind_value(query, value, column.column_type);
            }
            query.execute(&mut *tx).await.map_err(sqlx_error)?;
            count += 1;
        }
        tx.commit().await.map_err(sqlx_error)?;
        debug!(table = target_table, rows = count, "loaded");
        Ok(count)
    }
}

#[async_trait]
impl MergeTarget for SqliteDatabase {
    async fn merge(
        &self,
        target_table: &str,
        schema: &TableSchema,
        primary_key_column: &str,
        strategy: MergeStrategy,
        rows: &[DataRow],
    ) -> Result<MergeOutcome> {
        self.ensure_table(target_table, schema).await?;
        let key_index = schema.column_index(primary_key_column).ok_or_else(|| {
            Error::unsupported_type(format!(
                "primary key column {primary_key_column} does not exist in table {}",
                schema.table
            ))
        })?;
        let key_type = schema.columns[key_index].column_type;
        let exists_sql = build_exists_by_key(target_table, primary_key_column);
        let insert_sql = build_insert(target_table, schema);
        let update_sql = build_update_by_key(target_table, schema, primary_key_column);

        let mut tx = self.pool.begin().await.map_err(sqlx_error)?;
        let mut outcome = MergeOutcome::default();
        for row in rows {
            let key = &row.values[key_index];
            let exists = bind_value(sqlx::query(&exists_sql), key, key_type)
                .fetch_optional(&mut *tx)
                .await
                .map_err(sqlx_error)?
                .is_some();
            match (exists, strategy) {
                (true, MergeStrategy::Upsert) => {
                    let mut query = sqlx::query(&update_sql);
                    for (value, column) in row.values.iter().zip(&schema.columns) {
                        if column.name != primary_key_column {
                            query = bind_value(query, value, column.column_type);
                        }
                    }
                    query = bind_value(query, key, key_type);
                    query.execute(&mut *tx).await.map_err(sqlx_error)?;
                    outcome.updated += 1;
                }
                (true, MergeStrategy::Append) => {}
                (false, _) => {
                    let mut query = sqlx::query(&insert_sql);
                    for (value, column) in row.values.iter().zip(&schema.columns) {
                        query = bind_value(query, value, column.column_type);
                    }
                    query.execute(&mut *tx).await.map_err(sqlx_error)?;
                    outcome.inserted += 1;
                }
            }
        }
        tx.commit().await.map_err(sqlx_error)?;
        debug!(
            table = target_table,
            inserted = outcome.inserted,
            updated = outcome.updated,
            "merged"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lakesync::row::RowValue;
    use lakesync::sync::{DeltaPredicate, WatermarkValue};
    use tempfile::TempDir;

    async fn test_db() -> (TempDir, SqliteDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let db = SqliteDatabase::connect(&url).await.unwrap();
        (dir, db)
    }

    async fn seed_orders(db: &SqliteDatabase) {
        db.execute(
            "CREATE TABLE \"Orders\" (\
             \"OrderID\" INT NOT NULL PRIMARY KEY, \
             \"Customer\" NVARCHAR(50), \
             \"Total\" DECIMAL(18,2) NOT NULL, \
             \"OrderDate\" DATE NOT NULL, \
             \"UpdatedAt\" DATETIME2 NOT NULL)",
        )
        .await
        .unwrap();
        db.execute(
            "INSERT INTO \"Orders\" VALUES \
             (1, 'Alice', '99.99', '2024-01-05', '2024-01-05 08:30:00'), \
             (2, 'Bob', '149.50', '2024-01-20', '2024-01-20 12:00:00'), \
             (3, NULL, '0.00', '2024-02-02', '2024-02-02 09:15:00')",
        )
        .await
        .unwrap();
    }

    async fn extract_all(db: &SqliteDatabase, table: &str, options: ExtractOptions) -> Vec<DataRow> {
        let (tx, mut rx) = mpsc::channel(64);
        let count = db.extract(table, &options, tx).await.unwrap();
        let mut rows = Vec::new();
        while let Ok(row) = rx.try_recv() {
            rows.push(row);
        }
        assert_eq!(count as usize, rows.len());
        rows
    }

    #[tokio::test]
    async fn test_schema_discovery() {
        let (_dir, db) = test_db().await;
        seed_orders(&db).await;

        let schema = db.table_schema("Orders").await.unwrap();
        assert_eq!(schema.columns.len(), 5);
        assert_eq!(schema.columns[0].column_type, ColumnType::Int);
        assert!(schema.columns[0].primary_key);
        assert!(!schema.columns[0].nullable);
        assert_eq!(schema.columns[1].column_type, ColumnType::NVarChar);
        assert!(schema.columns[1].nullable);
        assert_eq!(
            schema.columns[2].column_type,
            ColumnType::Decimal {
                precision: 18,
                scale: 2
            }
        );
        assert_eq!(schema.columns[3].column_type, ColumnType::Date);
        assert_eq!(schema.columns[4].column_type, ColumnType::DateTime2);

        let err = db.table_schema("Missing").await.unwrap_err();
        assert!(matches!(err, Error::TableNotFound(name) if name == "Missing"));
    }

    #[tokio::test]
    async fn test_extract_decodes_typed_values() {
        let (_dir, db) = test_db().await;
        seed_orders(&db).await;

        let rows = extract_all(&db, "Orders", ExtractOptions::default()).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].values[0], RowValue::Int32(1));
        assert_eq!(rows[0].values[1], RowValue::String("Alice".to_string()));
        assert_eq!(rows[0].values[2], RowValue::Decimal(9999));
        assert_eq!(rows[0].values[3], RowValue::Date(19_727));
        assert_eq!(rows[2].values[1], RowValue::Null);
    }

    #[tokio::test]
    async fn test_extract_with_predicate_and_limit() {
        let (_dir, db) = test_db().await;
        seed_orders(&db).await;

        let predicate = DeltaPredicate {
            column: "OrderDate".to_string(),
            lower_bound: WatermarkValue::Timestamp(
                chrono::Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap(),
            ),
        };
        let rows = extract_all(
            &db,
            "Orders",
            ExtractOptions {
                predicate: Some(predicate),
                where_clause: None,
                row_limit: None,
            },
        )
        .await;
        // Strictly greater: the row on the boundary date is excluded.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values[0], RowValue::Int32(3));

        let rows = extract_all(
            &db,
            "Orders",
            ExtractOptions {
                predicate: None,
                where_clause: Some("\"Total\" <> '0.00'".to_string()),
                row_limit: Some(1),
            },
        )
        .await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values[0], RowValue::Int32(1));
    }

    #[tokio::test]
    async fn test_load_round_trips_rows() {
        let (_dir, db) = test_db().await;
        seed_orders(&db).await;

        let schema = db.table_schema("Orders").await.unwrap();
        let rows = extract_all(&db, "Orders", ExtractOptions::default()).await;

        let (tx, rx) = mpsc::channel(64);
        for row in &rows {
            tx.try_send(row.clone()).unwrap();
        }
        drop(tx);
        let loaded = db.load("OrdersCopy", &schema, rx).await.unwrap();
        assert_eq!(loaded, 3);

        let copy_rows = extract_all(&db, "OrdersCopy", ExtractOptions::default()).await;
        assert_eq!(copy_rows, rows);
    }

    #[tokio::test]
    async fn test_merge_upsert_counts_and_idempotence() {
        let (_dir, db) = test_db().await;
        seed_orders(&db).await;
        let schema = db.table_schema("Orders").await.unwrap();
        let rows = extract_all(&db, "Orders", ExtractOptions::default()).await;

        let first = db
            .merge("Mirror", &schema, "OrderID", MergeStrategy::Upsert, &rows)
            .await
            .unwrap();
        assert_eq!((first.inserted, first.updated), (3, 0));

        // Re-applying the same staged rowset converges instead of duplicating.
        let second = db
            .merge("Mirror", &schema, "OrderID", MergeStrategy::Upsert, &rows)
            .await
            .unwrap();
        assert_eq!((second.inserted, second.updated), (0, 3));
        let mirrored = extract_all(&db, "Mirror", ExtractOptions::default()).await;
        assert_eq!(mirrored, rows);
    }

    #[tokio::test]
    async fn test_merge_append_inserts_only_absent_keys() {
        let (_dir, db) = test_db().await;
        seed_orders(&db).await;
        let schema = db.table_schema("Orders").await.unwrap();
        let mut rows = extract_all(&db, "Orders", ExtractOptions::default()).await;

        db.merge("Mirror", &schema, "OrderID", MergeStrategy::Append, &rows)
            .await
            .unwrap();

        // Change an existing row and add a new key.
        rows[0].values[1] = RowValue::String("Altered".to_string());
        rows.push(DataRow::new(vec![
            RowValue::Int32(4),
            RowValue::String("Dana".to_string()),
            RowValue::Decimal(1000),
            RowValue::Date(19_760),
            RowValue::Timestamp(1_706_900_000_000_000),
        ]));
        let outcome = db
            .merge("Mirror", &schema, "OrderID", MergeStrategy::Append, &rows)
            .await
            .unwrap();
        assert_eq!((outcome.inserted, outcome.updated), (1, 0));

        let mirrored = extract_all(&db, "Mirror", ExtractOptions::default()).await;
        assert_eq!(mirrored.len(), 4);
        // The matched row kept its original values.
        assert_eq!(mirrored[0].values[1], RowValue::String("Alice".to_string()));
    }
}
