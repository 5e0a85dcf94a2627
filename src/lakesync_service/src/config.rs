use crate::error::{Error, Result};
use lakesync::sync::{MergeStrategy, WatermarkType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Substrings rejected in user-supplied WHERE fragments. Defense in depth;
/// actual safety comes from parameterized statements everywhere else.
const FORBIDDEN_WHERE_FRAGMENTS: &[&str] = &[
    ";--", "drop", "delete", "truncate", "alter", "create", "exec", "execute", "xp_",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    SqlToSql,
    SqlToParquet,
    ParquetToSql,
    SqlToIceberg,
    IcebergToSql,
    SqlToIcebergIncremental,
}

impl TransferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::SqlToSql => "sql_to_sql",
            TransferType::SqlToParquet => "sql_to_parquet",
            TransferType::ParquetToSql => "parquet_to_sql",
            TransferType::SqlToIceberg => "sql_to_iceberg",
            TransferType::IcebergToSql => "iceberg_to_sql",
            TransferType::SqlToIcebergIncremental => "sql_to_iceberg_incremental",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub parquet_path: Option<String>,
    #[serde(default)]
    pub iceberg: Option<IcebergEndpointConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IcebergEndpointConfig {
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub incremental: Option<IncrementalSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementalSettings {
    #[serde(default)]
    pub primary_key_column: Option<String>,
    #[serde(default)]
    pub watermark_column: Option<String>,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    #[serde(default)]
    pub watermark_type: WatermarkType,
}

/// One transfer description, loaded from a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    pub transfer_type: TransferType,
    #[serde(default)]
    pub source: EndpointConfig,
    #[serde(default)]
    pub destination: EndpointConfig,
    #[serde(default = "default_warehouse_path")]
    pub warehouse_path: String,
    /// Watermark directory; defaults to `<warehouse_path>/.sync-state`.
    #[serde(default)]
    pub state_path: Option<String>,
    #[serde(default)]
    pub row_limit: Option<i64>,
    #[serde(default)]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_warehouse_path() -> String {
    "./warehouse".to_string()
}

impl TransferConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn state_path(&self) -> PathBuf {
        match &self.state_path {
            Some(state_path) => PathBuf::from(state_path),
            None => Path::new(&self.warehouse_path).join(".sync-state"),
        }
    }

    /// Check the configuration and return every problem found, each naming
    /// the offending field. An empty list means the transfer can run.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let transfer_type = self.transfer_type.as_str();
        let mut require = |present: bool, field: &str| {
            if !present {
                errors.push(format!(
                    "{field} is required for transfer type {transfer_type}"
                ));
            }
        };

        let source_connection = self.source.connection.is_some();
        let source_table = self.source.table.is_some();
        let destination_connection = self.destination.connection.is_some();
        let destination_table = self.destination.table.is_some();
        let destination_iceberg_table = self
            .destination
            .iceberg
            .as_ref()
            .and_then(|i| i.table_name.as_ref())
            .is_some();

        match self.transfer_type {
            TransferType::SqlToSql => {
                require(source_connection, "source.connection");
                require(source_table, "source.table");
                require(destination_connection, "destination.connection");
                require(destination_table, "destination.table");
            }
            TransferType::SqlToParquet => {
                require(source_connection, "source.connection");
                require(source_table, "source.table");
                require(
                    self.destination.parquet_path.is_some(),
                    "destination.parquet_path",
                );
            }
            TransferType::ParquetToSql => {
                require(self.source.parquet_path.is_some(), "source.parquet_path");
                require(destination_connection, "destination.connection");
                require(destination_table, "destination.table");
            }
            TransferType::SqlToIceberg => {
                require(source_connection, "source.connection");
                require(source_table, "source.table");
                require(destination_iceberg_table, "destination.iceberg.table_name");
            }
            TransferType::IcebergToSql => {
                require(
                    self.source
                        .iceberg
                        .as_ref()
                        .and_then(|i| i.table_name.as_ref())
                        .is_some(),
                    "source.iceberg.table_name",
                );
                require(destination_connection, "destination.connection");
                require(destination_table, "destination.table");
            }
            TransferType::SqlToIcebergIncremental => {
                require(source_connection, "source.connection");
                require(source_table, "source.table");
                require(destination_iceberg_table, "destination.iceberg.table_name");
                let incremental = self
                    .destination
                    .iceberg
                    .as_ref()
                    .and_then(|i| i.incremental.as_ref());
                match incremental {
                    None => require(false, "destination.iceberg.incremental"),
                    Some(incremental) => {
                        require(
                            incremental.primary_key_column.is_some(),
                            "destination.iceberg.incremental.primary_key_column",
                        );
                        require(
                            incremental.watermark_column.is_some(),
                            "destination.iceberg.incremental.watermark_column",
                        );
                    }
                }
            }
        }

        if let Some(row_limit) = self.row_limit {
            if row_limit <= 0 {
                errors.push(format!(
                    "row_limit must be a positive integer, got {row_limit}"
                ));
            }
        }

        if let Some(where_clause) = &self.where_clause {
            let lowered = where_clause.to_lowercase();
            for fragment in FORBIDDEN_WHERE_FRAGMENTS {
                if lowered.contains(fragment) {
                    errors.push(format!(
                        "where_clause contains the forbidden fragment {fragment:?}"
                    ));
                }
            }
        }

        errors
    }

    /// Validation as a hard gate.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incremental_config() -> TransferConfig {
        serde_json::from_value(serde_json::json!({
            "transfer_type": "sql_to_iceberg_incremental",
            "source": { "connection": "sqlite://source.db", "table": "Sales" },
            "destination": { "iceberg": {
                "table_name": "sales",
                "incremental": {
                    "primary_key_column": "OrderID",
                    "watermark_column": "OrderDate"
                }
            }},
            "warehouse_path": "/tmp/warehouse"
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_incremental_config() {
        let config = incremental_config();
        assert!(config.validate().is_empty());
        let incremental = config
            .destination
            .iceberg
            .as_ref()
            .unwrap()
            .incremental
            .as_ref()
            .unwrap();
        // Unspecified strategy and watermark type take their defaults.
        assert_eq!(incremental.merge_strategy, MergeStrategy::Upsert);
        assert_eq!(incremental.watermark_type, WatermarkType::Timestamp);
    }

    #[test]
    fn test_missing_fields_are_each_named() {
        let config: TransferConfig = serde_json::from_value(serde_json::json!({
            "transfer_type": "sql_to_iceberg_incremental"
        }))
        .unwrap();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("source.connection")));
        assert!(errors.iter().any(|e| e.contains("source.table")));
        assert!(errors
            .iter()
            .any(|e| e.contains("destination.iceberg.table_name")));
        assert!(errors
            .iter()
            .any(|e| e.contains("destination.iceberg.incremental")));
    }

    #[test]
    fn test_each_transfer_type_names_required_fields() {
        for (transfer_type, expected) in [
            ("sql_to_sql", "destination.table"),
            ("sql_to_parquet", "destination.parquet_path"),
            ("parquet_to_sql", "source.parquet_path"),
            ("sql_to_iceberg", "destination.iceberg.table_name"),
            ("iceberg_to_sql", "source.iceberg.table_name"),
        ] {
            let config: TransferConfig = serde_json::from_value(serde_json::json!({
                "transfer_type": transfer_type
            }))
            .unwrap();
            let errors = config.validate();
            assert!(
                errors.iter().any(|e| e.contains(expected)),
                "{transfer_type} should report {expected}: {errors:?}"
            );
        }
    }

    #[test]
    fn test_unknown_transfer_type_is_rejected_at_parse() {
        let parsed = serde_json::from_value::<TransferConfig>(serde_json::json!({
            "transfer_type": "sql_to_csv"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_row_limit_must_be_positive() {
        let mut config = incremental_config();
        config.row_limit = Some(0);
        assert!(config
            .validate()
            .iter()
            .any(|e| e.contains("row_limit")));
        config.row_limit = Some(-5);
        assert!(!config.validate().is_empty());
        config.row_limit = Some(100);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_where_clause_blacklist() {
        let mut config = incremental_config();
        config.where_clause = Some("OrderID > 10".to_string());
        assert!(config.validate().is_empty());

        for hostile in [
            "1=1; DROP TABLE Sales",
            "1=1 ;-- comment",
            "OrderID IN (SELECT id FROM x); TRUNCATE TABLE Sales",
            "exec xp_cmdshell 'dir'",
            "1=1 OR dElEtE FROM Sales",
        ] {
            config.where_clause = Some(hostile.to_string());
            assert!(
                !config.validate().is_empty(),
                "{hostile:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_state_path_defaults_under_warehouse() {
        let config = incremental_config();
        assert_eq!(
            config.state_path(),
            PathBuf::from("/tmp/warehouse/.sync-state")
        );
    }
}
