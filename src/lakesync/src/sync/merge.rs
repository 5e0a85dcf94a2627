use crate::error::Result;
use crate::row::DataRow;
use crate::source::TableSchema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How a staged delta lands in a relational destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Update all non-key columns of matching rows, insert the rest. The
    /// default, because re-applying a delta after a partial failure must
    /// converge instead of duplicating.
    #[default]
    Upsert,
    /// Insert only rows whose primary key is absent; never update.
    Append,
}

/// Row counts produced by one merge application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    pub inserted: u64,
    pub updated: u64,
}

/// A relational destination that can absorb a staged rowset.
///
/// Semantics are row-level and deterministic for a given stage input,
/// regardless of target row ordering: applying the same rowset twice leaves
/// the target unchanged (upsert) or inserts nothing the second time (append).
#[async_trait]
pub trait MergeTarget: Send + Sync {
    async fn merge(
        &self,
        target_table: &str,
        schema: &TableSchema,
        primary_key_column: &str,
        strategy: MergeStrategy,
        rows: &[DataRow],
    ) -> Result<MergeOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_serde_defaults() {
        assert_eq!(MergeStrategy::default(), MergeStrategy::Upsert);
        assert_eq!(
            serde_json::from_str::<MergeStrategy>("\"upsert\"").unwrap(),
            MergeStrategy::Upsert
        );
        assert_eq!(
            serde_json::from_str::<MergeStrategy>("\"append\"").unwrap(),
            MergeStrategy::Append
        );
        assert!(serde_json::from_str::<MergeStrategy>("\"replace\"").is_err());
    }
}
