use crate::error::{Error, Result};
use crate::row::DataRow;
use crate::source::TableSchema;
use crate::sync::watermark::{Watermark, WatermarkType, WatermarkValue};

/// A half-open delta filter: `column > lower_bound`.
///
/// The bound is strict, so rows exactly at the stored cursor can be emitted
/// again on the next run; the downstream primary-key merge resolves those
/// ties.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaPredicate {
    pub column: String,
    pub lower_bound: WatermarkValue,
}

impl DeltaPredicate {
    /// Whether a row (positioned against `column_index`) falls inside the
    /// delta.
    pub fn matches(&self, row: &DataRow, column_index: usize, watermark_type: WatermarkType) -> bool {
        row.value(column_index)
            .and_then(|value| WatermarkValue::from_row_value(value, watermark_type))
            .map(|value| value > self.lower_bound)
            .unwrap_or(false)
    }
}

/// Builds the extraction filter for a sync run: none for the initial full
/// load, strict greater-than on the stored cursor afterwards.
pub fn build_delta_predicate(
    watermark_column: &str,
    watermark_type: WatermarkType,
    last: Option<&Watermark>,
) -> Option<DeltaPredicate> {
    let lower_bound = last?.value(watermark_type)?;
    Some(DeltaPredicate {
        column: watermark_column.to_string(),
        lower_bound,
    })
}

/// Folds extracted rows into the new high-water value for the next run.
#[derive(Debug)]
pub struct WatermarkTracker {
    column_index: usize,
    watermark_type: WatermarkType,
    observed_max: Option<WatermarkValue>,
}

impl WatermarkTracker {
    pub fn new(
        schema: &TableSchema,
        watermark_column: &str,
        watermark_type: WatermarkType,
    ) -> Result<Self> {
        let column_index = schema.column_index(watermark_column).ok_or_else(|| {
            Error::unsupported_type(format!(
                "watermark column {watermark_column} does not exist in table {}",
                schema.table
            ))
        })?;
        Ok(Self {
            column_index,
            watermark_type,
            observed_max: None,
        })
    }

    pub fn column_index(&self) -> usize {
        self.column_index
    }

    pub fn observe(&mut self, row: &DataRow) {
        let value = row
            .value(self.column_index)
            .and_then(|value| WatermarkValue::from_row_value(value, self.watermark_type));
        if let Some(value) = value {
            let advanced = match self.observed_max {
                None => true,
                Some(current) => value > current,
            };
            if advanced {
                self.observed_max = Some(value);
            }
        }
    }

    /// `max(watermark_column)` over everything observed so far.
    pub fn observed_max(&self) -> Option<WatermarkValue> {
        self.observed_max
    }
}
