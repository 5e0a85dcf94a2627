/// A single typed cell extracted from a relational source.
///
/// Dates are days since 1970-01-01; timestamps are microseconds since the
/// epoch, already normalized to UTC by the producing connector. Decimals are
/// the unscaled mantissa at the declared scale of their column.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RowValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(i128),
    String(String),
    Bytes(Vec<u8>),
    Uuid([u8; 16]),
    Date(i32),
    Timestamp(i64),
    #[default]
    Null,
}

impl RowValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RowValue::Null)
    }

    /// Variant name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            RowValue::Bool(_) => "bool",
            RowValue::Int32(_) => "int32",
            RowValue::Int64(_) => "int64",
            RowValue::Float32(_) => "float32",
            RowValue::Float64(_) => "float64",
            RowValue::Decimal(_) => "decimal",
            RowValue::String(_) => "string",
            RowValue::Bytes(_) => "bytes",
            RowValue::Uuid(_) => "uuid",
            RowValue::Date(_) => "date",
            RowValue::Timestamp(_) => "timestamp",
            RowValue::Null => "null",
        }
    }
}
