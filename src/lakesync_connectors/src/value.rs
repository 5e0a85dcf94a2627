use crate::error::{decode_error, sqlx_error};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lakesync::error::Result;
use lakesync::row::RowValue;
use lakesync::source::{ColumnType, SourceColumn};
use lakesync::sync::WatermarkValue;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::query::Query;
use sqlx::Row;
use std::str::FromStr;

const EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(1970, 1, 1) {
    Some(date) => date,
    None => panic!("epoch date is valid"),
};

/// Parse a decimal literal into its mantissa at the declared scale, e.g.
/// `"99.99"` at scale 2 becomes `9999`.
pub fn parse_decimal(text: &str, scale: u8) -> Result<i128> {
    let decimal = BigDecimal::from_str(text.trim())
        .map_err(|_| decode_error(format!("invalid decimal literal {text}")))?;
    let (mantissa, _) = decimal.with_scale(i64::from(scale)).into_bigint_and_exponent();
    (&mantissa)
        .try_into()
        .map_err(|_| decode_error(format!("decimal literal {text} overflows 128 bits")))
}

/// Render a mantissa back into a decimal literal at its scale.
pub fn format_decimal(mantissa: i128, scale: u8) -> String {
    if scale == 0 {
        return mantissa.to_string();
    }
    let digits = mantissa.unsigned_abs().to_string();
    let scale = scale as usize;
    let sign = if mantissa < 0 { "-" } else { "" };
    if digits.len() <= scale {
        format!("{sign}0.{digits:0>scale$}")
    } else {
        let (whole, fraction) = digits.split_at(digits.len() - scale);
        format!("{sign}{whole}.{fraction}")
    }
}

pub(crate) fn parse_date(text: &str) -> Result<i32> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map(|date| date.signed_duration_since(EPOCH).num_days() as i32)
        .map_err(|err| decode_error(format!("invalid date {text}: {err}")))
}

pub(crate) fn format_date(days: i32) -> String {
    (EPOCH + chrono::Duration::days(i64::from(days)))
        .format("%Y-%m-%d")
        .to_string()
}

/// Naive timestamps are assumed to already be UTC unless the source declares
/// otherwise.
pub(crate) fn parse_timestamp_naive(text: &str) -> Result<i64> {
    let trimmed = text.trim();
    let parsed = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(|date| date.and_hms_opt(0, 0, 0).expect("midnight is valid"))
        })
        .map_err(|err| decode_error(format!("invalid timestamp {text}: {err}")))?;
    Ok(parsed.and_utc().timestamp_micros())
}

/// Timezone-aware timestamps are normalized to UTC at parse time.
pub(crate) fn parse_timestamp_tz(text: &str) -> Result<i64> {
    let trimmed = text.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f %:z"))
        .map(|dt| dt.with_timezone(&Utc).timestamp_micros())
        .map_err(|err| decode_error(format!("invalid offset timestamp {text}: {err}")))
}

pub(crate) fn format_timestamp(micros: i64) -> String {
    let datetime = DateTime::<Utc>::from_timestamp_micros(micros)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_micros(0).expect("epoch is valid"));
    if micros % 1_000_000 == 0 {
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// SQL literal for a delta predicate bound. Timestamps render in the same
/// text shape the loader writes, so ISO text comparison orders correctly.
pub(crate) fn render_watermark_literal(value: &WatermarkValue) -> String {
    match value {
        WatermarkValue::Timestamp(dt) => {
            format!("'{}'", format_timestamp(dt.timestamp_micros()))
        }
        WatermarkValue::Integer(id) => id.to_string(),
    }
}

pub(crate) fn decimal_scale(column_type: ColumnType) -> Option<u8> {
    match column_type {
        ColumnType::Decimal { scale, .. } | ColumnType::Numeric { scale, .. } => Some(scale),
        ColumnType::Money | ColumnType::SmallMoney => Some(4),
        _ => None,
    }
}

/// Decode one cell from a SQLite row into the typed row model, per the
/// declared column type. Decimals, dates, and timestamps travel as TEXT.
pub(crate) fn decode_column(
    row: &SqliteRow,
    index: usize,
    column: &SourceColumn,
) -> Result<RowValue> {
    let value = match column.column_type {
        ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Int => row
            .try_get::<Option<i64>, _>(index)
            .map_err(sqlx_error)?
            .map(|v| RowValue::Int32(v as i32)),
        ColumnType::BigInt => row
            .try_get::<Option<i64>, _>(index)
            .map_err(sqlx_error)?
            .map(RowValue::Int64),
        ColumnType::Bit => row
            .try_get::<Option<bool>, _>(index)
            .map_err(sqlx_error)?
            .map(RowValue::Bool),
        ColumnType::Real => row
            .try_get::<Option<f64>, _>(index)
            .map_err(sqlx_error)?
            .map(|v| RowValue::Float32(v as f32)),
        ColumnType::Float => row
            .try_get::<Option<f64>, _>(index)
            .map_err(sqlx_error)?
            .map(RowValue::Float64),
        ColumnType::Decimal { .. }
        | ColumnType::Numeric { .. }
        | ColumnType::Money
        | ColumnType::SmallMoney => {
            let scale = decimal_scale(column.column_type).expect("decimal types carry a scale");
            row.try_get::<Option<String>, _>(index)
                .map_err(sqlx_error)?
                .map(|text| parse_decimal(&text, scale).map(RowValue::Decimal))
                .transpose()?
        }
        ColumnType::Char
        | ColumnType::VarChar
        | ColumnType::NChar
        | ColumnType::NVarChar
        | ColumnType::Text => row
            .try_get::<Option<String>, _>(index)
            .map_err(sqlx_error)?
            .map(RowValue::String),
        ColumnType::Binary | ColumnType::VarBinary => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map_err(sqlx_error)?
            .map(RowValue::Bytes),
        ColumnType::UniqueIdentifier => row
            .try_get::<Option<String>, _>(index)
            .map_err(sqlx_error)?
            .map(|text| {
                uuid::Uuid::parse_str(text.trim())
                    .map(|parsed| RowValue::Uuid(*parsed.as_bytes()))
                    .map_err(|err| decode_error(format!("invalid uuid {text}: {err}")))
            })
            .transpose()?,
        ColumnType::Date => row
            .try_get::<Option<String>, _>(index)
            .map_err(sqlx_error)?
            .map(|text| parse_date(&text).map(RowValue::Date))
            .transpose()?,
        ColumnType::DateTime | ColumnType::SmallDateTime | ColumnType::DateTime2 => row
            .try_get::<Option<String>, _>(index)
            .map_err(sqlx_error)?
            .map(|text| parse_timestamp_naive(&text).map(RowValue::Timestamp))
            .transpose()?,
        ColumnType::DateTimeOffset => row
            .try_get::<Option<String>, _>(index)
            .map_err(sqlx_error)?
            .map(|text| parse_timestamp_tz(&text).map(RowValue::Timestamp))
            .transpose()?,
        ColumnType::Xml
        | ColumnType::Variant
        | ColumnType::Udt
        | ColumnType::TableType
        | ColumnType::RowVersion => {
            return Err(lakesync::error::Error::unsupported_type(format!(
                "column {} has type {:?}, which cannot be extracted",
                column.name, column.column_type
            )))
        }
    };
    Ok(value.unwrap_or(RowValue::Null))
}

/// Bind one cell as a SQLite argument. Everything non-native travels in the
/// same text shapes `decode_column` reads back.
pub(crate) fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &RowValue,
    column_type: ColumnType,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        RowValue::Bool(v) => query.bind(*v),
        RowValue::Int32(v) => query.bind(i64::from(*v)),
        RowValue::Int64(v) => query.bind(*v),
        RowValue::Float32(v) => query.bind(f64::from(*v)),
        RowValue::Float64(v) => query.bind(*v),
        RowValue::Decimal(v) => {
            let scale = decimal_scale(column_type).unwrap_or(0);
            query.bind(format_decimal(*v, scale))
        }
        RowValue::String(v) => query.bind(v.clone()),
        RowValue::Bytes(v) => query.bind(v.clone()),
        RowValue::Uuid(bytes) => query.bind(uuid::Uuid::from_bytes(*bytes).to_string()),
        RowValue::Date(days) => query.bind(format_date(*days)),
        RowValue::Timestamp(micros) => query.bind(format_timestamp(*micros)),
        RowValue::Null => query.bind(None::<String>),
    }
}
