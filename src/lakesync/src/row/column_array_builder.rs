use crate::error::{Error, Result};
use crate::row::RowValue;
use arrow::array::builder::{
    BinaryBuilder, BooleanBuilder, Date32Builder, FixedSizeBinaryBuilder, PrimitiveBuilder,
    StringBuilder,
};
use arrow::array::types::{
    Decimal128Type, Float32Type, Float64Type, Int32Type, Int64Type, TimestampMicrosecondType,
};
use arrow::array::ArrayRef;
use arrow::datatypes::DataType;
use std::sync::Arc;

/// A column array builder that can handle the column types lakesync writes
pub(crate) enum ColumnArrayBuilder {
    Boolean(BooleanBuilder),
    Int32(PrimitiveBuilder<Int32Type>),
    Int64(PrimitiveBuilder<Int64Type>),
    Float32(PrimitiveBuilder<Float32Type>),
    Float64(PrimitiveBuilder<Float64Type>),
    Decimal128(PrimitiveBuilder<Decimal128Type>),
    Utf8(StringBuilder),
    Binary(BinaryBuilder),
    FixedSizeBinary(FixedSizeBinaryBuilder),
    Date32(Date32Builder),
    Timestamp(PrimitiveBuilder<TimestampMicrosecondType>),
}

impl ColumnArrayBuilder {
    /// Create a new column array builder for a specific data type
    pub(crate) fn new(data_type: &DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Boolean => {
                ColumnArrayBuilder::Boolean(BooleanBuilder::with_capacity(capacity))
            }
            DataType::Int32 => {
                ColumnArrayBuilder::Int32(PrimitiveBuilder::<Int32Type>::with_capacity(capacity))
            }
            DataType::Int64 => {
                ColumnArrayBuilder::Int64(PrimitiveBuilder::<Int64Type>::with_capacity(capacity))
            }
            DataType::Float32 => ColumnArrayBuilder::Float32(
                PrimitiveBuilder::<Float32Type>::with_capacity(capacity),
            ),
            DataType::Float64 => ColumnArrayBuilder::Float64(
                PrimitiveBuilder::<Float64Type>::with_capacity(capacity),
            ),
            DataType::Decimal128(_, _) => ColumnArrayBuilder::Decimal128(
                PrimitiveBuilder::<Decimal128Type>::with_capacity(capacity)
                    .with_data_type(data_type.clone()),
            ),
            DataType::Utf8 => {
                ColumnArrayBuilder::Utf8(StringBuilder::with_capacity(capacity, capacity * 10))
            }
            DataType::Binary => {
                ColumnArrayBuilder::Binary(BinaryBuilder::with_capacity(capacity, capacity * 10))
            }
            DataType::FixedSizeBinary(size) => {
                assert_eq!(*size, 16);
                ColumnArrayBuilder::FixedSizeBinary(FixedSizeBinaryBuilder::with_capacity(
                    capacity, 16,
                ))
            }
            DataType::Date32 => {
                ColumnArrayBuilder::Date32(Date32Builder::with_capacity(capacity))
            }
            DataType::Timestamp(_, _) => ColumnArrayBuilder::Timestamp(
                PrimitiveBuilder::<TimestampMicrosecondType>::with_capacity(capacity)
                    .with_data_type(data_type.clone()),
            ),
            _ => panic!("data type: {data_type:?}"),
        }
    }

    /// Append a value to this builder
    pub(crate) fn append_value(&mut self, value: &RowValue) -> Result<()> {
        match self {
            ColumnArrayBuilder::Boolean(builder) => match value {
                RowValue::Bool(v) => builder.append_value(*v),
                RowValue::Null => builder.append_null(),
                other => return Err(type_mismatch("bool", other)),
            },
            ColumnArrayBuilder::Int32(builder) => match value {
                RowValue::Int32(v) => builder.append_value(*v),
                RowValue::Null => builder.append_null(),
                other => return Err(type_mismatch("int32", other)),
            },
            ColumnArrayBuilder::Int64(builder) => match value {
                RowValue::Int64(v) => builder.append_value(*v),
                RowValue::Null => builder.append_null(),
                other => return Err(type_mismatch("int64", other)),
            },
            ColumnArrayBuilder::Float32(builder) => match value {
                RowValue::Float32(v) => builder.append_value(*v),
                RowValue::Null => builder.append_null(),
                other => return Err(type_mismatch("float32", other)),
            },
            ColumnArrayBuilder::Float64(builder) => match value {
                RowValue::Float64(v) => builder.append_value(*v),
                RowValue::Null => builder.append_null(),
                other => return Err(type_mismatch("float64", other)),
            },
            ColumnArrayBuilder::Decimal128(builder) => match value {
                RowValue::Decimal(v) => builder.append_value(*v),
                RowValue::Null => builder.append_null(),
                other => return Err(type_mismatch("decimal", other)),
            },
            ColumnArrayBuilder::Utf8(builder) => match value {
                RowValue::String(v) => builder.append_value(v),
                RowValue::Null => builder.append_null(),
                other => return Err(type_mismatch("string", other)),
            },
            ColumnArrayBuilder::Binary(builder) => match value {
                RowValue::Bytes(v) => builder.append_value(v),
                RowValue::Null => builder.append_null(),
                other => return Err(type_mismatch("bytes", other)),
            },
            ColumnArrayBuilder::FixedSizeBinary(builder) => match value {
                RowValue::Uuid(v) => builder.append_value(v)?,
                RowValue::Null => builder.append_null(),
                other => return Err(type_mismatch("uuid", other)),
            },
            ColumnArrayBuilder::Date32(builder) => match value {
                RowValue::Date(v) => builder.append_value(*v),
                RowValue::Null => builder.append_null(),
                other => return Err(type_mismatch("date", other)),
            },
            ColumnArrayBuilder::Timestamp(builder) => match value {
                RowValue::Timestamp(v) => builder.append_value(*v),
                RowValue::Null => builder.append_null(),
                other => return Err(type_mismatch("timestamp", other)),
            },
        }
        Ok(())
    }

    /// Finish building and return the array
    pub(crate) fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnArrayBuilder::Boolean(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Int32(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Int64(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Float32(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Float64(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Decimal128(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Utf8(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Binary(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::FixedSizeBinary(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Date32(builder) => Arc::new(builder.finish()),
            ColumnArrayBuilder::Timestamp(builder) => Arc::new(builder.finish()),
        }
    }
}

#[track_caller]
fn type_mismatch(expected: &'static str, actual: &RowValue) -> Error {
    Error::unsupported_type(format!(
        "{expected} column received a {} value",
        actual.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        Array, BooleanArray, Date32Array, Decimal128Array, FixedSizeBinaryArray, Int32Array,
        StringArray, TimestampMicrosecondArray,
    };
    use arrow::datatypes::{DataType, TimeUnit};

    #[test]
    fn test_column_array_builder() {
        // Int32 with interleaved nulls
        let mut builder = ColumnArrayBuilder::new(&DataType::Int32, 3);
        builder.append_value(&RowValue::Int32(1)).unwrap();
        builder.append_value(&RowValue::Null).unwrap();
        builder.append_value(&RowValue::Int32(3)).unwrap();
        let array = builder.finish();
        let int32_array = array.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(int32_array.value(0), 1);
        assert!(int32_array.is_null(1));
        assert_eq!(int32_array.value(2), 3);

        // Boolean
        let mut builder = ColumnArrayBuilder::new(&DataType::Boolean, 2);
        builder.append_value(&RowValue::Bool(true)).unwrap();
        builder.append_value(&RowValue::Bool(false)).unwrap();
        let array = builder.finish();
        let bool_array = array.as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(bool_array.value(0));
        assert!(!bool_array.value(1));

        // Utf8
        let mut builder = ColumnArrayBuilder::new(&DataType::Utf8, 2);
        builder
            .append_value(&RowValue::String("hello".to_string()))
            .unwrap();
        builder
            .append_value(&RowValue::String("world".to_string()))
            .unwrap();
        let array = builder.finish();
        let string_array = array.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(string_array.value(0), "hello");
        assert_eq!(string_array.value(1), "world");

        // Uuid as FixedSizeBinary(16)
        let mut builder = ColumnArrayBuilder::new(&DataType::FixedSizeBinary(16), 1);
        let bytes = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        builder.append_value(&RowValue::Uuid(bytes)).unwrap();
        let array = builder.finish();
        let binary_array = array
            .as_any()
            .downcast_ref::<FixedSizeBinaryArray>()
            .unwrap();
        assert_eq!(binary_array.value(0), bytes);
    }

    #[test]
    fn test_column_array_builder_logical_types() {
        // Decimal mantissas keep the declared precision and scale
        let mut builder = ColumnArrayBuilder::new(&DataType::Decimal128(18, 2), 2);
        builder.append_value(&RowValue::Decimal(9999)).unwrap();
        builder.append_value(&RowValue::Null).unwrap();
        let array = builder.finish();
        assert_eq!(array.data_type(), &DataType::Decimal128(18, 2));
        let decimal_array = array.as_any().downcast_ref::<Decimal128Array>().unwrap();
        assert_eq!(decimal_array.value(0), 9999);
        assert!(decimal_array.is_null(1));

        // Date is days since epoch
        let mut builder = ColumnArrayBuilder::new(&DataType::Date32, 1);
        builder.append_value(&RowValue::Date(19_000)).unwrap();
        let array = builder.finish();
        let date_array = array.as_any().downcast_ref::<Date32Array>().unwrap();
        assert_eq!(date_array.value(0), 19_000);

        // Timestamps carry the UTC zone annotation
        let data_type = DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()));
        let mut builder = ColumnArrayBuilder::new(&data_type, 1);
        builder
            .append_value(&RowValue::Timestamp(1_700_000_000_000_000))
            .unwrap();
        let array = builder.finish();
        assert_eq!(array.data_type(), &data_type);
        let ts_array = array
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(ts_array.value(0), 1_700_000_000_000_000);
    }

    #[test]
    fn test_column_array_builder_type_mismatch() {
        let mut builder = ColumnArrayBuilder::new(&DataType::Int32, 1);
        let err = builder
            .append_value(&RowValue::String("oops".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(_)));
    }
}
