use crate::error::{Error, Result};
use arrow_schema::{DataType, Field as ArrowField, Schema as ArrowSchema, TimeUnit};
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Arrow field metadata key the parquet crate turns into the Parquet
/// `SchemaElement.field_id` attribute. Writing it on every column is what
/// lets Iceberg readers match columns by id instead of by name.
pub const PARQUET_FIELD_ID_KEY: &str = "PARQUET:field_id";

/// Arrow canonical extension name for UUID columns; the parquet crate maps it
/// to the UUID logical annotation on FIXED_LEN_BYTE_ARRAY(16).
const ARROW_EXTENSION_KEY: &str = "ARROW:extension:name";

/// An Iceberg primitive or parametrized type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcebergType {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    String,
    Binary,
    Uuid,
    Date,
    Timestamp,
    Timestamptz,
    Decimal { precision: u8, scale: u8 },
}

impl fmt::Display for IcebergType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IcebergType::Boolean => write!(f, "boolean"),
            IcebergType::Int => write!(f, "int"),
            IcebergType::Long => write!(f, "long"),
            IcebergType::Float => write!(f, "float"),
            IcebergType::Double => write!(f, "double"),
            IcebergType::String => write!(f, "string"),
            IcebergType::Binary => write!(f, "binary"),
            IcebergType::Uuid => write!(f, "uuid"),
            IcebergType::Date => write!(f, "date"),
            IcebergType::Timestamp => write!(f, "timestamp"),
            IcebergType::Timestamptz => write!(f, "timestamptz"),
            IcebergType::Decimal { precision, scale } => {
                write!(f, "decimal({precision},{scale})")
            }
        }
    }
}

impl IcebergType {
    /// Parse the Iceberg string form, e.g. `long` or `decimal(18,2)`.
    pub fn parse(text: &str) -> Result<IcebergType> {
        let parsed = match text {
            "boolean" => IcebergType::Boolean,
            "int" => IcebergType::Int,
            "long" => IcebergType::Long,
            "float" => IcebergType::Float,
            "double" => IcebergType::Double,
            "string" => IcebergType::String,
            "binary" => IcebergType::Binary,
            "uuid" => IcebergType::Uuid,
            "date" => IcebergType::Date,
            "timestamp" => IcebergType::Timestamp,
            "timestamptz" => IcebergType::Timestamptz,
            other => {
                let inner = other
                    .strip_prefix("decimal(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| {
                        Error::unsupported_type(format!("unrecognized Iceberg type {other}"))
                    })?;
                let mut parts = inner.splitn(2, ',');
                let precision = parts
                    .next()
                    .and_then(|p| p.trim().parse::<u8>().ok())
                    .ok_or_else(|| {
                        Error::unsupported_type(format!("invalid decimal precision in {other}"))
                    })?;
                let scale = parts
                    .next()
                    .and_then(|s| s.trim().parse::<u8>().ok())
                    .ok_or_else(|| {
                        Error::unsupported_type(format!("invalid decimal scale in {other}"))
                    })?;
                IcebergType::Decimal { precision, scale }
            }
        };
        Ok(parsed)
    }
}

impl Serialize for IcebergType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for IcebergType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = std::string::String::deserialize(deserializer)?;
        IcebergType::parse(&text).map_err(de::Error::custom)
    }
}

/// A named field with a stable id. Ids are assigned once at schema creation
/// and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcebergField {
    pub id: i32,
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: IcebergType,
}

/// An Iceberg struct schema; field ids are unique and start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcebergSchema {
    #[serde(rename = "type", default = "struct_type")]
    pub struct_type: String,
    #[serde(rename = "schema-id")]
    pub schema_id: i32,
    pub fields: Vec<IcebergField>,
}

fn struct_type() -> String {
    "struct".to_string()
}

impl IcebergSchema {
    /// The highest assigned field id; recorded as `last-column-id` in table
    /// metadata.
    pub fn last_column_id(&self) -> i32 {
        self.fields.iter().map(|f| f.id).max().unwrap_or(0)
    }

    pub fn field(&self, name: &str) -> Option<&IcebergField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Arrow rendition of this schema. Every field carries the
    /// `PARQUET:field_id` metadata entry; UUID fields additionally carry the
    /// canonical extension name so parquet emits the UUID logical type.
    pub fn to_arrow_schema(&self) -> Result<ArrowSchema> {
        let mut arrow_fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let data_type = arrow_data_type(&field.field_type)?;
            let mut metadata = HashMap::from([(
                PARQUET_FIELD_ID_KEY.to_string(),
                field.id.to_string(),
            )]);
            if field.field_type == IcebergType::Uuid {
                metadata.insert(ARROW_EXTENSION_KEY.to_string(), "arrow.uuid".to_string());
            }
            arrow_fields.push(Arc::new(
                ArrowField::new(field.name.clone(), data_type, !field.required)
                    .with_metadata(metadata),
            ));
        }
        Ok(ArrowSchema::new(arrow_fields))
    }
}

fn arrow_data_type(iceberg_type: &IcebergType) -> Result<DataType> {
    let data_type = match iceberg_type {
        IcebergType::Boolean => DataType::Boolean,
        IcebergType::Int => DataType::Int32,
        IcebergType::Long => DataType::Int64,
        IcebergType::Float => DataType::Float32,
        IcebergType::Double => DataType::Float64,
        IcebergType::String => DataType::Utf8,
        IcebergType::Binary => DataType::Binary,
        IcebergType::Uuid => DataType::FixedSizeBinary(16),
        IcebergType::Date => DataType::Date32,
        // Both flavors are stored adjusted to UTC; naive values were
        // normalized by the connector before they reach the writer.
        IcebergType::Timestamp | IcebergType::Timestamptz => {
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        }
        IcebergType::Decimal { precision, scale } => {
            if *precision > 38 {
                return Err(Error::unsupported_type(format!(
                    "decimal precision {precision} exceeds the 38-digit limit"
                )));
            }
            DataType::Decimal128(*precision, *scale as i8)
        }
    };
    Ok(data_type)
}

/// Reads the Iceberg field id back out of an Arrow field, as restored by the
/// parquet reader.
pub(crate) fn arrow_field_id(field: &ArrowField) -> Option<i32> {
    field
        .metadata()
        .get(PARQUET_FIELD_ID_KEY)
        .and_then(|id| id.parse::<i32>().ok())
}

/// Builds an [`IcebergSchema`] from ordered `(name, type, required)` triples,
/// assigning field ids 1..N in declaration order. Fields are never reordered
/// or deduplicated.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<(String, IcebergType, bool)>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(
        mut self,
        name: impl Into<String>,
        field_type: IcebergType,
        required: bool,
    ) -> Self {
        self.fields.push((name.into(), field_type, required));
        self
    }

    pub fn build(self) -> IcebergSchema {
        let fields = self
            .fields
            .into_iter()
            .enumerate()
            .map(|(index, (name, field_type, required))| IcebergField {
                id: index as i32 + 1,
                name,
                required,
                field_type,
            })
            .collect();
        IcebergSchema {
            struct_type: struct_type(),
            schema_id: 0,
            fields,
        }
    }
}
