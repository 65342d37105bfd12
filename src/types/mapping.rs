//! Type mapping between descriptor fields and Apache Arrow data types.

use crate::descriptor::{Field, FieldType};
use crate::error::DescriptorError;
use arrow_schema::{DataType, TimeUnit};
use std::collections::HashMap;

/// Metadata key carrying the serialized native field type.
pub const TYPE_METADATA_KEY: &str = "dsql:type";
const SCALE_METADATA_KEY: &str = "dsql:scale";
const SUBTYPE_METADATA_KEY: &str = "dsql:subtype";

/// Longest VARCHAR an Arrow string column is mapped to.
const MAX_VARCHAR_LENGTH: u16 = 32765;

/// Blob subtype holding text.
const TEXT_BLOB_SUBTYPE: i16 = 1;

/// Decimal type for an integer of `precision` digits scaled by `scale` (< 0).
fn decimal(precision: u8, scale: i16) -> Result<DataType, DescriptorError> {
    match scale.checked_neg().and_then(|s| u8::try_from(s).ok()) {
        Some(digits) if digits <= precision => Ok(DataType::Decimal128(precision, digits as i8)),
        _ => Err(DescriptorError::UnsupportedType(format!(
            "scale {} for precision {}",
            scale, precision
        ))),
    }
}

/// Type mapper for converting between descriptor fields and Arrow types.
pub struct TypeMapper;

impl TypeMapper {
    /// Convert a descriptor field to an Arrow DataType.
    ///
    /// Integer fields with a negative scale are exact numerics and map to
    /// `Decimal128`; text blobs map to `Utf8`.
    ///
    /// # Errors
    /// Returns `DescriptorError::UnsupportedType` if the scale does not fit the
    /// precision of the integer type.
    pub fn field_to_arrow(field: &Field) -> Result<DataType, DescriptorError> {
        let scale = field.scale();
        let data_type = match field.field_type() {
            FieldType::SmallInt if scale < 0 => decimal(4, scale)?,
            FieldType::Integer if scale < 0 => decimal(9, scale)?,
            FieldType::BigInt if scale < 0 => decimal(18, scale)?,
            FieldType::Blob if field.subtype() == TEXT_BLOB_SUBTYPE => DataType::Utf8,
            other => Self::type_to_arrow(other),
        };
        Ok(data_type)
    }

    /// Convert a bare field type to an Arrow DataType.
    pub fn type_to_arrow(field_type: FieldType) -> DataType {
        match field_type {
            FieldType::Boolean => DataType::Boolean,
            FieldType::Char { .. } | FieldType::VarChar { .. } => DataType::Utf8,
            FieldType::SmallInt => DataType::Int16,
            FieldType::Integer => DataType::Int32,
            FieldType::BigInt => DataType::Int64,
            FieldType::Float => DataType::Float32,
            FieldType::Double => DataType::Float64,
            FieldType::Date => DataType::Date32,
            FieldType::Time => DataType::Time64(TimeUnit::Microsecond),
            FieldType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            FieldType::Blob => DataType::Binary,
        }
    }

    /// Convert an Arrow DataType to a descriptor field.
    ///
    /// This is used to build input descriptors from Arrow parameter schemas.
    ///
    /// # Errors
    /// Returns `DescriptorError::UnsupportedType` if the type cannot be mapped
    pub fn arrow_to_field(arrow_type: &DataType) -> Result<Field, DescriptorError> {
        let field = match arrow_type {
            DataType::Boolean => Field::new(FieldType::Boolean),

            DataType::Utf8 | DataType::LargeUtf8 => Field::new(FieldType::VarChar {
                max_length: MAX_VARCHAR_LENGTH,
            }),

            DataType::Int8 | DataType::Int16 => Field::new(FieldType::SmallInt),
            DataType::Int32 => Field::new(FieldType::Integer),
            DataType::Int64 => Field::new(FieldType::BigInt),

            DataType::Float32 => Field::new(FieldType::Float),
            DataType::Float64 => Field::new(FieldType::Double),

            DataType::Decimal128(precision, scale) if *precision <= 18 => {
                let field_type = match precision {
                    0..=4 => FieldType::SmallInt,
                    5..=9 => FieldType::Integer,
                    _ => FieldType::BigInt,
                };
                Field::new(field_type).with_scale(-i16::from(*scale))
            }

            DataType::Date32 | DataType::Date64 => Field::new(FieldType::Date),
            DataType::Time32(_) | DataType::Time64(_) => Field::new(FieldType::Time),
            DataType::Timestamp(_, _) => Field::new(FieldType::Timestamp),

            DataType::Binary | DataType::LargeBinary => Field::new(FieldType::Blob),

            _ => {
                return Err(DescriptorError::UnsupportedType(format!(
                    "Arrow type {:?}",
                    arrow_type
                )))
            }
        };
        Ok(field)
    }

    /// Create Arrow field metadata to preserve the native field type.
    ///
    /// This allows round-tripping type information.
    pub fn create_field_metadata(field: &Field) -> HashMap<String, String> {
        let mut metadata = HashMap::new();

        if let Ok(json) = serde_json::to_string(&field.field_type()) {
            metadata.insert(TYPE_METADATA_KEY.to_string(), json);
        }
        if field.scale() != 0 {
            metadata.insert(SCALE_METADATA_KEY.to_string(), field.scale().to_string());
        }
        if field.subtype() != 0 {
            metadata.insert(SUBTYPE_METADATA_KEY.to_string(), field.subtype().to_string());
        }

        metadata
    }

    /// Rebuild a field from metadata written by [`create_field_metadata`](Self::create_field_metadata).
    pub fn from_field_metadata(metadata: &HashMap<String, String>) -> Option<Field> {
        let field_type: FieldType = metadata
            .get(TYPE_METADATA_KEY)
            .and_then(|s| serde_json::from_str(s).ok())?;
        let scale = metadata
            .get(SCALE_METADATA_KEY)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let subtype = metadata
            .get(SUBTYPE_METADATA_KEY)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Some(
            Field::new(field_type)
                .with_scale(scale)
                .with_subtype(subtype),
        )
    }
}
