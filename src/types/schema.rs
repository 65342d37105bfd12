//! Conversion between descriptors and Arrow schemas.

use crate::descriptor::{Descriptor, Field};
use crate::error::DescriptorError;
use crate::types::TypeMapper;
use arrow_schema::{Field as ArrowField, Schema};
use std::collections::HashMap;

/// Column name used for a field: alias, then name, then its position.
fn column_name(index: usize, field: &Field) -> String {
    if !field.alias().is_empty() {
        field.alias().to_string()
    } else if !field.name().is_empty() {
        field.name().to_string()
    } else {
        format!("COLUMN{}", index + 1)
    }
}

/// Build an Arrow schema describing the rows of `descriptor`.
///
/// Each Arrow field carries the native type in its metadata, plus the source
/// relation when the descriptor names one.
///
/// # Errors
/// Returns `DescriptorError::UnsupportedType` if a field has no Arrow equivalent
pub fn descriptor_to_schema(descriptor: &Descriptor) -> Result<Schema, DescriptorError> {
    let fields = descriptor
        .fields()
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let mut metadata = TypeMapper::create_field_metadata(field);
            if !field.relation().is_empty() {
                metadata.insert("dsql:relation".to_string(), field.relation().to_string());
            }
            Ok(ArrowField::new(
                column_name(index, field),
                TypeMapper::field_to_arrow(field)?,
                field.is_nullable(),
            )
            .with_metadata(metadata))
        })
        .collect::<Result<Vec<ArrowField>, DescriptorError>>()?;

    Ok(Schema::new(fields))
}

/// Build the schema with additional schema-level metadata.
///
/// # Errors
/// Same as [`descriptor_to_schema`].
pub fn descriptor_to_schema_with_metadata(
    descriptor: &Descriptor,
    metadata: HashMap<String, String>,
) -> Result<Schema, DescriptorError> {
    Ok(descriptor_to_schema(descriptor)?.with_metadata(metadata))
}

/// Build a descriptor from an Arrow schema.
///
/// Fields produced by [`descriptor_to_schema`] restore their exact native
/// type; other fields are inferred from the Arrow type.
///
/// # Errors
/// Returns `DescriptorError::UnsupportedType` if any column type cannot be mapped
pub fn schema_to_descriptor(schema: &Schema) -> Result<Descriptor, DescriptorError> {
    let fields: Result<Vec<Field>, DescriptorError> = schema
        .fields()
        .iter()
        .map(|arrow_field| {
            let field = match TypeMapper::from_field_metadata(arrow_field.metadata()) {
                Some(field) => field,
                None => TypeMapper::arrow_to_field(arrow_field.data_type())?,
            };
            let mut field = field
                .nullable(arrow_field.is_nullable())
                .with_name(arrow_field.name());
            if let Some(relation) = arrow_field.metadata().get("dsql:relation") {
                field = field.with_relation(relation);
            }
            Ok(field)
        })
        .collect();

    Ok(Descriptor::new(fields?))
}
