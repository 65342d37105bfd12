//! Type mapping between descriptor fields and Apache Arrow data types.

mod mapping;
mod schema;

pub use mapping::{TypeMapper, TYPE_METADATA_KEY};
pub use schema::{descriptor_to_schema, descriptor_to_schema_with_metadata, schema_to_descriptor};
