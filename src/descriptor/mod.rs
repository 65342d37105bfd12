//! Self-describing parameter and row buffers.
//!
//! A [`Descriptor`] is the ordered list of field records produced by prepare
//! for a statement's inputs and, if it returns rows, its output. The codec
//! turns logical [`Value`]s into descriptor-shaped byte buffers and back.
//!
//! # Example
//!
//! ```
//! use dsql_rs::descriptor::{codec, Descriptor, Field, FieldType, Value};
//!
//! let descriptor = Descriptor::new(vec![
//!     Field::new(FieldType::Integer).with_name("ID"),
//!     Field::new(FieldType::VarChar { max_length: 40 }).nullable(true),
//! ]);
//! let values = vec![Value::Integer(1), Value::from("Alice")];
//!
//! let buffer = codec::encode_to_vec(&values, &descriptor)?;
//! assert_eq!(codec::decode(&buffer, &descriptor)?, values);
//! # Ok::<(), dsql_rs::error::DescriptorError>(())
//! ```

pub mod codec;
mod field;

pub use codec::Value;
pub use field::{Descriptor, Field, FieldType};
