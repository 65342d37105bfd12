//! Encoding and decoding of descriptor-shaped value buffers.
//!
//! A buffer consists of the descriptor's fixed area followed by a variable
//! area. Fixed-width values sit at their field offset; `VARCHAR` and `BLOB`
//! values store an `(offset:u32, length:u32)` reference in their slot that
//! points into the variable area. Every field carries a two-byte null
//! indicator (`0` present, `-1` null). All integers are little-endian.
//! `CHAR` values are blank-padded to the field length; padding is stripped
//! again on decode, so a `CHAR` value never ends in a blank.
//!
//! Callers use the two-call sizing idiom: when a buffer is too small the
//! operation fails with [`DescriptorError::DescriptorOverflow`] carrying the
//! exact size needed, and nothing is written.

use crate::descriptor::field::{Descriptor, Field, FieldType};
use crate::error::DescriptorError;
use serde::{Deserialize, Serialize};

const NULL_FLAG: i16 = -1;

/// Logical value exchanged through a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Binary(Vec<u8>),
    Date(i32),
    Time(u32),
    Timestamp { date: i32, time: u32 },
}

impl Value {
    /// Short type name used in mismatch diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::SmallInt(_) => "SMALLINT",
            Value::Integer(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE PRECISION",
            Value::Text(_) => "TEXT",
            Value::Binary(_) => "BINARY",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::Timestamp { .. } => "TIMESTAMP",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i16> for Value {
    fn from(value: i16) -> Self {
        Value::SmallInt(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::BigInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

fn mismatch(index: usize, field: &Field, value: &Value) -> DescriptorError {
    DescriptorError::TypeMismatch {
        index,
        expected: field.field_type().sql_name(),
        found: value.type_name().to_string(),
    }
}

/// Check one value against one field record.
fn check_value(index: usize, field: &Field, value: &Value) -> Result<(), DescriptorError> {
    let conforms = match (field.field_type(), value) {
        (_, Value::Null) => field.is_nullable(),
        // padding is not part of a CHAR value, so it cannot be bound either
        (FieldType::Char { length }, Value::Text(s)) => {
            s.len() <= length as usize && !s.ends_with(' ')
        }
        (FieldType::VarChar { max_length }, Value::Text(s)) => s.len() <= max_length as usize,
        (FieldType::Blob, Value::Binary(b)) => u32::try_from(b.len()).is_ok(),
        (FieldType::SmallInt, Value::SmallInt(_))
        | (FieldType::Integer, Value::Integer(_))
        | (FieldType::BigInt, Value::BigInt(_))
        | (FieldType::Float, Value::Float(_))
        | (FieldType::Double, Value::Double(_))
        | (FieldType::Date, Value::Date(_))
        | (FieldType::Time, Value::Time(_))
        | (FieldType::Timestamp, Value::Timestamp { .. })
        | (FieldType::Boolean, Value::Boolean(_)) => true,
        _ => false,
    };
    if conforms {
        Ok(())
    } else {
        Err(mismatch(index, field, value))
    }
}

/// Check that `values` conform to `descriptor`.
///
/// # Errors
/// Returns `DescriptorError::TypeMismatch` naming the first offending field,
/// or the first missing/extra position when the counts differ.
pub fn validate(values: &[Value], descriptor: &Descriptor) -> Result<(), DescriptorError> {
    if values.len() != descriptor.len() {
        return Err(DescriptorError::TypeMismatch {
            index: values.len().min(descriptor.len()),
            expected: format!("{} values", descriptor.len()),
            found: format!("{} values", values.len()),
        });
    }
    for (index, (field, value)) in descriptor.fields().iter().zip(values).enumerate() {
        check_value(index, field, value)?;
    }
    Ok(())
}

fn variable_len(value: &Value) -> usize {
    match value {
        Value::Text(s) => s.len(),
        Value::Binary(b) => b.len(),
        _ => 0,
    }
}

/// Exact buffer size needed to encode `values`.
///
/// # Errors
/// Returns `DescriptorError::TypeMismatch` if the values do not conform.
pub fn required_size(values: &[Value], descriptor: &Descriptor) -> Result<usize, DescriptorError> {
    validate(values, descriptor)?;
    Ok(descriptor.fixed_length()
        + descriptor
            .fields()
            .iter()
            .zip(values)
            .filter(|(field, _)| field.field_type().is_variable())
            .map(|(_, value)| variable_len(value))
            .sum::<usize>())
}

/// Encode `values` into `buffer`, returning the number of bytes written.
///
/// # Errors
/// - `TypeMismatch` if the values do not conform to the descriptor
/// - `DescriptorOverflow` if `buffer` is smaller than [`required_size`];
///   the buffer is left untouched in that case
pub fn encode(
    values: &[Value],
    descriptor: &Descriptor,
    buffer: &mut [u8],
) -> Result<usize, DescriptorError> {
    let required = required_size(values, descriptor)?;
    if buffer.len() < required {
        return Err(DescriptorError::DescriptorOverflow {
            required,
            available: buffer.len(),
        });
    }

    let fixed = descriptor.fixed_length();
    buffer[..fixed].fill(0);
    let mut tail = fixed;

    for (field, value) in descriptor.fields().iter().zip(values) {
        let slot = field.offset();
        let indicator = if value.is_null() { NULL_FLAG } else { 0 };
        put(buffer, field.null_offset(), &indicator.to_le_bytes());

        match (field.field_type(), value) {
            (_, Value::Null) => {}
            (FieldType::Char { length }, Value::Text(s)) => {
                let end = slot + length as usize;
                buffer[slot..end].fill(b' ');
                put(buffer, slot, s.as_bytes());
            }
            (FieldType::VarChar { .. }, Value::Text(s)) => {
                tail = put_indirect(buffer, slot, tail, s.as_bytes());
            }
            (FieldType::Blob, Value::Binary(b)) => {
                tail = put_indirect(buffer, slot, tail, b);
            }
            (_, Value::Boolean(v)) => put(buffer, slot, &[u8::from(*v)]),
            (_, Value::SmallInt(v)) => put(buffer, slot, &v.to_le_bytes()),
            (_, Value::Integer(v)) => put(buffer, slot, &v.to_le_bytes()),
            (_, Value::BigInt(v)) => put(buffer, slot, &v.to_le_bytes()),
            (_, Value::Float(v)) => put(buffer, slot, &v.to_le_bytes()),
            (_, Value::Double(v)) => put(buffer, slot, &v.to_le_bytes()),
            (_, Value::Date(v)) => put(buffer, slot, &v.to_le_bytes()),
            (_, Value::Time(v)) => put(buffer, slot, &v.to_le_bytes()),
            (_, Value::Timestamp { date, time }) => {
                put(buffer, slot, &date.to_le_bytes());
                put(buffer, slot + 4, &time.to_le_bytes());
            }
            // validate() rules out every other pairing
            (_, Value::Text(_)) | (_, Value::Binary(_)) => {}
        }
    }

    Ok(tail)
}

/// Encode `values` into a freshly allocated buffer of exactly the required size.
pub fn encode_to_vec(values: &[Value], descriptor: &Descriptor) -> Result<Vec<u8>, DescriptorError> {
    let mut buffer = vec![0u8; required_size(values, descriptor)?];
    encode(values, descriptor, &mut buffer)?;
    Ok(buffer)
}

fn put(buffer: &mut [u8], offset: usize, bytes: &[u8]) {
    buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn put_indirect(buffer: &mut [u8], slot: usize, tail: usize, bytes: &[u8]) -> usize {
    put(buffer, slot, &(tail as u32).to_le_bytes());
    put(buffer, slot + 4, &(bytes.len() as u32).to_le_bytes());
    put(buffer, tail, bytes);
    tail + bytes.len()
}

fn read<const N: usize>(buffer: &[u8], offset: usize) -> Result<[u8; N], DescriptorError> {
    buffer
        .get(offset..offset + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| {
            DescriptorError::Malformed(format!("{} bytes at offset {} out of range", N, offset))
        })
}

fn read_indirect(buffer: &[u8], slot: usize, index: usize) -> Result<&[u8], DescriptorError> {
    let start = u32::from_le_bytes(read(buffer, slot)?) as usize;
    let len = u32::from_le_bytes(read(buffer, slot + 4)?) as usize;
    buffer.get(start..start + len).ok_or_else(|| {
        DescriptorError::Malformed(format!(
            "field {} references {} bytes at offset {} beyond buffer end {}",
            index,
            len,
            start,
            buffer.len()
        ))
    })
}

fn utf8(bytes: &[u8], index: usize) -> Result<String, DescriptorError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| DescriptorError::Malformed(format!("field {} is not valid UTF-8", index)))
}

/// Decode a buffer produced by [`encode`].
///
/// Trailing blanks of `CHAR` fields are stripped.
///
/// # Errors
/// - `DescriptorOverflow` if `buffer` is shorter than the fixed area
/// - `Malformed` for bad null indicators, references or text
pub fn decode(buffer: &[u8], descriptor: &Descriptor) -> Result<Vec<Value>, DescriptorError> {
    if buffer.len() < descriptor.fixed_length() {
        return Err(DescriptorError::DescriptorOverflow {
            required: descriptor.fixed_length(),
            available: buffer.len(),
        });
    }

    let mut values = Vec::with_capacity(descriptor.len());
    for (index, field) in descriptor.fields().iter().enumerate() {
        let indicator = i16::from_le_bytes(read(buffer, field.null_offset())?);
        match indicator {
            0 => {}
            NULL_FLAG if field.is_nullable() => {
                values.push(Value::Null);
                continue;
            }
            other => {
                return Err(DescriptorError::Malformed(format!(
                    "field {} has invalid null indicator {}",
                    index, other
                )))
            }
        }

        let slot = field.offset();
        let value = match field.field_type() {
            FieldType::Char { length } => {
                let bytes = buffer.get(slot..slot + length as usize).ok_or_else(|| {
                    DescriptorError::Malformed(format!("field {} out of range", index))
                })?;
                let text = utf8(bytes, index)?;
                Value::Text(text.trim_end_matches(' ').to_string())
            }
            FieldType::VarChar { .. } => Value::Text(utf8(read_indirect(buffer, slot, index)?, index)?),
            FieldType::Blob => Value::Binary(read_indirect(buffer, slot, index)?.to_vec()),
            FieldType::Boolean => Value::Boolean(read::<1>(buffer, slot)?[0] != 0),
            FieldType::SmallInt => Value::SmallInt(i16::from_le_bytes(read(buffer, slot)?)),
            FieldType::Integer => Value::Integer(i32::from_le_bytes(read(buffer, slot)?)),
            FieldType::BigInt => Value::BigInt(i64::from_le_bytes(read(buffer, slot)?)),
            FieldType::Float => Value::Float(f32::from_le_bytes(read(buffer, slot)?)),
            FieldType::Double => Value::Double(f64::from_le_bytes(read(buffer, slot)?)),
            FieldType::Date => Value::Date(i32::from_le_bytes(read(buffer, slot)?)),
            FieldType::Time => Value::Time(u32::from_le_bytes(read(buffer, slot)?)),
            FieldType::Timestamp => Value::Timestamp {
                date: i32::from_le_bytes(read(buffer, slot)?),
                time: u32::from_le_bytes(read(buffer, slot + 4)?),
            },
        };
        values.push(value);
    }

    Ok(values)
}
