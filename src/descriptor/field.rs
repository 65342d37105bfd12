//! Field records and descriptor layout.

use serde::{Deserialize, Serialize};

/// Wire type of a descriptor field.
///
/// Lengths on `Char` and `VarChar` are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum FieldType {
    /// Fixed-length text, blank padded
    Char { length: u16 },
    /// Variable-length text up to `max_length` bytes
    #[serde(rename = "VARCHAR")]
    VarChar { max_length: u16 },
    #[serde(rename = "SMALLINT")]
    SmallInt,
    Integer,
    #[serde(rename = "BIGINT")]
    BigInt,
    Float,
    Double,
    /// Days since the epoch
    Date,
    /// Ten-thousandths of a second since midnight
    Time,
    Timestamp,
    /// Variable-length binary
    Blob,
    Boolean,
}

impl FieldType {
    /// Base numeric type tag. Nullable fields report `tag() + 1`.
    pub fn tag(&self) -> u16 {
        match self {
            FieldType::Char { .. } => 452,
            FieldType::VarChar { .. } => 448,
            FieldType::SmallInt => 500,
            FieldType::Integer => 496,
            FieldType::BigInt => 580,
            FieldType::Float => 482,
            FieldType::Double => 480,
            FieldType::Date => 570,
            FieldType::Time => 560,
            FieldType::Timestamp => 510,
            FieldType::Blob => 520,
            FieldType::Boolean => 32764,
        }
    }

    /// Inverse of [`FieldType::tag`]. Returns the type and its nullability.
    pub fn from_tag(tag: u16, length: u16) -> Option<(FieldType, bool)> {
        let nullable = tag & 1 == 1;
        let field_type = match tag & !1 {
            452 => FieldType::Char { length },
            448 => FieldType::VarChar { max_length: length },
            500 => FieldType::SmallInt,
            496 => FieldType::Integer,
            580 => FieldType::BigInt,
            482 => FieldType::Float,
            480 => FieldType::Double,
            570 => FieldType::Date,
            560 => FieldType::Time,
            510 => FieldType::Timestamp,
            520 => FieldType::Blob,
            32764 => FieldType::Boolean,
            _ => return None,
        };
        Some((field_type, nullable))
    }

    /// Bytes occupied in the fixed area.
    pub fn slot_length(&self) -> usize {
        match self {
            FieldType::Char { length } => *length as usize,
            // indirect (offset, length) reference
            FieldType::VarChar { .. } | FieldType::Blob => 8,
            FieldType::SmallInt => 2,
            FieldType::Integer | FieldType::Float | FieldType::Date | FieldType::Time => 4,
            FieldType::BigInt | FieldType::Double | FieldType::Timestamp => 8,
            FieldType::Boolean => 1,
        }
    }

    /// Alignment of the fixed slot.
    pub fn alignment(&self) -> usize {
        match self {
            FieldType::Char { .. } | FieldType::Boolean => 1,
            FieldType::SmallInt => 2,
            FieldType::VarChar { .. }
            | FieldType::Blob
            | FieldType::Integer
            | FieldType::Float
            | FieldType::Date
            | FieldType::Time
            | FieldType::Timestamp => 4,
            FieldType::BigInt | FieldType::Double => 8,
        }
    }

    /// Declared byte length as reported to callers.
    pub fn declared_length(&self) -> u16 {
        match self {
            FieldType::Char { length } => *length,
            FieldType::VarChar { max_length } => *max_length,
            other => other.slot_length() as u16,
        }
    }

    /// Whether values live in the variable area behind an indirect reference.
    pub fn is_variable(&self) -> bool {
        matches!(self, FieldType::VarChar { .. } | FieldType::Blob)
    }

    /// SQL-style name used in diagnostics.
    pub fn sql_name(&self) -> String {
        match self {
            FieldType::Char { length } => format!("CHAR({})", length),
            FieldType::VarChar { max_length } => format!("VARCHAR({})", max_length),
            FieldType::SmallInt => "SMALLINT".to_string(),
            FieldType::Integer => "INTEGER".to_string(),
            FieldType::BigInt => "BIGINT".to_string(),
            FieldType::Float => "FLOAT".to_string(),
            FieldType::Double => "DOUBLE PRECISION".to_string(),
            FieldType::Date => "DATE".to_string(),
            FieldType::Time => "TIME".to_string(),
            FieldType::Timestamp => "TIMESTAMP".to_string(),
            FieldType::Blob => "BLOB".to_string(),
            FieldType::Boolean => "BOOLEAN".to_string(),
        }
    }
}

/// One field record of a descriptor.
///
/// Offsets are assigned when the field is placed into a [`Descriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    field_type: FieldType,
    subtype: i16,
    scale: i16,
    nullable: bool,
    name: String,
    relation: String,
    alias: String,
    offset: usize,
    null_offset: usize,
}

impl Field {
    /// Create a non-nullable field of the given type.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            subtype: 0,
            scale: 0,
            nullable: false,
            name: String::new(),
            relation: String::new(),
            alias: String::new(),
            offset: 0,
            null_offset: 0,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_subtype(mut self, subtype: i16) -> Self {
        self.subtype = subtype;
        self
    }

    pub fn with_scale(mut self, scale: i16) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_relation(mut self, relation: &str) -> Self {
        self.relation = relation.to_string();
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Type tag including the nullable bit.
    pub fn tag(&self) -> u16 {
        self.field_type.tag() | u16::from(self.nullable)
    }

    pub fn subtype(&self) -> i16 {
        self.subtype
    }

    pub fn scale(&self) -> i16 {
        self.scale
    }

    pub fn length(&self) -> u16 {
        self.field_type.declared_length()
    }

    pub fn alignment(&self) -> usize {
        self.field_type.alignment()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Offset of the data slot within the fixed area.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Offset of the two-byte null indicator.
    pub fn null_offset(&self) -> usize {
        self.null_offset
    }
}

const NULL_INDICATOR_LEN: usize = 2;
const FIXED_AREA_ALIGN: usize = 8;

fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Ordered sequence of field records describing a parameter set or a row.
///
/// A descriptor is immutable once built; the layout is computed up front.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Descriptor {
    fields: Vec<Field>,
    fixed_length: usize,
}

impl Descriptor {
    /// Lay out the given fields.
    pub fn new(fields: Vec<Field>) -> Self {
        let mut fields = fields;
        let mut cursor = 0usize;
        for field in &mut fields {
            cursor = align_up(cursor, field.alignment());
            field.offset = cursor;
            cursor += field.field_type.slot_length();
            cursor = align_up(cursor, NULL_INDICATOR_LEN);
            field.null_offset = cursor;
            cursor += NULL_INDICATOR_LEN;
        }
        let fixed_length = if fields.is_empty() {
            0
        } else {
            align_up(cursor, FIXED_AREA_ALIGN)
        };
        Self {
            fields,
            fixed_length,
        }
    }

    /// Descriptor with no fields.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Size of the fixed area; variable data starts here.
    pub fn fixed_length(&self) -> usize {
        self.fixed_length
    }

    /// Append the describe block used by `sql_info`.
    ///
    /// Layout: `count:u16`, then per field `tag:u16 subtype:i16 scale:i16
    /// length:u16` followed by name, relation and alias as `len:u16 bytes`.
    pub fn describe_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.fields.len() as u16).to_le_bytes());
        for field in &self.fields {
            out.extend_from_slice(&field.tag().to_le_bytes());
            out.extend_from_slice(&field.subtype.to_le_bytes());
            out.extend_from_slice(&field.scale.to_le_bytes());
            out.extend_from_slice(&field.length().to_le_bytes());
            for text in [&field.name, &field.relation, &field.alias] {
                out.extend_from_slice(&(text.len() as u16).to_le_bytes());
                out.extend_from_slice(text.as_bytes());
            }
        }
    }

    /// Inverse of [`Descriptor::describe_into`].
    pub fn from_describe(mut block: &[u8]) -> Option<Self> {
        fn take<'a>(block: &mut &'a [u8], n: usize) -> Option<&'a [u8]> {
            if block.len() < n {
                return None;
            }
            let (head, tail) = block.split_at(n);
            *block = tail;
            Some(head)
        }
        fn take_u16(block: &mut &[u8]) -> Option<u16> {
            take(block, 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
        }
        fn take_text(block: &mut &[u8]) -> Option<String> {
            let len = take_u16(block)? as usize;
            let bytes = take(block, len)?;
            String::from_utf8(bytes.to_vec()).ok()
        }

        let count = take_u16(&mut block)?;
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let tag = take_u16(&mut block)?;
            let subtype = take_u16(&mut block)? as i16;
            let scale = take_u16(&mut block)? as i16;
            let length = take_u16(&mut block)?;
            let (field_type, nullable) = FieldType::from_tag(tag, length)?;
            let name = take_text(&mut block)?;
            let relation = take_text(&mut block)?;
            let alias = take_text(&mut block)?;
            fields.push(
                Field::new(field_type)
                    .nullable(nullable)
                    .with_subtype(subtype)
                    .with_scale(scale)
                    .with_name(&name)
                    .with_relation(&relation)
                    .with_alias(&alias),
            );
        }
        Some(Self::new(fields))
    }
}
