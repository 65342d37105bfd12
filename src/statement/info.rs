//! `sql_info` item serialization.
//!
//! A request is a list of item codes. The reply is a sequence of
//! `[item:u8][len:u16 LE][payload]` clusters closed by a single `End` byte.
//! Requesting nothing produces an empty reply.

use crate::descriptor::Descriptor;
use crate::error::{DescriptorError, StatementError};
use crate::statement::StatementKind;

/// Introspection items understood by `sql_info` and `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InfoItem {
    End = 1,
    /// `u32` kind code
    StatementType = 4,
    /// `u32` parameter count
    InputCount = 5,
    /// `u32` output column count
    OutputCount = 6,
    /// Describe block of the input descriptor
    InputDescribe = 7,
    /// Describe block of the output descriptor
    OutputDescribe = 8,
    /// `u64` last affected count, then `u64` rows fetched
    Records = 9,
    /// Access plan text
    Plan = 10,
    /// `u8` flag, 1 when non-forward fetch was negotiated
    Scrollable = 11,
    /// Name bound by `set_cursor`, empty when unnamed
    CursorName = 12,
}

impl TryFrom<u8> for InfoItem {
    type Error = StatementError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(InfoItem::End),
            4 => Ok(InfoItem::StatementType),
            5 => Ok(InfoItem::InputCount),
            6 => Ok(InfoItem::OutputCount),
            7 => Ok(InfoItem::InputDescribe),
            8 => Ok(InfoItem::OutputDescribe),
            9 => Ok(InfoItem::Records),
            10 => Ok(InfoItem::Plan),
            11 => Ok(InfoItem::Scrollable),
            12 => Ok(InfoItem::CursorName),
            other => Err(StatementError::UnknownInfoItem(other)),
        }
    }
}

/// Parse a request list. Parsing stops at the first `End`.
///
/// # Errors
/// Returns `StatementError::UnknownInfoItem` for an unrecognised code.
pub fn parse_items(codes: &[u8]) -> Result<Vec<InfoItem>, StatementError> {
    let mut items = Vec::with_capacity(codes.len());
    for code in codes {
        match InfoItem::try_from(*code)? {
            InfoItem::End => break,
            item => items.push(item),
        }
    }
    Ok(items)
}

/// Read-only view of a statement used to answer info requests.
#[derive(Debug, Clone, Copy)]
pub struct InfoSnapshot<'a> {
    pub kind: StatementKind,
    pub input: &'a Descriptor,
    pub output: Option<&'a Descriptor>,
    pub last_affected: Option<u64>,
    pub rows_fetched: u64,
    pub plan_text: Option<&'a str>,
    pub scrollable: bool,
    pub cursor_name: Option<&'a str>,
}

/// Serialize the requested items.
///
/// # Errors
/// Returns `DescriptorError::Malformed` if a single payload exceeds the `u16`
/// length field.
pub fn render(items: &[InfoItem], snapshot: &InfoSnapshot<'_>) -> Result<Vec<u8>, DescriptorError> {
    let mut out = Vec::new();
    if items.is_empty() {
        return Ok(out);
    }

    let mut payload = Vec::new();
    for item in items {
        payload.clear();
        match item {
            InfoItem::End => continue,
            InfoItem::StatementType => {
                payload.extend_from_slice(&snapshot.kind.info_code().to_le_bytes())
            }
            InfoItem::InputCount => {
                payload.extend_from_slice(&(snapshot.input.len() as u32).to_le_bytes())
            }
            InfoItem::OutputCount => {
                let count = snapshot.output.map_or(0, Descriptor::len) as u32;
                payload.extend_from_slice(&count.to_le_bytes());
            }
            InfoItem::InputDescribe => snapshot.input.describe_into(&mut payload),
            InfoItem::OutputDescribe => match snapshot.output {
                Some(output) => output.describe_into(&mut payload),
                None => Descriptor::empty().describe_into(&mut payload),
            },
            InfoItem::Records => {
                payload.extend_from_slice(&snapshot.last_affected.unwrap_or(0).to_le_bytes());
                payload.extend_from_slice(&snapshot.rows_fetched.to_le_bytes());
            }
            InfoItem::Plan => payload.extend_from_slice(snapshot.plan_text.unwrap_or("").as_bytes()),
            InfoItem::Scrollable => payload.push(u8::from(snapshot.scrollable)),
            InfoItem::CursorName => {
                payload.extend_from_slice(snapshot.cursor_name.unwrap_or("").as_bytes())
            }
        }

        let len = u16::try_from(payload.len()).map_err(|_| {
            DescriptorError::Malformed(format!(
                "info item {:?} payload of {} bytes exceeds item length field",
                item,
                payload.len()
            ))
        })?;
        out.push(*item as u8);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&payload);
    }
    out.push(InfoItem::End as u8);
    Ok(out)
}

/// Copy a rendered reply into the caller's buffer.
///
/// Nothing is written when the buffer is too small.
///
/// # Errors
/// Returns `DescriptorError::DescriptorOverflow` with the exact size needed.
pub fn write_reply(reply: &[u8], buffer: &mut [u8]) -> Result<usize, DescriptorError> {
    if buffer.len() < reply.len() {
        return Err(DescriptorError::DescriptorOverflow {
            required: reply.len(),
            available: buffer.len(),
        });
    }
    buffer[..reply.len()].copy_from_slice(reply);
    Ok(reply.len())
}

/// Split a reply back into `(item, payload)` pairs.
///
/// # Errors
/// Returns `DescriptorError::Malformed` on an unknown code or a truncated
/// cluster.
pub fn parse_reply(mut reply: &[u8]) -> Result<Vec<(InfoItem, &[u8])>, DescriptorError> {
    let mut clusters = Vec::new();
    loop {
        let Some((&code, rest)) = reply.split_first() else {
            return Err(DescriptorError::Malformed("info reply has no end marker".into()));
        };
        let item = InfoItem::try_from(code)
            .map_err(|e| DescriptorError::Malformed(e.to_string()))?;
        if item == InfoItem::End {
            return Ok(clusters);
        }
        if rest.len() < 2 {
            return Err(DescriptorError::Malformed(format!("truncated {:?} cluster", item)));
        }
        let len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        let rest = &rest[2..];
        if rest.len() < len {
            return Err(DescriptorError::Malformed(format!("truncated {:?} cluster", item)));
        }
        clusters.push((item, &rest[..len]));
        reply = &rest[len..];
    }
}
