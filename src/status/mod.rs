//! Structured status reporting.
//!
//! Every public operation reports its outcome as a [`StatusVector`]: a leading
//! severity followed by zero or more `(code, arguments)` entries. Message text
//! is composed elsewhere; this module only guarantees the codes and arguments.
//!
//! # Example
//!
//! ```
//! use dsql_rs::status::{Severity, StatusVector};
//! use dsql_rs::error::{DsqlError, StatementError};
//!
//! let mut status = StatusVector::new();
//! let failed: Result<(), DsqlError> = Err(StatementError::NoTransaction.into());
//! status.record(&failed);
//! assert_eq!(status.severity(), Severity::Error);
//!
//! status.record(&Ok::<_, DsqlError>(()));
//! assert!(status.is_success());
//! assert!(status.entries().is_empty());
//! ```

use crate::error::DsqlError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity marker leading every status vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

/// Stable status codes.
///
/// The numeric values are part of the caller contract and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    ParseError = 1001,
    PlanError = 1002,
    TypeMismatch = 1003,
    DescriptorOverflow = 1004,
    InvalidHandle = 1005,
    InvalidAttachment = 1006,
    NoTransaction = 1007,
    CursorNotOpen = 1008,
    UnsupportedDirection = 1009,
    DuplicateCursorName = 1010,
    CursorAlreadyOpen = 1011,
    Unprepared = 1012,
    UnexpectedResultSet = 1013,
    SingletonSelect = 1014,
    UnknownInfoItem = 1015,
    TooManyStatements = 1016,
    Malformed = 1017,
    ExecutionFailed = 1018,
    TransactionFailed = 1019,
    ConfigInvalid = 1020,
    InvalidCursorName = 1021,
    /// Terminal fetch signal, reported with severity `Success`
    EndOfCursor = 100,
    /// Re-prepare closed a cursor that was still open
    CursorClosedByPrepare = 200,
}

impl StatusCode {
    /// Numeric value of the code.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_u32())
    }
}

/// Substitution parameter for a status entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusArg {
    Int(i64),
    Str(String),
}

/// One detail entry of a status vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub code: StatusCode,
    pub args: Vec<StatusArg>,
}

impl StatusEntry {
    pub fn new(code: StatusCode, args: Vec<StatusArg>) -> Self {
        Self { code, args }
    }
}

/// Ordered diagnostic sequence returned by every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusVector {
    severity: Severity,
    entries: Vec<StatusEntry>,
}

impl StatusVector {
    /// Create an empty success vector.
    pub fn new() -> Self {
        Self {
            severity: Severity::Success,
            entries: Vec::new(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn is_success(&self) -> bool {
        self.severity == Severity::Success
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// True when the vector carries the end-of-cursor signal.
    pub fn is_end_of_cursor(&self) -> bool {
        self.severity == Severity::Success
            && self
                .entries
                .first()
                .is_some_and(|entry| entry.code == StatusCode::EndOfCursor)
    }

    /// Code of the first detail entry, if any.
    pub fn primary_code(&self) -> Option<StatusCode> {
        self.entries.first().map(|entry| entry.code)
    }

    /// Overwrite with a plain success.
    pub fn set_success(&mut self) {
        self.severity = Severity::Success;
        self.entries.clear();
    }

    /// Overwrite with the end-of-cursor signal.
    pub fn set_end_of_cursor(&mut self) {
        self.severity = Severity::Success;
        self.entries.clear();
        self.entries
            .push(StatusEntry::new(StatusCode::EndOfCursor, Vec::new()));
    }

    /// Overwrite with a warning.
    pub fn set_warning(&mut self, code: StatusCode, args: Vec<StatusArg>) {
        self.severity = Severity::Warning;
        self.entries.clear();
        self.entries.push(StatusEntry::new(code, args));
    }

    /// Overwrite with an error.
    pub fn set_error(&mut self, error: &DsqlError) {
        self.severity = Severity::Error;
        self.entries.clear();
        self.entries
            .push(StatusEntry::new(error.to_status_code(), error.status_args()));
    }

    /// Overwrite from an operation result.
    ///
    /// Values that carry their own status (fetch outcomes, re-prepare warnings)
    /// go through [`Reportable`] so the vector reflects them.
    pub fn record<T: Reportable>(&mut self, result: &Result<T, DsqlError>) {
        match result {
            Ok(value) => value.report(self),
            Err(error) => self.set_error(error),
        }
    }
}

impl Default for StatusVector {
    fn default() -> Self {
        Self::new()
    }
}

/// Successful outcomes that know how to describe themselves in a status vector.
pub trait Reportable {
    fn report(&self, status: &mut StatusVector) {
        status.set_success();
    }
}

impl Reportable for () {}
impl Reportable for usize {}
impl Reportable for u64 {}
impl Reportable for Vec<u8> {}
