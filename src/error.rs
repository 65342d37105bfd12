//! Error types for dsql-rs.
//!
//! This module defines domain-specific error types organized by functional area.
//! Every error maps onto a stable [`StatusCode`] plus substitution arguments so
//! the status reporter can build a structured status vector from it.

use crate::engine::FetchDirection;
use crate::status::{StatusArg, StatusCode};
use thiserror::Error;

/// Top-level error type encompassing all possible errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DsqlError {
    /// Statement lifecycle errors
    #[error(transparent)]
    Statement(#[from] StatementError),

    /// Descriptor encoding/decoding errors
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// Errors reported by the external engine collaborator
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Runtime configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors related to the statement state machine and handle table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatementError {
    /// The handle does not name a live statement (stale generation or never allocated)
    #[error("Invalid statement handle {index}:{generation}")]
    InvalidHandle { index: u32, generation: u32 },

    /// The attachment is not known to the engine
    #[error("Invalid attachment {0}")]
    InvalidAttachment(u64),

    /// Execute or fetch without a bound transaction
    #[error("No transaction bound to statement")]
    NoTransaction,

    /// Operation needs an open cursor
    #[error("Cursor is not open")]
    CursorNotOpen,

    /// Execute while a cursor is still open
    #[error("Cursor is already open")]
    CursorAlreadyOpen,

    /// Fetch direction not negotiated for this cursor
    #[error("Fetch direction {0:?} is not supported by this cursor")]
    UnsupportedDirection(FetchDirection),

    /// Cursor name is empty once trailing blanks are removed
    #[error("Invalid cursor name '{0}'")]
    InvalidCursorName(String),

    /// Cursor name already in use within the transaction
    #[error("Cursor name '{0}' is already in use")]
    DuplicateCursorName(String),

    /// Operation needs a prepared statement
    #[error("Statement is not prepared")]
    Unprepared,

    /// A row count was expected but the statement produces rows
    #[error("Expected row count but statement produces a result set")]
    UnexpectedResultSet,

    /// Execute-immediate output requested but more than one row came back
    #[error("Singleton select returned more than one row")]
    SingletonSelect,

    /// Unknown sql_info item code
    #[error("Unknown info item code {0}")]
    UnknownInfoItem(u8),

    /// Handle table is at its configured capacity
    #[error("Too many statements (limit {limit})")]
    TooManyStatements { limit: usize },
}

/// Errors related to descriptor encoding and decoding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    /// A value does not conform to the field it is bound to
    #[error("Type mismatch for field {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    /// Caller buffer is too small; `required` is the exact size to retry with
    #[error("Buffer of {available} bytes is too small, {required} bytes required")]
    DescriptorOverflow { required: usize, available: usize },

    /// Buffer contents do not match the descriptor
    #[error("Malformed buffer: {0}")]
    Malformed(String),

    /// An external type has no descriptor field equivalent
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),
}

/// Errors reported by the external compile/execute collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// SQL text could not be parsed
    #[error("SQL syntax error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// Statement parsed but could not be planned
    #[error("Planning failed: {0}")]
    Plan(String),

    /// Runtime failure while executing or fetching
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Transaction manager failure
    #[error("Transaction error: {0}")]
    Transaction(String),
}

/// Errors related to runtime configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Configuration string could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A configuration value is invalid
    #[error("Invalid configuration parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },
}

impl DsqlError {
    /// Map to the status code reported in the status vector.
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            DsqlError::Statement(e) => e.to_status_code(),
            DsqlError::Descriptor(e) => e.to_status_code(),
            DsqlError::Engine(e) => e.to_status_code(),
            DsqlError::Config(_) => StatusCode::ConfigInvalid,
        }
    }

    /// Substitution arguments naming the object at fault.
    pub fn status_args(&self) -> Vec<StatusArg> {
        match self {
            DsqlError::Statement(e) => e.status_args(),
            DsqlError::Descriptor(e) => e.status_args(),
            DsqlError::Engine(e) => e.status_args(),
            DsqlError::Config(ConfigError::InvalidParameter { parameter, .. }) => {
                vec![StatusArg::Str(parameter.clone())]
            }
            DsqlError::Config(ConfigError::ParseError(message)) => {
                vec![StatusArg::Str(message.clone())]
            }
        }
    }

    /// Required buffer size when this is an overflow error.
    pub fn required_size(&self) -> Option<usize> {
        match self {
            DsqlError::Descriptor(DescriptorError::DescriptorOverflow { required, .. }) => {
                Some(*required)
            }
            _ => None,
        }
    }
}

impl StatementError {
    /// Map to status code.
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            StatementError::InvalidHandle { .. } => StatusCode::InvalidHandle,
            StatementError::InvalidAttachment(_) => StatusCode::InvalidAttachment,
            StatementError::NoTransaction => StatusCode::NoTransaction,
            StatementError::CursorNotOpen => StatusCode::CursorNotOpen,
            StatementError::CursorAlreadyOpen => StatusCode::CursorAlreadyOpen,
            StatementError::UnsupportedDirection(_) => StatusCode::UnsupportedDirection,
            StatementError::InvalidCursorName(_) => StatusCode::InvalidCursorName,
            StatementError::DuplicateCursorName(_) => StatusCode::DuplicateCursorName,
            StatementError::Unprepared => StatusCode::Unprepared,
            StatementError::UnexpectedResultSet => StatusCode::UnexpectedResultSet,
            StatementError::SingletonSelect => StatusCode::SingletonSelect,
            StatementError::UnknownInfoItem(_) => StatusCode::UnknownInfoItem,
            StatementError::TooManyStatements { .. } => StatusCode::TooManyStatements,
        }
    }

    fn status_args(&self) -> Vec<StatusArg> {
        match self {
            StatementError::InvalidHandle { index, generation } => vec![
                StatusArg::Int(i64::from(*index)),
                StatusArg::Int(i64::from(*generation)),
            ],
            StatementError::InvalidAttachment(id) => vec![StatusArg::Int(*id as i64)],
            StatementError::UnsupportedDirection(direction) => {
                vec![StatusArg::Str(format!("{:?}", direction))]
            }
            StatementError::InvalidCursorName(name) | StatementError::DuplicateCursorName(name) => {
                vec![StatusArg::Str(name.clone())]
            }
            StatementError::UnknownInfoItem(code) => vec![StatusArg::Int(i64::from(*code))],
            StatementError::TooManyStatements { limit } => vec![StatusArg::Int(*limit as i64)],
            _ => Vec::new(),
        }
    }
}

impl DescriptorError {
    /// Map to status code.
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            DescriptorError::TypeMismatch { .. } => StatusCode::TypeMismatch,
            DescriptorError::DescriptorOverflow { .. } => StatusCode::DescriptorOverflow,
            DescriptorError::Malformed(_) => StatusCode::Malformed,
            DescriptorError::UnsupportedType(_) => StatusCode::TypeMismatch,
        }
    }

    fn status_args(&self) -> Vec<StatusArg> {
        match self {
            DescriptorError::TypeMismatch {
                index,
                expected,
                found,
            } => vec![
                StatusArg::Int(*index as i64),
                StatusArg::Str(expected.clone()),
                StatusArg::Str(found.clone()),
            ],
            DescriptorError::DescriptorOverflow {
                required,
                available,
            } => vec![
                StatusArg::Int(*required as i64),
                StatusArg::Int(*available as i64),
            ],
            DescriptorError::Malformed(message) | DescriptorError::UnsupportedType(message) => {
                vec![StatusArg::Str(message.clone())]
            }
        }
    }
}

impl EngineError {
    /// Map to status code.
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            EngineError::Parse { .. } => StatusCode::ParseError,
            EngineError::Plan(_) => StatusCode::PlanError,
            EngineError::Execution(_) => StatusCode::ExecutionFailed,
            EngineError::Transaction(_) => StatusCode::TransactionFailed,
        }
    }

    fn status_args(&self) -> Vec<StatusArg> {
        match self {
            EngineError::Parse { position, message } => vec![
                StatusArg::Int(*position as i64),
                StatusArg::Str(message.clone()),
            ],
            EngineError::Plan(message)
            | EngineError::Execution(message)
            | EngineError::Transaction(message) => vec![StatusArg::Str(message.clone())],
        }
    }
}
