//! Successful results of statement operations.

use crate::engine::TransactionId;
use crate::statement::StatementKind;
use crate::status::{Reportable, StatusArg, StatusCode, StatusVector};

/// What `prepare` learned about the compiled statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareOutcome {
    pub kind: StatementKind,
    pub input_count: usize,
    pub output_count: usize,
    /// Non-forward fetch was negotiated
    pub scrollable: bool,
    /// Bytes of `sql_info` reply written to the caller's buffer
    pub info_length: usize,
    /// Name of the cursor that re-preparing closed, empty if it was unnamed
    pub closed_cursor: Option<String>,
}

impl Reportable for PrepareOutcome {
    fn report(&self, status: &mut StatusVector) {
        match &self.closed_cursor {
            Some(name) => status.set_warning(
                StatusCode::CursorClosedByPrepare,
                vec![StatusArg::Str(name.clone())],
            ),
            None => status.set_success(),
        }
    }
}

/// Result of a successful execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Statement completed; rows affected
    Affected(u64),
    /// A cursor is now open on the statement
    CursorOpened,
    /// SET TRANSACTION started a transaction the caller now owns
    TransactionStarted(TransactionId),
    /// COMMIT or ROLLBACK ended a transaction
    TransactionEnded(TransactionId),
}

impl ExecuteOutcome {
    pub fn affected(&self) -> Option<u64> {
        match self {
            ExecuteOutcome::Affected(count) => Some(*count),
            _ => None,
        }
    }
}

impl Reportable for ExecuteOutcome {}

/// Result of a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A row was encoded into the first `length` bytes of the buffer
    Row { length: usize },
    /// The cursor has no row in the requested direction
    EndOfCursor,
}

impl FetchOutcome {
    pub fn is_end_of_cursor(&self) -> bool {
        matches!(self, FetchOutcome::EndOfCursor)
    }
}

impl Reportable for FetchOutcome {
    fn report(&self, status: &mut StatusVector) {
        match self {
            FetchOutcome::Row { .. } => status.set_success(),
            FetchOutcome::EndOfCursor => status.set_end_of_cursor(),
        }
    }
}

/// Option accepted by `free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeOption {
    /// Close the cursor, keep the prepared statement
    Close,
    /// Release everything and retire the handle
    Drop,
}
