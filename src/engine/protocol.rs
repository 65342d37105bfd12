//! Engine collaborator abstraction.
//!
//! This module defines the `Engine` trait that abstracts SQL compilation,
//! plan execution and the transaction manager. The statement core never looks
//! inside a plan; it only passes opaque references back to the engine.

use crate::descriptor::{Descriptor, Value};
use crate::error::EngineError;
use crate::statement::StatementKind;
use std::fmt;

/// Opaque reference to a live database attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentId(pub u64);

/// Opaque reference to a transaction owned by the transaction manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u64);

/// Opaque reference to a compiled plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanRef(pub u64);

/// SQL dialect tag, passed through to the compiler untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Dialect(pub u16);

impl Dialect {
    pub const V1: Dialect = Dialect(1);
    pub const V3: Dialect = Dialect(3);
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::V3
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cursor movement requested by fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDirection {
    Next,
    Prior,
    First,
    Last,
    Absolute(i64),
    Relative(i64),
}

impl FetchDirection {
    /// Forward-only cursors accept only this direction.
    pub fn is_forward(&self) -> bool {
        matches!(self, FetchDirection::Next)
    }
}

impl Default for FetchDirection {
    fn default() -> Self {
        FetchDirection::Next
    }
}

/// Output of a successful compile.
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    /// Plan handed back on execute and release
    pub plan: PlanRef,
    /// Statement classification
    pub kind: StatementKind,
    /// Parameter descriptor
    pub input: Descriptor,
    /// Row descriptor; `None` for statements that return no rows
    pub output: Option<Descriptor>,
    /// Whether the plan supports non-forward fetch
    pub scrollable: bool,
    /// Human-readable access plan, if the engine provides one
    pub plan_text: Option<String>,
}

/// Open result stream of a row-producing execution.
pub trait RowSource: Send {
    /// Move the cursor and return the row under it, or `None` past either end.
    fn fetch(&mut self, direction: FetchDirection) -> Result<Option<Vec<Value>>, EngineError>;

    /// 1-based position of the current row, if positioned.
    fn position(&self) -> Option<u64>;

    /// Release engine resources held by the stream.
    fn close(&mut self) {}
}

/// Result of executing a plan.
pub enum Execution {
    /// Statement completed; number of rows affected
    Affected(u64),
    /// Statement opened a row stream
    Rows(Box<dyn RowSource>),
    /// Statement started a transaction
    TransactionStarted(TransactionId),
    /// Statement committed or rolled back a transaction
    TransactionEnded(TransactionId),
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Execution::Affected(count) => f.debug_tuple("Affected").field(count).finish(),
            Execution::Rows(_) => f.debug_tuple("Rows").field(&"<RowSource>").finish(),
            Execution::TransactionStarted(id) => {
                f.debug_tuple("TransactionStarted").field(id).finish()
            }
            Execution::TransactionEnded(id) => f.debug_tuple("TransactionEnded").field(id).finish(),
        }
    }
}

/// Compile/execute collaborator and transaction manager.
///
/// Implementations provide their own thread safety; the statement core calls
/// into them from whichever thread drives a handle.
pub trait Engine: Send + Sync {
    /// Check that an attachment is live.
    fn attachment_valid(&self, attachment: AttachmentId) -> bool;

    /// Compile SQL text into a plan with descriptors.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Parse` or `EngineError::Plan`.
    fn compile(
        &self,
        attachment: AttachmentId,
        transaction: Option<TransactionId>,
        dialect: Dialect,
        sql: &str,
    ) -> Result<CompiledStatement, EngineError>;

    /// Execute a compiled plan with validated input values.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Execution` or `EngineError::Transaction`.
    fn execute(
        &self,
        attachment: AttachmentId,
        transaction: Option<TransactionId>,
        plan: PlanRef,
        inputs: &[Value],
    ) -> Result<Execution, EngineError>;

    /// Start a transaction on behalf of execute-immediate.
    fn start_transaction(&self, attachment: AttachmentId) -> Result<TransactionId, EngineError>;

    /// Roll back a transaction started on behalf of execute-immediate.
    fn rollback_transaction(&self, transaction: TransactionId) -> Result<(), EngineError>;

    /// Release a plan that is no longer referenced.
    fn release_plan(&self, plan: PlanRef);
}
