//! Per-handle statement state machine.

use crate::cursor::{Cursor, CursorScope};
use crate::descriptor::{codec, Descriptor, Value};
use crate::engine::{
    AttachmentId, CompiledStatement, Dialect, Engine, Execution, FetchDirection, PlanRef,
    TransactionId,
};
use crate::error::{DescriptorError, DsqlError, StatementError};
use crate::statement::info::{self, InfoSnapshot};
use crate::statement::{ExecuteOutcome, FetchOutcome, FreeOption, PrepareOutcome, StatementKind};
use crate::types::descriptor_to_schema;
use arrow_schema::Schema;
use std::hash::Hash;
use std::sync::Arc;

/// Lifecycle state of a live statement.
///
/// `Unallocated` and `Freed` have no representation here: a statement that
/// exists is at least `Allocated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Allocated,
    Prepared,
    Cursored,
}

/// Parameters of a prepare call.
#[derive(Debug, Clone, Copy)]
pub struct PrepareRequest<'a> {
    pub sql: &'a str,
    pub transaction: Option<TransactionId>,
    pub dialect: Dialect,
    /// `sql_info` item codes answered into the prepare buffer
    pub items: &'a [u8],
    /// Whether the caller accepts a scrollable cursor
    pub allow_scrollable: bool,
}

impl<'a> PrepareRequest<'a> {
    pub fn new(sql: &'a str) -> Self {
        Self {
            sql,
            transaction: None,
            dialect: Dialect::default(),
            items: &[],
            allow_scrollable: true,
        }
    }

    pub fn with_transaction(mut self, transaction: Option<TransactionId>) -> Self {
        self.transaction = transaction;
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_items(mut self, items: &'a [u8]) -> Self {
        self.items = items;
        self
    }

    pub fn allow_scrollable(mut self, allow: bool) -> Self {
        self.allow_scrollable = allow;
        self
    }
}

/// Everything a successful prepare produced.
#[derive(Debug)]
struct Prepared {
    plan: PlanRef,
    kind: StatementKind,
    input: Descriptor,
    output: Option<Descriptor>,
    scrollable: bool,
    plan_text: Option<String>,
    transaction: Option<TransactionId>,
    dialect: Dialect,
    sql: String,
}

impl Prepared {
    fn new(compiled: CompiledStatement, request: &PrepareRequest<'_>) -> Self {
        Self {
            plan: compiled.plan,
            kind: compiled.kind,
            input: compiled.input,
            output: compiled.output,
            scrollable: compiled.scrollable && request.allow_scrollable,
            plan_text: compiled.plan_text,
            transaction: request.transaction,
            dialect: request.dialect,
            sql: request.sql.to_string(),
        }
    }

    fn snapshot<'a>(
        &'a self,
        last_affected: Option<u64>,
        rows_fetched: u64,
        cursor: Option<&'a Cursor>,
    ) -> InfoSnapshot<'a> {
        InfoSnapshot {
            kind: self.kind,
            input: &self.input,
            output: self.output.as_ref(),
            last_affected,
            rows_fetched,
            plan_text: self.plan_text.as_deref(),
            scrollable: self.scrollable,
            cursor_name: cursor.and_then(Cursor::name),
        }
    }
}

/// One statement handle's state: plan, descriptors and at most one cursor.
///
/// Operations follow the lifecycle `Allocated -> Prepared <-> Cursored`.
/// A failed operation leaves the statement in the state it was in before
/// the call.
pub struct Statement {
    engine: Arc<dyn Engine>,
    attachment: AttachmentId,
    state: StatementState,
    prepared: Option<Prepared>,
    cursor: Option<Cursor>,
    last_affected: Option<u64>,
    rows_fetched: u64,
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("attachment", &self.attachment)
            .field("state", &self.state)
            .field("prepared", &self.prepared)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl Statement {
    /// Create an allocated statement on `attachment`.
    pub fn new(engine: Arc<dyn Engine>, attachment: AttachmentId) -> Self {
        Self {
            engine,
            attachment,
            state: StatementState::Allocated,
            prepared: None,
            cursor: None,
            last_affected: None,
            rows_fetched: 0,
        }
    }

    pub fn attachment(&self) -> AttachmentId {
        self.attachment
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    pub fn kind(&self) -> Option<StatementKind> {
        self.prepared.as_ref().map(|p| p.kind)
    }

    pub fn input(&self) -> Option<&Descriptor> {
        self.prepared.as_ref().map(|p| &p.input)
    }

    pub fn output(&self) -> Option<&Descriptor> {
        self.prepared.as_ref().and_then(|p| p.output.as_ref())
    }

    pub fn sql(&self) -> Option<&str> {
        self.prepared.as_ref().map(|p| p.sql.as_str())
    }

    pub fn dialect(&self) -> Option<Dialect> {
        self.prepared.as_ref().map(|p| p.dialect)
    }

    /// Whether non-forward fetch was negotiated at prepare time.
    pub fn is_scrollable(&self) -> bool {
        self.prepared.as_ref().is_some_and(|p| p.scrollable)
    }

    /// Arrow schema of the parameters.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::Unprepared` before prepare and
    /// `DescriptorError::UnsupportedType` for a field Arrow cannot express.
    pub fn input_schema(&self) -> Result<Schema, DsqlError> {
        let prepared = self.prepared.as_ref().ok_or(StatementError::Unprepared)?;
        Ok(descriptor_to_schema(&prepared.input)?)
    }

    /// Arrow schema of the result rows; `None` for statements without rows.
    ///
    /// # Errors
    ///
    /// Same as [`input_schema`](Self::input_schema).
    pub fn output_schema(&self) -> Result<Option<Schema>, DsqlError> {
        let prepared = self.prepared.as_ref().ok_or(StatementError::Unprepared)?;
        match &prepared.output {
            Some(output) => Ok(Some(descriptor_to_schema(output)?)),
            None => Ok(None),
        }
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn last_affected(&self) -> Option<u64> {
        self.last_affected
    }

    /// Compile `request.sql`, replacing any previous plan.
    ///
    /// The requested `sql_info` items are answered into `buffer`. Nothing
    /// changes if compilation fails or the buffer is too small; otherwise an
    /// open cursor is closed and reported in the outcome.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Parse`/`EngineError::Plan` from the compiler,
    /// `StatementError::UnknownInfoItem` for a bad item code, and
    /// `DescriptorError::DescriptorOverflow` when the info reply does not fit.
    pub fn prepare<K: Copy + Eq + Hash>(
        &mut self,
        request: PrepareRequest<'_>,
        buffer: &mut [u8],
        scope: &CursorScope<'_, K>,
    ) -> Result<PrepareOutcome, DsqlError> {
        let items = info::parse_items(request.items)?;
        let compiled = self.engine.compile(
            self.attachment,
            request.transaction,
            request.dialect,
            request.sql,
        )?;
        let prepared = Prepared::new(compiled, &request);

        let written = info::render(&items, &prepared.snapshot(None, 0, None))
            .and_then(|reply| info::write_reply(&reply, buffer));
        let info_length = match written {
            Ok(length) => length,
            Err(e) => {
                self.engine.release_plan(prepared.plan);
                return Err(e.into());
            }
        };

        let closed_cursor = self.close_cursor(scope).map(|name| {
            tracing::warn!("Re-prepare closed open cursor '{}'", name);
            name
        });
        let outcome = PrepareOutcome {
            kind: prepared.kind,
            input_count: prepared.input.len(),
            output_count: prepared.output.as_ref().map_or(0, Descriptor::len),
            scrollable: prepared.scrollable,
            info_length,
            closed_cursor,
        };
        if let Some(previous) = self.prepared.replace(prepared) {
            self.engine.release_plan(previous.plan);
        }
        self.state = StatementState::Prepared;
        self.last_affected = None;
        self.rows_fetched = 0;
        tracing::debug!(kind = ?outcome.kind, "Statement prepared");
        Ok(outcome)
    }

    /// Execute the prepared plan with `inputs`.
    ///
    /// `transaction` overrides the one given at prepare time.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::Unprepared`, `StatementError::CursorAlreadyOpen`,
    /// `StatementError::NoTransaction`, `DescriptorError::TypeMismatch`, or the
    /// engine's execution error. No cursor is opened on failure.
    pub fn execute<K: Copy + Eq + Hash>(
        &mut self,
        transaction: Option<TransactionId>,
        inputs: &[Value],
        scope: &CursorScope<'_, K>,
    ) -> Result<ExecuteOutcome, DsqlError> {
        let prepared = self.prepared.as_ref().ok_or(StatementError::Unprepared)?;
        if self.cursor.is_some() {
            return Err(StatementError::CursorAlreadyOpen.into());
        }
        let transaction = transaction.or(prepared.transaction);
        if transaction.is_none() && prepared.kind.requires_transaction() {
            return Err(StatementError::NoTransaction.into());
        }
        codec::validate(inputs, &prepared.input)?;

        let execution = self
            .engine
            .execute(self.attachment, transaction, prepared.plan, inputs)?;
        let scrollable = prepared.scrollable;
        self.rows_fetched = 0;

        match execution {
            Execution::Affected(count) => {
                self.last_affected = Some(count);
                tracing::debug!(count, "Statement executed");
                Ok(ExecuteOutcome::Affected(count))
            }
            Execution::Rows(mut rows) => {
                let Some(transaction) = transaction else {
                    rows.close();
                    return Err(StatementError::NoTransaction.into());
                };
                self.cursor = Some(Cursor::open(transaction, rows, scrollable));
                scope.opened(transaction);
                self.state = StatementState::Cursored;
                tracing::debug!(transaction = transaction.0, scrollable, "Cursor opened");
                Ok(ExecuteOutcome::CursorOpened)
            }
            Execution::TransactionStarted(id) => Ok(ExecuteOutcome::TransactionStarted(id)),
            Execution::TransactionEnded(id) => Ok(ExecuteOutcome::TransactionEnded(id)),
        }
    }

    /// Move the cursor and encode the row into `buffer`.
    ///
    /// A row that does not fit stays pending and is returned by the next
    /// fetch in the same direction, so retrying with a larger buffer loses
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::CursorNotOpen`,
    /// `StatementError::UnsupportedDirection`,
    /// `DescriptorError::DescriptorOverflow` or the engine's fetch error.
    pub fn fetch(
        &mut self,
        direction: FetchDirection,
        buffer: &mut [u8],
    ) -> Result<FetchOutcome, DsqlError> {
        let cursor = self.cursor.as_mut().ok_or(StatementError::CursorNotOpen)?;
        let Some(row) = cursor.advance(direction)? else {
            return Ok(FetchOutcome::EndOfCursor);
        };

        let empty = Descriptor::empty();
        let output = self
            .prepared
            .as_ref()
            .and_then(|p| p.output.as_ref())
            .unwrap_or(&empty);
        match codec::encode(&row, output, buffer) {
            Ok(length) => {
                cursor.record_delivery();
                self.rows_fetched += 1;
                Ok(FetchOutcome::Row { length })
            }
            Err(e @ DescriptorError::DescriptorOverflow { .. }) => {
                cursor.hold(direction, row);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move the cursor and return the row as values.
    ///
    /// `Ok(None)` means end of cursor.
    pub fn fetch_values(
        &mut self,
        direction: FetchDirection,
    ) -> Result<Option<Vec<Value>>, DsqlError> {
        let cursor = self.cursor.as_mut().ok_or(StatementError::CursorNotOpen)?;
        let Some(row) = cursor.advance(direction)? else {
            return Ok(None);
        };
        if let Some(output) = self.prepared.as_ref().and_then(|p| p.output.as_ref()) {
            codec::validate(&row, output)?;
        }
        cursor.record_delivery();
        self.rows_fetched += 1;
        Ok(Some(row))
    }

    /// Name the open cursor for positioned update/delete.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::CursorNotOpen` without a cursor,
    /// `StatementError::InvalidCursorName` for a blank name and
    /// `StatementError::DuplicateCursorName` if the name is taken in the
    /// cursor's transaction.
    pub fn set_cursor<K: Copy + Eq + Hash>(
        &mut self,
        name: &str,
        scope: &CursorScope<'_, K>,
    ) -> Result<(), DsqlError> {
        let cursor = self.cursor.as_mut().ok_or(StatementError::CursorNotOpen)?;
        let trimmed = name.trim_end();
        if trimmed.is_empty() {
            return Err(StatementError::InvalidCursorName(name.to_string()).into());
        }
        let name = trimmed;
        scope.bind(cursor.transaction(), name)?;
        cursor.set_name(name.to_string());
        tracing::debug!("Cursor named '{}'", name);
        Ok(())
    }

    /// Answer `sql_info` items into `buffer`. Never changes state.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::Unprepared`, `StatementError::UnknownInfoItem`
    /// or `DescriptorError::DescriptorOverflow`.
    pub fn sql_info(&self, items: &[u8], buffer: &mut [u8]) -> Result<usize, DsqlError> {
        let prepared = self.prepared.as_ref().ok_or(StatementError::Unprepared)?;
        let items = info::parse_items(items)?;
        let snapshot = prepared.snapshot(self.last_affected, self.rows_fetched, self.cursor.as_ref());
        let reply = info::render(&items, &snapshot)?;
        Ok(info::write_reply(&reply, buffer)?)
    }

    /// Close the cursor or release the whole statement.
    ///
    /// Closing without an open cursor does nothing. After `Drop` the statement
    /// is back to `Allocated` with no plan; the registry retires its handle.
    pub fn free<K: Copy + Eq + Hash>(&mut self, option: FreeOption, scope: &CursorScope<'_, K>) {
        self.close_cursor(scope);
        if option == FreeOption::Drop {
            if let Some(prepared) = self.prepared.take() {
                self.engine.release_plan(prepared.plan);
            }
            self.state = StatementState::Allocated;
            self.last_affected = None;
            tracing::debug!("Statement released");
        }
    }

    /// Prepare and execute a single non-row-producing statement.
    ///
    /// # Errors
    ///
    /// Everything `prepare` and `execute` return, plus
    /// `StatementError::UnexpectedResultSet` for row-producing text.
    pub fn insert<K: Copy + Eq + Hash>(
        &mut self,
        request: PrepareRequest<'_>,
        values: &[Value],
        scope: &CursorScope<'_, K>,
    ) -> Result<u64, DsqlError> {
        let outcome = self.prepare(request.with_items(&[]), &mut [], scope)?;
        if outcome.kind.is_row_producing() {
            return Err(StatementError::UnexpectedResultSet.into());
        }
        match self.execute(request.transaction, values, scope)? {
            ExecuteOutcome::Affected(count) => Ok(count),
            ExecuteOutcome::CursorOpened => {
                self.close_cursor(scope);
                Err(StatementError::UnexpectedResultSet.into())
            }
            ExecuteOutcome::TransactionStarted(_) | ExecuteOutcome::TransactionEnded(_) => Ok(0),
        }
    }

    /// Close the cursor if it belongs to `transaction`, which has ended.
    ///
    /// The namespace entry is expected to be gone already.
    pub(crate) fn end_transaction(&mut self, transaction: TransactionId) -> bool {
        if self
            .cursor
            .as_ref()
            .is_some_and(|cursor| cursor.transaction() == transaction)
        {
            self.cursor = None;
            self.state = StatementState::Prepared;
            tracing::debug!(transaction = transaction.0, "Cursor closed by transaction end");
            return true;
        }
        false
    }

    /// Drop the open cursor and its namespace entry. Returns its name.
    fn close_cursor<K: Copy + Eq + Hash>(&mut self, scope: &CursorScope<'_, K>) -> Option<String> {
        let cursor = self.cursor.take()?;
        scope.closed(cursor.transaction());
        if self.prepared.is_some() {
            self.state = StatementState::Prepared;
        }
        tracing::debug!(rows = cursor.rows_fetched(), "Cursor closed");
        Some(cursor.name().unwrap_or("").to_string())
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        self.cursor = None;
        if let Some(prepared) = self.prepared.take() {
            self.engine.release_plan(prepared.plan);
        }
    }
}
