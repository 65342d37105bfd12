//! Statement registry: handle table, allocation and execute-immediate.

use crate::cursor::{CursorRegistry, CursorScope};
use crate::descriptor::Value;
use crate::engine::{AttachmentId, Dialect, Engine, FetchDirection, TransactionId};
use crate::error::{DsqlError, StatementError};
use crate::registry::handle_table::{HandleTable, RawHandle};
use crate::registry::RuntimeConfig;
use crate::statement::{
    ExecuteOutcome, FetchOutcome, FreeOption, PrepareOutcome, PrepareRequest, Statement,
    StatementState,
};
use crate::status::Reportable;
use arrow_schema::Schema;
use parking_lot::Mutex;
use std::sync::Arc;

type SharedStatement = Arc<Mutex<Statement>>;

/// Caller-held token for one statement.
///
/// The handle is neither `Clone` nor `Copy`: operations borrow it mutably,
/// so one handle has one driver at a time. Once the statement is dropped the
/// handle is stale and every operation on it fails with `InvalidHandle`.
#[derive(Debug, PartialEq, Eq)]
pub struct StatementHandle {
    raw: RawHandle,
}

impl StatementHandle {
    /// Identity of the handle, for comparison and diagnostics only.
    pub fn id(&self) -> HandleId {
        HandleId(self.raw)
    }

    /// Give up the typed handle, e.g. to pass it across an FFI boundary.
    pub fn into_raw(self) -> RawHandle {
        self.raw
    }

    /// Rebuild a handle given up with [`into_raw`](Self::into_raw).
    ///
    /// Meant for the FFI boundary: the raw value stands in for the handle
    /// while it is outside Rust, so rebuilding it twice breaks the
    /// one-driver rule. A stale id is detected on first use. An
    /// identity from [`id`](Self::id) is not accepted:
    ///
    /// ```compile_fail
    /// # use dsql_rs::registry::StatementHandle;
    /// # fn twin(handle: &StatementHandle) -> StatementHandle {
    /// StatementHandle::from_raw(handle.id())
    /// # }
    /// ```
    pub fn from_raw(raw: RawHandle) -> Self {
        Self { raw }
    }
}

/// Opaque identity of a live or stale statement handle.
///
/// Comparable and printable, but it cannot be turned back into a
/// [`StatementHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(RawHandle);

impl HandleId {
    pub fn index(&self) -> u32 {
        self.0.index
    }

    pub fn generation(&self) -> u32 {
        self.0.generation
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of [`StatementRegistry::execute_immediate`].
///
/// The transaction the caller owns afterwards is written back through the
/// call's `transaction` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImmediateOutcome {
    /// The transaction was started by this call on the caller's behalf
    pub implicit_transaction: bool,
    /// Rows affected by a non-row-producing statement
    pub affected: Option<u64>,
    /// Length of the singleton row encoded into the output buffer
    pub row_length: Option<usize>,
}

impl Reportable for ImmediateOutcome {}

/// Row currently under a named cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorTarget {
    pub owner: HandleId,
    pub position: Option<u64>,
    pub rows_fetched: u64,
}

struct ImmediateRequest<'a> {
    attachment: AttachmentId,
    dialect: Option<Dialect>,
    sql: &'a str,
    inputs: &'a [Value],
}

/// Owner of every statement of a runtime.
///
/// Different handles can be driven from different threads in parallel; each
/// statement has its own lock and the table lock is held only to look a
/// handle up.
pub struct StatementRegistry {
    engine: Arc<dyn Engine>,
    config: RuntimeConfig,
    table: Mutex<HandleTable<SharedStatement>>,
    cursors: Mutex<CursorRegistry<RawHandle>>,
}

impl StatementRegistry {
    pub fn new(engine: Arc<dyn Engine>, config: RuntimeConfig) -> Self {
        Self {
            engine,
            config,
            table: Mutex::new(HandleTable::new()),
            cursors: Mutex::new(CursorRegistry::new()),
        }
    }

    /// Registry with the default configuration.
    pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
        Self::new(engine, RuntimeConfig::default())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate a statement on `attachment`.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::InvalidAttachment` if the engine does not know
    /// the attachment and `StatementError::TooManyStatements` at capacity.
    pub fn allocate(&self, attachment: AttachmentId) -> Result<StatementHandle, DsqlError> {
        if !self.engine.attachment_valid(attachment) {
            return Err(StatementError::InvalidAttachment(attachment.0).into());
        }

        let statement = Statement::new(Arc::clone(&self.engine), attachment);
        let mut table = self.table.lock();
        let limit = self.config.max_statements;
        if limit > 0 && table.len() >= limit {
            return Err(StatementError::TooManyStatements { limit }.into());
        }
        let raw = table.insert(Arc::new(Mutex::new(statement)));
        tracing::debug!(handle = %raw, attachment = attachment.0, "Statement allocated");
        Ok(StatementHandle { raw })
    }

    /// Compile SQL on the handle, answering `items` into `buffer`.
    ///
    /// See [`Statement::prepare`].
    pub fn prepare(
        &self,
        handle: &mut StatementHandle,
        transaction: Option<TransactionId>,
        dialect: Option<Dialect>,
        sql: &str,
        items: &[u8],
        buffer: &mut [u8],
    ) -> Result<PrepareOutcome, DsqlError> {
        let request = PrepareRequest::new(sql)
            .with_transaction(transaction)
            .with_dialect(dialect.unwrap_or(self.config.default_dialect))
            .with_items(items)
            .allow_scrollable(self.config.scrollable_cursors);
        let shared = self.lookup(handle.raw)?;
        let mut statement = shared.lock();
        statement.prepare(request, buffer, &self.scope(handle.raw))
    }

    /// Execute the prepared statement. See [`Statement::execute`].
    ///
    /// A COMMIT or ROLLBACK closes every cursor of the ended transaction.
    pub fn execute(
        &self,
        handle: &mut StatementHandle,
        transaction: Option<TransactionId>,
        inputs: &[Value],
    ) -> Result<ExecuteOutcome, DsqlError> {
        let shared = self.lookup(handle.raw)?;
        let outcome = shared
            .lock()
            .execute(transaction, inputs, &self.scope(handle.raw))?;
        if let ExecuteOutcome::TransactionEnded(ended) = outcome {
            self.transaction_ended(ended);
        }
        Ok(outcome)
    }

    /// Fetch the next row into `buffer`. See [`Statement::fetch`].
    pub fn fetch(
        &self,
        handle: &mut StatementHandle,
        direction: FetchDirection,
        buffer: &mut [u8],
    ) -> Result<FetchOutcome, DsqlError> {
        let shared = self.lookup(handle.raw)?;
        let mut statement = shared.lock();
        statement.fetch(direction, buffer)
    }

    /// Fetch the next row as values; `None` at end of cursor.
    pub fn fetch_values(
        &self,
        handle: &mut StatementHandle,
        direction: FetchDirection,
    ) -> Result<Option<Vec<Value>>, DsqlError> {
        let shared = self.lookup(handle.raw)?;
        let mut statement = shared.lock();
        statement.fetch_values(direction)
    }

    /// Name the open cursor of the handle.
    pub fn set_cursor(&self, handle: &mut StatementHandle, name: &str) -> Result<(), DsqlError> {
        let shared = self.lookup(handle.raw)?;
        let mut statement = shared.lock();
        statement.set_cursor(name, &self.scope(handle.raw))
    }

    /// Answer `sql_info` items into `buffer`.
    pub fn sql_info(
        &self,
        handle: &StatementHandle,
        items: &[u8],
        buffer: &mut [u8],
    ) -> Result<usize, DsqlError> {
        let shared = self.lookup(handle.raw)?;
        let statement = shared.lock();
        statement.sql_info(items, buffer)
    }

    /// Close the cursor or retire the handle.
    ///
    /// With `FreeOption::Drop` the handle id stops resolving before the
    /// statement releases its plan, and the slot becomes reusable under a new
    /// generation.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::InvalidHandle` for a stale handle.
    pub fn free(&self, handle: &mut StatementHandle, option: FreeOption) -> Result<(), DsqlError> {
        let scope = self.scope(handle.raw);
        match option {
            FreeOption::Close => {
                let shared = self.lookup(handle.raw)?;
                shared.lock().free(FreeOption::Close, &scope);
            }
            FreeOption::Drop => {
                let shared = self
                    .table
                    .lock()
                    .remove(handle.raw)
                    .ok_or_else(|| invalid_handle(handle.raw))?;
                shared.lock().free(FreeOption::Drop, &scope);
                tracing::debug!(handle = %handle.raw, "Statement dropped");
            }
        }
        Ok(())
    }

    /// Prepare and execute one non-row-producing statement.
    pub fn insert(
        &self,
        handle: &mut StatementHandle,
        transaction: Option<TransactionId>,
        dialect: Option<Dialect>,
        sql: &str,
        values: &[Value],
    ) -> Result<u64, DsqlError> {
        let request = PrepareRequest::new(sql)
            .with_transaction(transaction)
            .with_dialect(dialect.unwrap_or(self.config.default_dialect))
            .allow_scrollable(false);
        let shared = self.lookup(handle.raw)?;
        let mut statement = shared.lock();
        statement.insert(request, values, &self.scope(handle.raw))
    }

    /// Allocate, prepare, execute and drop a statement as one call.
    ///
    /// `transaction` is in/out. On entry it is the caller's transaction, if
    /// any; on return, success or failure, it holds the transaction the
    /// caller owns. Without a caller transaction one is started for
    /// statements that need it. On failure that transaction is rolled back
    /// and cleared, unless rollback is disabled in the configuration or
    /// fails, in which case it is left in `transaction` for the caller to
    /// finish. A statement that starts or ends a transaction updates it too.
    ///
    /// The transient handle is always dropped before returning. A
    /// row-producing statement must return at most one row, which is encoded
    /// into `output`.
    ///
    /// # Errors
    ///
    /// Everything allocate, prepare, execute and fetch return, plus
    /// `StatementError::SingletonSelect` for a second row.
    pub fn execute_immediate(
        &self,
        attachment: AttachmentId,
        transaction: &mut Option<TransactionId>,
        dialect: Option<Dialect>,
        sql: &str,
        inputs: &[Value],
        output: &mut [u8],
    ) -> Result<ImmediateOutcome, DsqlError> {
        let request = ImmediateRequest {
            attachment,
            dialect,
            sql,
            inputs,
        };
        let mut handle = self.allocate(attachment)?;
        let mut implicit = None;

        let result = self.run_immediate(
            &mut handle,
            &request,
            output,
            transaction,
            &mut implicit,
        );

        if let Err(e) = self.free(&mut handle, FreeOption::Drop) {
            tracing::debug!("Failed to drop execute-immediate statement: {}", e);
        }

        if let (Err(e), Some(started)) = (&result, implicit) {
            self.abandon_implicit(started, e, transaction);
        }

        result
    }

    /// Roll back a transaction this call started, clearing it from the
    /// caller's slot once it is gone.
    fn abandon_implicit(
        &self,
        started: TransactionId,
        error: &DsqlError,
        transaction: &mut Option<TransactionId>,
    ) {
        if !self.config.rollback_implicit_on_failure {
            tracing::warn!(
                transaction = started.0,
                "Leaving implicit transaction open after failure: {}",
                error
            );
            return;
        }
        tracing::warn!(
            transaction = started.0,
            "Rolling back implicit transaction after failure: {}",
            error
        );
        match self.engine.rollback_transaction(started) {
            Ok(()) => {
                self.transaction_ended(started);
                *transaction = None;
            }
            Err(rollback) => tracing::warn!("Implicit rollback failed: {}", rollback),
        }
    }

    fn run_immediate(
        &self,
        handle: &mut StatementHandle,
        request: &ImmediateRequest<'_>,
        output: &mut [u8],
        transaction: &mut Option<TransactionId>,
        implicit: &mut Option<TransactionId>,
    ) -> Result<ImmediateOutcome, DsqlError> {
        let prepared = self.prepare(
            handle,
            *transaction,
            request.dialect,
            request.sql,
            &[],
            &mut [],
        )?;

        if transaction.is_none() && prepared.kind.requires_transaction() {
            let started = self.engine.start_transaction(request.attachment)?;
            tracing::debug!(transaction = started.0, "Started implicit transaction");
            *implicit = Some(started);
            *transaction = Some(started);
        }

        let mut outcome = ImmediateOutcome {
            implicit_transaction: implicit.is_some(),
            ..ImmediateOutcome::default()
        };

        match self.execute(handle, *transaction, request.inputs)? {
            ExecuteOutcome::Affected(count) => outcome.affected = Some(count),
            ExecuteOutcome::CursorOpened => {
                if let FetchOutcome::Row { length } =
                    self.fetch(handle, FetchDirection::Next, output)?
                {
                    outcome.row_length = Some(length);
                    if self.fetch_values(handle, FetchDirection::Next)?.is_some() {
                        return Err(StatementError::SingletonSelect.into());
                    }
                }
            }
            ExecuteOutcome::TransactionStarted(started) => *transaction = Some(started),
            ExecuteOutcome::TransactionEnded(_) => *transaction = None,
        }

        Ok(outcome)
    }

    /// Close every cursor opened under `transaction`. Returns how many closed.
    ///
    /// Called by the transaction manager on commit/rollback; statements that
    /// end a transaction themselves trigger it automatically.
    pub fn transaction_ended(&self, transaction: TransactionId) -> usize {
        let owners = self.cursors.lock().take_transaction(transaction);
        let mut closed = 0;
        for owner in owners {
            let Some(shared) = self.table.lock().get(owner).cloned() else {
                continue;
            };
            if shared.lock().end_transaction(transaction) {
                closed += 1;
            }
        }
        tracing::debug!(transaction = transaction.0, closed, "Transaction ended");
        closed
    }

    /// Resolve a cursor name for a positioned update or delete.
    pub fn resolve_cursor(&self, transaction: TransactionId, name: &str) -> Option<CursorTarget> {
        let owner = self.cursors.lock().resolve(transaction, name.trim_end())?;
        let shared = self.table.lock().get(owner).cloned()?;
        let statement = shared.lock();
        let cursor = statement.cursor()?;
        Some(CursorTarget {
            owner: HandleId(owner),
            position: cursor.position(),
            rows_fetched: cursor.rows_fetched(),
        })
    }

    /// Arrow schema of the statement's parameters.
    ///
    /// See [`Statement::input_schema`].
    pub fn input_schema(&self, handle: &StatementHandle) -> Result<Schema, DsqlError> {
        self.with_statement(handle, Statement::input_schema)?
    }

    /// Arrow schema of the statement's result rows, `None` when it has none.
    ///
    /// See [`Statement::output_schema`].
    pub fn output_schema(&self, handle: &StatementHandle) -> Result<Option<Schema>, DsqlError> {
        self.with_statement(handle, Statement::output_schema)?
    }

    /// Current lifecycle state of the handle.
    pub fn state(&self, handle: &StatementHandle) -> Result<StatementState, DsqlError> {
        self.with_statement(handle, Statement::state)
    }

    /// Run `f` against the statement behind `handle`.
    pub fn with_statement<R>(
        &self,
        handle: &StatementHandle,
        f: impl FnOnce(&Statement) -> R,
    ) -> Result<R, DsqlError> {
        let shared = self.lookup(handle.raw)?;
        let statement = shared.lock();
        Ok(f(&statement))
    }

    fn lookup(&self, raw: RawHandle) -> Result<SharedStatement, DsqlError> {
        self.table
            .lock()
            .get(raw)
            .cloned()
            .ok_or_else(|| invalid_handle(raw))
    }

    fn scope(&self, raw: RawHandle) -> CursorScope<'_, RawHandle> {
        CursorScope::new(&self.cursors, raw)
    }
}

fn invalid_handle(raw: RawHandle) -> DsqlError {
    StatementError::InvalidHandle {
        index: raw.index,
        generation: raw.generation,
    }
    .into()
}

impl std::fmt::Debug for StatementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementRegistry")
            .field("config", &self.config)
            .field("live", &self.len())
            .finish()
    }
}
