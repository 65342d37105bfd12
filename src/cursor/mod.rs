//! Cursor state and the named-cursor namespace.
//!
//! A [`Cursor`] is owned by exactly one statement and wraps the engine's row
//! stream. [`CursorRegistry`] keeps the per-transaction namespace used by
//! `set_cursor` and by positioned update/delete targets.

mod namespace;

pub use namespace::CursorRegistry;

use crate::descriptor::Value;
use crate::engine::{FetchDirection, RowSource, TransactionId};
use crate::error::{DsqlError, StatementError};
use parking_lot::Mutex;
use std::hash::Hash;

/// Open result-set position of a row-producing statement.
pub struct Cursor {
    transaction: TransactionId,
    rows: Box<dyn RowSource>,
    name: Option<String>,
    scrollable: bool,
    exhausted: bool,
    /// Row taken from the engine but not yet delivered (caller buffer too small)
    pending: Option<(FetchDirection, Vec<Value>)>,
    rows_fetched: u64,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("transaction", &self.transaction)
            .field("name", &self.name)
            .field("scrollable", &self.scrollable)
            .field("exhausted", &self.exhausted)
            .field("rows_fetched", &self.rows_fetched)
            .finish()
    }
}

impl Cursor {
    pub(crate) fn open(
        transaction: TransactionId,
        rows: Box<dyn RowSource>,
        scrollable: bool,
    ) -> Self {
        Self {
            transaction,
            rows,
            name: None,
            scrollable,
            exhausted: false,
            pending: None,
            rows_fetched: 0,
        }
    }

    /// Transaction whose namespace holds this cursor.
    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_scrollable(&self) -> bool {
        self.scrollable
    }

    /// True once a forward fetch has run past the last row.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Current 1-based row position as reported by the engine.
    pub fn position(&self) -> Option<u64> {
        self.rows.position()
    }

    /// Rows delivered to the caller so far.
    pub fn rows_fetched(&self) -> u64 {
        self.rows_fetched
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    /// Move the cursor and return the row under it.
    ///
    /// `Ok(None)` is the end-of-cursor signal. Once a forward-only cursor is
    /// exhausted the engine is not consulted again.
    pub(crate) fn advance(
        &mut self,
        direction: FetchDirection,
    ) -> Result<Option<Vec<Value>>, DsqlError> {
        if !self.scrollable && !direction.is_forward() {
            return Err(StatementError::UnsupportedDirection(direction).into());
        }

        if let Some((held_direction, row)) = self.pending.take() {
            if held_direction == direction {
                return Ok(Some(row));
            }
        }

        if self.exhausted && !self.scrollable {
            return Ok(None);
        }

        match self.rows.fetch(direction)? {
            Some(row) => {
                self.exhausted = false;
                Ok(Some(row))
            }
            None => {
                if direction.is_forward() {
                    self.exhausted = true;
                }
                Ok(None)
            }
        }
    }

    /// Keep a row that could not be delivered so the next fetch returns it.
    pub(crate) fn hold(&mut self, direction: FetchDirection, row: Vec<Value>) {
        self.pending = Some((direction, row));
    }

    pub(crate) fn record_delivery(&mut self) {
        self.rows_fetched += 1;
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.rows.close();
    }
}

/// The part of the shared namespace one statement is allowed to touch.
///
/// The namespace lock is only held for the duration of a single call, never
/// across engine calls.
pub struct CursorScope<'a, K> {
    registry: &'a Mutex<CursorRegistry<K>>,
    owner: K,
}

impl<'a, K: Copy + Eq + Hash> CursorScope<'a, K> {
    pub fn new(registry: &'a Mutex<CursorRegistry<K>>, owner: K) -> Self {
        Self { registry, owner }
    }

    pub fn owner(&self) -> K {
        self.owner
    }

    pub(crate) fn opened(&self, transaction: TransactionId) {
        self.registry.lock().track_open(transaction, self.owner);
    }

    pub(crate) fn closed(&self, transaction: TransactionId) {
        self.registry.lock().release(transaction, self.owner);
    }

    pub(crate) fn bind(&self, transaction: TransactionId, name: &str) -> Result<(), StatementError> {
        self.registry.lock().register(transaction, name, self.owner)
    }
}
