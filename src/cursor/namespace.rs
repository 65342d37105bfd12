//! Per-transaction cursor namespace.

use crate::engine::TransactionId;
use crate::error::StatementError;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Tracks open cursors and their names, keyed by owning transaction.
///
/// `K` identifies the statement that owns a cursor. A name is unique among
/// the open cursors of one transaction; the same name may be reused in a
/// different transaction.
#[derive(Debug)]
pub struct CursorRegistry<K> {
    names: HashMap<TransactionId, HashMap<String, K>>,
    open: HashMap<TransactionId, HashSet<K>>,
}

impl<K: Copy + Eq + Hash> CursorRegistry<K> {
    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
            open: HashMap::new(),
        }
    }

    /// Record that `owner` opened a cursor under `transaction`.
    pub fn track_open(&mut self, transaction: TransactionId, owner: K) {
        self.open.entry(transaction).or_default().insert(owner);
    }

    /// Bind `name` to the cursor owned by `owner`.
    ///
    /// Re-binding the same name to the same owner is a no-op; binding a new
    /// name replaces the owner's previous one.
    ///
    /// # Errors
    /// Returns `StatementError::DuplicateCursorName` if another open cursor in
    /// the transaction already holds the name.
    pub fn register(
        &mut self,
        transaction: TransactionId,
        name: &str,
        owner: K,
    ) -> Result<(), StatementError> {
        let names = self.names.entry(transaction).or_default();
        match names.get(name) {
            Some(existing) if *existing == owner => return Ok(()),
            Some(_) => return Err(StatementError::DuplicateCursorName(name.to_string())),
            None => {}
        }
        names.retain(|_, bound| *bound != owner);
        names.insert(name.to_string(), owner);
        Ok(())
    }

    /// Drop every binding held by `owner` in `transaction`.
    pub fn release(&mut self, transaction: TransactionId, owner: K) {
        if let Some(names) = self.names.get_mut(&transaction) {
            names.retain(|_, bound| *bound != owner);
            if names.is_empty() {
                self.names.remove(&transaction);
            }
        }
        if let Some(open) = self.open.get_mut(&transaction) {
            open.remove(&owner);
            if open.is_empty() {
                self.open.remove(&transaction);
            }
        }
    }

    /// Owner of the cursor named `name`, for positioned update/delete.
    pub fn resolve(&self, transaction: TransactionId, name: &str) -> Option<K> {
        self.names
            .get(&transaction)
            .and_then(|names| names.get(name))
            .copied()
    }

    /// Forget the transaction and return the owners of its open cursors.
    pub fn take_transaction(&mut self, transaction: TransactionId) -> Vec<K> {
        self.names.remove(&transaction);
        self.open
            .remove(&transaction)
            .map(|owners| owners.into_iter().collect())
            .unwrap_or_default()
    }

    /// Number of cursors open under `transaction`.
    pub fn open_count(&self, transaction: TransactionId) -> usize {
        self.open.get(&transaction).map_or(0, HashSet::len)
    }
}

impl<K: Copy + Eq + Hash> Default for CursorRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
