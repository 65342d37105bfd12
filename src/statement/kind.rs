//! Statement classification.

use serde::{Deserialize, Serialize};

/// Kind of a prepared SQL statement, as classified by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    /// SELECT query
    Select,
    /// SELECT ... FOR UPDATE (positioned update/delete target)
    SelectForUpdate,
    /// INSERT statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// DDL statement (CREATE, ALTER, DROP)
    Ddl,
    /// EXECUTE PROCEDURE
    ExecProcedure,
    /// SET TRANSACTION
    StartTransaction,
    /// COMMIT
    Commit,
    /// ROLLBACK
    Rollback,
    /// SET GENERATOR
    SetGenerator,
    /// Unknown or other statement type
    Other,
}

impl StatementKind {
    /// Classify SQL text by its leading keyword.
    ///
    /// Compilers with a real parser report the kind themselves; this is the
    /// fallback for engines that do not.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = sql.trim_start().to_uppercase();
        let mut words = trimmed.split_whitespace();
        let first = words.next().unwrap_or("");

        match first {
            "SELECT" | "WITH" => {
                if trimmed.contains(" FOR UPDATE") {
                    Self::SelectForUpdate
                } else {
                    Self::Select
                }
            }
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "CREATE" | "ALTER" | "DROP" | "RECREATE" | "DECLARE" | "GRANT" | "REVOKE" => Self::Ddl,
            "EXECUTE" => Self::ExecProcedure,
            "COMMIT" => Self::Commit,
            "ROLLBACK" => Self::Rollback,
            "SET" => match words.next() {
                Some("TRANSACTION") => Self::StartTransaction,
                Some("GENERATOR") => Self::SetGenerator,
                _ => Self::Other,
            },
            _ => Self::Other,
        }
    }

    /// Check if executing this kind opens a cursor.
    pub fn is_row_producing(&self) -> bool {
        matches!(self, Self::Select | Self::SelectForUpdate)
    }

    /// Check if executing this kind needs a bound transaction.
    pub fn requires_transaction(&self) -> bool {
        !matches!(self, Self::StartTransaction)
    }

    /// Numeric code reported by the `StatementType` info item.
    pub fn info_code(&self) -> u32 {
        match self {
            Self::Select => 1,
            Self::Insert => 2,
            Self::Update => 3,
            Self::Delete => 4,
            Self::Ddl => 5,
            Self::ExecProcedure => 8,
            Self::StartTransaction => 9,
            Self::Commit => 10,
            Self::Rollback => 11,
            Self::SelectForUpdate => 12,
            Self::SetGenerator => 13,
            Self::Other => 0,
        }
    }
}
