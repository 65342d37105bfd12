//! Statement state machine.
//!
//! A [`Statement`] moves through `Allocated -> Prepared <-> Cursored` and is
//! driven by the registry, which owns it behind a handle.
//!
//! # Example
//!
//! ```
//! use dsql_rs::statement::StatementKind;
//!
//! let kind = StatementKind::from_sql("SELECT * FROM employees");
//! assert!(kind.is_row_producing());
//! assert!(!StatementKind::from_sql("DELETE FROM employees").is_row_producing());
//! ```

pub mod info;
mod kind;
mod outcome;
mod state;

pub use info::InfoItem;
pub use kind::StatementKind;
pub use outcome::{ExecuteOutcome, FetchOutcome, FreeOption, PrepareOutcome};
pub use state::{PrepareRequest, Statement, StatementState};
