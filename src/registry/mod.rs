//! Statement registry and runtime configuration.
//!
//! The registry owns the handle table. It is the only place handle ids and
//! generations are assigned, and the entry point for every public operation.
//!
//! # Example
//!
//! ```no_run
//! use dsql_rs::engine::{AttachmentId, Engine};
//! use dsql_rs::registry::{RuntimeConfig, StatementRegistry};
//! use dsql_rs::statement::FreeOption;
//! use std::sync::Arc;
//!
//! # fn demo(engine: Arc<dyn Engine>) -> Result<(), dsql_rs::DsqlError> {
//! let registry = StatementRegistry::new(engine, RuntimeConfig::default());
//! let mut handle = registry.allocate(AttachmentId(1))?;
//! registry.prepare(&mut handle, None, None, "CREATE TABLE T (A INTEGER)", &[], &mut [])?;
//! registry.free(&mut handle, FreeOption::Drop)?;
//! # Ok(())
//! # }
//! ```

mod config;
mod handle_table;
mod statements;

pub use config::{RuntimeConfig, RuntimeConfigBuilder};
pub use handle_table::RawHandle;
pub use statements::{
    CursorTarget, HandleId, ImmediateOutcome, StatementHandle, StatementRegistry,
};
