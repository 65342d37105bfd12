//! # dsql-rs
//!
//! Statement-execution core of an embedded dynamic-SQL runtime.
//!
//! This library manages the lifecycle of SQL statement handles bound to a
//! database attachment: allocation, prepare, execute, cursor fetch,
//! introspection and release. Parameters and rows travel in self-describing
//! descriptor buffers, and every operation reports a structured status.
//! Parsing, planning, storage and transaction management are reached through
//! the [`Engine`] trait.
//!
//! ## Example
//!
//! ```no_run
//! # use dsql_rs::*;
//! # use std::sync::Arc;
//! # fn example(engine: Arc<dyn Engine>) -> Result<(), DsqlError> {
//! let registry = StatementRegistry::new(engine, RuntimeConfig::default());
//! let attachment = AttachmentId(1);
//! let transaction = Some(TransactionId(1));
//!
//! let mut handle = registry.allocate(attachment)?;
//! registry.prepare(&mut handle, transaction, None, "SELECT * FROM T", &[], &mut [])?;
//! registry.execute(&mut handle, transaction, &[])?;
//!
//! let mut buffer = vec![0u8; 256];
//! let mut status = StatusVector::new();
//! loop {
//!     let fetched = registry.fetch(&mut handle, FetchDirection::Next, &mut buffer);
//!     status.record(&fetched);
//!     if status.is_end_of_cursor() || status.is_error() {
//!         break;
//!     }
//! }
//!
//! registry.free(&mut handle, FreeOption::Drop)?;
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod cursor;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod registry;
pub mod statement;
pub mod status;
pub mod types;

// Re-export public API
pub use descriptor::{Descriptor, Field, FieldType, Value};
pub use engine::{AttachmentId, Dialect, Engine, FetchDirection, TransactionId};
pub use error::{ConfigError, DescriptorError, DsqlError, EngineError, StatementError};
pub use registry::{ImmediateOutcome, RuntimeConfig, StatementHandle, StatementRegistry};
pub use statement::{ExecuteOutcome, FetchOutcome, FreeOption, StatementKind, StatementState};
pub use status::{Severity, StatusCode, StatusVector};
pub use types::TypeMapper;
