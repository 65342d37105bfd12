//! External collaborators consumed by the statement core.
//!
//! The compiler, the executor and the transaction manager live outside this
//! crate. They are reached through the [`Engine`] trait and exchange only
//! opaque ids, descriptors and values with the core.

pub mod protocol;

pub use protocol::{
    AttachmentId, CompiledStatement, Dialect, Engine, Execution, FetchDirection, PlanRef,
    RowSource, TransactionId,
};
