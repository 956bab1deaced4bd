//! Ferry Runtime
//!
//! This crate runs a single task end to end: it resolves the task's input
//! bindings, converts them into the formats the task's ports declare, hands
//! them to a [`ScriptExecutor`], then converts and pushes what the script
//! produced.
//!
//! ```text
//!  bindings ──fetch──▶ values ──convert/validate──▶ script
//!                                                     │
//!  bindings ◀──push── values ◀──validate/convert──────┘
//! ```
//!
//! Conversion steps come from a [`ferry_format::FormatRegistry`] and run
//! through the same executor seam as tasks. Tasks with `mode = "builtin"` are
//! run in process by [`BuiltinExecutor`].

mod builtin;
mod error;
mod executor;
mod runtime;
mod task;

pub use builtin::{BUILTIN_MODE, Builtin, BuiltinExecutor};
pub use error::RuntimeError;
pub use executor::{ExecutorError, ScriptExecutor, Values};
pub use runtime::TaskRuntime;
pub use task::{TaskExecution, TaskResult};
