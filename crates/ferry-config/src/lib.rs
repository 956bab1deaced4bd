//! Ferry Config
//!
//! This crate contains the serializable configuration types for ferry.
//! These types describe a task and the bindings of its inputs and outputs
//! before the runtime resolves them into concrete values.
//!
//! Documents are loaded from:
//! - JSON files (via CLI with `ferry run task.json --inputs inputs.json`)
//! - Callers embedding the runtime (constructed directly)
//!
//! Field names follow the remote service's camelCase convention; the
//! multi-word fields also accept snake_case spellings.

mod binding;
mod error;
mod task;
mod worker;

pub use binding::{BindingMode, BindingSpec, RemoteBinding, ResourceType};
pub use error::ConfigError;
pub use task::{PortSpec, Target, TaskSpec};
pub use worker::WorkerConfig;
