//! Ferry Binding
//!
//! Turns binding specifications into values and back.
//!
//! An input binding is fetched into a [`Value`]: a path inside the task's
//! [`Scratch`] directory when the target is `filepath`, or bytes that never
//! touch disk when the target is `memory`. An output value is pushed to its
//! binding: written to a local path, uploaded to the remote service as a
//! single chunk, or handed back in memory.
//!
//! Mandatory binding fields are checked before any network call.

mod error;
mod resolver;
mod scratch;
mod value;

pub use error::BindingError;
pub use resolver::{BindingResolver, PushOutcome, safe_file_name};
pub use scratch::Scratch;
pub use value::Value;
