//! Runtime errors.

use std::path::PathBuf;

use ferry_binding::BindingError;
use ferry_format::FormatError;

use crate::executor::ExecutorError;

/// Errors that abort a task.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// A declared input has no binding.
  #[error("input '{name}' is declared but not bound")]
  MissingInput { name: String },

  /// The script did not produce a declared output.
  #[error("output '{name}' was not produced")]
  MissingOutput { name: String },

  /// The task scratch directory could not be created.
  #[error("failed to create scratch directory '{}'", .path.display())]
  Scratch {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Fetching an input or pushing an output failed.
  #[error(transparent)]
  Binding(#[from] BindingError),

  /// No converter chain leads to the required format.
  #[error(transparent)]
  Conversion(#[from] FormatError),

  /// A registered validator rejected a value.
  #[error("validation failed for '{port}': not valid {data_type}:{format}")]
  Validation {
    port: String,
    data_type: String,
    format: String,
  },

  /// The task script or a conversion step failed.
  #[error("execution of '{task}' failed")]
  Execution {
    task: String,
    #[source]
    source: ExecutorError,
  },

  /// Execution was cancelled.
  #[error("execution cancelled")]
  Cancelled,
}
