//! The script execution seam.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ferry_binding::Value;
use ferry_config::TaskSpec;

/// Named values passed to or returned from a script.
pub type Values = BTreeMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
  /// No engine for the task's mode.
  #[error("unsupported execution mode '{mode}'")]
  UnsupportedMode { mode: String },

  #[error("unknown builtin '{name}'")]
  UnknownBuiltin { name: String },

  /// A port the script reads was not supplied.
  #[error("missing value for port '{port}'")]
  MissingValue { port: String },

  /// A supplied value cannot be interpreted in the port's format.
  #[error("invalid value for port '{port}': {message}")]
  InvalidValue { port: String, message: String },

  /// The script itself failed.
  #[error("script failed: {message}")]
  Failed { message: String },
}

/// Runs task scripts.
///
/// Implementations receive values keyed by input port name and return values
/// keyed by output port name. Conversion steps go through the same seam.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
  async fn execute(&self, task: &TaskSpec, inputs: Values) -> Result<Values, ExecutorError>;
}
