//! Worker-wide settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings shared by every task a worker runs.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Parent directory for task-scoped scratch directories.
  pub tmp_root: PathBuf,

  /// Directories scanned for converter and validator descriptors, in order.
  pub plugin_paths: Vec<PathBuf>,

  /// Remove scratch directories when a task ends.
  pub cleanup: bool,

  /// Run registered validators on converted inputs and produced outputs.
  pub validate: bool,

  /// Plan and apply format conversions between bindings and task ports.
  pub auto_convert: bool,

  /// Deadline applied to every remote call.
  pub request_timeout_secs: u64,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      tmp_root: std::env::temp_dir().join("ferry"),
      plugin_paths: Vec::new(),
      cleanup: true,
      validate: true,
      auto_convert: true,
      request_timeout_secs: 60,
    }
  }
}

impl WorkerConfig {
  /// Read a config from a JSON file.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}
