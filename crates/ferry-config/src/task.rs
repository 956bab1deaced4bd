use serde::{Deserialize, Serialize};

/// Where a value is materialized locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
  /// Bytes are written into a task-scoped scratch directory.
  #[default]
  Filepath,
  /// Bytes stay in process and never touch disk.
  Memory,
}

/// A declared input or output of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
  #[serde(default)]
  pub name: String,

  /// Semantic type, e.g. "table" or "string".
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub data_type: Option<String>,

  /// Concrete encoding of the value, e.g. "csv" or "text".
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub format: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target: Option<Target>,
}

impl PortSpec {
  pub fn new(name: impl Into<String>, data_type: impl Into<String>, format: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      data_type: Some(data_type.into()),
      format: Some(format.into()),
      target: None,
    }
  }

  pub fn with_target(mut self, target: Target) -> Self {
    self.target = Some(target);
    self
  }
}

/// A task description.
///
/// Converter and validator plugins use the same shape: a converter is a task
/// with one input and one output of the same type but different formats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  /// Execution mode understood by the script executor, e.g. "builtin".
  #[serde(default)]
  pub mode: String,

  /// Inline script source (or builtin name for `mode = "builtin"`).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub script: Option<String>,

  /// File holding the script, relative to the descriptor that declares it.
  #[serde(default, alias = "script_uri", skip_serializing_if = "Option::is_none")]
  pub script_uri: Option<String>,

  #[serde(default)]
  pub inputs: Vec<PortSpec>,

  #[serde(default)]
  pub outputs: Vec<PortSpec>,
}

impl TaskSpec {
  /// Look up a declared input by name.
  pub fn input(&self, name: &str) -> Option<&PortSpec> {
    self.inputs.iter().find(|p| p.name == name)
  }

  /// Look up a declared output by name.
  pub fn output(&self, name: &str) -> Option<&PortSpec> {
    self.outputs.iter().find(|p| p.name == name)
  }

  /// A short label for logs and error messages.
  pub fn label(&self) -> &str {
    self
      .name
      .as_deref()
      .or(self.script.as_deref())
      .unwrap_or("<anonymous>")
  }
}
