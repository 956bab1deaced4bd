//! Binding specifications for task inputs and outputs.
//!
//! A binding says where an input's value comes from or where an output's
//! value must go. The `mode` field selects the variant:
//!
//! ```json
//! {
//!   "mode": "remote",
//!   "apiUrl": "https://data.example.com/api/v1",
//!   "resourceType": "item",
//!   "id": "5f1c...",
//!   "name": "table.csv",
//!   "type": "table",
//!   "format": "csv",
//!   "token": "..."
//! }
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::task::Target;

/// Binding of one task input or output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingSpec {
  #[serde(flatten)]
  pub mode: BindingMode,

  /// Semantic type of the bound value.
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub data_type: Option<String>,

  /// Format the value is stored in (inputs) or must be written as (outputs).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub format: Option<String>,

  /// Local materialization; overrides the task port's target when set.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target: Option<Target>,
}

impl BindingSpec {
  pub fn remote(remote: RemoteBinding) -> Self {
    Self::from_mode(BindingMode::Remote(remote))
  }

  pub fn filepath(path: impl Into<PathBuf>) -> Self {
    Self::from_mode(BindingMode::Filepath { path: path.into() })
  }

  pub fn memory(data: Option<serde_json::Value>) -> Self {
    Self::from_mode(BindingMode::Memory { data })
  }

  fn from_mode(mode: BindingMode) -> Self {
    Self {
      mode,
      data_type: None,
      format: None,
      target: None,
    }
  }

  pub fn with_format(mut self, data_type: impl Into<String>, format: impl Into<String>) -> Self {
    self.data_type = Some(data_type.into());
    self.format = Some(format.into());
    self
  }

  pub fn with_target(mut self, target: Target) -> Self {
    self.target = Some(target);
    self
  }

  /// Mode name as it appears in documents.
  pub fn mode_name(&self) -> &'static str {
    match self.mode {
      BindingMode::Remote(_) => "remote",
      BindingMode::Filepath { .. } => "filepath",
      BindingMode::Memory { .. } => "memory",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BindingMode {
  /// Value lives in the remote data-management service.
  Remote(RemoteBinding),

  /// Value is read from (inputs) or written to (outputs) a local path.
  Filepath { path: PathBuf },

  /// Value is passed through in process. Outputs carry no data.
  Memory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
  },
}

/// Kind of remote resource an input binding points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
  Item,
  File,
}

/// Remote-mode fields.
///
/// `api_url`, when present, overrides `scheme`, `host`, `port` and `api_root`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBinding {
  #[serde(default, alias = "api_url", skip_serializing_if = "Option::is_none")]
  pub api_url: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub scheme: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub host: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub port: Option<u16>,

  #[serde(default, alias = "api_root", skip_serializing_if = "Option::is_none")]
  pub api_root: Option<String>,

  /// Input only.
  #[serde(default, alias = "resource_type", skip_serializing_if = "Option::is_none")]
  pub resource_type: Option<ResourceType>,

  /// Input only.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,

  /// Output only, e.g. "folder" or "item".
  #[serde(default, alias = "parent_type", skip_serializing_if = "Option::is_none")]
  pub parent_type: Option<String>,

  /// Output only.
  #[serde(default, alias = "parent_id", skip_serializing_if = "Option::is_none")]
  pub parent_id: Option<String>,

  /// Remote file name: selects a file inside an item, or names an upload.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  /// Opaque credential sent as the `Girder-Token` header.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,

  /// Input only: also retrieve every sibling file of the owning item.
  #[serde(default, alias = "fetch_parent")]
  pub fetch_parent: bool,
}
