use serde::{Deserialize, Serialize};

/// Metadata of a remote file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileRef {
  #[serde(rename = "_id")]
  pub id: String,

  #[serde(default)]
  pub name: String,

  #[serde(default)]
  pub size: u64,

  /// Owning item. Absent from item file listings and upload responses.
  #[serde(rename = "itemId", default, skip_serializing_if = "Option::is_none")]
  pub item_id: Option<String>,
}

/// Metadata of a remote item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
  #[serde(rename = "_id")]
  pub id: String,

  #[serde(default)]
  pub name: String,
}

/// Response to an upload initiation.
#[derive(Debug, Deserialize)]
pub(crate) struct UploadHandle {
  #[serde(rename = "_id")]
  pub id: String,
}
