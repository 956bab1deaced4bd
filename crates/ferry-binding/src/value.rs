use std::path::PathBuf;

use bytes::Bytes;

/// A materialized input or output value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  /// A local file, usually inside the task's scratch directory.
  Path(PathBuf),
  /// Raw bytes held in memory.
  Bytes(Bytes),
  /// A structured value such as a row table.
  Json(serde_json::Value),
}

impl Value {
  pub fn kind(&self) -> &'static str {
    match self {
      Value::Path(_) => "path",
      Value::Bytes(_) => "bytes",
      Value::Json(_) => "json",
    }
  }

  /// The value's contents as bytes.
  ///
  /// Paths are read from disk. A JSON string yields its text; any other JSON
  /// value yields its serialized form.
  pub async fn to_bytes(&self) -> std::io::Result<Bytes> {
    match self {
      Value::Path(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
      Value::Bytes(bytes) => Ok(bytes.clone()),
      Value::Json(serde_json::Value::String(text)) => Ok(Bytes::from(text.clone())),
      Value::Json(json) => Ok(Bytes::from(json.to_string())),
    }
  }

  /// A JSON rendering for reporting results: paths as strings, bytes as
  /// (lossy) UTF-8 text.
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      Value::Path(path) => serde_json::Value::String(path.display().to_string()),
      Value::Bytes(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
      Value::Json(json) => json.clone(),
    }
  }
}

impl From<PathBuf> for Value {
  fn from(path: PathBuf) -> Self {
    Value::Path(path)
  }
}

impl From<Bytes> for Value {
  fn from(bytes: Bytes) -> Self {
    Value::Bytes(bytes)
  }
}

impl From<serde_json::Value> for Value {
  fn from(json: serde_json::Value) -> Self {
    Value::Json(json)
  }
}
