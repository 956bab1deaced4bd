use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
  /// A plugin descriptor could not be read or is malformed.
  #[error("failed to load plugin '{}': {message}", .path.display())]
  PluginLoad { path: PathBuf, message: String },

  /// No converter chain leads from one format of a type to another.
  #[error("no conversion path for type '{data_type}' from '{from}' to '{to}'")]
  NoConversionPath {
    data_type: String,
    from: String,
    to: String,
  },
}

impl FormatError {
  pub(crate) fn plugin_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
    FormatError::PluginLoad {
      path: path.into(),
      message: message.into(),
    }
  }
}
