use std::path::PathBuf;

use ferry_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
  /// The binding is missing a field its mode requires.
  #[error("binding '{binding}' is misconfigured: {message}")]
  Configuration { binding: String, message: String },

  /// A call to the remote service failed.
  #[error("binding '{binding}': {source}")]
  Transport {
    binding: String,
    #[source]
    source: TransportError,
  },

  /// Local file access failed.
  #[error("binding '{binding}': io error on '{}': {source}", .path.display())]
  Io {
    binding: String,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The remote item holds no file matching the binding.
  #[error("binding '{binding}': no matching file in item '{item_id}'")]
  MissingRemoteFile {
    binding: String,
    item_id: String,
    name: Option<String>,
  },
}

impl BindingError {
  pub(crate) fn configuration(binding: &str, message: impl Into<String>) -> Self {
    BindingError::Configuration {
      binding: binding.to_string(),
      message: message.into(),
    }
  }

  pub(crate) fn transport(binding: &str) -> impl FnOnce(TransportError) -> Self + '_ {
    move |source| BindingError::Transport {
      binding: binding.to_string(),
      source,
    }
  }

  pub(crate) fn io(binding: &str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self + '_ {
    let path = path.into();
    move |source| BindingError::Io {
      binding: binding.to_string(),
      path,
      source,
    }
  }
}
