#[derive(Debug, thiserror::Error)]
pub enum TransportError {
  /// The service address could not be built.
  #[error("invalid api url '{url}': {message}")]
  Endpoint { url: String, message: String },

  /// The HTTP client could not be constructed.
  #[error("failed to build http client: {0}")]
  Client(#[source] reqwest::Error),

  /// Connection failure, timeout, or a body that could not be read.
  #[error("{operation} failed for '{resource}': {source}")]
  Request {
    operation: &'static str,
    resource: String,
    #[source]
    source: reqwest::Error,
  },

  /// The service answered with a non-success status.
  #[error("{operation} failed for '{resource}': status {status}: {body}")]
  Status {
    operation: &'static str,
    resource: String,
    status: u16,
    body: String,
  },

  /// The response body is not the expected JSON document.
  #[error("{operation} returned malformed json for '{resource}': {source}")]
  Decode {
    operation: &'static str,
    resource: String,
    #[source]
    source: serde_json::Error,
  },
}

impl TransportError {
  /// The operation that failed, when the failure came from a call.
  pub fn operation(&self) -> Option<&'static str> {
    match self {
      TransportError::Request { operation, .. }
      | TransportError::Status { operation, .. }
      | TransportError::Decode { operation, .. } => Some(*operation),
      TransportError::Endpoint { .. } | TransportError::Client(_) => None,
    }
  }
}
