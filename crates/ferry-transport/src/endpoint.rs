use url::Url;

use crate::error::TransportError;

pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_API_ROOT: &str = "/api/v1";

/// Base address of the service API, e.g. `https://data.example.com/api/v1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
  base: Url,
}

impl ApiEndpoint {
  /// Use a complete API URL as given.
  pub fn parse(api_url: &str) -> Result<Self, TransportError> {
    let url = Url::parse(api_url).map_err(|e| TransportError::Endpoint {
      url: api_url.to_string(),
      message: e.to_string(),
    })?;

    if url.cannot_be_a_base() || url.host_str().is_none() {
      return Err(TransportError::Endpoint {
        url: api_url.to_string(),
        message: "not an absolute http url".to_string(),
      });
    }

    Ok(Self { base: url })
  }

  /// Assemble an API URL from its parts.
  pub fn new(scheme: &str, host: &str, port: u16, api_root: &str) -> Result<Self, TransportError> {
    let root = api_root.trim_matches('/');
    let url = if root.is_empty() {
      format!("{}://{}:{}", scheme, host, port)
    } else {
      format!("{}://{}:{}/{}", scheme, host, port, root)
    };
    Self::parse(&url)
  }

  pub fn as_str(&self) -> &str {
    self.base.as_str().trim_end_matches('/')
  }

  /// Absolute URL of an API path given as segments, e.g.
  /// `["file", id, "download"]`. Each segment is percent-encoded, so ids
  /// holding `/`, `?` or `#` stay inside their segment.
  pub fn url(&self, segments: &[&str]) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_keeps_path_and_port() {
    let endpoint = ApiEndpoint::parse("https://hello.com:1234/foo/bar/api").unwrap();
    assert_eq!(endpoint.as_str(), "https://hello.com:1234/foo/bar/api");
    assert_eq!(
      endpoint.url(&["file", "abc"]).as_str(),
      "https://hello.com:1234/foo/bar/api/file/abc"
    );
  }

  #[test]
  fn test_parse_strips_trailing_slash() {
    let endpoint = ApiEndpoint::parse("http://localhost:8080/girder/api/v1/").unwrap();
    assert_eq!(endpoint.as_str(), "http://localhost:8080/girder/api/v1");
    assert_eq!(
      endpoint.url(&["item", "x", "files"]).as_str(),
      "http://localhost:8080/girder/api/v1/item/x/files"
    );
  }

  #[test]
  fn test_new_from_parts() {
    let endpoint = ApiEndpoint::new("http", "localhost", 8080, "/girder/api/v1").unwrap();
    assert_eq!(endpoint.as_str(), "http://localhost:8080/girder/api/v1");

    let defaults = ApiEndpoint::new(DEFAULT_SCHEME, "data.example.com", DEFAULT_PORT, DEFAULT_API_ROOT)
      .unwrap();
    // The default port of the scheme is implied.
    assert_eq!(defaults.as_str(), "http://data.example.com/api/v1");
  }

  #[test]
  fn test_segments_are_percent_encoded() {
    let endpoint = ApiEndpoint::parse("http://localhost/api/v1").unwrap();
    assert_eq!(
      endpoint.url(&["file", "a/b?c#d", "download"]).as_str(),
      "http://localhost/api/v1/file/a%2Fb%3Fc%23d/download"
    );

    let bare = ApiEndpoint::parse("http://localhost:8080").unwrap();
    assert_eq!(bare.as_str(), "http://localhost:8080");
    assert_eq!(bare.url(&["file"]).as_str(), "http://localhost:8080/file");
  }

  #[test]
  fn test_rejects_invalid_urls() {
    assert!(matches!(
      ApiEndpoint::parse("not a url"),
      Err(TransportError::Endpoint { .. })
    ));
    assert!(ApiEndpoint::parse("mailto:someone@example.com").is_err());
    assert!(ApiEndpoint::new("http", "", 80, "/api/v1").is_err());
  }
}
