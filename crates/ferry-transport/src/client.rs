use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::endpoint::ApiEndpoint;
use crate::error::TransportError;
use crate::types::{RemoteFileRef, RemoteItem, UploadHandle};

/// Header carrying the session token.
pub const TOKEN_HEADER: &str = "Girder-Token";

/// A boxed stream of downloaded bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Client bound to one API endpoint and optional token.
#[derive(Debug, Clone)]
pub struct RemoteClient {
  http: Client,
  endpoint: ApiEndpoint,
  token: Option<String>,
  timeout: Duration,
}

impl RemoteClient {
  /// Build a client bounded by `timeout`.
  ///
  /// Connecting and every read of a response body must finish within
  /// `timeout`. Metadata calls must also complete within it as a whole;
  /// downloads and uploads may run longer as long as data keeps flowing.
  pub fn new(
    endpoint: ApiEndpoint,
    token: Option<String>,
    timeout: Duration,
  ) -> Result<Self, TransportError> {
    let http = Client::builder()
      .connect_timeout(timeout)
      .read_timeout(timeout)
      .build()
      .map_err(TransportError::Client)?;
    Ok(Self {
      http,
      endpoint,
      token,
      timeout,
    })
  }

  pub fn endpoint(&self) -> &ApiEndpoint {
    &self.endpoint
  }

  /// Files contained in an item.
  #[instrument(name = "list_item_files", skip(self), fields(endpoint = %self.endpoint.as_str()))]
  pub async fn list_item_files(&self, item_id: &str) -> Result<Vec<RemoteFileRef>, TransportError> {
    let request = self
      .request(Method::GET, &["item", item_id, "files"])
      .timeout(self.timeout);
    self.send_json("list item files", item_id, request).await
  }

  #[instrument(name = "get_file", skip(self), fields(endpoint = %self.endpoint.as_str()))]
  pub async fn get_file(&self, file_id: &str) -> Result<RemoteFileRef, TransportError> {
    let request = self
      .request(Method::GET, &["file", file_id])
      .timeout(self.timeout);
    self.send_json("get file", file_id, request).await
  }

  #[instrument(name = "get_item", skip(self), fields(endpoint = %self.endpoint.as_str()))]
  pub async fn get_item(&self, item_id: &str) -> Result<RemoteItem, TransportError> {
    let request = self
      .request(Method::GET, &["item", item_id])
      .timeout(self.timeout);
    self.send_json("get item", item_id, request).await
  }

  /// Stream the contents of a file.
  #[instrument(name = "download", skip(self), fields(endpoint = %self.endpoint.as_str()))]
  pub async fn download(&self, file_id: &str) -> Result<ByteStream, TransportError> {
    const OPERATION: &str = "download";

    let request = self.request(Method::GET, &["file", file_id, "download"]);
    let response = self.send(OPERATION, file_id, request).await?;

    let resource = file_id.to_string();
    let stream = response
      .bytes_stream()
      .map_err(move |source| TransportError::Request {
        operation: OPERATION,
        resource: resource.clone(),
        source,
      });
    Ok(Box::pin(stream))
  }

  /// Download a whole file into memory.
  pub async fn download_bytes(&self, file_id: &str) -> Result<Bytes, TransportError> {
    let mut stream = self.download(file_id).await?;
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
      buffer.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(buffer))
  }

  /// Open an upload of `size` bytes named `name` under a parent resource.
  /// Returns the upload id.
  #[instrument(name = "initiate_upload", skip(self), fields(endpoint = %self.endpoint.as_str()))]
  pub async fn initiate_upload(
    &self,
    parent_type: &str,
    parent_id: &str,
    name: &str,
    size: u64,
  ) -> Result<String, TransportError> {
    let size = size.to_string();
    let request = self.request(Method::POST, &["file"]).timeout(self.timeout).form(&[
      ("parentType", parent_type),
      ("parentId", parent_id),
      ("name", name),
      ("size", size.as_str()),
    ]);
    let handle: UploadHandle = self.send_json("initiate upload", parent_id, request).await?;
    debug!(upload_id = %handle.id, "upload_initiated");
    Ok(handle.id)
  }

  /// Send the whole payload as a single chunk at offset 0, completing the
  /// upload.
  #[instrument(
    name = "upload_chunk",
    skip(self, data),
    fields(endpoint = %self.endpoint.as_str(), size = data.len())
  )]
  pub async fn upload_chunk(
    &self,
    upload_id: &str,
    data: Bytes,
  ) -> Result<RemoteFileRef, TransportError> {
    let form = Form::new()
      .text("uploadId", upload_id.to_string())
      .text("offset", "0")
      .part("chunk", Part::bytes(data.to_vec()).file_name("chunk"));
    let request = self.request(Method::POST, &["file", "chunk"]).multipart(form);
    self.send_json("upload chunk", upload_id, request).await
  }

  fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
    let request = self.http.request(method, self.endpoint.url(segments));
    match &self.token {
      Some(token) => request.header(TOKEN_HEADER, token),
      None => request,
    }
  }

  /// Send a request and reject non-success statuses.
  async fn send(
    &self,
    operation: &'static str,
    resource: &str,
    request: RequestBuilder,
  ) -> Result<Response, TransportError> {
    let response = request
      .send()
      .await
      .map_err(|source| TransportError::Request {
        operation,
        resource: resource.to_string(),
        source,
      })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(TransportError::Status {
        operation,
        resource: resource.to_string(),
        status: status.as_u16(),
        body,
      });
    }

    Ok(response)
  }

  async fn send_json<T: DeserializeOwned>(
    &self,
    operation: &'static str,
    resource: &str,
    request: RequestBuilder,
  ) -> Result<T, TransportError> {
    let response = self.send(operation, resource, request).await?;
    let body = response
      .bytes()
      .await
      .map_err(|source| TransportError::Request {
        operation,
        resource: resource.to_string(),
        source,
      })?;
    serde_json::from_slice(&body).map_err(|source| TransportError::Decode {
      operation,
      resource: resource.to_string(),
      source,
    })
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use mockito::{Matcher, Server, ServerGuard};

  use super::*;

  fn client(server: &ServerGuard, token: Option<&str>) -> RemoteClient {
    let endpoint = ApiEndpoint::parse(&format!("{}/api/v1", server.url())).unwrap();
    RemoteClient::new(endpoint, token.map(String::from), Duration::from_secs(5)).unwrap()
  }

  #[tokio::test]
  async fn test_list_item_files_sends_token() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/api/v1/item/item_id/files")
      .match_header(TOKEN_HEADER, "foo")
      .with_header("content-type", "application/json")
      .with_body(r#"[{"_id": "file_id", "name": "test.txt", "size": 13}]"#)
      .expect(1)
      .create_async()
      .await;

    let files = client(&server, Some("foo"))
      .list_item_files("item_id")
      .await
      .unwrap();

    mock.assert_async().await;
    assert_eq!(
      files,
      vec![RemoteFileRef {
        id: "file_id".to_string(),
        name: "test.txt".to_string(),
        size: 13,
        item_id: None,
      }]
    );
  }

  #[tokio::test]
  async fn test_no_token_header_without_token() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/api/v1/item/item_id")
      .match_header(TOKEN_HEADER, Matcher::Missing)
      .with_body(r#"{"_id": "item_id", "name": "parent_item"}"#)
      .expect(1)
      .create_async()
      .await;

    let item = client(&server, None).get_item("item_id").await.unwrap();

    mock.assert_async().await;
    assert_eq!(item.name, "parent_item");
  }

  #[tokio::test]
  async fn test_download_streams_body() {
    let mut server = Server::new_async().await;
    let _m1 = server
      .mock("GET", "/api/v1/file/file_id/download")
      .with_body("file_contents")
      .create_async()
      .await;

    let bytes = client(&server, Some("foo"))
      .download_bytes("file_id")
      .await
      .unwrap();
    assert_eq!(&bytes[..], b"file_contents");
  }

  #[tokio::test]
  async fn test_slow_download_is_not_cut_off() {
    let mut server = Server::new_async().await;
    let _m4 = server
      .mock("GET", "/api/v1/file/big/download")
      .with_chunked_body(|w| {
        for _ in 0..6 {
          w.write_all(b"0123456789")?;
          w.flush()?;
          std::thread::sleep(Duration::from_millis(400));
        }
        Ok(())
      })
      .create_async()
      .await;

    let endpoint = ApiEndpoint::parse(&format!("{}/api/v1", server.url())).unwrap();
    let client = RemoteClient::new(endpoint, None, Duration::from_secs(1)).unwrap();
    let bytes = client.download_bytes("big").await.unwrap();
    assert_eq!(bytes.len(), 60);
  }

  #[tokio::test]
  async fn test_ids_are_percent_encoded() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/api/v1/file/a%2Fb%3Fc")
      .with_body(r#"{"_id": "a/b?c", "name": "odd.txt"}"#)
      .expect(1)
      .create_async()
      .await;

    let file = client(&server, None).get_file("a/b?c").await.unwrap();

    mock.assert_async().await;
    assert_eq!(file.id, "a/b?c");
  }

  #[tokio::test]
  async fn test_upload_sends_form_then_single_chunk() {
    let mut server = Server::new_async().await;
    let initiate = server
      .mock("POST", "/api/v1/file")
      .match_header(TOKEN_HEADER, "foo")
      .match_body(Matcher::AllOf(vec![
        Matcher::UrlEncoded("parentType".into(), "folder".into()),
        Matcher::UrlEncoded("parentId".into(), "parent_id".into()),
        Matcher::UrlEncoded("name".into(), "out.txt".into()),
        Matcher::UrlEncoded("size".into(), "13".into()),
      ]))
      .with_body(r#"{"_id": "upload_id"}"#)
      .expect(1)
      .create_async()
      .await;
    let chunk = server
      .mock("POST", "/api/v1/file/chunk")
      .match_header(TOKEN_HEADER, "foo")
      .match_body(Matcher::AllOf(vec![
        Matcher::Regex("upload_id".into()),
        Matcher::Regex("file_contents".into()),
      ]))
      .with_body(r#"{"_id": "new_file_id", "name": "out.txt"}"#)
      .expect(1)
      .create_async()
      .await;

    let client = client(&server, Some("foo"));
    let upload_id = client
      .initiate_upload("folder", "parent_id", "out.txt", 13)
      .await
      .unwrap();
    let file = client
      .upload_chunk(&upload_id, Bytes::from_static(b"file_contents"))
      .await
      .unwrap();

    initiate.assert_async().await;
    chunk.assert_async().await;
    assert_eq!(file.id, "new_file_id");
    assert_eq!(file.name, "out.txt");
  }

  #[tokio::test]
  async fn test_error_status_carries_operation_and_resource() {
    let mut server = Server::new_async().await;
    let _m2 = server
      .mock("GET", "/api/v1/file/missing")
      .with_status(400)
      .with_body(r#"{"message": "Invalid ObjectId"}"#)
      .create_async()
      .await;

    let err = client(&server, None).get_file("missing").await.unwrap_err();
    assert!(matches!(
      err,
      TransportError::Status { operation: "get file", ref resource, status: 400, .. }
        if resource == "missing"
    ));
    assert_eq!(err.operation(), Some("get file"));
  }

  #[tokio::test]
  async fn test_malformed_json() {
    let mut server = Server::new_async().await;
    let _m3 = server
      .mock("GET", "/api/v1/file/file_id")
      .with_body("<html>")
      .create_async()
      .await;

    let err = client(&server, None).get_file("file_id").await.unwrap_err();
    assert!(matches!(err, TransportError::Decode { .. }));
  }

  #[tokio::test]
  async fn test_connection_failure() {
    let endpoint = ApiEndpoint::parse("http://127.0.0.1:1/api/v1").unwrap();
    let client = RemoteClient::new(endpoint, None, Duration::from_secs(5)).unwrap();
    let err = client.get_item("item_id").await.unwrap_err();
    assert!(matches!(err, TransportError::Request { operation: "get item", .. }));
  }
}
