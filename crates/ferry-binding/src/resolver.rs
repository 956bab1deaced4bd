use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use ferry_config::{BindingMode, BindingSpec, RemoteBinding, ResourceType, Target};
use ferry_transport::{
  ApiEndpoint, ByteStream, DEFAULT_API_ROOT, DEFAULT_PORT, DEFAULT_SCHEME, RemoteClient,
  RemoteFileRef,
};
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::error::BindingError;
use crate::scratch::Scratch;
use crate::value::Value;

/// Where an output value ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
  /// Uploaded; the new remote file.
  Remote(RemoteFileRef),
  /// Written to a local path.
  Path(PathBuf),
  /// Kept in memory and returned to the caller.
  Memory(Value),
}

/// Fetches inputs and pushes outputs for one task.
pub struct BindingResolver {
  scratch: Scratch,
  request_timeout: Duration,
}

impl BindingResolver {
  pub fn new(scratch: Scratch, request_timeout: Duration) -> Self {
    Self {
      scratch,
      request_timeout,
    }
  }

  pub fn scratch(&self) -> &Scratch {
    &self.scratch
  }

  pub fn into_scratch(self) -> Scratch {
    self.scratch
  }

  /// Materialize the input bound by `spec`.
  ///
  /// The binding's `target` wins over `port_target`; both default to
  /// [`Target::Filepath`].
  #[instrument(
    name = "fetch_input",
    skip(self, spec, port_target),
    fields(binding = %name, mode = spec.mode_name())
  )]
  pub async fn fetch_input(
    &self,
    name: &str,
    spec: &BindingSpec,
    port_target: Option<Target>,
  ) -> Result<Value, BindingError> {
    let target = spec.target.or(port_target).unwrap_or_default();

    let value = match &spec.mode {
      BindingMode::Remote(remote) => self.fetch_remote(name, remote, target).await?,
      BindingMode::Filepath { path } => match target {
        Target::Filepath => Value::Path(path.clone()),
        Target::Memory => {
          let data = fs::read(path).await.map_err(BindingError::io(name, path))?;
          Value::Bytes(Bytes::from(data))
        }
      },
      BindingMode::Memory { data } => {
        let data = data
          .clone()
          .ok_or_else(|| BindingError::configuration(name, "memory input has no data"))?;
        Value::Json(data)
      }
    };

    debug!(kind = value.kind(), "input_fetched");
    Ok(value)
  }

  /// Deliver an output value to the destination bound by `spec`.
  #[instrument(
    name = "push_output",
    skip(self, spec, value),
    fields(binding = %name, mode = spec.mode_name())
  )]
  pub async fn push_output(
    &self,
    name: &str,
    spec: &BindingSpec,
    value: Value,
  ) -> Result<PushOutcome, BindingError> {
    match &spec.mode {
      BindingMode::Remote(remote) => {
        let file = self.push_remote(name, remote, value).await?;
        info!(file_id = %file.id, file_name = %file.name, "output_uploaded");
        Ok(PushOutcome::Remote(file))
      }
      BindingMode::Filepath { path } => {
        let data = value.to_bytes().await.map_err(|source| value_io(name, &value, source))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
          fs::create_dir_all(parent)
            .await
            .map_err(BindingError::io(name, parent))?;
        }
        fs::write(path, &data).await.map_err(BindingError::io(name, path))?;
        Ok(PushOutcome::Path(path.clone()))
      }
      BindingMode::Memory { .. } => Ok(PushOutcome::Memory(value)),
    }
  }

  async fn fetch_remote(
    &self,
    name: &str,
    remote: &RemoteBinding,
    target: Target,
  ) -> Result<Value, BindingError> {
    let endpoint = endpoint(name, remote)?;
    let resource_type = remote
      .resource_type
      .ok_or_else(|| BindingError::configuration(name, "remote input requires resourceType"))?;
    let id = remote
      .id
      .as_deref()
      .ok_or_else(|| BindingError::configuration(name, "remote input requires id"))?;

    let client = self.client(name, endpoint, remote)?;

    if remote.fetch_parent && target == Target::Filepath {
      return self
        .fetch_with_siblings(name, &client, remote, resource_type, id)
        .await;
    }

    let file = match resource_type {
      ResourceType::File => match &remote.name {
        Some(file_name) if target == Target::Filepath => RemoteFileRef {
          id: id.to_string(),
          name: file_name.clone(),
          size: 0,
          item_id: None,
        },
        // The content is all that is needed for memory targets.
        _ if target == Target::Memory => RemoteFileRef {
          id: id.to_string(),
          name: String::new(),
          size: 0,
          item_id: None,
        },
        _ => client
          .get_file(id)
          .await
          .map_err(BindingError::transport(name))?,
      },
      ResourceType::Item => {
        let files = client
          .list_item_files(id)
          .await
          .map_err(BindingError::transport(name))?;
        select_file(name, id, remote.name.as_deref(), files)?
      }
    };

    match target {
      Target::Memory => {
        let data = client
          .download_bytes(&file.id)
          .await
          .map_err(BindingError::transport(name))?;
        Ok(Value::Bytes(data))
      }
      Target::Filepath => {
        let dir = self
          .scratch
          .binding_dir()
          .await
          .map_err(BindingError::io(name, self.scratch.root()))?;
        let path = dir.join(local_file_name(&file));
        download_to(name, &client, &file.id, &path).await?;
        Ok(Value::Path(path))
      }
    }
  }

  /// Download the requested file and every sibling in its item into a
  /// directory named after the item. Returns the requested file's path.
  async fn fetch_with_siblings(
    &self,
    name: &str,
    client: &RemoteClient,
    remote: &RemoteBinding,
    resource_type: ResourceType,
    id: &str,
  ) -> Result<Value, BindingError> {
    let (item_id, requested) = match resource_type {
      ResourceType::File => {
        let file = client.get_file(id).await.map_err(BindingError::transport(name))?;
        let item_id = file.item_id.clone().ok_or_else(|| {
          BindingError::configuration(name, format!("file '{}' has no parent item", id))
        })?;
        (item_id, Some(file.id))
      }
      ResourceType::Item => (id.to_string(), None),
    };

    let item = client
      .get_item(&item_id)
      .await
      .map_err(BindingError::transport(name))?;
    let files = client
      .list_item_files(&item_id)
      .await
      .map_err(BindingError::transport(name))?;

    let requested = match requested {
      Some(file_id) => files
        .iter()
        .find(|f| f.id == file_id)
        .cloned()
        .ok_or_else(|| BindingError::MissingRemoteFile {
          binding: name.to_string(),
          item_id: item_id.clone(),
          name: remote.name.clone(),
        })?,
      None => select_file(name, &item_id, remote.name.as_deref(), files.clone())?,
    };

    let dir = self
      .scratch
      .binding_dir()
      .await
      .map_err(BindingError::io(name, self.scratch.root()))?;
    let parent_dir = dir.join(safe_file_name(&item.name, &item.id));
    fs::create_dir_all(&parent_dir)
      .await
      .map_err(BindingError::io(name, &parent_dir))?;

    for file in &files {
      download_to(name, client, &file.id, &parent_dir.join(local_file_name(file))).await?;
    }

    info!(item_id = %item_id, files = files.len(), "parent_fetched");
    Ok(Value::Path(parent_dir.join(local_file_name(&requested))))
  }

  async fn push_remote(
    &self,
    name: &str,
    remote: &RemoteBinding,
    value: Value,
  ) -> Result<RemoteFileRef, BindingError> {
    let endpoint = endpoint(name, remote)?;
    let parent_type = remote
      .parent_type
      .as_deref()
      .ok_or_else(|| BindingError::configuration(name, "remote output requires parentType"))?;
    let parent_id = remote
      .parent_id
      .as_deref()
      .ok_or_else(|| BindingError::configuration(name, "remote output requires parentId"))?;

    let file_name = match (&remote.name, &value) {
      (Some(file_name), _) => file_name.clone(),
      (None, Value::Path(path)) => path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string()),
      (None, _) => name.to_string(),
    };

    let client = self.client(name, endpoint, remote)?;
    let data = value
      .to_bytes()
      .await
      .map_err(|source| value_io(name, &value, source))?;

    let upload_id = client
      .initiate_upload(parent_type, parent_id, &file_name, data.len() as u64)
      .await
      .map_err(BindingError::transport(name))?;
    client
      .upload_chunk(&upload_id, data)
      .await
      .map_err(BindingError::transport(name))
  }

  fn client(
    &self,
    name: &str,
    endpoint: ApiEndpoint,
    remote: &RemoteBinding,
  ) -> Result<RemoteClient, BindingError> {
    RemoteClient::new(endpoint, remote.token.clone(), self.request_timeout)
      .map_err(BindingError::transport(name))
  }
}

/// API address of a remote binding; `apiUrl` overrides the discrete fields.
fn endpoint(name: &str, remote: &RemoteBinding) -> Result<ApiEndpoint, BindingError> {
  let endpoint = match (&remote.api_url, &remote.host) {
    (Some(api_url), _) => ApiEndpoint::parse(api_url),
    (None, Some(host)) => ApiEndpoint::new(
      remote.scheme.as_deref().unwrap_or(DEFAULT_SCHEME),
      host,
      remote.port.unwrap_or(DEFAULT_PORT),
      remote.api_root.as_deref().unwrap_or(DEFAULT_API_ROOT),
    ),
    (None, None) => {
      return Err(BindingError::configuration(
        name,
        "remote binding requires apiUrl or host",
      ));
    }
  };
  endpoint.map_err(|e| BindingError::configuration(name, e.to_string()))
}

/// Pick the file of an item: the one named `wanted`, or the only one.
fn select_file(
  binding: &str,
  item_id: &str,
  wanted: Option<&str>,
  files: Vec<RemoteFileRef>,
) -> Result<RemoteFileRef, BindingError> {
  let missing = || BindingError::MissingRemoteFile {
    binding: binding.to_string(),
    item_id: item_id.to_string(),
    name: wanted.map(str::to_string),
  };

  if let Some(wanted) = wanted
    && let Some(file) = files.iter().find(|f| f.name == wanted)
  {
    return Ok(file.clone());
  }

  match <[RemoteFileRef; 1]>::try_from(files) {
    Ok([only]) => Ok(only),
    Err(_) => Err(missing()),
  }
}

/// Local name for a downloaded remote file.
fn local_file_name(file: &RemoteFileRef) -> String {
  safe_file_name(&file.name, &file.id)
}

/// The last path component of `name`, or `fallback` when it has none.
pub fn safe_file_name(name: &str, fallback: &str) -> String {
  Path::new(name)
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| fallback.to_string())
}

async fn download_to(
  name: &str,
  client: &RemoteClient,
  file_id: &str,
  path: &Path,
) -> Result<(), BindingError> {
  let mut stream: ByteStream = client
    .download(file_id)
    .await
    .map_err(BindingError::transport(name))?;
  let mut file = File::create(path).await.map_err(BindingError::io(name, path))?;

  while let Some(chunk) = stream.next().await {
    let bytes = chunk.map_err(BindingError::transport(name))?;
    file
      .write_all(&bytes)
      .await
      .map_err(BindingError::io(name, path))?;
  }

  file.flush().await.map_err(BindingError::io(name, path))?;
  Ok(())
}

fn value_io(name: &str, value: &Value, source: std::io::Error) -> BindingError {
  let path = match value {
    Value::Path(path) => path.clone(),
    _ => PathBuf::new(),
  };
  BindingError::Io {
    binding: name.to_string(),
    path,
    source,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn file(id: &str, name: &str) -> RemoteFileRef {
    RemoteFileRef {
      id: id.to_string(),
      name: name.to_string(),
      size: 0,
      item_id: None,
    }
  }

  #[test]
  fn test_select_file_by_name() {
    let files = vec![file("1", "a.txt"), file("2", "b.txt")];
    assert_eq!(select_file("in", "item", Some("b.txt"), files).unwrap().id, "2");
  }

  #[test]
  fn test_select_only_file() {
    let files = vec![file("1", "a.txt")];
    assert_eq!(select_file("in", "item", None, files.clone()).unwrap().id, "1");
    // A name that does not match still falls back to the only file.
    assert_eq!(select_file("in", "item", Some("zzz"), files).unwrap().id, "1");
  }

  #[test]
  fn test_select_ambiguous_or_empty() {
    let files = vec![file("1", "a.txt"), file("2", "b.txt")];
    assert!(matches!(
      select_file("in", "item", None, files),
      Err(BindingError::MissingRemoteFile { .. })
    ));
    assert!(select_file("in", "item", Some("a.txt"), Vec::new()).is_err());
  }

  #[test]
  fn test_safe_file_name() {
    assert_eq!(safe_file_name("../../etc/passwd", "id"), "passwd");
    assert_eq!(safe_file_name("", "id"), "id");
    assert_eq!(safe_file_name("..", "id"), "id");
    assert_eq!(safe_file_name("table.csv", "id"), "table.csv");
  }

  #[test]
  fn test_endpoint_precedence_and_defaults() {
    let remote = RemoteBinding {
      api_url: Some("https://hello.com:1234/foo/bar/api".to_string()),
      host: Some("wrong_host".to_string()),
      port: Some(5678),
      ..Default::default()
    };
    assert_eq!(
      endpoint("in", &remote).unwrap().as_str(),
      "https://hello.com:1234/foo/bar/api"
    );

    let remote = RemoteBinding {
      host: Some("wrong_host".to_string()),
      ..Default::default()
    };
    assert_eq!(endpoint("in", &remote).unwrap().as_str(), "http://wrong_host/api/v1");

    assert!(matches!(
      endpoint("in", &RemoteBinding::default()),
      Err(BindingError::Configuration { .. })
    ));
  }
}
