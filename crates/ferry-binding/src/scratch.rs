use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

/// Task-scoped scratch directory, `{tmp_root}/{task_id}`.
///
/// Each binding that needs local files gets its own subdirectory so that
/// concurrently fetched bindings never collide.
#[derive(Debug)]
pub struct Scratch {
  root: PathBuf,
  keep: bool,
}

impl Scratch {
  /// Create the scratch directory for a task. With `keep`, [`Scratch::cleanup`]
  /// leaves it in place.
  pub async fn create(tmp_root: &Path, task_id: &str, keep: bool) -> io::Result<Self> {
    let root = tmp_root.join(task_id);
    fs::create_dir_all(&root).await?;
    Ok(Self { root, keep })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn keeps_files(&self) -> bool {
    self.keep
  }

  /// Create a fresh private subdirectory.
  pub async fn binding_dir(&self) -> io::Result<PathBuf> {
    let dir = self.root.join(Uuid::new_v4().to_string());
    fs::create_dir_all(&dir).await?;
    Ok(dir)
  }

  /// Remove the scratch directory unless it is kept. Returns the path left
  /// behind, if any.
  pub async fn cleanup(self) -> io::Result<Option<PathBuf>> {
    if self.keep {
      return Ok(Some(self.root));
    }
    match fs::remove_dir_all(&self.root).await {
      Ok(()) => Ok(None),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e),
    }
  }
}
