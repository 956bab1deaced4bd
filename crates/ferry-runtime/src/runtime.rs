//! Task runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use ferry_config::{BindingSpec, TaskSpec, WorkerConfig};
use ferry_format::FormatRegistry;
use tokio_util::sync::CancellationToken;

use crate::builtin::{BUILTIN_MODE, BuiltinExecutor};
use crate::executor::ScriptExecutor;
use crate::task::TaskExecution;

/// Runs tasks against a shared format registry.
///
/// Conversion steps and tasks with `mode = "builtin"` run in process; every
/// other mode is handed to the configured [`ScriptExecutor`].
pub struct TaskRuntime {
  pub(crate) config: WorkerConfig,
  pub(crate) registry: Arc<FormatRegistry>,
  scripts: Arc<dyn ScriptExecutor>,
  builtin: BuiltinExecutor,
}

impl TaskRuntime {
  pub fn new(
    config: WorkerConfig,
    registry: Arc<FormatRegistry>,
    scripts: Arc<dyn ScriptExecutor>,
  ) -> Self {
    Self {
      config,
      registry,
      scripts,
      builtin: BuiltinExecutor,
    }
  }

  /// A runtime that only runs builtin tasks.
  pub fn with_builtins(config: WorkerConfig, registry: Arc<FormatRegistry>) -> Self {
    Self::new(config, registry, Arc::new(BuiltinExecutor))
  }

  pub fn config(&self) -> &WorkerConfig {
    &self.config
  }

  pub fn registry(&self) -> &FormatRegistry {
    &self.registry
  }

  /// Prepare a run of `task` with the given bindings, keyed by port name.
  ///
  /// Returns a `TaskExecution` handle. Call `.wait()` to run it.
  pub fn run(
    &self,
    task: TaskSpec,
    inputs: BTreeMap<String, BindingSpec>,
    outputs: BTreeMap<String, BindingSpec>,
    cancel: CancellationToken,
  ) -> TaskExecution<'_> {
    let task_id = uuid::Uuid::new_v4().to_string();
    TaskExecution::new(self, task_id, task, inputs, outputs, cancel)
  }

  pub(crate) fn executor_for(&self, task: &TaskSpec) -> &dyn ScriptExecutor {
    if task.mode == BUILTIN_MODE {
      &self.builtin
    } else {
      self.scripts.as_ref()
    }
  }
}
