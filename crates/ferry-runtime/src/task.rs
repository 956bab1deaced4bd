//! Task execution.
//!
//! A run moves through fixed stages:
//!
//! ```text
//! FetchInputs -> ConvertInputs -> Execute -> ConvertOutputs -> PushOutputs -> Cleanup
//! ```
//!
//! Validation happens inside the convert stages: converted inputs and
//! produced outputs are checked against the validator registered for their
//! (type, format). The first failure aborts the run; uploads that already
//! completed are not rolled back. Cleanup runs whatever the outcome.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ferry_binding::{BindingError, BindingResolver, PushOutcome, Scratch, Value, safe_file_name};
use ferry_config::{BindingSpec, PortSpec, TaskSpec, Target};
use ferry_format::ConversionPlan;
use futures::future::join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::RuntimeError;
use crate::executor::{ExecutorError, Values};
use crate::runtime::TaskRuntime;

/// Result of a task run.
#[derive(Debug)]
pub struct TaskResult {
  pub task_id: String,
  /// Where each declared output went, keyed by port name. Outputs without a
  /// binding are returned as [`PushOutcome::Memory`].
  pub outputs: BTreeMap<String, PushOutcome>,
  /// Scratch directory left in place when cleanup is disabled.
  pub scratch_dir: Option<PathBuf>,
  /// Set when the run succeeded but its scratch directory could not be
  /// removed.
  pub cleanup_error: Option<String>,
}

impl TaskResult {
  /// A JSON report of the run.
  pub fn to_json(&self) -> serde_json::Value {
    let outputs: serde_json::Map<String, serde_json::Value> = self
      .outputs
      .iter()
      .map(|(name, outcome)| {
        let report = match outcome {
          PushOutcome::Remote(file) => json!({"mode": "remote", "file": file}),
          PushOutcome::Path(path) => json!({"mode": "filepath", "path": path.display().to_string()}),
          PushOutcome::Memory(value) => json!({"mode": "memory", "data": value.to_json()}),
        };
        (name.clone(), report)
      })
      .collect();

    json!({
      "task_id": self.task_id,
      "outputs": outputs,
      "scratch_dir": self.scratch_dir.as_ref().map(|p| p.display().to_string()),
      "cleanup_error": self.cleanup_error,
    })
  }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
  FetchInputs,
  ConvertInputs,
  Execute,
  ConvertOutputs,
  PushOutputs,
}

impl Stage {
  fn as_str(self) -> &'static str {
    match self {
      Stage::FetchInputs => "fetch_inputs",
      Stage::ConvertInputs => "convert_inputs",
      Stage::Execute => "execute",
      Stage::ConvertOutputs => "convert_outputs",
      Stage::PushOutputs => "push_outputs",
    }
  }
}

/// A handle to a task run.
///
/// Call `.wait()` to run the task and get the result.
pub struct TaskExecution<'a> {
  runtime: &'a TaskRuntime,
  task_id: String,
  task: TaskSpec,
  inputs: BTreeMap<String, BindingSpec>,
  outputs: BTreeMap<String, BindingSpec>,
  cancel: CancellationToken,
  cleanup: bool,
  validate: bool,
  auto_convert: bool,
}

impl<'a> TaskExecution<'a> {
  pub(crate) fn new(
    runtime: &'a TaskRuntime,
    task_id: String,
    task: TaskSpec,
    inputs: BTreeMap<String, BindingSpec>,
    outputs: BTreeMap<String, BindingSpec>,
    cancel: CancellationToken,
  ) -> Self {
    let config = &runtime.config;
    Self {
      runtime,
      task_id,
      task,
      inputs,
      outputs,
      cancel,
      cleanup: config.cleanup,
      validate: config.validate,
      auto_convert: config.auto_convert,
    }
  }

  pub fn task_id(&self) -> &str {
    &self.task_id
  }

  /// Remove the scratch directory when the run ends. Defaults to the worker
  /// config.
  pub fn cleanup(mut self, cleanup: bool) -> Self {
    self.cleanup = cleanup;
    self
  }

  /// Run registered validators for this run. Defaults to the worker config.
  pub fn validate(mut self, validate: bool) -> Self {
    self.validate = validate;
    self
  }

  /// Plan and apply format conversions for this run. Defaults to the worker
  /// config.
  pub fn auto_convert(mut self, auto_convert: bool) -> Self {
    self.auto_convert = auto_convert;
    self
  }

  /// Run the task to completion.
  #[instrument(
    name = "task_execute",
    skip(self),
    fields(task_id = %self.task_id, task = %self.task.label())
  )]
  pub async fn wait(self) -> Result<TaskResult, RuntimeError> {
    if self.cancel.is_cancelled() {
      return Err(RuntimeError::Cancelled);
    }

    info!(
      task_id = %self.task_id,
      inputs = self.inputs.len(),
      outputs = self.outputs.len(),
      "task_started"
    );

    let config = &self.runtime.config;
    let scratch = Scratch::create(&config.tmp_root, &self.task_id, !self.cleanup)
      .await
      .map_err(|source| RuntimeError::Scratch {
        path: config.tmp_root.join(&self.task_id),
        source,
      })?;
    let resolver = BindingResolver::new(scratch, config.request_timeout());

    let result = self.run_stages(&resolver).await;

    let (scratch_dir, cleanup_error) = match resolver.into_scratch().cleanup().await {
      Ok(kept) => {
        if let Some(path) = &kept {
          info!(path = %path.display(), "scratch_kept");
        }
        (kept, None)
      }
      Err(e) => {
        warn!(task_id = %self.task_id, error = %e, "cleanup_failed");
        (None, Some(e.to_string()))
      }
    };

    match result {
      Ok(outputs) => {
        info!(task_id = %self.task_id, outputs = outputs.len(), "task_completed");
        Ok(TaskResult {
          task_id: self.task_id,
          outputs,
          scratch_dir,
          cleanup_error,
        })
      }
      Err(e) => {
        error!(task_id = %self.task_id, error = %e, "task_failed");
        Err(e)
      }
    }
  }

  async fn run_stages(
    &self,
    resolver: &BindingResolver,
  ) -> Result<BTreeMap<String, PushOutcome>, RuntimeError> {
    self.check_cancelled(Stage::FetchInputs)?;
    let fetched = self.fetch_inputs(resolver).await?;

    self.check_cancelled(Stage::ConvertInputs)?;
    let mut values = Values::new();
    for (port, spec, value) in fetched {
      let value = self.convert_input(resolver, port, spec, value).await?;
      values.insert(port.name.clone(), value);
    }

    self.check_cancelled(Stage::Execute)?;
    let produced = self.execute(values).await?;

    self.check_cancelled(Stage::ConvertOutputs)?;
    let prepared = self.convert_outputs(produced).await?;

    self.check_cancelled(Stage::PushOutputs)?;
    self.push_outputs(resolver, prepared).await
  }

  fn check_cancelled(&self, stage: Stage) -> Result<(), RuntimeError> {
    if self.cancel.is_cancelled() {
      warn!(task_id = %self.task_id, stage = stage.as_str(), "task cancelled");
      return Err(RuntimeError::Cancelled);
    }
    debug!(stage = stage.as_str(), "stage_started");
    Ok(())
  }

  /// Fetch every declared input concurrently.
  async fn fetch_inputs<'s>(
    &'s self,
    resolver: &BindingResolver,
  ) -> Result<Vec<(&'s PortSpec, &'s BindingSpec, Value)>, RuntimeError> {
    for name in self.inputs.keys() {
      if self.task.input(name).is_none() {
        warn!(binding = %name, "input binding has no matching port");
      }
    }

    let mut bound = Vec::with_capacity(self.task.inputs.len());
    for port in &self.task.inputs {
      let spec = self
        .inputs
        .get(&port.name)
        .ok_or_else(|| RuntimeError::MissingInput {
          name: port.name.clone(),
        })?;
      bound.push((port, spec));
    }

    let results = join_all(
      bound
        .iter()
        .map(|(port, spec)| resolver.fetch_input(&port.name, spec, port.target)),
    )
    .await;

    let mut fetched = Vec::with_capacity(bound.len());
    let mut first_error: Option<BindingError> = None;
    for ((port, spec), result) in bound.into_iter().zip(results) {
      match result {
        Ok(value) => fetched.push((port, spec, value)),
        Err(e) => {
          error!(binding = %port.name, error = %e, "input_fetch_failed");
          if first_error.is_none() {
            first_error = Some(e);
          }
        }
      }
    }

    if let Some(e) = first_error {
      return Err(e.into());
    }

    info!(count = fetched.len(), "inputs_fetched");
    Ok(fetched)
  }

  /// Bring a fetched input into the format its port declares, then validate
  /// it.
  async fn convert_input(
    &self,
    resolver: &BindingResolver,
    port: &PortSpec,
    spec: &BindingSpec,
    value: Value,
  ) -> Result<Value, RuntimeError> {
    let data_type = port.data_type.as_deref().or(spec.data_type.as_deref());

    let mut value = value;
    if self.auto_convert
      && let Some(plan) = self.plan(data_type, spec.format.as_deref(), port.format.as_deref())?
    {
      value = self.apply(&port.name, &plan, value).await?;

      let target = spec.target.or(port.target).unwrap_or_default();
      if target == Target::Filepath && !matches!(value, Value::Path(_)) {
        value = self.materialize(resolver, &port.name, value).await?;
      }
    }

    let format = port.format.as_deref().or(spec.format.as_deref());
    self.validate_value(&port.name, data_type, format, &value).await?;
    Ok(value)
  }

  /// Run the task script.
  async fn execute(&self, values: Values) -> Result<Values, RuntimeError> {
    let executor = self.runtime.executor_for(&self.task);

    let result = tokio::select! {
      result = executor.execute(&self.task, values) => result,
      _ = self.cancel.cancelled() => {
        warn!(task_id = %self.task_id, "task cancelled during execution");
        return Err(RuntimeError::Cancelled);
      }
    };

    let produced = result.map_err(|source| RuntimeError::Execution {
      task: self.task.label().to_string(),
      source,
    })?;
    info!(count = produced.len(), "script_executed");
    Ok(produced)
  }

  /// Validate each declared output and bring it into its binding's format.
  async fn convert_outputs(
    &self,
    mut produced: Values,
  ) -> Result<Vec<(String, Option<&BindingSpec>, Value)>, RuntimeError> {
    for name in self.outputs.keys() {
      if self.task.output(name).is_none() {
        warn!(binding = %name, "output binding has no matching port");
      }
    }

    let mut prepared = Vec::with_capacity(self.task.outputs.len());
    for port in &self.task.outputs {
      let value = produced
        .remove(&port.name)
        .ok_or_else(|| RuntimeError::MissingOutput {
          name: port.name.clone(),
        })?;

      let data_type = port.data_type.as_deref();
      self
        .validate_value(&port.name, data_type, port.format.as_deref(), &value)
        .await?;

      let spec = self.outputs.get(&port.name);
      let value = match spec {
        Some(spec) if self.auto_convert => {
          let data_type = data_type.or(spec.data_type.as_deref());
          match self.plan(data_type, port.format.as_deref(), spec.format.as_deref())? {
            Some(plan) => self.apply(&port.name, &plan, value).await?,
            None => value,
          }
        }
        _ => value,
      };

      prepared.push((port.name.clone(), spec, value));
    }

    for name in produced.keys() {
      debug!(port = %name, "undeclared output dropped");
    }

    Ok(prepared)
  }

  /// Push bound outputs concurrently; unbound outputs are returned as is.
  async fn push_outputs(
    &self,
    resolver: &BindingResolver,
    prepared: Vec<(String, Option<&BindingSpec>, Value)>,
  ) -> Result<BTreeMap<String, PushOutcome>, RuntimeError> {
    let mut outcomes = BTreeMap::new();
    let mut bound = Vec::new();

    for (name, spec, value) in prepared {
      match spec {
        Some(spec) => bound.push((name, spec, value)),
        None => {
          outcomes.insert(name, PushOutcome::Memory(value));
        }
      }
    }

    let results = join_all(bound.into_iter().map(|(name, spec, value)| async move {
      let result = resolver.push_output(&name, spec, value).await;
      (name, result)
    }))
    .await;

    let mut first_error: Option<BindingError> = None;
    for (name, result) in results {
      match result {
        Ok(outcome) => {
          outcomes.insert(name, outcome);
        }
        Err(e) => {
          error!(binding = %name, error = %e, "output_push_failed");
          if first_error.is_none() {
            first_error = Some(e);
          }
        }
      }
    }

    if let Some(e) = first_error {
      return Err(e.into());
    }

    info!(count = outcomes.len(), "outputs_pushed");
    Ok(outcomes)
  }

  /// The conversion needed between two formats, if they differ.
  fn plan(
    &self,
    data_type: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
  ) -> Result<Option<ConversionPlan>, RuntimeError> {
    match (from, to) {
      (Some(from), Some(to)) if from != to => {
        let plan = self
          .runtime
          .registry
          .plan(data_type.unwrap_or_default(), from, to)?;
        Ok(Some(plan))
      }
      _ => Ok(None),
    }
  }

  async fn apply(
    &self,
    port: &str,
    plan: &ConversionPlan,
    value: Value,
  ) -> Result<Value, RuntimeError> {
    debug!(
      port = %port,
      data_type = %plan.data_type,
      from = %plan.from,
      to = %plan.to,
      steps = plan.steps.len(),
      "converting"
    );

    let mut value = value;
    for step in &plan.steps {
      value = self.run_step(step, value).await?;
    }
    Ok(value)
  }

  /// Run a single-input, single-output step such as a converter or validator.
  async fn run_step(&self, step: &TaskSpec, value: Value) -> Result<Value, RuntimeError> {
    let failed = |source: ExecutorError| RuntimeError::Execution {
      task: step.label().to_string(),
      source,
    };

    let (Some(input), Some(output)) = (step.inputs.first(), step.outputs.first()) else {
      return Err(failed(ExecutorError::Failed {
        message: "steps need one input and one output".to_string(),
      }));
    };

    let mut outputs = self
      .runtime
      .executor_for(step)
      .execute(step, Values::from([(input.name.clone(), value)]))
      .await
      .map_err(failed)?;

    outputs.remove(&output.name).ok_or_else(|| {
      failed(ExecutorError::MissingValue {
        port: output.name.clone(),
      })
    })
  }

  /// Check `value` with the validator registered for its type and format.
  async fn validate_value(
    &self,
    port: &str,
    data_type: Option<&str>,
    format: Option<&str>,
    value: &Value,
  ) -> Result<(), RuntimeError> {
    if !self.validate {
      return Ok(());
    }
    let (Some(data_type), Some(format)) = (data_type, format) else {
      return Ok(());
    };
    let Some(validator) = self.runtime.registry.validator(data_type, format) else {
      return Ok(());
    };

    match self.run_step(validator, value.clone()).await? {
      Value::Json(serde_json::Value::Bool(true)) => Ok(()),
      _ => Err(RuntimeError::Validation {
        port: port.to_string(),
        data_type: data_type.to_string(),
        format: format.to_string(),
      }),
    }
  }

  /// Write a converted value into scratch space for a filepath target.
  async fn materialize(
    &self,
    resolver: &BindingResolver,
    port: &str,
    value: Value,
  ) -> Result<Value, RuntimeError> {
    let dir = resolver
      .scratch()
      .binding_dir()
      .await
      .map_err(|source| BindingError::Io {
        binding: port.to_string(),
        path: resolver.scratch().root().to_path_buf(),
        source,
      })?;

    let path = dir.join(safe_file_name(port, "value"));
    resolver
      .push_output(port, &BindingSpec::filepath(&path), value)
      .await?;
    Ok(Value::Path(path))
  }
}
