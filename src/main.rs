use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ferry_config::{BindingSpec, TaskSpec, WorkerConfig};
use ferry_format::FormatRegistry;
use ferry_runtime::TaskRuntime;

/// Ferry - moves typed task data between a remote service, disk, and memory
#[derive(Parser)]
#[command(name = "ferry")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.ferry)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Worker config file (default: <data-dir>/config.json when present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a single task
  Run {
    /// Path to the task file (JSON)
    task_file: PathBuf,

    /// Input bindings keyed by port name (JSON)
    #[arg(long)]
    inputs: Option<PathBuf>,

    /// Output bindings keyed by port name (JSON)
    #[arg(long)]
    outputs: Option<PathBuf>,

    /// Leave the task's scratch directory in place
    #[arg(long)]
    no_cleanup: bool,

    /// Skip registered validators
    #[arg(long)]
    no_validate: bool,

    /// Pass values through without format conversion
    #[arg(long)]
    no_convert: bool,
  },

  /// List the conversions the loaded plugins provide
  Formats {
    /// Print a Graphviz digraph instead of a from,to table
    #[arg(long)]
    dot: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".ferry"),
  };
  let config = load_config(cli.config.as_deref(), &data_dir)?;

  match cli.command {
    Some(Commands::Run {
      task_file,
      inputs,
      outputs,
      no_cleanup,
      no_validate,
      no_convert,
    }) => {
      let switches = RunSwitches {
        cleanup: !no_cleanup && config.cleanup,
        validate: !no_validate && config.validate,
        auto_convert: !no_convert && config.auto_convert,
      };
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_task(config, task_file, inputs, outputs, switches))?;
    }
    Some(Commands::Formats { dot }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(list_formats(config, dot))?;
    }
    None => {
      println!("ferry - use --help to see available commands");
    }
  }

  Ok(())
}

/// Per-run overrides of the worker config switches.
struct RunSwitches {
  cleanup: bool,
  validate: bool,
  auto_convert: bool,
}

/// Read the worker config, falling back to defaults rooted in `data_dir`.
fn load_config(path: Option<&Path>, data_dir: &Path) -> Result<WorkerConfig> {
  let default_path = data_dir.join("config.json");
  let mut config = match path {
    Some(path) => WorkerConfig::from_file(path)?,
    None if default_path.is_file() => WorkerConfig::from_file(&default_path)?,
    None => WorkerConfig {
      tmp_root: data_dir.join("tmp"),
      ..Default::default()
    },
  };

  if config.plugin_paths.is_empty() {
    let plugins = data_dir.join("plugins");
    if plugins.is_dir() {
      config.plugin_paths.push(plugins);
    }
  }

  Ok(config)
}

async fn run_task(
  config: WorkerConfig,
  task_file: PathBuf,
  inputs: Option<PathBuf>,
  outputs: Option<PathBuf>,
  switches: RunSwitches,
) -> Result<()> {
  let task = read_task(&task_file).await?;
  let inputs = read_bindings(inputs.as_deref()).await?;
  let outputs = read_bindings(outputs.as_deref()).await?;

  let registry = FormatRegistry::load(&config.plugin_paths)
    .await
    .context("failed to load format plugins")?;
  let runtime = TaskRuntime::with_builtins(config, Arc::new(registry));

  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_signal.cancel();
    }
  });

  let execution = runtime
    .run(task, inputs, outputs, cancel)
    .cleanup(switches.cleanup)
    .validate(switches.validate)
    .auto_convert(switches.auto_convert);
  eprintln!("Running task: {}", execution.task_id());

  let result = execution.wait().await.context("task execution failed")?;
  if let Some(error) = &result.cleanup_error {
    eprintln!("Warning: scratch cleanup failed: {}", error);
  }

  println!("{}", serde_json::to_string_pretty(&result.to_json())?);

  Ok(())
}

async fn list_formats(config: WorkerConfig, dot: bool) -> Result<()> {
  let registry = FormatRegistry::load(&config.plugin_paths)
    .await
    .context("failed to load format plugins")?;

  eprintln!(
    "Loaded {} conversions and {} validators",
    registry.converter_count(),
    registry.validator_count()
  );

  if dot {
    print!("{}", registry.to_dot());
  } else {
    print!("{}", registry.to_table());
  }

  Ok(())
}

/// Read a task file. A `script_uri` is resolved relative to the task file.
async fn read_task(path: &Path) -> Result<TaskSpec> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read task file: {}", path.display()))?;

  let mut task: TaskSpec = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse task file: {}", path.display()))?;

  if task.script.is_none()
    && let Some(uri) = &task.script_uri
  {
    let script_path = path.parent().unwrap_or(Path::new(".")).join(uri);
    let script = tokio::fs::read_to_string(&script_path)
      .await
      .with_context(|| format!("failed to read script: {}", script_path.display()))?;
    task.script = Some(script);
  }

  Ok(task)
}

async fn read_bindings(path: Option<&Path>) -> Result<BTreeMap<String, BindingSpec>> {
  let Some(path) = path else {
    return Ok(BTreeMap::new());
  };

  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read bindings file: {}", path.display()))?;

  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse bindings file: {}", path.display()))
}
