use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ferry_config::TaskSpec;
use tokio::fs;
use tracing::{debug, info};

use crate::descriptor::{Descriptor, DescriptorKind};
use crate::error::FormatError;
use crate::plan::{ConversionPlan, ConverterEdge};

/// Closure passes run after loading.
pub const MAX_CONVERSION_HOPS: usize = 3;

/// data type -> source format -> target format -> edge
type EdgeMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, ConverterEdge>>>;

/// data type -> format -> validator
type ValidatorMap = BTreeMap<String, BTreeMap<String, Arc<TaskSpec>>>;

/// Converters and validators known to a worker.
///
/// Built once at startup and shared read-only, typically behind an `Arc`.
/// All maps are ordered, so iteration and closure results are reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatRegistry {
  converters: EdgeMap,
  validators: ValidatorMap,
}

impl FormatRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Load every descriptor under `search_paths` and close the conversion
  /// graph with [`MAX_CONVERSION_HOPS`] passes.
  ///
  /// Directories are visited in the given order and the `*.json` files
  /// within each in lexicographic order. A later descriptor for the same key
  /// replaces an earlier one.
  pub async fn load(search_paths: &[PathBuf]) -> Result<Self, FormatError> {
    let mut registry = Self::new();

    for dir in search_paths {
      for path in descriptor_files(dir).await? {
        let descriptor = Descriptor::load(&path).await?;
        debug!(
          path = %path.display(),
          kind = ?descriptor.kind,
          data_type = %descriptor.data_type,
          from = %descriptor.input_format,
          to = %descriptor.output_format,
          "plugin_loaded"
        );
        registry.insert(descriptor);
      }
    }

    let composed = registry.close(MAX_CONVERSION_HOPS);
    info!(
      converters = registry.converter_count(),
      composed,
      validators = registry.validator_count(),
      "registry_loaded"
    );

    Ok(registry)
  }

  /// Add a checked descriptor, replacing any previous one for the same key.
  pub fn insert(&mut self, descriptor: Descriptor) {
    match descriptor.kind {
      DescriptorKind::Validator => {
        self
          .validators
          .entry(descriptor.data_type)
          .or_default()
          .insert(descriptor.input_format, descriptor.spec);
      }
      DescriptorKind::Converter => {
        self
          .converters
          .entry(descriptor.data_type)
          .or_default()
          .entry(descriptor.input_format)
          .or_default()
          .insert(descriptor.output_format, ConverterEdge::single(descriptor.spec));
      }
    }
  }

  /// Add composed edges `A: f1 -> f3` for every pair `A: f1 -> f2`,
  /// `A: f2 -> f3` with `f1 != f3` and no existing `A: f1 -> f3`.
  ///
  /// Runs at most `max_hops` passes and stops early once a pass adds
  /// nothing. Within a pass the first composition found in lexicographic
  /// (type, source, intermediate, target) order wins; edges found in a pass
  /// only become visible to the next one. Returns the number of edges added.
  pub fn close(&mut self, max_hops: usize) -> usize {
    let mut added = 0;

    for pass in 0..max_hops {
      let mut pending: BTreeMap<(String, String, String), ConverterEdge> = BTreeMap::new();

      for (data_type, sources) in &self.converters {
        for (from, targets) in sources {
          for (via, first) in targets {
            let Some(onward) = sources.get(via) else {
              continue;
            };
            for (to, second) in onward {
              if to == from || targets.contains_key(to) {
                continue;
              }
              pending
                .entry((data_type.clone(), from.clone(), to.clone()))
                .or_insert_with(|| first.then(second));
            }
          }
        }
      }

      if pending.is_empty() {
        break;
      }

      debug!(pass, edges = pending.len(), "closure_pass");
      added += pending.len();

      for ((data_type, from, to), edge) in pending {
        self
          .converters
          .entry(data_type)
          .or_default()
          .entry(from)
          .or_default()
          .insert(to, edge);
      }
    }

    added
  }

  /// Direct or composed edge, if any.
  pub fn edge(&self, data_type: &str, from: &str, to: &str) -> Option<&ConverterEdge> {
    self.converters.get(data_type)?.get(from)?.get(to)
  }

  /// Steps converting a value of `data_type` from format `from` to `to`.
  pub fn plan(&self, data_type: &str, from: &str, to: &str) -> Result<ConversionPlan, FormatError> {
    let steps = if from == to {
      Vec::new()
    } else {
      self
        .edge(data_type, from, to)
        .ok_or_else(|| FormatError::NoConversionPath {
          data_type: data_type.to_string(),
          from: from.to_string(),
          to: to.to_string(),
        })?
        .steps()
        .to_vec()
    };

    Ok(ConversionPlan {
      data_type: data_type.to_string(),
      from: from.to_string(),
      to: to.to_string(),
      steps,
    })
  }

  /// Validator registered for a (type, format) pair.
  pub fn validator(&self, data_type: &str, format: &str) -> Option<&Arc<TaskSpec>> {
    self.validators.get(data_type)?.get(format)
  }

  /// Number of edges, composed ones included.
  pub fn converter_count(&self) -> usize {
    self.edges().count()
  }

  pub fn validator_count(&self) -> usize {
    self.validators.values().map(BTreeMap::len).sum()
  }

  /// Every edge as `(type, from, to)` in lexicographic order.
  pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &str)> + '_ {
    self.converters.iter().flat_map(|(data_type, sources)| {
      sources.iter().flat_map(move |(from, targets)| {
        targets
          .keys()
          .map(move |to| (data_type.as_str(), from.as_str(), to.as_str()))
      })
    })
  }

  /// The conversion graph in Graphviz DOT, one `type:format` node per format.
  pub fn to_dot(&self) -> String {
    let mut out = String::from("digraph g {\n");
    for (data_type, from, to) in self.edges() {
      let _ = writeln!(out, "  \"{data_type}:{from}\" -> \"{data_type}:{to}\"");
    }
    out.push_str("}\n");
    out
  }

  /// The conversion graph as CSV with `from` and `to` columns.
  pub fn to_table(&self) -> String {
    let mut out = String::from("from,to\n");
    for (data_type, from, to) in self.edges() {
      let _ = writeln!(out, "{data_type}:{from},{data_type}:{to}");
    }
    out
  }
}

/// `*.json` files directly inside `dir`, sorted by file name.
async fn descriptor_files(dir: &Path) -> Result<Vec<PathBuf>, FormatError> {
  let unreadable =
    |e: std::io::Error| FormatError::plugin_load(dir, format!("failed to read plugin directory: {}", e));

  let mut entries = fs::read_dir(dir).await.map_err(unreadable)?;
  let mut files = Vec::new();

  while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
    let path = entry.path();
    if path.extension().is_none_or(|ext| ext != "json") {
      continue;
    }
    let file_type = entry.file_type().await.map_err(unreadable)?;
    if file_type.is_file() {
      files.push(path);
    }
  }

  files.sort();
  Ok(files)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn write_converter(dir: &Path, file: &str, data_type: &str, from: &str, to: &str) {
    let descriptor = json!({
      "name": file.trim_end_matches(".json"),
      "mode": "builtin",
      "script": "copy",
      "inputs": [{"name": "input", "type": data_type, "format": from}],
      "outputs": [{"name": "output", "type": data_type, "format": to}]
    });
    std::fs::write(dir.join(file), descriptor.to_string()).unwrap();
  }

  fn step_names(edge: &ConverterEdge) -> Vec<&str> {
    edge.steps().iter().map(|s| s.label()).collect()
  }

  fn chain(hops: &[(&str, &str)]) -> FormatRegistry {
    let mut registry = FormatRegistry::new();
    for (from, to) in hops {
      let spec = TaskSpec {
        name: Some(format!("{from}_to_{to}")),
        mode: "builtin".to_string(),
        script: Some("copy".to_string()),
        inputs: vec![ferry_config::PortSpec::new("input", "t", *from)],
        outputs: vec![ferry_config::PortSpec::new("output", "t", *to)],
        ..Default::default()
      };
      registry.insert(Descriptor::from_spec("mem.json", DescriptorKind::Converter, spec).unwrap());
    }
    registry
  }

  #[tokio::test]
  async fn test_load_converters_and_validators() {
    let dir = tempfile::tempdir().unwrap();
    write_converter(dir.path(), "csv_to_rows.json", "table", "csv", "rows");
    std::fs::write(
      dir.path().join("validate_rows.json"),
      json!({
        "mode": "builtin",
        "script": "is_rows",
        "inputs": [{"name": "input", "type": "table", "format": "rows"}],
        "outputs": [{"name": "output", "type": "boolean", "format": "boolean"}]
      })
      .to_string(),
    )
    .unwrap();
    std::fs::write(dir.path().join("README.md"), "not a plugin").unwrap();
    std::fs::create_dir(dir.path().join("archive.json")).unwrap();

    let registry = FormatRegistry::load(&[dir.path().to_path_buf()]).await.unwrap();

    assert_eq!(registry.converter_count(), 1);
    assert_eq!(registry.validator_count(), 1);
    assert!(registry.edge("table", "csv", "rows").is_some());
    assert_eq!(
      registry.validator("table", "rows").unwrap().script.as_deref(),
      Some("is_rows")
    );
    // Validators never become conversion edges.
    assert!(registry.edge("table", "rows", "boolean").is_none());
  }

  #[tokio::test]
  async fn test_later_descriptor_replaces_earlier() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    write_converter(first.path(), "a.json", "table", "csv", "rows");
    write_converter(first.path(), "b.json", "table", "csv", "rows");
    write_converter(second.path(), "c.json", "table", "csv", "json");
    write_converter(second.path(), "d.json", "table", "csv", "rows");

    let registry = FormatRegistry::load(&[first.path().to_path_buf(), second.path().to_path_buf()])
      .await
      .unwrap();

    let edge = registry.edge("table", "csv", "rows").unwrap();
    assert_eq!(step_names(edge), vec!["d"]);
    assert_eq!(registry.converter_count(), 2);
  }

  #[tokio::test]
  async fn test_script_uri_is_relative_to_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("convert.txt"), "csv_to_rows").unwrap();
    std::fs::write(
      dir.path().join("csv_to_rows.json"),
      json!({
        "mode": "builtin",
        "script_uri": "convert.txt",
        "inputs": [{"name": "input", "type": "table", "format": "csv"}],
        "outputs": [{"name": "output", "type": "table", "format": "rows"}]
      })
      .to_string(),
    )
    .unwrap();

    let registry = FormatRegistry::load(&[dir.path().to_path_buf()]).await.unwrap();
    let plan = registry.plan("table", "csv", "rows").unwrap();
    assert_eq!(plan.steps[0].script.as_deref(), Some("csv_to_rows"));
  }

  #[tokio::test]
  async fn test_malformed_descriptors_fail_to_load() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
    let err = FormatRegistry::load(&[dir.path().to_path_buf()]).await.unwrap_err();
    assert!(matches!(err, FormatError::PluginLoad { ref path, .. } if path.ends_with("broken.json")));

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join("no_script.json"),
      json!({
        "mode": "builtin",
        "inputs": [{"name": "input", "type": "table", "format": "csv"}],
        "outputs": [{"name": "output", "type": "table", "format": "rows"}]
      })
      .to_string(),
    )
    .unwrap();
    let err = FormatRegistry::load(&[dir.path().to_path_buf()]).await.unwrap_err();
    assert!(err.to_string().contains("script"));

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join("no_output_format.json"),
      json!({
        "mode": "builtin",
        "script": "copy",
        "inputs": [{"name": "input", "type": "table", "format": "csv"}],
        "outputs": [{"name": "output", "type": "table"}]
      })
      .to_string(),
    )
    .unwrap();
    assert!(FormatRegistry::load(&[dir.path().to_path_buf()]).await.is_err());
  }

  #[tokio::test]
  async fn test_missing_directory_fails_to_load() {
    let err = FormatRegistry::load(&[PathBuf::from("/nonexistent/ferry-plugins")])
      .await
      .unwrap_err();
    assert!(matches!(err, FormatError::PluginLoad { .. }));
  }

  #[test]
  fn test_closure_composes_chains() {
    let mut registry = chain(&[("a", "b"), ("b", "c"), ("c", "d")]);
    let added = registry.close(MAX_CONVERSION_HOPS);

    // a->c, b->d, a->d
    assert_eq!(added, 3);
    assert_eq!(
      step_names(registry.edge("t", "a", "c").unwrap()),
      vec!["a_to_b", "b_to_c"]
    );
    assert_eq!(
      step_names(registry.edge("t", "a", "d").unwrap()),
      vec!["a_to_b", "b_to_c", "c_to_d"]
    );
    assert!(registry.edge("t", "d", "a").is_none());
  }

  #[test]
  fn test_closure_never_adds_self_loops_or_replaces_edges() {
    let mut registry = chain(&[("a", "b"), ("b", "a"), ("a", "c"), ("b", "c")]);
    registry.close(MAX_CONVERSION_HOPS);

    assert!(registry.edge("t", "a", "a").is_none());
    assert!(registry.edge("t", "b", "b").is_none());
    assert_eq!(step_names(registry.edge("t", "a", "c").unwrap()), vec!["a_to_c"]);
  }

  #[test]
  fn test_closure_first_discovered_wins() {
    // a->d is reachable through b and through c; b sorts first.
    let mut registry = chain(&[("a", "c"), ("a", "b"), ("c", "d"), ("b", "d")]);
    registry.close(MAX_CONVERSION_HOPS);
    assert_eq!(
      step_names(registry.edge("t", "a", "d").unwrap()),
      vec!["a_to_b", "b_to_d"]
    );
  }

  #[test]
  fn test_closure_is_idempotent() {
    let mut registry = chain(&[("a", "b"), ("b", "c"), ("c", "d"), ("d", "e")]);
    registry.close(MAX_CONVERSION_HOPS);
    let closed = registry.clone();

    assert_eq!(registry.close(MAX_CONVERSION_HOPS), 0);
    assert_eq!(registry, closed);
  }

  #[test]
  fn test_closure_is_bounded_by_passes() {
    let mut registry = chain(&[("a", "b"), ("b", "c"), ("c", "d"), ("d", "e")]);
    registry.close(1);

    assert!(registry.edge("t", "a", "c").is_some());
    assert!(registry.edge("t", "a", "d").is_none());
    assert!(registry.edge("t", "a", "e").is_none());

    registry.close(1);
    assert_eq!(registry.edge("t", "a", "e").unwrap().steps().len(), 4);
  }

  #[test]
  fn test_plan() {
    let mut registry = chain(&[("csv", "rows"), ("rows", "json")]);
    registry.close(MAX_CONVERSION_HOPS);

    let identity = registry.plan("t", "csv", "csv").unwrap();
    assert!(identity.is_identity());

    let plan = registry.plan("t", "csv", "json").unwrap();
    assert_eq!(plan.steps.len(), 2);
    assert_eq!(plan.from, "csv");
    assert_eq!(plan.to, "json");

    let err = registry.plan("t", "json", "csv").unwrap_err();
    assert!(matches!(
      err,
      FormatError::NoConversionPath { ref data_type, ref from, ref to }
        if data_type == "t" && from == "json" && to == "csv"
    ));
    assert!(registry.plan("other", "csv", "json").is_err());
  }

  #[test]
  fn test_graph_exports() {
    let registry = chain(&[("csv", "rows"), ("rows", "csv")]);

    assert_eq!(
      registry.to_dot(),
      "digraph g {\n  \"t:csv\" -> \"t:rows\"\n  \"t:rows\" -> \"t:csv\"\n}\n"
    );
    assert_eq!(registry.to_table(), "from,to\nt:csv,t:rows\nt:rows,t:csv\n");
  }
}
