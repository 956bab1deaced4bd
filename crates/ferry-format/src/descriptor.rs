//! Plugin descriptor loading and validation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ferry_config::TaskSpec;
use tokio::fs;

use crate::error::FormatError;

/// Filename prefix that marks a descriptor as a validator.
pub const VALIDATOR_PREFIX: &str = "validate_";

const BOOLEAN: &str = "boolean";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
  Converter,
  Validator,
}

impl DescriptorKind {
  /// Classify a descriptor by its file name.
  pub fn from_path(path: &Path) -> Self {
    let is_validator = path
      .file_name()
      .and_then(|n| n.to_str())
      .is_some_and(|n| n.starts_with(VALIDATOR_PREFIX));
    if is_validator {
      DescriptorKind::Validator
    } else {
      DescriptorKind::Converter
    }
  }
}

/// A checked converter or validator plugin.
///
/// For a converter, `input_format -> output_format` is the edge it
/// contributes. For a validator, `input_format` is the format it checks and
/// `output_format` is always `boolean`.
#[derive(Debug, Clone)]
pub struct Descriptor {
  pub path: PathBuf,
  pub kind: DescriptorKind,
  pub data_type: String,
  pub input_format: String,
  pub output_format: String,
  pub spec: Arc<TaskSpec>,
}

impl Descriptor {
  /// Read and check the descriptor at `path`.
  ///
  /// A descriptor without an inline `script` must name a `script_uri`; that
  /// file is read relative to the descriptor's own directory and becomes the
  /// script.
  pub async fn load(path: &Path) -> Result<Self, FormatError> {
    let content = fs::read_to_string(path)
      .await
      .map_err(|e| FormatError::plugin_load(path, format!("failed to read descriptor: {}", e)))?;

    let mut spec: TaskSpec = serde_json::from_str(&content)
      .map_err(|e| FormatError::plugin_load(path, format!("invalid descriptor: {}", e)))?;

    if spec.script.is_none() {
      let Some(uri) = spec.script_uri.as_deref() else {
        return Err(FormatError::plugin_load(
          path,
          "descriptor has neither script nor script_uri",
        ));
      };
      let script_path = path.parent().unwrap_or(Path::new(".")).join(uri);
      let script = fs::read_to_string(&script_path).await.map_err(|e| {
        FormatError::plugin_load(
          path,
          format!("failed to read script '{}': {}", script_path.display(), e),
        )
      })?;
      spec.script = Some(script);
    }

    Self::from_spec(path, DescriptorKind::from_path(path), spec)
  }

  /// Check a task spec against the shape required for `kind`.
  pub fn from_spec(
    path: impl Into<PathBuf>,
    kind: DescriptorKind,
    spec: TaskSpec,
  ) -> Result<Self, FormatError> {
    let path = path.into();
    let invalid = |message: &str| FormatError::plugin_load(path.clone(), message);

    let (input, output) = match (spec.inputs.as_slice(), spec.outputs.as_slice()) {
      ([input], [output]) => (input, output),
      _ => return Err(invalid("plugins declare exactly one input and one output")),
    };

    let data_type = input
      .data_type
      .clone()
      .ok_or_else(|| invalid("inputs[0].type is missing"))?;
    let input_format = input
      .format
      .clone()
      .ok_or_else(|| invalid("inputs[0].format is missing"))?;
    let output_format = output
      .format
      .clone()
      .ok_or_else(|| invalid("outputs[0].format is missing"))?;

    match kind {
      DescriptorKind::Validator => {
        if output.data_type.as_deref() != Some(BOOLEAN) || output_format != BOOLEAN {
          return Err(invalid("validator output must have type and format 'boolean'"));
        }
      }
      DescriptorKind::Converter => {
        if output.data_type.as_ref().is_some_and(|t| *t != data_type) {
          return Err(invalid("converter input and output types differ"));
        }
        if output_format == input_format {
          return Err(invalid("converter input and output formats are equal"));
        }
      }
    }

    Ok(Self {
      path,
      kind,
      data_type,
      input_format,
      output_format,
      spec: Arc::new(spec),
    })
  }
}

#[cfg(test)]
mod tests {
  use ferry_config::PortSpec;

  use super::*;

  fn converter(from: &str, to: &str) -> TaskSpec {
    TaskSpec {
      mode: "builtin".to_string(),
      script: Some("copy".to_string()),
      inputs: vec![PortSpec::new("input", "table", from)],
      outputs: vec![PortSpec::new("output", "table", to)],
      ..Default::default()
    }
  }

  #[test]
  fn test_classify_by_file_name() {
    assert_eq!(
      DescriptorKind::from_path(Path::new("/plugins/validate_csv.json")),
      DescriptorKind::Validator
    );
    assert_eq!(
      DescriptorKind::from_path(Path::new("/plugins/csv_to_rows.json")),
      DescriptorKind::Converter
    );
    // Only the file name counts, not the directory.
    assert_eq!(
      DescriptorKind::from_path(Path::new("/validate_dir/csv.json")),
      DescriptorKind::Converter
    );
  }

  #[test]
  fn test_converter_shape() {
    let d = Descriptor::from_spec("c.json", DescriptorKind::Converter, converter("csv", "rows"))
      .unwrap();
    assert_eq!(d.data_type, "table");
    assert_eq!(d.input_format, "csv");
    assert_eq!(d.output_format, "rows");
  }

  #[test]
  fn test_converter_rejects_same_format() {
    let err = Descriptor::from_spec("c.json", DescriptorKind::Converter, converter("csv", "csv"))
      .unwrap_err();
    assert!(matches!(err, FormatError::PluginLoad { .. }));
  }

  #[test]
  fn test_converter_rejects_type_change() {
    let mut spec = converter("csv", "rows");
    spec.outputs[0].data_type = Some("tree".to_string());
    assert!(Descriptor::from_spec("c.json", DescriptorKind::Converter, spec).is_err());
  }

  #[test]
  fn test_converter_requires_formats() {
    let mut spec = converter("csv", "rows");
    spec.inputs[0].format = None;
    let err = Descriptor::from_spec("c.json", DescriptorKind::Converter, spec).unwrap_err();
    assert!(err.to_string().contains("inputs[0].format"));

    let mut spec = converter("csv", "rows");
    spec.outputs.push(PortSpec::new("extra", "table", "json"));
    assert!(Descriptor::from_spec("c.json", DescriptorKind::Converter, spec).is_err());
  }

  #[test]
  fn test_validator_requires_boolean_output() {
    let mut spec = converter("csv", "boolean");
    assert!(Descriptor::from_spec("v.json", DescriptorKind::Validator, spec.clone()).is_err());

    spec.outputs[0].data_type = Some("boolean".to_string());
    let d = Descriptor::from_spec("v.json", DescriptorKind::Validator, spec).unwrap();
    assert_eq!(d.input_format, "csv");
  }
}
