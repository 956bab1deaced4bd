use std::sync::Arc;

use ferry_config::TaskSpec;

/// A directed conversion `from -> to` within one data type.
///
/// `steps` is never empty: a loaded converter contributes a single step and
/// composed edges concatenate the steps of their parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterEdge {
  steps: Vec<Arc<TaskSpec>>,
}

impl ConverterEdge {
  pub fn single(step: Arc<TaskSpec>) -> Self {
    Self { steps: vec![step] }
  }

  /// This edge followed by `next`.
  pub fn then(&self, next: &ConverterEdge) -> Self {
    let mut steps = self.steps.clone();
    steps.extend(next.steps.iter().cloned());
    Self { steps }
  }

  pub fn steps(&self) -> &[Arc<TaskSpec>] {
    &self.steps
  }
}

/// The ordered steps that take a value of `data_type` from one format to
/// another. An identity plan has no steps.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionPlan {
  pub data_type: String,
  pub from: String,
  pub to: String,
  pub steps: Vec<Arc<TaskSpec>>,
}

impl ConversionPlan {
  pub fn is_identity(&self) -> bool {
    self.steps.is_empty()
  }
}
