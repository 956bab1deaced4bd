//! Tabular conversion errors.

#[derive(Debug, thiserror::Error)]
pub enum TabularError {
  /// The input could not be read as CSV.
  #[error("malformed csv: {0}")]
  Csv(#[from] csv::Error),

  /// A table could not be written as CSV.
  #[error("failed to encode csv: {message}")]
  Encode { message: String },

  /// A structured value does not have the `{fields, rows}` table shape.
  #[error("value is not a table: {0}")]
  NotATable(#[source] serde_json::Error),
}
