//! Conversion between CSV text and tables of row mappings.

use csv::{StringRecord, WriterBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::TabularError;
use crate::sniff::{SNIFF_SAMPLE_CHARS, has_header, read_records, sniff_delimiter};

/// Rows keyed by field name, with the field order kept separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
  pub fields: Vec<String>,
  pub rows: Vec<Map<String, Value>>,
}

impl Table {
  /// Interpret a structured value of shape `{"fields": [...], "rows": [...]}`.
  pub fn from_value(value: Value) -> Result<Self, TabularError> {
    serde_json::from_value(value).map_err(TabularError::NotATable)
  }

  pub fn to_value(&self) -> Value {
    let rows = self.rows.iter().cloned().map(Value::Object).collect();
    let fields = self.fields.iter().cloned().map(Value::String).collect();
    let mut object = Map::new();
    object.insert("fields".to_string(), Value::Array(fields));
    object.insert("rows".to_string(), Value::Array(rows));
    Value::Object(object)
  }
}

/// Parse CSV text into a [`Table`].
///
/// The delimiter and the presence of a header are sniffed from the first
/// [`SNIFF_SAMPLE_CHARS`] characters. With a header, rows are keyed by the
/// header fields and rows of a different width are dropped. Without one,
/// every cell of a row is keyed `Column 1`, `Column 2`, ... and the field list
/// follows the width of the first row. Cells that parse as integers or finite
/// floats become numbers; everything else stays a string.
pub fn csv_to_rows(text: &str) -> Result<Table, TabularError> {
  let head: String = text.chars().take(SNIFF_SAMPLE_CHARS).collect();
  let sample = head.lines().collect::<Vec<_>>().join("\n");

  let header = has_header(&sample)?;
  let delimiter = sniff_delimiter(&sample);
  let mut records = read_records(text, delimiter)?.into_iter();

  if header {
    let Some(first) = records.next() else {
      return Ok(Table::default());
    };
    let fields: Vec<String> = first.iter().map(str::to_string).collect();
    let rows = records
      .filter(|record| record.len() == fields.len())
      .map(|record| to_row(&fields, &record))
      .collect();
    return Ok(Table { fields, rows });
  }

  let records: Vec<StringRecord> = records.collect();
  let fields = records
    .first()
    .map(|first| (1..=first.len()).map(column_name).collect())
    .unwrap_or_default();
  let rows = records
    .iter()
    .map(|record| {
      let names: Vec<String> = (1..=record.len()).map(column_name).collect();
      to_row(&names, record)
    })
    .collect();

  Ok(Table { fields, rows })
}

/// Write a [`Table`] as comma-separated CSV with a header row.
///
/// Cells missing from a row are written empty; strings are written as-is and
/// other values in their JSON form.
pub fn rows_to_csv(table: &Table) -> Result<String, TabularError> {
  let mut writer = WriterBuilder::new().from_writer(Vec::new());
  writer.write_record(&table.fields)?;

  for row in &table.rows {
    let cells = table.fields.iter().map(|field| match row.get(field) {
      None | Some(Value::Null) => String::new(),
      Some(Value::String(s)) => s.clone(),
      Some(other) => other.to_string(),
    });
    writer.write_record(cells)?;
  }

  let bytes = writer.into_inner().map_err(|e| TabularError::Encode {
    message: e.to_string(),
  })?;
  String::from_utf8(bytes).map_err(|e| TabularError::Encode {
    message: e.to_string(),
  })
}

fn column_name(index: usize) -> String {
  format!("Column {}", index)
}

fn to_row(fields: &[String], record: &StringRecord) -> Map<String, Value> {
  fields
    .iter()
    .zip(record.iter())
    .map(|(field, cell)| (field.clone(), coerce(cell)))
    .collect()
}

fn coerce(cell: &str) -> Value {
  let trimmed = cell.trim();
  if let Ok(int) = trimmed.parse::<i64>() {
    return Value::Number(int.into());
  }
  if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
    return Value::Number(number);
  }
  Value::String(cell.to_string())
}
