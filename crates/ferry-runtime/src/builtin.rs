//! In-process conversion steps and validators.
//!
//! A task with `mode = "builtin"` names one of these in its `script`. Each
//! builtin reads the task's first input and writes its first output.
//!
//! | Builtin       | Reads        | Writes               |
//! |---------------|--------------|----------------------|
//! | `copy`        | any          | the same value       |
//! | `csv_to_rows` | CSV text     | `{fields, rows}`     |
//! | `rows_to_csv` | `{fields, rows}` | CSV text         |
//! | `rows_to_json`| `{fields, rows}` | JSON text        |
//! | `json_to_rows`| JSON text    | `{fields, rows}`     |
//! | `is_json`     | any          | whether the text parses as JSON |
//! | `is_rows`     | any          | whether the value is a table |

use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use ferry_binding::Value;
use ferry_config::TaskSpec;
use ferry_tabular::{Table, csv_to_rows, rows_to_csv};

use crate::executor::{ExecutorError, ScriptExecutor, Values};

/// Mode handled by [`BuiltinExecutor`].
pub const BUILTIN_MODE: &str = "builtin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
  Copy,
  CsvToRows,
  RowsToCsv,
  RowsToJson,
  JsonToRows,
  IsJson,
  IsRows,
}

impl FromStr for Builtin {
  type Err = ExecutorError;

  fn from_str(name: &str) -> Result<Self, Self::Err> {
    match name.trim() {
      "copy" => Ok(Builtin::Copy),
      "csv_to_rows" => Ok(Builtin::CsvToRows),
      "rows_to_csv" => Ok(Builtin::RowsToCsv),
      "rows_to_json" => Ok(Builtin::RowsToJson),
      "json_to_rows" => Ok(Builtin::JsonToRows),
      "is_json" => Ok(Builtin::IsJson),
      "is_rows" => Ok(Builtin::IsRows),
      other => Err(ExecutorError::UnknownBuiltin {
        name: other.to_string(),
      }),
    }
  }
}

impl Builtin {
  pub async fn apply(self, port: &str, value: Value) -> Result<Value, ExecutorError> {
    let invalid = |message: String| ExecutorError::InvalidValue {
      port: port.to_string(),
      message,
    };

    match self {
      Builtin::Copy => Ok(value),
      Builtin::CsvToRows => {
        let text = text(port, &value).await?;
        let table = csv_to_rows(&text).map_err(|e| invalid(e.to_string()))?;
        Ok(Value::Json(table.to_value()))
      }
      Builtin::RowsToCsv => {
        let table = table(port, value).await?;
        let csv = rows_to_csv(&table).map_err(|e| invalid(e.to_string()))?;
        Ok(Value::Bytes(Bytes::from(csv)))
      }
      Builtin::RowsToJson => {
        let table = table(port, value).await?;
        Ok(Value::Bytes(Bytes::from(table.to_value().to_string())))
      }
      Builtin::JsonToRows => {
        let table = table(port, value).await?;
        Ok(Value::Json(table.to_value()))
      }
      Builtin::IsJson => {
        let data = bytes(port, &value).await?;
        let valid = serde_json::from_slice::<serde_json::Value>(&data).is_ok();
        Ok(Value::Json(serde_json::Value::Bool(valid)))
      }
      Builtin::IsRows => Ok(Value::Json(serde_json::Value::Bool(
        table(port, value).await.is_ok(),
      ))),
    }
  }
}

/// Runs `mode = "builtin"` tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinExecutor;

#[async_trait]
impl ScriptExecutor for BuiltinExecutor {
  async fn execute(&self, task: &TaskSpec, mut inputs: Values) -> Result<Values, ExecutorError> {
    if task.mode != BUILTIN_MODE {
      return Err(ExecutorError::UnsupportedMode {
        mode: task.mode.clone(),
      });
    }

    let builtin: Builtin = task.script.as_deref().unwrap_or_default().parse()?;

    let (Some(input), Some(output)) = (task.inputs.first(), task.outputs.first()) else {
      return Err(ExecutorError::Failed {
        message: "builtins need one input and one output".to_string(),
      });
    };

    let value = inputs
      .remove(&input.name)
      .ok_or_else(|| ExecutorError::MissingValue {
        port: input.name.clone(),
      })?;

    let result = builtin.apply(&input.name, value).await?;
    Ok(Values::from([(output.name.clone(), result)]))
  }
}

async fn bytes(port: &str, value: &Value) -> Result<Bytes, ExecutorError> {
  value.to_bytes().await.map_err(|e| ExecutorError::InvalidValue {
    port: port.to_string(),
    message: e.to_string(),
  })
}

async fn text(port: &str, value: &Value) -> Result<String, ExecutorError> {
  let data = bytes(port, value).await?;
  String::from_utf8(data.to_vec()).map_err(|e| ExecutorError::InvalidValue {
    port: port.to_string(),
    message: e.to_string(),
  })
}

/// A table from a structured value, or from JSON text.
async fn table(port: &str, value: Value) -> Result<Table, ExecutorError> {
  let json = match value {
    Value::Json(json) if !json.is_string() => json,
    other => {
      let data = bytes(port, &other).await?;
      serde_json::from_slice(&data).map_err(|e| ExecutorError::InvalidValue {
        port: port.to_string(),
        message: e.to_string(),
      })?
    }
  };
  Table::from_value(json).map_err(|e| ExecutorError::InvalidValue {
    port: port.to_string(),
    message: e.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use ferry_config::PortSpec;
  use serde_json::json;

  use super::*;

  fn step(script: &str) -> TaskSpec {
    TaskSpec {
      mode: BUILTIN_MODE.to_string(),
      script: Some(script.to_string()),
      inputs: vec![PortSpec::new("input", "table", "csv")],
      outputs: vec![PortSpec::new("output", "table", "rows")],
      ..Default::default()
    }
  }

  async fn run(script: &str, value: Value) -> Result<Value, ExecutorError> {
    let mut outputs = BuiltinExecutor
      .execute(&step(script), Values::from([("input".to_string(), value)]))
      .await?;
    Ok(outputs.remove("output").unwrap())
  }

  #[tokio::test]
  async fn test_csv_round_trip() {
    let rows = run("csv_to_rows", Value::Bytes(Bytes::from_static(b"a,b\n1,2\n")))
      .await
      .unwrap();
    assert_eq!(
      rows,
      Value::Json(json!({"fields": ["a", "b"], "rows": [{"a": 1, "b": 2}]}))
    );

    let csv = run("rows_to_csv", rows).await.unwrap();
    assert_eq!(csv, Value::Bytes(Bytes::from_static(b"a,b\n1,2\n")));
  }

  #[tokio::test]
  async fn test_json_text_and_rows() {
    let text = run(
      "rows_to_json",
      Value::Json(json!({"fields": ["a"], "rows": [{"a": 1}]})),
    )
    .await
    .unwrap();
    let Value::Bytes(data) = &text else {
      panic!("expected bytes, got {:?}", text);
    };
    let parsed: serde_json::Value = serde_json::from_slice(data).unwrap();
    assert_eq!(parsed, json!({"fields": ["a"], "rows": [{"a": 1}]}));

    let rows = run("json_to_rows", text).await.unwrap();
    assert!(matches!(rows, Value::Json(_)));
  }

  #[tokio::test]
  async fn test_validators() {
    let yes = Value::Json(json!(true));
    let no = Value::Json(json!(false));

    assert_eq!(run("is_json", Value::Bytes(Bytes::from_static(b"[1]"))).await.unwrap(), yes);
    assert_eq!(run("is_json", Value::Bytes(Bytes::from_static(b"nope"))).await.unwrap(), no);
    assert_eq!(
      run("is_rows", Value::Json(json!({"fields": [], "rows": []}))).await.unwrap(),
      yes
    );
    assert_eq!(run("is_rows", Value::Json(json!([1, 2]))).await.unwrap(), no);
  }

  #[tokio::test]
  async fn test_rejections() {
    let err = run("frobnicate", Value::Json(json!(1))).await.unwrap_err();
    assert!(matches!(err, ExecutorError::UnknownBuiltin { .. }));

    let err = run("rows_to_csv", Value::Bytes(Bytes::from_static(b"not json")))
      .await
      .unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidValue { ref port, .. } if port == "input"));

    let mut task = step("copy");
    task.mode = "python".to_string();
    let err = BuiltinExecutor.execute(&task, Values::new()).await.unwrap_err();
    assert!(matches!(err, ExecutorError::UnsupportedMode { .. }));

    let err = BuiltinExecutor.execute(&step("copy"), Values::new()).await.unwrap_err();
    assert!(matches!(err, ExecutorError::MissingValue { .. }));
  }

  #[test]
  fn test_script_names_are_trimmed() {
    assert_eq!("csv_to_rows\n".parse::<Builtin>().unwrap(), Builtin::CsvToRows);
  }
}
