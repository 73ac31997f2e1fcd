use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The host's description of the table it wants rows for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRequest {
    pub table_id: String,
    /// Column used as a refresh watermark, if the table supports it.
    pub increment_column_id: Option<String>,
    /// Highest increment value seen in a previous refresh.
    pub increment_value: Option<Value>,
}

impl TableRequest {
    pub fn new(table_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            ..Default::default()
        }
    }

    pub fn incremental(
        table_id: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            table_id: table_id.into(),
            increment_column_id: Some(column.into()),
            increment_value: Some(value.into()),
        }
    }

    /// The watermark to filter on; empty values mean a full refresh.
    pub fn watermark(&self) -> Option<(&str, &Value)> {
        let column = self.increment_column_id.as_deref().filter(|c| !c.is_empty())?;
        let value = self.increment_value.as_ref().filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })?;
        Some((column, value))
    }
}
