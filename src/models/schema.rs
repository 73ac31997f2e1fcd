use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::table::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Date,
    Datetime,
    Float,
    Int,
    String,
    Geometry,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnType::Bool => "bool",
            ColumnType::Date => "date",
            ColumnType::Datetime => "datetime",
            ColumnType::Float => "float",
            ColumnType::Int => "int",
            ColumnType::String => "string",
            ColumnType::Geometry => "geometry",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub data_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment_column_id: Option<String>,
}

impl TableDescriptor {
    pub fn headers(&self) -> Vec<ColumnHeader> {
        self.columns
            .iter()
            .map(|c| ColumnHeader {
                name: c.id.clone(),
                data_type: c.data_type,
            })
            .collect()
    }

    /// Reduce `row` to exactly this table's columns.
    ///
    /// Missing columns become null; nested values are rendered as JSON text.
    pub fn project(&self, row: &Record) -> Record {
        self.columns
            .iter()
            .map(|column| {
                let value = match row.get(&column.id) {
                    None => Value::Null,
                    Some(v @ (Value::Object(_) | Value::Array(_))) => Value::String(v.to_string()),
                    Some(v) => v.clone(),
                };
                (column.id.clone(), value)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTable {
    pub id: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinColumn {
    pub table_alias: String,
    pub column_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Join {
    pub left: JoinColumn,
    pub right: JoinColumn,
    pub join_type: JoinType,
}

/// How the tables of one data type relate, for the host's join planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinDescriptor {
    pub alias: String,
    pub tables: Vec<JoinTable>,
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<TableDescriptor>,
    pub joins: Vec<JoinDescriptor>,
}

impl Schema {
    pub fn table(&self, id: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.id == id)
    }

    pub fn table_ids(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.id.as_str())
    }
}
