use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{ColumnHeader, Record};

/// Receiver of the headers and rows produced for a requested table.
pub trait TableSink {
    fn register_headers(&mut self, table_id: &str, headers: Vec<ColumnHeader>);
    fn register_rows(&mut self, table_id: &str, rows: Vec<Record>);
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BufferedTable {
    pub headers: Vec<ColumnHeader>,
    pub rows: Vec<Record>,
}

/// In-memory sink collecting everything it is handed, keyed by table.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RowBuffer {
    tables: BTreeMap<String, BufferedTable>,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, table_id: &str) -> Option<&BufferedTable> {
        self.tables.get(table_id)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &BufferedTable)> {
        self.tables.iter().map(|(name, table)| (name.as_str(), table))
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(|t| t.rows.len()).sum()
    }
}

impl TableSink for RowBuffer {
    fn register_headers(&mut self, table_id: &str, headers: Vec<ColumnHeader>) {
        self.tables.entry(table_id.to_string()).or_default().headers = headers;
    }

    fn register_rows(&mut self, table_id: &str, rows: Vec<Record>) {
        self.tables
            .entry(table_id.to_string())
            .or_default()
            .rows
            .extend(rows);
    }
}
