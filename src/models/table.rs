use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

/// One flat row, keyed by column id.
pub type Record = serde_json::Map<String, Value>;

/// An ordered row collection that remembers which identities it holds.
#[derive(Debug, Clone, Default)]
pub struct Table {
    rows: Vec<Record>,
    keys: HashSet<String>,
}

impl Table {
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append `row` unless a row with the same key is already present.
    pub fn insert_unique(&mut self, key: String, row: Record) -> bool {
        if !self.keys.insert(key) {
            return false;
        }
        self.rows.push(row);
        true
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Append without an identity check.
    pub fn push(&mut self, row: Record) {
        self.rows.push(row);
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.keys.clear();
    }
}

/// Named tables produced by normalization.
///
/// A table is present once some normalization pass has produced it, even when
/// it ended up empty. Tables only grow: rows already stored are never removed
/// except by an explicit [`TableSet::reset`].
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: BTreeMap<String, Table>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn rows(&self, name: &str) -> Option<&[Record]> {
        self.tables.get(name).map(Table::rows)
    }

    /// The named table, created empty if missing.
    pub fn table_mut(&mut self, name: &str) -> &mut Table {
        self.tables.entry(name.to_string()).or_default()
    }

    /// The named table, emptied.
    pub fn reset(&mut self, name: &str) -> &mut Table {
        let table = self.table_mut(name);
        table.clear();
        table
    }

    pub fn insert_unique(&mut self, name: &str, key: String, row: Record) -> bool {
        self.table_mut(name).insert_unique(key, row)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Identity key for an `id`-like value. Null ids have no identity.
pub fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Identity key for a join row relating `parent` to `child`.
pub fn pair_key(parent: &Value, child: &Value) -> Option<String> {
    Some(format!("{}/{}", id_key(parent)?, id_key(child)?))
}
