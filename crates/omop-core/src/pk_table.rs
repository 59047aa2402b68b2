//! Per-document primary-key carry-over.
//!
//! Every PK-like value produced while resolving one document is appended
//! here under its field name. Later configs pick these up through their FK
//! fields. The table is scoped to a single document; a fresh one is built
//! for each input file.

use std::collections::BTreeMap;

use omop_model::Value;

#[derive(Debug, Default)]
pub struct PkTable {
    entries: BTreeMap<String, Vec<Value>>,
}

impl PkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a key value under a field name. Values are kept in arrival
    /// order, duplicates and all; resolution cardinality is judged later.
    pub fn append(&mut self, name: &str, value: Value) {
        self.entries.entry(name.to_string()).or_default().push(value);
    }

    /// Records a key value only if an equal value is not already present.
    /// Derived keys recompute identically across repeated elements, and each
    /// distinct key must count once toward FK cardinality.
    pub fn append_unique(&mut self, name: &str, value: Value) {
        let values = self.entries.entry(name.to_string()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    pub fn values(&self, name: &str) -> &[Value] {
        self.entries.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
