//! Output records.
//!
//! An `OutputRecord` is one row for one output table: an insertion-ordered
//! list of field name → value pairs. Field counts are small (tens), so
//! by-name access is a linear scan; what matters is that iteration order is
//! the order fields were written, which the engine's ordering/pruning step
//! relies on to emit fields sorted by their declared `order`.

use std::collections::BTreeSet;

use crate::value::Value;

/// Per-config set of field names whose resolution failed. Diagnostic only;
/// a populated set never rejects a row.
pub type ErrorFieldSet = BTreeSet<String>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRecord {
    fields: Vec<(String, Value)>,
}

impl OutputRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Sets a field, replacing in place when it already exists (keeping its
    /// position) and appending otherwise.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self
            .fields
            .iter_mut()
            .find(|(field, _)| *field == name)
        {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(field, _)| field == name)?;
        Some(self.fields.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Exact-match identity key: every field rendered kind-tagged, sorted by
    /// field name so two records with the same content in different insertion
    /// order compare equal.
    pub fn dedupe_key(&self) -> String {
        let mut parts: Vec<String> = self
            .fields
            .iter()
            .map(|(name, value)| format!("{name}={}", value.key_repr()))
            .collect();
        parts.sort();
        parts.join("|")
    }
}

impl FromIterator<(String, Value)> for OutputRecord {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut record = Self::new();
        for (name, value) in iter {
            record.set(name, value);
        }
        record
    }
}

/// Deduplicates rows by exact field-set equality, keeping first-seen order.
/// Idempotent: reapplying to its own output is a no-op.
pub fn dedupe_records(rows: Vec<OutputRecord>) -> Vec<OutputRecord> {
    let mut seen = BTreeSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.dedupe_key()))
        .collect()
}
