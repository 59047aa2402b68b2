//! Whole-document processing.
//!
//! Runs every parse configuration over one document in declaration order,
//! sharing a single [`PkTable`] so later configs can pick up keys earlier
//! configs produced, then applies visit reconciliation to the collected
//! tables.

use indexmap::IndexMap;
use omop_model::{ErrorFieldSet, Metadata, OutputRecord};
use tracing::{error, info};

use crate::document::DocumentQuery;
use crate::engine::run_config;
use crate::functions::FunctionRegistry;
use crate::pk_table::PkTable;
use crate::visit;

/// Everything one document produced: one row list per config name, in
/// config declaration order, plus per-config resolution diagnostics.
#[derive(Debug, Default)]
pub struct DocumentOutput {
    tables: IndexMap<String, Vec<OutputRecord>>,
    error_fields: IndexMap<String, ErrorFieldSet>,
}

impl DocumentOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> &[OutputRecord] {
        self.tables.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Vec<OutputRecord>> {
        self.tables.get_mut(name)
    }

    /// Removes a table and returns its rows. Table order shifts; callers
    /// re-insert replacements under their final names.
    pub fn take_table(&mut self, name: &str) -> Vec<OutputRecord> {
        self.tables.shift_remove(name).unwrap_or_default()
    }

    pub fn set_table(&mut self, name: &str, rows: Vec<OutputRecord>) {
        self.tables.insert(name.to_string(), rows);
    }

    /// Appends rows under a name, creating the table if needed. An empty
    /// append still creates the table so every config shows up downstream.
    pub fn append(&mut self, name: &str, rows: Vec<OutputRecord>) {
        self.tables.entry(name.to_string()).or_default().extend(rows);
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &[OutputRecord])> {
        self.tables.iter().map(|(name, rows)| (name.as_str(), rows.as_slice()))
    }

    pub fn record_errors(&mut self, config: &str, fields: ErrorFieldSet) {
        if !fields.is_empty() {
            self.error_fields.entry(config.to_string()).or_default().extend(fields);
        }
    }

    pub fn error_fields(&self) -> impl Iterator<Item = (&str, &ErrorFieldSet)> {
        self.error_fields.iter().map(|(name, fields)| (name.as_str(), fields))
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

/// Converts one parsed document into its per-table rows.
///
/// Configs that fail structural validation are logged and skipped; nothing
/// short of an unreadable document aborts processing.
pub fn process_document(
    doc: &dyn DocumentQuery,
    filename: &str,
    metadata: &Metadata,
    functions: &FunctionRegistry,
) -> DocumentOutput {
    let mut output = DocumentOutput::new();
    let mut pk = PkTable::new();
    for (name, config) in metadata.iter() {
        if let Err(validation) = config.validate(name) {
            error!(config = name, error = %validation, "skipping invalid config");
            continue;
        }
        let result = run_config(doc, name, config, filename, &mut pk, functions);
        output.record_errors(name, result.error_fields);
        output.append(name, result.rows);
    }
    visit::reclassify_nested_visits(&mut output);
    visit::link_events_to_visits(&mut output, metadata);
    visit::link_events_to_visit_details(&mut output, metadata);
    info!(filename, rows = output.total_rows(), "document processed");
    output
}
