//! Result types shared between command execution and summary rendering.

use std::collections::BTreeSet;

use indexmap::IndexMap;

/// Row and diagnostic tallies for one output table, across all documents.
#[derive(Debug, Default)]
pub struct TableTally {
    pub rows: usize,
    /// Field names that failed to resolve in at least one document.
    pub error_fields: BTreeSet<String>,
}

/// Outcome of a `convert` run.
#[derive(Debug, Default)]
pub struct ConvertResult {
    pub documents: usize,
    /// Files that could not be read or parsed at all.
    pub failed: Vec<String>,
    /// Per-table tallies, in config evaluation order.
    pub tables: IndexMap<String, TableTally>,
}

impl ConvertResult {
    pub fn has_errors(&self) -> bool {
        !self.failed.is_empty()
    }
}
