//! Loading parse configurations from disk.

use std::path::Path;

use anyhow::{Context, Result};
use omop_model::Metadata;
use tracing::warn;

/// Loads a metadata JSON file: an object of config name to field specs, in
/// the order the configs must run.
///
/// Structurally broken configs are reported here but left in place; the
/// pipeline skips them per document.
pub fn load_metadata(path: &Path) -> Result<Metadata> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read metadata file {}", path.display()))?;
    let metadata: Metadata = serde_json::from_str(&raw)
        .with_context(|| format!("parse metadata file {}", path.display()))?;
    for error in metadata.validate() {
        warn!(%error, "config will be skipped");
    }
    Ok(metadata)
}
