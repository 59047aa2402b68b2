//! Declarative per-table parse configurations.
//!
//! A `Metadata` holds one `ConfigSpec` per output table, in the order the
//! tables must be evaluated (header tables such as Person and Visit before
//! the clinical tables that consume their primary keys). Each config is an
//! ordered mapping of field name to `FieldSpec`, with one mandatory `root`
//! entry naming the document path that scopes a single output row.
//!
//! All of these types are read-only inputs: they are loaded once per run
//! (typically from JSON) and never mutated afterwards.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// How a field obtains its value. Mirrors the `config_type` attribute of the
/// parse configurations; fields with no declared type resolve to `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldKind {
    #[default]
    None,
    Constant,
    Filename,
    Field,
    Pk,
    Fk,
    Derived,
    Derived2,
    Hash,
    Priority,
    Root,
}

/// Optional coercion applied to a document-sourced field value.
///
/// `Other` absorbs unrecognized names so a typo in a config is a logged
/// engine configuration error with raw pass-through, not a load failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Date,
    DateTime,
    Long,
    Integer,
    BigIntHash,
    Text,
    Float,
    #[serde(other)]
    Other,
}

/// A priority-chain membership: this field feeds the value of `target`,
/// competing at the given `rank` (lowest rank wins among non-null values).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrioritySpec {
    pub target: String,
    pub rank: i32,
}

/// One declared field of a parse configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSpec {
    pub config_type: FieldKind,
    /// Document path scoping the field (or, on the `root` entry, the row).
    pub element: Option<String>,
    /// Attribute to read from the matched element; `#text` selects the
    /// element's concatenated text content.
    pub attribute: Option<String>,
    pub data_type: Option<DataType>,
    pub constant_value: Option<String>,
    /// Registered function name, for `Derived` and `Derived2` fields.
    pub function: Option<String>,
    /// Argument name → source field name, for `Derived` fields. The special
    /// argument name `default` passes its value through as a literal.
    pub argument_names: IndexMap<String, String>,
    /// Source field name list, for `Derived2` functions that mine the whole
    /// in-progress record.
    pub argument_list: Vec<String>,
    /// Source field names, for `Hash` fields.
    pub fields: Vec<String>,
    pub priority: Option<PrioritySpec>,
    /// Output position. Fields without an `order` are internal-only and are
    /// dropped from the final record.
    pub order: Option<u32>,
    /// Fallback for a priority target when every chain member is null.
    pub default: Option<String>,
    /// On the `root` entry: the domain this config's rows are expected to
    /// land in, compared against the computed `domain_id` for routing.
    pub expected_domain_id: Option<String>,
}

/// An ordered mapping of field name → `FieldSpec` for one output table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSpec {
    pub fields: IndexMap<String, FieldSpec>,
}

pub const ROOT_KEY: &str = "root";

impl ConfigSpec {
    pub fn root(&self) -> Option<&FieldSpec> {
        self.fields.get(ROOT_KEY)
    }

    pub fn root_element(&self) -> Option<&str> {
        self.root().and_then(|spec| spec.element.as_deref())
    }

    pub fn expected_domain_id(&self) -> Option<&str> {
        self.root().and_then(|spec| spec.expected_domain_id.as_deref())
    }

    /// Field entries excluding the `root` pseudo-field.
    pub fn data_fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields
            .iter()
            .filter(|(name, _)| name.as_str() != ROOT_KEY)
            .map(|(name, spec)| (name.as_str(), spec))
    }

    /// Structural validation: a config without a root path cannot scope rows
    /// and must be skipped before any row is attempted.
    pub fn validate(&self, name: &str) -> Result<(), ModelError> {
        let Some(root) = self.root() else {
            return Err(ModelError::MissingRoot(name.to_string()));
        };
        if root.element.as_deref().is_none_or(str::is_empty) {
            return Err(ModelError::MissingRootElement(name.to_string()));
        }
        Ok(())
    }
}

/// The full set of parse configurations for a run, in evaluation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    pub configs: IndexMap<String, ConfigSpec>,
}

impl Metadata {
    pub fn get(&self, name: &str) -> Option<&ConfigSpec> {
        self.configs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigSpec)> {
        self.configs.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Structural validation of every config. Returns one error per broken
    /// config; callers log these and skip the named configs rather than
    /// aborting the run.
    pub fn validate(&self) -> Vec<ModelError> {
        self.configs
            .iter()
            .filter_map(|(name, config)| config.validate(name).err())
            .collect()
    }
}
