//! Registry of derivation functions.
//!
//! `Derived` fields call a function over a named argument map assembled
//! from earlier fields; `Derived2` fields call a function over the whole
//! in-progress record. Functions are registered by name at startup and
//! every name referenced by the loaded configurations is checked before
//! any document is processed, so a typo fails the run up front instead of
//! nulling a column silently.

use std::collections::BTreeMap;
use std::sync::Arc;

use omop_model::{FieldKind, FieldSpec, Metadata, ModelError, OutputRecord, Value};

/// Named arguments for a `Derived` function, in config-declared order of
/// no significance; lookups are by name.
pub type ArgMap = BTreeMap<String, Value>;

pub type DerivedFn = Arc<dyn Fn(&ArgMap) -> anyhow::Result<Value> + Send + Sync>;
pub type RecordFn = Arc<dyn Fn(&FieldSpec, &OutputRecord) -> anyhow::Result<Value> + Send + Sync>;

#[derive(Default, Clone)]
pub struct FunctionRegistry {
    derived: BTreeMap<String, DerivedFn>,
    record: BTreeMap<String, RecordFn>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in functions the stock
    /// configurations reference.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_derived("default_value", |args| {
            Ok(args.get("default").cloned().unwrap_or(Value::Null))
        });
        registry.register_record("concat_field_list", |spec, record| {
            // hash_repr, not Display: these strings usually seed surrogate
            // keys, which must match the SQL-side stringification.
            let parts: Vec<String> = spec
                .argument_list
                .iter()
                .filter_map(|name| record.get(name))
                .map(Value::hash_repr)
                .collect();
            Ok(Value::Text(parts.join("|")))
        });
        registry
    }

    pub fn register_derived<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&ArgMap) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.derived.insert(name.to_string(), Arc::new(function));
    }

    pub fn register_record<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&FieldSpec, &OutputRecord) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.record.insert(name.to_string(), Arc::new(function));
    }

    pub fn derived(&self, name: &str) -> Option<&DerivedFn> {
        self.derived.get(name)
    }

    pub fn record_fn(&self, name: &str) -> Option<&RecordFn> {
        self.record.get(name)
    }

    /// Checks that every function referenced by `Derived`/`Derived2` fields
    /// is registered. Returns one error per broken reference.
    pub fn validate_metadata(&self, metadata: &Metadata) -> Vec<ModelError> {
        let mut errors = Vec::new();
        for (config_name, config) in metadata.iter() {
            for (field_name, spec) in config.data_fields() {
                let known = match spec.config_type {
                    FieldKind::Derived => {
                        spec.function.as_deref().is_some_and(|f| self.derived.contains_key(f))
                    }
                    FieldKind::Derived2 => {
                        spec.function.as_deref().is_some_and(|f| self.record.contains_key(f))
                    }
                    _ => continue,
                };
                if !known {
                    errors.push(ModelError::UnknownFunction {
                        config: config_name.to_string(),
                        field: field_name.to_string(),
                        function: spec.function.clone().unwrap_or_else(|| "<unset>".to_string()),
                    });
                }
            }
        }
        errors
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("derived", &self.derived.keys().collect::<Vec<_>>())
            .field("record", &self.record.keys().collect::<Vec<_>>())
            .finish()
    }
}
