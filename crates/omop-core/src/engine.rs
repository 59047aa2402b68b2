//! The multi-phase field-resolution engine.
//!
//! One output row is produced per match of a config's root path. The row is
//! filled in by a fixed sequence of phases, each responsible for one
//! `config_type`; the order is load-bearing, since later phases consume
//! values earlier phases wrote (priority chains read document fields,
//! hash fields read priority winners, and so on).
//!
//! Failures never abort a row. A field that cannot be resolved becomes
//! `Null`, its name lands in the per-config [`ErrorFieldSet`], and the
//! remaining phases proceed.

use std::collections::BTreeMap;

use omop_model::{
    ConfigSpec, DataType, ErrorFieldSet, FieldKind, FieldSpec, OutputRecord, Value,
    dedupe_records,
};
use tracing::{debug, trace, warn};

use crate::datetime;
use crate::document::{DocumentQuery, NodeId, read_attribute};
use crate::functions::{ArgMap, FunctionRegistry};
use crate::hash::hash_text;
use crate::pk_table::PkTable;

/// Header tables are accepted unconditionally by domain routing; only
/// clinical-event configs are filtered by their computed `domain_id`.
pub const HEADER_TABLES: [&str; 5] = ["Person", "Location", "Care_Site", "Provider", "Visit"];

/// The special argument name whose mapped value is passed to a derived
/// function as a literal instead of being looked up in the record.
const LITERAL_ARG: &str = "default";

/// Everything a phase may touch while resolving one row.
pub struct PhaseContext<'a> {
    pub doc: &'a dyn DocumentQuery,
    pub scope: NodeId,
    pub config_name: &'a str,
    pub config: &'a ConfigSpec,
    pub filename: &'a str,
    pub pk: &'a mut PkTable,
    pub functions: &'a FunctionRegistry,
    pub errors: &'a mut ErrorFieldSet,
}

impl PhaseContext<'_> {
    fn record_error(&mut self, field: &str) {
        self.errors.insert(field.to_string());
    }
}

/// One step of the resolution pipeline, handling every field of a single
/// `config_type`.
pub trait FieldPhase {
    fn phase_name(&self) -> &'static str;
    fn apply(&self, record: &mut OutputRecord, ctx: &mut PhaseContext<'_>);
}

/// The nine phases, in execution order.
pub fn build_phase_pipeline() -> Vec<Box<dyn FieldPhase>> {
    vec![
        Box::new(NonePhase),
        Box::new(ConstantPhase),
        Box::new(FilenamePhase),
        Box::new(DocumentFieldPhase),
        Box::new(DerivedPhase),
        Box::new(RecordDerivedPhase),
        Box::new(ForeignKeyPhase),
        Box::new(PriorityPhase),
        Box::new(HashPhase),
    ]
}

/// Fields with no declared type hold a slot in the record but never a value.
struct NonePhase;

impl FieldPhase for NonePhase {
    fn phase_name(&self) -> &'static str {
        "none"
    }

    fn apply(&self, record: &mut OutputRecord, ctx: &mut PhaseContext<'_>) {
        for (name, spec) in ctx.config.data_fields() {
            if spec.config_type == FieldKind::None {
                record.set(name, Value::Null);
            }
        }
    }
}

struct ConstantPhase;

impl FieldPhase for ConstantPhase {
    fn phase_name(&self) -> &'static str {
        "constant"
    }

    fn apply(&self, record: &mut OutputRecord, ctx: &mut PhaseContext<'_>) {
        let config = ctx.config;
        for (name, spec) in config.data_fields() {
            if spec.config_type != FieldKind::Constant {
                continue;
            }
            match &spec.constant_value {
                Some(raw) => {
                    let value = coerce_value(raw, spec.data_type, ctx, name);
                    record.set(name, value);
                }
                None => {
                    ctx.record_error(name);
                    record.set(name, Value::Null);
                }
            }
        }
    }
}

struct FilenamePhase;

impl FieldPhase for FilenamePhase {
    fn phase_name(&self) -> &'static str {
        "filename"
    }

    fn apply(&self, record: &mut OutputRecord, ctx: &mut PhaseContext<'_>) {
        for (name, spec) in ctx.config.data_fields() {
            if spec.config_type == FieldKind::Filename {
                record.set(name, Value::Text(ctx.filename.to_string()));
            }
        }
    }
}

/// Resolves `FIELD` and `PK` entries from the document. `PK` values are
/// additionally carried over for later configs' foreign keys.
struct DocumentFieldPhase;

impl FieldPhase for DocumentFieldPhase {
    fn phase_name(&self) -> &'static str {
        "basic"
    }

    fn apply(&self, record: &mut OutputRecord, ctx: &mut PhaseContext<'_>) {
        let config = ctx.config;
        for (name, spec) in config.data_fields() {
            if !matches!(spec.config_type, FieldKind::Field | FieldKind::Pk) {
                continue;
            }
            let value = resolve_document_field(ctx, name, spec);
            if spec.config_type == FieldKind::Pk {
                ctx.pk.append(name, value.clone());
            }
            record.set(name, value);
        }
    }
}

struct DerivedPhase;

impl FieldPhase for DerivedPhase {
    fn phase_name(&self) -> &'static str {
        "derived"
    }

    fn apply(&self, record: &mut OutputRecord, ctx: &mut PhaseContext<'_>) {
        let config = ctx.config;
        let functions = ctx.functions;
        for (name, spec) in config.data_fields() {
            if spec.config_type != FieldKind::Derived {
                continue;
            }
            let mut args = ArgMap::new();
            let mut complete = true;
            for (arg, source) in &spec.argument_names {
                if arg == LITERAL_ARG {
                    args.insert(arg.clone(), Value::Text(source.clone()));
                    continue;
                }
                match record.get(source) {
                    Some(value) => {
                        args.insert(arg.clone(), value.clone());
                    }
                    None => {
                        debug!(
                            config = ctx.config_name,
                            field = name,
                            source,
                            "derived argument source missing from record"
                        );
                        ctx.record_error(name);
                        complete = false;
                    }
                }
            }
            let value = if complete {
                call_derived(functions, ctx, name, spec, &args)
            } else {
                Value::Null
            };
            if value.is_usable() {
                ctx.pk.append_unique(name, value.clone());
            }
            record.set(name, value);
        }
    }
}

fn call_derived(
    functions: &FunctionRegistry,
    ctx: &mut PhaseContext<'_>,
    name: &str,
    spec: &FieldSpec,
    args: &ArgMap,
) -> Value {
    let Some(function_name) = spec.function.as_deref() else {
        ctx.record_error(name);
        return Value::Null;
    };
    // Unknown names are rejected at load time; this guards a registry
    // swapped after validation.
    let Some(function) = functions.derived(function_name) else {
        ctx.record_error(name);
        return Value::Null;
    };
    match function(args) {
        Ok(value) => value,
        Err(error) => {
            warn!(
                config = ctx.config_name,
                field = name,
                function = function_name,
                %error,
                "derived function failed"
            );
            ctx.record_error(name);
            Value::Null
        }
    }
}

/// Like `DerivedPhase`, but the function sees the whole in-progress record
/// instead of a named argument map.
struct RecordDerivedPhase;

impl FieldPhase for RecordDerivedPhase {
    fn phase_name(&self) -> &'static str {
        "derived2"
    }

    fn apply(&self, record: &mut OutputRecord, ctx: &mut PhaseContext<'_>) {
        let config = ctx.config;
        let functions = ctx.functions;
        for (name, spec) in config.data_fields() {
            if spec.config_type != FieldKind::Derived2 {
                continue;
            }
            record.set(name, Value::Null);
            let Some(function_name) = spec.function.as_deref() else {
                ctx.record_error(name);
                continue;
            };
            let Some(function) = functions.record_fn(function_name) else {
                ctx.record_error(name);
                continue;
            };
            match function(spec, record) {
                Ok(value) => record.set(name, value),
                Err(error) => {
                    warn!(
                        config = ctx.config_name,
                        field = name,
                        function = function_name,
                        %error,
                        "record-derived function failed"
                    );
                    ctx.record_error(name);
                }
            }
        }
    }
}

struct ForeignKeyPhase;

impl FieldPhase for ForeignKeyPhase {
    fn phase_name(&self) -> &'static str {
        "foreign_key"
    }

    fn apply(&self, record: &mut OutputRecord, ctx: &mut PhaseContext<'_>) {
        let config = ctx.config;
        for (name, spec) in config.data_fields() {
            if spec.config_type != FieldKind::Fk {
                continue;
            }
            let value = match ctx.pk.values(name) {
                [] => Value::Null,
                [single] => single.clone(),
                many => {
                    debug!(
                        config = ctx.config_name,
                        field = name,
                        candidates = many.len(),
                        "ambiguous foreign key left unresolved"
                    );
                    Value::Unresolved
                }
            };
            if value.is_null() {
                ctx.record_error(name);
            }
            record.set(name, value);
        }
    }
}

/// Resolves each priority chain: members compete by rank, lowest rank with
/// a usable value wins; the target field's declared default applies when
/// every member is null.
struct PriorityPhase;

impl FieldPhase for PriorityPhase {
    fn phase_name(&self) -> &'static str {
        "priority"
    }

    fn apply(&self, record: &mut OutputRecord, ctx: &mut PhaseContext<'_>) {
        let config = ctx.config;
        let mut chains: BTreeMap<&str, Vec<(i32, &str)>> = BTreeMap::new();
        for (name, spec) in config.data_fields() {
            if let Some(priority) = &spec.priority {
                chains
                    .entry(priority.target.as_str())
                    .or_default()
                    .push((priority.rank, name));
            }
        }
        for (target, mut members) in chains {
            // Stable sort: equal ranks keep declaration order.
            members.sort_by_key(|(rank, _)| *rank);
            let mut chosen = members.iter().find_map(|(_, field)| {
                record.get(field).filter(|value| value.is_usable()).cloned()
            });
            if chosen.is_none() {
                if let Some(target_spec) = config.fields.get(target) {
                    if let Some(default) = target_spec.default.clone() {
                        chosen = Some(coerce_value(&default, target_spec.data_type, ctx, target));
                    }
                }
            }
            let value = match chosen {
                Some(value) => value,
                None => {
                    debug!(
                        config = ctx.config_name,
                        field = target,
                        "no priority chain member resolved and no default declared"
                    );
                    ctx.record_error(target);
                    Value::Null
                }
            };
            // Unresolved chains carry nothing; a Null here would count as an
            // extra candidate against later foreign keys.
            if value.is_usable() {
                ctx.pk.append(target, value.clone());
            }
            record.set(target, value);
        }
    }
}

/// Computes surrogate keys from previously resolved fields.
struct HashPhase;

impl FieldPhase for HashPhase {
    fn phase_name(&self) -> &'static str {
        "hash"
    }

    fn apply(&self, record: &mut OutputRecord, ctx: &mut PhaseContext<'_>) {
        let config = ctx.config;
        for (name, spec) in config.data_fields() {
            if spec.config_type != FieldKind::Hash {
                continue;
            }
            let mut parts = Vec::with_capacity(spec.fields.len());
            for source in &spec.fields {
                match record.get(source) {
                    Some(value) => parts.push(value.hash_repr()),
                    None => {
                        debug!(
                            config = ctx.config_name,
                            field = name,
                            source,
                            "hash input field missing from record"
                        );
                        ctx.record_error(name);
                    }
                }
            }
            let value = Value::from(hash_text(&parts.join("|")));
            ctx.pk.append(name, value.clone());
            record.set(name, value);
        }
    }
}

fn resolve_document_field(ctx: &mut PhaseContext<'_>, name: &str, spec: &FieldSpec) -> Value {
    let (Some(element), Some(attribute)) = (spec.element.as_deref(), spec.attribute.as_deref())
    else {
        warn!(
            config = ctx.config_name,
            field = name,
            "field lacks an element path or attribute name"
        );
        ctx.record_error(name);
        return Value::Null;
    };
    let nodes = ctx.doc.select(ctx.scope, element);
    let Some(node) = nodes.first().copied() else {
        trace!(config = ctx.config_name, field = name, element, "no element match");
        ctx.record_error(name);
        return Value::Null;
    };
    if nodes.len() > 1 {
        debug!(
            config = ctx.config_name,
            field = name,
            matches = nodes.len(),
            "multiple element matches, taking the first"
        );
    }
    let Some(raw) = read_attribute(ctx.doc, node, attribute) else {
        trace!(config = ctx.config_name, field = name, attribute, "attribute absent");
        ctx.record_error(name);
        return Value::Null;
    };
    coerce_value(raw.trim(), spec.data_type, ctx, name)
}

/// Applies the declared `data_type` to raw attribute text. Calendar types
/// degrade to the Unix epoch on unparseable input so a bad timestamp is
/// visible in the output rather than silently dropped; numeric types
/// degrade to `Null`.
fn coerce_value(
    raw: &str,
    data_type: Option<DataType>,
    ctx: &mut PhaseContext<'_>,
    field: &str,
) -> Value {
    let Some(data_type) = data_type else {
        return Value::Text(raw.to_string());
    };
    match data_type {
        DataType::Text => Value::Text(raw.to_string()),
        DataType::Date => match datetime::parse_date(raw) {
            Some(date) => Value::Date(date),
            None => {
                warn!(config = ctx.config_name, field, raw, "unparseable date, using epoch");
                ctx.record_error(field);
                Value::Date(datetime::epoch_date())
            }
        },
        DataType::DateTime => match datetime::parse_datetime(raw) {
            Some(dt) => Value::DateTime(dt),
            None => {
                warn!(config = ctx.config_name, field, raw, "unparseable datetime, using epoch");
                ctx.record_error(field);
                Value::DateTime(datetime::epoch_datetime())
            }
        },
        DataType::Long => parse_number::<i64>(raw, ctx, field).map_or(Value::Null, Value::Int64),
        DataType::Integer => parse_number::<i32>(raw, ctx, field).map_or(Value::Null, Value::Int32),
        DataType::Float => parse_number::<f64>(raw, ctx, field).map_or(Value::Null, Value::Float),
        DataType::BigIntHash => Value::from(hash_text(raw)),
        DataType::Other => {
            warn!(config = ctx.config_name, field, "unrecognized data type, passing text through");
            ctx.record_error(field);
            Value::Text(raw.to_string())
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    raw: &str,
    ctx: &mut PhaseContext<'_>,
    field: &str,
) -> Option<T> {
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(config = ctx.config_name, field, raw, "unparseable numeric value");
            ctx.record_error(field);
            None
        }
    }
}

/// Resolves one output row for one root match, then routes and prunes it.
/// Returns `None` when domain routing rejects the row.
pub fn resolve_single_root(ctx: &mut PhaseContext<'_>) -> Option<OutputRecord> {
    let mut record = OutputRecord::new();
    for phase in build_phase_pipeline() {
        trace!(config = ctx.config_name, phase = phase.phase_name(), "applying phase");
        phase.apply(&mut record, ctx);
    }
    if !domain_accepts(ctx.config_name, ctx.config, &record) {
        return None;
    }
    Some(prune_and_order(ctx.config, &record))
}

/// Routing: header tables pass unconditionally; clinical configs keep only
/// rows whose computed `domain_id` equals the config's expected domain.
fn domain_accepts(config_name: &str, config: &ConfigSpec, record: &OutputRecord) -> bool {
    let Some(expected) = config.expected_domain_id() else {
        return true;
    };
    if HEADER_TABLES.contains(&expected) {
        return true;
    }
    match record.get("domain_id") {
        Some(domain) if domain.is_usable() => {
            let matched = domain.to_string() == expected;
            if !matched {
                trace!(
                    config = config_name,
                    expected,
                    actual = %domain,
                    "row routed away from this config's domain"
                );
            }
            matched
        }
        _ => {
            debug!(config = config_name, "row lacks a domain_id, rejecting");
            false
        }
    }
}

/// Keeps only fields with a declared `order`, emitted in ascending order
/// (declaration order breaking ties). Internal working fields disappear
/// here.
fn prune_and_order(config: &ConfigSpec, record: &OutputRecord) -> OutputRecord {
    let mut ordered: Vec<(u32, &str)> = config
        .data_fields()
        .filter_map(|(name, spec)| spec.order.map(|order| (order, name)))
        .collect();
    ordered.sort_by_key(|(order, _)| *order);
    ordered
        .into_iter()
        .filter_map(|(_, name)| record.get(name).map(|value| (name.to_string(), value.clone())))
        .collect()
}

/// All rows one config produces for one document, with the fields that
/// failed to resolve along the way.
#[derive(Debug, Default)]
pub struct ConfigRows {
    pub rows: Vec<OutputRecord>,
    pub error_fields: ErrorFieldSet,
}

/// Runs one config against a document: one row attempt per root match,
/// exact-duplicate rows collapsed.
pub fn run_config(
    doc: &dyn DocumentQuery,
    config_name: &str,
    config: &ConfigSpec,
    filename: &str,
    pk: &mut PkTable,
    functions: &FunctionRegistry,
) -> ConfigRows {
    let mut errors = ErrorFieldSet::new();
    let Some(root_path) = config.root_element() else {
        return ConfigRows::default();
    };
    let scopes = doc.roots(root_path);
    if scopes.is_empty() {
        debug!(config = config_name, root = root_path, "no root matches in document");
        return ConfigRows::default();
    }
    let mut rows = Vec::with_capacity(scopes.len());
    for scope in scopes {
        let mut ctx = PhaseContext {
            doc,
            scope,
            config_name,
            config,
            filename,
            pk: &mut *pk,
            functions,
            errors: &mut errors,
        };
        if let Some(row) = resolve_single_root(&mut ctx) {
            if !row.is_empty() {
                rows.push(row);
            }
        }
    }
    let attempted = rows.len();
    let rows = dedupe_records(rows);
    if rows.len() < attempted {
        debug!(
            config = config_name,
            collapsed = attempted - rows.len(),
            "collapsed duplicate rows"
        );
    }
    if !errors.is_empty() {
        debug!(config = config_name, fields = ?errors, "fields failed to resolve");
    }
    ConfigRows { rows, error_fields: errors }
}
