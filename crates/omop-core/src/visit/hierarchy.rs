//! Nested-visit reclassification.
//!
//! CCDA documents frequently record one hospitalization several times: an
//! encompassing encounter plus the individual encounters that happened
//! inside it. This stage merges the two visit sources, finds visits whose
//! window sits inside a plausible inpatient stay, and demotes them to a
//! visit-detail table under their top-level ancestor.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use omop_model::{OutputRecord, Value};
use tracing::{debug, info, warn};

use super::{ENCOMPASSING_TABLE, VISIT_DETAIL_TABLE, VISIT_TABLE, Window};
use crate::pipeline::DocumentOutput;

/// Visit concept ids that can anchor a hierarchy as the enclosing stay.
const INPATIENT_CONCEPT_IDS: [i64; 1] = [9201];

/// A parent candidate longer than this is assumed to be a data error
/// (a year-plus "stay" swallowing everything) and is never used.
const MAX_PARENT_DURATION_DAYS: f64 = 367.0;

/// How each visit field lands in a visit-detail row. Fields not listed are
/// dropped; the occurrence and parent keys are overwritten afterwards.
const DETAIL_FIELD_MAP: [(&str, &str); 17] = [
    ("visit_occurrence_id", "visit_detail_id"),
    ("person_id", "person_id"),
    ("visit_concept_id", "visit_detail_concept_id"),
    ("visit_start_date", "visit_detail_start_date"),
    ("visit_start_datetime", "visit_detail_start_datetime"),
    ("visit_end_date", "visit_detail_end_date"),
    ("visit_end_datetime", "visit_detail_end_datetime"),
    ("visit_type_concept_id", "visit_detail_type_concept_id"),
    ("provider_id", "provider_id"),
    ("care_site_id", "care_site_id"),
    ("visit_source_value", "visit_detail_source_value"),
    ("visit_source_concept_id", "visit_detail_source_concept_id"),
    ("admitting_source_value", "admitting_source_value"),
    ("admitting_source_concept_id", "admitting_source_concept_id"),
    ("discharge_to_source_value", "discharge_to_source_value"),
    ("discharge_to_concept_id", "discharge_to_concept_id"),
    ("filename", "filename"),
];

/// Merges both visit sources, then splits the result into top-level visits
/// and visit details.
pub fn reclassify_nested_visits(output: &mut DocumentOutput) {
    let canonical = output.take_table(VISIT_TABLE);
    let encompassing = output.take_table(ENCOMPASSING_TABLE);
    if canonical.is_empty() && encompassing.is_empty() {
        return;
    }

    // First occurrence of an id wins; the canonical source is listed first,
    // so its row shadows an encompassing duplicate.
    let mut merged: IndexMap<String, OutputRecord> = IndexMap::new();
    let mut unkeyed = Vec::new();
    for record in canonical.into_iter().chain(encompassing) {
        match visit_id(&record) {
            Some(id) => {
                merged.entry(id.key_repr()).or_insert(record);
            }
            None => {
                warn!("visit row lacks a usable visit_occurrence_id, leaving it untouched");
                unkeyed.push(record);
            }
        }
    }

    // A lone visit has nothing to nest under.
    if merged.len() <= 1 {
        let mut visits: Vec<OutputRecord> = merged.into_values().collect();
        visits.append(&mut unkeyed);
        output.set_table(VISIT_TABLE, visits);
        return;
    }

    let parents: Vec<&OutputRecord> = merged
        .values()
        .filter(|record| is_plausible_parent(record))
        .collect();
    if parents.is_empty() {
        let mut visits: Vec<OutputRecord> = merged.into_values().collect();
        visits.append(&mut unkeyed);
        output.set_table(VISIT_TABLE, visits);
        return;
    }

    // child id key -> immediate parent id key
    let mut parent_of: BTreeMap<String, String> = BTreeMap::new();
    for (key, record) in &merged {
        if let Some(parent_key) = find_most_specific_parent(key, record, &parents) {
            parent_of.insert(key.clone(), parent_key);
        }
    }
    let nested: BTreeSet<&String> = parent_of.keys().collect();

    let mut details = Vec::with_capacity(parent_of.len());
    let mut visits = Vec::with_capacity(merged.len() - parent_of.len());
    for (key, record) in &merged {
        let Some(parent_key) = parent_of.get(key) else {
            visits.push(record.clone());
            continue;
        };
        let top_key = top_level_ancestor(parent_key, &parent_of);
        // The parent key becomes visit_detail_parent_id only when the parent
        // is itself demoted to a detail row.
        let detail_parent = nested.contains(parent_key).then(|| id_of(&merged, parent_key));
        details.push(to_detail(record, id_of(&merged, &top_key), detail_parent));
    }
    visits.append(&mut unkeyed);

    info!(
        visits = visits.len(),
        details = details.len(),
        "reclassified nested visits"
    );
    output.set_table(VISIT_TABLE, visits);
    if !details.is_empty() {
        output.set_table(VISIT_DETAIL_TABLE, details);
    }
}

fn visit_id(record: &OutputRecord) -> Option<&Value> {
    record.get("visit_occurrence_id").filter(|value| value.is_usable())
}

fn id_of(merged: &IndexMap<String, OutputRecord>, key: &str) -> Value {
    merged
        .get(key)
        .and_then(visit_id)
        .cloned()
        .unwrap_or(Value::Null)
}

/// Inpatient concept, with a window short enough to be a real stay.
fn is_plausible_parent(record: &OutputRecord) -> bool {
    let inpatient = record
        .get("visit_concept_id")
        .and_then(Value::as_i64)
        .is_some_and(|concept| INPATIENT_CONCEPT_IDS.contains(&concept));
    if !inpatient {
        return false;
    }
    Window::of(record, "visit")
        .duration_days()
        .is_some_and(|days| days < MAX_PARENT_DURATION_DAYS)
}

/// The containing parent with the smallest window, or `None` when no parent
/// contains the child or two sibling candidates overlap ambiguously.
fn find_most_specific_parent(
    child_key: &str,
    child: &OutputRecord,
    parents: &[&OutputRecord],
) -> Option<String> {
    let child_window = Window::of(child, "visit");
    let candidates: Vec<&OutputRecord> = parents
        .iter()
        .filter(|parent| {
            let parent_key = visit_id(parent).map(Value::key_repr);
            parent_key.as_deref() != Some(child_key)
                && parent.get("person_id") == child.get("person_id")
                && Window::of(parent, "visit").contains(&child_window)
        })
        .copied()
        .collect();

    // Two candidates where neither contains the other cannot be ordered
    // into a hierarchy; refuse to guess.
    for (i, a) in candidates.iter().enumerate() {
        for b in &candidates[i + 1..] {
            let wa = Window::of(a, "visit");
            let wb = Window::of(b, "visit");
            if !wa.contains(&wb) && !wb.contains(&wa) {
                debug!(child = child_key, "ambiguous sibling parents, leaving visit top-level");
                return None;
            }
        }
    }

    candidates
        .into_iter()
        .min_by(|a, b| {
            let da = Window::of(a, "visit").duration_days().unwrap_or(f64::MAX);
            let db = Window::of(b, "visit").duration_days().unwrap_or(f64::MAX);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .and_then(visit_id)
        .map(Value::key_repr)
}

/// Follows parent links to the hierarchy root. A cycle (identical windows
/// containing each other) stops at the first repeat.
fn top_level_ancestor(start: &str, parent_of: &BTreeMap<String, String>) -> String {
    let mut seen = BTreeSet::new();
    let mut current = start.to_string();
    while let Some(next) = parent_of.get(&current) {
        if !seen.insert(current.clone()) {
            break;
        }
        current = next.clone();
    }
    current
}

fn to_detail(visit: &OutputRecord, occurrence_id: Value, parent_id: Option<Value>) -> OutputRecord {
    let mut detail = OutputRecord::new();
    for (source, target) in DETAIL_FIELD_MAP {
        if let Some(value) = visit.get(source) {
            detail.set(target, value.clone());
        }
    }
    detail.set("visit_occurrence_id", occurrence_id);
    detail.set("visit_detail_parent_id", parent_id.unwrap_or(Value::Null));
    detail.set("preceding_visit_detail_id", Value::Null);
    detail
}
