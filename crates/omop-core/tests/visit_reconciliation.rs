//! End-to-end checks of nested-visit reclassification and event linking,
//! driven through the same table shapes the document pipeline produces.

use omop_core::datetime;
use omop_core::pipeline::DocumentOutput;
use omop_core::visit::{
    link_events_to_visit_details, link_events_to_visits, reclassify_nested_visits,
};
use omop_model::{Metadata, OutputRecord, Value};

const INPATIENT: i64 = 9201;
const OUTPATIENT: i64 = 9202;

fn visit(id: i64, concept: i64, start: &str, end: &str) -> OutputRecord {
    let mut record = OutputRecord::new();
    record.set("visit_occurrence_id", Value::Int64(id));
    record.set("person_id", Value::Int64(1));
    record.set("visit_concept_id", Value::Int64(concept));
    record.set("visit_start_date", Value::from(datetime::parse_date(start)));
    record.set("visit_end_date", Value::from(datetime::parse_date(end)));
    record.set(
        "visit_start_datetime",
        Value::from(datetime::parse_datetime(start)),
    );
    record.set("visit_end_datetime", Value::from(datetime::parse_datetime(end)));
    record
}

fn measurement(id: i64, visit_id: Value, datetime: &str) -> OutputRecord {
    let mut record = OutputRecord::new();
    record.set("measurement_id", Value::Int64(id));
    record.set("person_id", Value::Int64(1));
    record.set("measurement_date", Value::from(datetime::parse_date(datetime)));
    record.set(
        "measurement_datetime",
        Value::from(datetime::parse_datetime(datetime)),
    );
    record.set("visit_occurrence_id", visit_id);
    record
}

fn measurement_metadata() -> Metadata {
    serde_json::from_str(
        r#"{
            "Visit": { "root": { "config_type": "ROOT", "expected_domain_id": "Visit", "element": "./v" } },
            "Measurement": { "root": { "config_type": "ROOT", "expected_domain_id": "Measurement", "element": "./m" } }
        }"#,
    )
    .expect("metadata")
}

fn ids(rows: &[OutputRecord], field: &str) -> Vec<Option<i64>> {
    rows.iter().map(|row| row.get(field).and_then(Value::as_i64)).collect()
}

#[test]
fn nested_visits_become_details_under_the_top_ancestor() {
    let mut output = DocumentOutput::new();
    output.set_table(
        "Visit",
        vec![
            visit(1, INPATIENT, "2020-01-01T08:00:00", "2020-01-10T17:00:00"),
            visit(2, INPATIENT, "2020-01-02T09:00:00", "2020-01-03T09:00:00"),
            visit(3, OUTPATIENT, "2020-01-02T12:00:00", "2020-01-02T18:00:00"),
        ],
    );
    reclassify_nested_visits(&mut output);

    assert_eq!(ids(output.table("Visit"), "visit_occurrence_id"), vec![Some(1)]);

    let details = output.table("VisitDetail");
    assert_eq!(ids(details, "visit_detail_id"), vec![Some(2), Some(3)]);
    // both details hang off the top-level stay
    assert_eq!(ids(details, "visit_occurrence_id"), vec![Some(1), Some(1)]);
    // V2's parent is the top-level visit, not a detail; V3 nests under V2
    assert_eq!(
        ids(details, "visit_detail_parent_id"),
        vec![None, Some(2)]
    );
    assert_eq!(details[0].get("preceding_visit_detail_id"), Some(&Value::Null));
}

#[test]
fn detail_rows_carry_renamed_visit_fields() {
    let mut output = DocumentOutput::new();
    let mut inner = visit(2, OUTPATIENT, "2020-01-02", "2020-01-03");
    inner.set("visit_source_value", Value::Text("AMB".into()));
    output.set_table(
        "Visit",
        vec![visit(1, INPATIENT, "2020-01-01", "2020-01-10"), inner],
    );
    reclassify_nested_visits(&mut output);

    let detail = &output.table("VisitDetail")[0];
    assert_eq!(detail.get("visit_detail_source_value"), Some(&Value::Text("AMB".into())));
    assert_eq!(
        detail.get("visit_detail_concept_id").and_then(Value::as_i64),
        Some(OUTPATIENT)
    );
    assert!(detail.get("visit_source_value").is_none());
    assert!(detail.get("visit_concept_id").is_none());
}

#[test]
fn ambiguous_sibling_parents_leave_the_visit_top_level() {
    // Two overlapping inpatient stays, neither containing the other; the
    // short visit fits inside both.
    let mut output = DocumentOutput::new();
    output.set_table(
        "Visit",
        vec![
            visit(1, INPATIENT, "2020-01-01", "2020-01-06"),
            visit(2, INPATIENT, "2020-01-03", "2020-01-09"),
            visit(3, OUTPATIENT, "2020-01-04", "2020-01-05"),
        ],
    );
    reclassify_nested_visits(&mut output);

    assert_eq!(
        ids(output.table("Visit"), "visit_occurrence_id"),
        vec![Some(1), Some(2), Some(3)]
    );
    assert!(output.table("VisitDetail").is_empty());
}

#[test]
fn overlong_stays_never_anchor_a_hierarchy() {
    let mut output = DocumentOutput::new();
    output.set_table(
        "Visit",
        vec![
            visit(1, INPATIENT, "2019-01-01", "2020-06-01"),
            visit(2, OUTPATIENT, "2019-03-01", "2019-03-02"),
        ],
    );
    reclassify_nested_visits(&mut output);
    assert_eq!(output.table("Visit").len(), 2);
    assert!(output.table("VisitDetail").is_empty());
}

#[test]
fn non_inpatient_visits_never_anchor_a_hierarchy() {
    let mut output = DocumentOutput::new();
    output.set_table(
        "Visit",
        vec![
            visit(1, OUTPATIENT, "2020-01-01", "2020-01-10"),
            visit(2, OUTPATIENT, "2020-01-02", "2020-01-03"),
        ],
    );
    reclassify_nested_visits(&mut output);
    assert_eq!(output.table("Visit").len(), 2);
    assert!(output.table("VisitDetail").is_empty());
}

#[test]
fn a_lone_visit_short_circuits_reconciliation() {
    let mut output = DocumentOutput::new();
    output.set_table("Visit", vec![visit(1, INPATIENT, "2020-01-01", "2020-01-10")]);
    reclassify_nested_visits(&mut output);
    assert_eq!(output.table("Visit").len(), 1);
    assert!(output.table("VisitDetail").is_empty());
}

#[test]
fn canonical_visit_rows_shadow_encompassing_duplicates() {
    let mut output = DocumentOutput::new();
    let mut canonical = visit(1, INPATIENT, "2020-01-01", "2020-01-10");
    canonical.set("visit_source_value", Value::Text("from-section".into()));
    let mut duplicate = visit(1, INPATIENT, "2020-01-01", "2020-01-10");
    duplicate.set("visit_source_value", Value::Text("from-header".into()));
    output.set_table("Visit", vec![canonical]);
    output.set_table("Visit_encompassingEncounter", vec![duplicate]);
    reclassify_nested_visits(&mut output);

    let visits = output.table("Visit");
    assert_eq!(visits.len(), 1);
    assert_eq!(
        visits[0].get("visit_source_value"),
        Some(&Value::Text("from-section".into()))
    );
    // the merged auxiliary table is gone
    assert!(output.table("Visit_encompassingEncounter").is_empty());
}

#[test]
fn events_link_to_the_one_containing_visit_and_its_narrowest_detail() {
    let mut output = DocumentOutput::new();
    output.set_table(
        "Visit",
        vec![
            visit(1, INPATIENT, "2020-01-01T08:00:00", "2020-01-10T17:00:00"),
            visit(2, INPATIENT, "2020-01-02T09:00:00", "2020-01-03T09:00:00"),
            visit(3, OUTPATIENT, "2020-01-02T12:00:00", "2020-01-02T18:00:00"),
        ],
    );
    output.set_table(
        "Measurement",
        vec![
            measurement(100, Value::Unresolved, "2020-01-02T13:00:00"),
            measurement(101, Value::Null, "2021-06-01T00:00:00"),
            measurement(102, Value::Null, "2020-01-02T10:00:00"),
        ],
    );
    let metadata = measurement_metadata();
    reclassify_nested_visits(&mut output);
    link_events_to_visits(&mut output, &metadata);
    link_events_to_visit_details(&mut output, &metadata);

    let rows = output.table("Measurement");
    assert_eq!(
        rows[0].get("visit_occurrence_id").and_then(Value::as_i64),
        Some(1)
    );
    // V3 is narrower than V2, so the detail link prefers it
    assert_eq!(rows[0].get("visit_detail_id").and_then(Value::as_i64), Some(3));
    // out-of-window event ends up null, not unresolved
    assert_eq!(rows[1].get("visit_occurrence_id"), Some(&Value::Null));
    assert!(rows[1].get("visit_detail_id").is_none());
    // before V3 opens, only V2 contains the event
    assert_eq!(
        rows[2].get("visit_occurrence_id").and_then(Value::as_i64),
        Some(1)
    );
    assert_eq!(rows[2].get("visit_detail_id").and_then(Value::as_i64), Some(2));
}

#[test]
fn undated_events_are_left_unlinked() {
    let mut output = DocumentOutput::new();
    output.set_table("Visit", vec![visit(1, INPATIENT, "2020-01-01", "2020-01-10")]);
    let mut event = OutputRecord::new();
    event.set("measurement_id", Value::Int64(100));
    event.set("person_id", Value::Int64(1));
    event.set("visit_occurrence_id", Value::Unresolved);
    output.set_table("Measurement", vec![event]);
    let metadata = measurement_metadata();
    link_events_to_visits(&mut output, &metadata);
    assert_eq!(
        output.table("Measurement")[0].get("visit_occurrence_id"),
        Some(&Value::Null)
    );
}

#[test]
fn preassigned_visit_keys_are_left_alone() {
    let mut output = DocumentOutput::new();
    output.set_table("Visit", vec![visit(1, INPATIENT, "2020-01-01", "2020-01-10")]);
    output.set_table(
        "Measurement",
        vec![measurement(100, Value::Int64(42), "2020-01-02T13:00:00")],
    );
    let metadata = measurement_metadata();
    link_events_to_visits(&mut output, &metadata);
    assert_eq!(
        output.table("Measurement")[0]
            .get("visit_occurrence_id")
            .and_then(Value::as_i64),
        Some(42)
    );
}

#[test]
fn ambiguous_visit_matches_resolve_to_null_without_diagnostic_leftovers() {
    // Two overlapping top-level visits both contain the event.
    let mut output = DocumentOutput::new();
    output.set_table(
        "Visit",
        vec![
            visit(1, OUTPATIENT, "2020-01-01", "2020-01-06"),
            visit(2, OUTPATIENT, "2020-01-03", "2020-01-09"),
        ],
    );
    output.set_table(
        "Measurement",
        vec![measurement(100, Value::Unresolved, "2020-01-04T10:00:00")],
    );
    let metadata = measurement_metadata();
    link_events_to_visits(&mut output, &metadata);

    let row = &output.table("Measurement")[0];
    assert_eq!(row.get("visit_occurrence_id"), Some(&Value::Null));
    assert!(row.field_names().all(|name| !name.starts_with("__")));
}

#[test]
fn a_zero_width_visit_window_spans_its_whole_day() {
    let mut output = DocumentOutput::new();
    output.set_table(
        "Visit",
        vec![visit(1, OUTPATIENT, "2020-01-02T08:00:00", "2020-01-02T08:00:00")],
    );
    output.set_table(
        "Measurement",
        vec![measurement(100, Value::Null, "2020-01-02T15:30:00")],
    );
    let metadata = measurement_metadata();
    link_events_to_visits(&mut output, &metadata);
    assert_eq!(
        output.table("Measurement")[0]
            .get("visit_occurrence_id")
            .and_then(Value::as_i64),
        Some(1)
    );
}

// Date-only event stamps are matched against the visits' date window.
#[test]
fn date_precision_events_use_the_date_window() {
    let mut output = DocumentOutput::new();
    output.set_table("Visit", vec![visit(1, OUTPATIENT, "2020-01-01", "2020-01-10")]);
    let mut event = measurement(100, Value::Null, "2020-01-05");
    event.set("measurement_datetime", Value::Null);
    output.set_table("Measurement", vec![event]);
    let metadata = measurement_metadata();
    link_events_to_visits(&mut output, &metadata);
    assert_eq!(
        output.table("Measurement")[0]
            .get("visit_occurrence_id")
            .and_then(Value::as_i64),
        Some(1)
    );
}
