//! End-to-end conversion of a sample CCDA through the shipped metadata
//! machinery: load metadata, parse the document, run the pipeline.

use std::path::Path;

use omop_cli::metadata::load_metadata;
use omop_core::{FunctionRegistry, process_document};
use omop_ingest::XmlDocument;
use omop_model::Value;

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

// Keys below reproduce conv(substr(md5(upper(x)), 1, 13), 16, 10).
const PERSON_KEY: i64 = 537_062_200_044_092; // "123-45-6789"
const VISIT_KEY: i64 = 2_412_400_912_610_190; // "ENC-42"
// "537062200044092|8302-2|2020-01-02 10:30:00"
const MEASUREMENT_KEY: i64 = 1_587_535_949_699_504;

#[test]
fn converts_a_document_end_to_end() {
    let metadata = load_metadata(&fixture("metadata.json")).expect("load metadata");
    let functions = FunctionRegistry::with_builtins();
    assert!(functions.validate_metadata(&metadata).is_empty());

    let doc = XmlDocument::from_file(&fixture("sample_ccda.xml")).expect("parse document");
    let output = process_document(&doc, "sample_ccda.xml", &metadata, &functions);

    // Person: the SSN outranks the MRN in the identity chain.
    let person = &output.table("Person")[0];
    assert_eq!(person.get("person_id"), Some(&Value::Int64(PERSON_KEY)));
    assert_eq!(
        person.get("birth_datetime").map(ToString::to_string),
        Some("1970-12-02T00:00:00".to_string())
    );
    assert_eq!(person.get("gender_source_value"), Some(&Value::Text("F".into())));
    assert_eq!(
        person.get("filename"),
        Some(&Value::Text("sample_ccda.xml".into()))
    );

    // Visit: hashed encounter id, person key carried over, offset-naive dates.
    let visit = &output.table("Visit")[0];
    assert_eq!(visit.get("visit_occurrence_id"), Some(&Value::Int64(VISIT_KEY)));
    assert_eq!(visit.get("person_id"), Some(&Value::Int64(PERSON_KEY)));
    assert_eq!(
        visit.get("visit_start_datetime").map(ToString::to_string),
        Some("2020-01-02T09:00:00".to_string())
    );
    assert_eq!(
        visit.get("visit_end_date").map(ToString::to_string),
        Some("2020-01-03".to_string())
    );

    // Measurement: both foreign keys resolve, and the surrogate key hashes
    // the derived seed string.
    let measurement = &output.table("Measurement")[0];
    assert_eq!(measurement.get("person_id"), Some(&Value::Int64(PERSON_KEY)));
    assert_eq!(
        measurement.get("visit_occurrence_id"),
        Some(&Value::Int64(VISIT_KEY))
    );
    assert_eq!(
        measurement.get("measurement_id"),
        Some(&Value::Int64(MEASUREMENT_KEY))
    );
    assert_eq!(measurement.get("value_source_value"), Some(&Value::Text("172".into())));
    // the derived seed is internal only and pruned from the final row
    assert!(measurement.get("measurement_id_seed").is_none());
    assert!(measurement.get("domain_id").is_none());

    // field order follows the declared `order` values
    let names: Vec<&str> = measurement.field_names().collect();
    assert_eq!(names[0], "measurement_id");
    assert_eq!(names[1], "person_id");
}

#[test]
fn tables_without_matches_stay_empty_without_errors() {
    let metadata = load_metadata(&fixture("metadata.json")).expect("load metadata");
    let functions = FunctionRegistry::with_builtins();
    let doc = XmlDocument::parse("<ClinicalDocument xmlns=\"urn:hl7-org:v3\"/>").expect("parse");
    let output = process_document(&doc, "empty.xml", &metadata, &functions);
    assert_eq!(output.total_rows(), 0);
    assert_eq!(output.error_fields().count(), 0);
}
