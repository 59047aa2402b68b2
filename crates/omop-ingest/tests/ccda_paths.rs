//! Path evaluation against a cut-down CCDA document.

use omop_core::DocumentQuery;
use omop_ingest::XmlDocument;

const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ClinicalDocument xmlns="urn:hl7-org:v3" xmlns:hl7="urn:hl7-org:v3">
  <recordTarget>
    <patientRole>
      <id root="2.16.840.1.113883.4.1" extension="123-45-6789"/>
      <id root="2.16.840.1.113883.19.5" extension="MRN-001"/>
      <patient>
        <name>
          <given>Ada</given>
          <family>Lovelace</family>
        </name>
        <birthTime value="19701202"/>
      </patient>
    </patientRole>
  </recordTarget>
  <componentOf>
    <encompassingEncounter>
      <effectiveTime>
        <low value="20200102090000-0500"/>
        <high value="20200103170000-0500"/>
      </effectiveTime>
    </encompassingEncounter>
  </componentOf>
  <component>
    <structuredBody>
      <component>
        <section>
          <entry typeCode="DRIV">
            <observation>
              <templateId root="2.16.840.1.113883.10.20.22.4.27"/>
              <code code="8302-2" codeSystem="2.16.840.1.113883.6.1"/>
              <value value="172" unit="cm"/>
              <text>Body height</text>
            </observation>
          </entry>
          <entry typeCode="COMP">
            <observation>
              <templateId root="2.16.840.1.113883.10.20.22.4.2"/>
              <code code="2093-3" codeSystem="2.16.840.1.113883.6.1"/>
              <value nullFlavor="NI"/>
            </observation>
          </entry>
        </section>
      </component>
    </structuredBody>
  </component>
</ClinicalDocument>
"#;

fn doc() -> XmlDocument {
    XmlDocument::parse(SAMPLE).expect("parse sample")
}

#[test]
fn root_paths_resolve_relative_to_the_document_element() {
    let doc = doc();
    assert_eq!(doc.roots("./hl7:recordTarget/hl7:patientRole").len(), 1);
    assert_eq!(
        doc.roots("./hl7:component/hl7:structuredBody/hl7:component/hl7:section/hl7:entry")
            .len(),
        2
    );
    assert!(doc.roots("./hl7:nonexistent").is_empty());
}

#[test]
fn attribute_predicates_pick_the_right_sibling() {
    let doc = doc();
    let scope = doc.roots("./hl7:recordTarget/hl7:patientRole")[0];
    let ssn = doc.select(scope, r#"hl7:id[@root="2.16.840.1.113883.4.1"]"#);
    assert_eq!(ssn.len(), 1);
    assert_eq!(doc.attribute(ssn[0], "extension").as_deref(), Some("123-45-6789"));

    let mrn = doc.select(scope, r#"hl7:id[@root="2.16.840.1.113883.19.5"]"#);
    assert_eq!(doc.attribute(mrn[0], "extension").as_deref(), Some("MRN-001"));
}

#[test]
fn parent_step_climbs_back_from_a_template_id() {
    let doc = doc();
    let entries =
        doc.roots("./hl7:component/hl7:structuredBody/hl7:component/hl7:section/hl7:entry");
    let observations: Vec<_> = entries
        .iter()
        .flat_map(|&entry| {
            doc.select(
                entry,
                r#"hl7:observation/hl7:templateId[@root="2.16.840.1.113883.10.20.22.4.27"]/.."#,
            )
        })
        .collect();
    assert_eq!(observations.len(), 1);
    let code = doc.select(observations[0], "hl7:code");
    assert_eq!(doc.attribute(code[0], "code").as_deref(), Some("8302-2"));
}

#[test]
fn negated_and_or_predicates() {
    let doc = doc();
    let section =
        doc.roots("./hl7:component/hl7:structuredBody/hl7:component/hl7:section")[0];
    let with_value = doc.select(
        section,
        r#"hl7:entry/hl7:observation/hl7:value[not(@nullFlavor="NI")]"#,
    );
    assert_eq!(with_value.len(), 1);
    assert_eq!(doc.attribute(with_value[0], "unit").as_deref(), Some("cm"));

    let either = doc.select(section, r#"hl7:entry[@typeCode="DRIV" or @typeCode="COMP"]"#);
    assert_eq!(either.len(), 2);
}

#[test]
fn wildcard_and_current_steps() {
    let doc = doc();
    let patient = doc.roots("./hl7:recordTarget/hl7:patientRole/hl7:patient")[0];
    assert_eq!(doc.select(patient, ".").len(), 1);
    // name and birthTime
    assert_eq!(doc.select(patient, "*").len(), 2);
}

#[test]
fn text_content_concatenates_descendants() {
    let doc = doc();
    let patient = doc.roots("./hl7:recordTarget/hl7:patientRole/hl7:patient")[0];
    let name = doc.select(patient, "hl7:name");
    assert_eq!(doc.text(name[0]).as_deref(), Some("Ada Lovelace"));

    let birth = doc.select(patient, "hl7:birthTime");
    assert_eq!(doc.text(birth[0]), None);
    assert_eq!(doc.attribute(birth[0], "value").as_deref(), Some("19701202"));
}

#[test]
fn unprefixed_paths_match_because_namespaces_are_dropped() {
    let doc = doc();
    assert_eq!(doc.roots("./recordTarget/patientRole").len(), 1);
}

#[test]
fn malformed_path_selects_nothing() {
    let doc = doc();
    let scope = doc.roots("./hl7:recordTarget")[0];
    assert!(doc.select(scope, "patientRole[@root=").is_empty());
}

#[test]
fn broken_xml_is_an_error() {
    assert!(XmlDocument::parse("<a><b></a>").is_err());
}
