//! Relational rules running inside the full validator: the shipped rule
//! library, XML-loaded libraries, and evaluation-error reporting.

use afd_catalog::Catalog;
use afd_checks::{relations, Validator};
use afd_core::{Severity, ValidationOutcome};

// ---------------------------------------------------------------------------
// Schema fixtures
// ---------------------------------------------------------------------------

const FORMATS: &str = r#"
    <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:simpleType name="Bn">
        <xs:restriction base="xs:decimal"><xs:totalDigits value="15"/></xs:restriction>
      </xs:simpleType>
      <xs:simpleType name="codeB2">
        <xs:restriction base="fm:Bn"><xs:fractionDigits value="2"/></xs:restriction>
      </xs:simpleType>
      <xs:simpleType name="codeD1">
        <xs:restriction base="xs:string"><xs:length value="8"/></xs:restriction>
      </xs:simpleType>
      <xs:simpleType name="N5">
        <xs:restriction base="xs:string"><xs:maxLength value="5"/></xs:restriction>
      </xs:simpleType>
    </xs:schema>"#;

const CODELISTS: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"/>"#;

const ATTRIBUTES: &str = r#"
    <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:simpleType name="_VOLGNUM"><xs:restriction base="fm:N5"/></xs:simpleType>
      <xs:simpleType name="_BTP"><xs:restriction base="fm:codeB2"/></xs:simpleType>
      <xs:simpleType name="_TASS"><xs:restriction base="fm:codeB2"/></xs:simpleType>
      <xs:simpleType name="_INGDAT"><xs:restriction base="fm:codeD1"/></xs:simpleType>
    </xs:schema>"#;

const ENTITIES: &str = r#"
    <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:complexType name="AL">
        <xs:sequence>
          <xs:element name="AL_VOLGNUM"/>
          <xs:element name="AL_ENTITEI"/>
          <xs:element name="AL_CNTRNUM"/>
          <xs:element name="AL_POLNR"/>
        </xs:sequence>
      </xs:complexType>
      <xs:complexType name="PP">
        <xs:sequence>
          <xs:element name="PP_VOLGNUM"/>
          <xs:element name="PP_ENTITEI"/>
          <xs:element name="PP_INGDAT"/>
          <xs:element name="PP_BTP"/>
          <xs:element name="PP_TASS"/>
        </xs:sequence>
      </xs:complexType>
      <xs:complexType name="VP">
        <xs:sequence>
          <xs:element name="VP_VOLGNUM"/>
          <xs:element name="VP_ENTITEI"/>
          <xs:element name="VP_RELCODE"/>
        </xs:sequence>
      </xs:complexType>
      <xs:complexType name="CA">
        <xs:sequence>
          <xs:element name="CA_VOLGNUM"/>
          <xs:element name="CA_BTP"/>
          <xs:group ref="dg:CA_CODEGroup"/>
        </xs:sequence>
      </xs:complexType>
      <xs:complexType name="WA">
        <xs:sequence>
          <xs:element name="WA_VOLGNUM"/>
          <xs:element name="WA_BTP"/>
          <xs:group ref="dg:WA_CODEGroup"/>
        </xs:sequence>
      </xs:complexType>
    </xs:schema>"#;

const COVERAGE: &str = r#"
    <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:group name="CA_CODEGroup">
        <xs:sequence>
          <xs:element name="CA_CODE">
            <xs:simpleType>
              <xs:restriction base="xs:string">
                <xs:enumeration value="3001"/>
                <xs:enumeration value="3002"/>
              </xs:restriction>
            </xs:simpleType>
          </xs:element>
        </xs:sequence>
      </xs:group>
      <xs:group name="WA_CODEGroup">
        <xs:sequence>
          <xs:element name="WA_CODE">
            <xs:simpleType>
              <xs:restriction base="xs:string">
                <xs:enumeration value="2001"/>
              </xs:restriction>
            </xs:simpleType>
          </xs:element>
        </xs:sequence>
      </xs:group>
    </xs:schema>"#;

const STRUCTURE: &str = r#"
    <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:complexType name="Contractberichtstructuur">
        <xs:sequence>
          <xs:element name="AL" minOccurs="1"/>
          <xs:element name="PP" minOccurs="1" maxOccurs="unbounded"/>
          <xs:element name="VP" minOccurs="0" maxOccurs="unbounded"/>
          <xs:element name="CA" minOccurs="0" maxOccurs="unbounded"/>
          <xs:element name="WA" minOccurs="0" maxOccurs="unbounded"/>
        </xs:sequence>
      </xs:complexType>
    </xs:schema>"#;

fn catalog() -> Catalog {
    Catalog::from_sources(FORMATS, CODELISTS, ATTRIBUTES, ENTITIES, COVERAGE, STRUCTURE).unwrap()
}

const MOTOR_CONTRACT: &str = "<Batch><Contract>\
    <AL><AL_VOLGNUM>1</AL_VOLGNUM><AL_ENTITEI>AL</AL_ENTITEI>\
        <AL_CNTRNUM>M1</AL_CNTRNUM><AL_POLNR>M1</AL_POLNR></AL>\
    <PP><PP_VOLGNUM>1</PP_VOLGNUM><PP_ENTITEI>PP</PP_ENTITEI>\
        <PP_INGDAT>20250101</PP_INGDAT><PP_BTP>10.00</PP_BTP>\
        <PP_TASS>10.00</PP_TASS></PP>\
    <VP><VP_VOLGNUM>1</VP_VOLGNUM><VP_ENTITEI>VP</VP_ENTITEI>\
        <VP_RELCODE>VN</VP_RELCODE></VP>\
    <CA><CA_VOLGNUM>1</CA_VOLGNUM><CA_BTP>6.00</CA_BTP><CA_CODE>3002</CA_CODE></CA>\
    <WA><WA_VOLGNUM>1</WA_VOLGNUM><WA_BTP>4.00</WA_BTP><WA_CODE>2001</WA_CODE></WA>\
    </Contract></Batch>";

fn codes<'a>(outcome: &'a ValidationOutcome, code: &str) -> Vec<&'a afd_core::Finding> {
    outcome.findings.iter().filter(|f| f.code == code).collect()
}

// ---------------------------------------------------------------------------
// Shipped rule library
// ---------------------------------------------------------------------------

#[test]
fn shipped_rules_pass_on_a_complete_motor_contract() {
    let outcome = Validator::new(catalog()).validate(MOTOR_CONTRACT);
    assert!(outcome.findings.is_empty(), "unexpected findings: {:#?}", outcome.findings);
    assert!(outcome.certificate.is_some());
}

#[test]
fn casco_without_liability_cover_blocks_certification() {
    let input = MOTOR_CONTRACT
        .replace(
            "<WA><WA_VOLGNUM>1</WA_VOLGNUM><WA_BTP>4.00</WA_BTP><WA_CODE>2001</WA_CODE></WA>",
            "",
        )
        .replace("<CA_BTP>6.00</CA_BTP>", "<CA_BTP>10.00</CA_BTP>");
    let outcome = Validator::new(catalog()).validate(&input);
    let failures = codes(&outcome, "EX-001");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].label, "VB-003");
    assert_eq!(failures[0].severity, Severity::Error);
    assert_eq!(failures[0].source, "relational rules");
    assert_eq!(codes(&outcome, "EF-001").len(), 1);
    assert!(outcome.certificate.is_none());
}

#[test]
fn missing_policyholder_blocks_certification() {
    let input = MOTOR_CONTRACT.replace(
        "<VP><VP_VOLGNUM>1</VP_VOLGNUM><VP_ENTITEI>VP</VP_ENTITEI>\
         <VP_RELCODE>VN</VP_RELCODE></VP>",
        "",
    );
    let outcome = Validator::new(catalog()).validate(&input);
    let failures = codes(&outcome, "EX-001");
    assert!(failures.iter().any(|f| f.label == "VB-007"));
    assert!(outcome.certificate.is_none());
}

// ---------------------------------------------------------------------------
// XML-loaded libraries
// ---------------------------------------------------------------------------

const SIMPLE_BATCH: &str = "<Batch><Contract>\
    <AL><AL_VOLGNUM>1</AL_VOLGNUM><AL_ENTITEI>AL</AL_ENTITEI>\
        <AL_CNTRNUM>S1</AL_CNTRNUM><AL_POLNR>S1</AL_POLNR></AL>\
    <PP><PP_VOLGNUM>1</PP_VOLGNUM><PP_ENTITEI>PP</PP_ENTITEI>\
        <PP_INGDAT>20250101</PP_INGDAT><PP_BTP>10.00</PP_BTP></PP>\
    </Contract></Batch>";

#[test]
fn xml_library_warning_rule_reports_but_still_certifies() {
    let library = r#"
        <rules>
          <rule id="HUIS-001">
            <name>policyholder present</name>
            <condition>true()</condition>
            <then>count(//VP) &gt; 0</then>
            <severity>WAARSCHUWING</severity>
          </rule>
          <rule id="HUIS-002" enabled="false">
            <condition>true()</condition>
            <then>count(//AD) &gt; 0</then>
            <severity>FOUT</severity>
          </rule>
        </rules>"#;
    let rules = relations::load_rules_xml(library).unwrap();
    assert_eq!(rules.len(), 2);

    let outcome = Validator::with_rules(catalog(), rules).validate(SIMPLE_BATCH);
    let failures = codes(&outcome, "EX-001");
    // The disabled FOUT rule never runs; the warning rule fires.
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].label, "HUIS-001");
    assert_eq!(failures[0].severity, Severity::Warning);
    let certificate = outcome.certificate.as_ref().unwrap();
    assert_eq!(certificate.warnings_acknowledged, 1);
}

#[test]
fn unparseable_expression_surfaces_as_info() {
    let library = r#"
        <rules>
          <rule id="BAD-001">
            <condition>true()</condition>
            <then>//CA &gt;</then>
          </rule>
        </rules>"#;
    let rules = relations::load_rules_xml(library).unwrap();
    let outcome = Validator::with_rules(catalog(), rules).validate(SIMPLE_BATCH);
    let errors = codes(&outcome, "EX-002");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].severity, Severity::Info);
    // Evaluation problems never block the batch.
    assert!(outcome.certificate.is_some());
}
