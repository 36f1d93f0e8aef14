//! # Schema Pass
//!
//! Per-attribute validation against the schema lookup: label ownership,
//! coverage codes, code-catalog membership, length bounds, format rules,
//! and decimal digit budgets, plus the per-entity required-attribute check.
//!
//! Ownership is checked first; an attribute that does not belong to its
//! entity is reported once and skipped by the value checks, which would
//! otherwise pile unrelated findings onto the same mistake.

use regex::Regex;

use afd_catalog::SchemaLookup;
use afd_core::{Finding, FindingBuilder, Pass, Severity};
use afd_document::{Batch, Contract, EntityNode};

use crate::display_value;

/// Run the schema pass over the whole batch.
pub fn check(batch: &Batch, schema: &SchemaLookup) -> Vec<Finding> {
    let mut findings = Vec::new();
    for contract in &batch.contracts {
        for entity in contract.all_entities() {
            check_entity(contract, entity, schema, &mut findings);
        }
    }
    findings
}

fn check_entity(
    contract: &Contract,
    entity: &EntityNode,
    schema: &SchemaLookup,
    findings: &mut Vec<Finding>,
) {
    check_required_attributes(contract, entity, schema, findings);

    // Entities the schema does not define cannot have their attributes
    // judged; the structure pass reports unknown kinds.
    if !schema.has_entity(&entity.entity_type) {
        return;
    }

    for (label, value) in &entity.attributes {
        if !check_ownership(contract, entity, label, schema, findings) {
            continue;
        }
        check_coverage_code(contract, entity, label, value, schema, findings);
        check_codelist(contract, entity, label, value, schema, findings);
        check_length(contract, entity, label, value, schema, findings);
        check_format(contract, entity, label, value, schema, findings);
        check_decimal(contract, entity, label, value, schema, findings);
    }
}

fn base(
    severity: Severity,
    code: &str,
    rule_type: &str,
    contract: &Contract,
    entity: &EntityNode,
    label: &str,
) -> FindingBuilder {
    Finding::builder(severity, Pass::Schema, code, rule_type)
        .contract(&contract.number)
        .branch(&contract.branch)
        .entity(&entity.entity_type)
        .label(label)
        .line(entity.line)
}

// ---------------------------------------------------------------------------
// E1-007: required attributes
// ---------------------------------------------------------------------------

fn check_required_attributes(
    contract: &Contract,
    entity: &EntityNode,
    schema: &SchemaLookup,
    findings: &mut Vec<Finding>,
) {
    for suffix in schema.required_attributes(&entity.entity_type) {
        let missing = if *suffix == "VOLGNUM" {
            entity.ordinal.is_none()
        } else {
            entity.attr_non_empty(suffix).is_none()
        };
        if missing {
            let label = format!("{}_{}", entity.entity_type, suffix);
            findings.push(
                base(Severity::Error, "E1-007", "required_attribute_missing", contract, entity, &label)
                    .description(format!(
                        "required attribute {label} is missing on entity {}",
                        entity.entity_type
                    ))
                    .expected(format!("a non-empty value for {label}"))
                    .source("entiteiten.xsd")
                    .finish(),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// E1-001 / E1-005: label ownership
// ---------------------------------------------------------------------------

/// Returns false when the label does not belong here and value checks
/// should be skipped.
fn check_ownership(
    contract: &Contract,
    entity: &EntityNode,
    label: &str,
    schema: &SchemaLookup,
    findings: &mut Vec<Finding>,
) -> bool {
    let own_prefix = format!("{}_", entity.entity_type);
    if !label.starts_with(&own_prefix) {
        let other = label.split_once('_').map(|(p, _)| p).unwrap_or("");
        // A prefix that is not a known entity kind is noise, not a
        // misplacement; nothing useful can be said about it.
        if schema.has_entity(other) {
            findings.push(
                base(Severity::Error, "E1-005", "misplaced_attribute", contract, entity, label)
                    .description(format!(
                        "attribute {label} belongs to entity {other}, not {}",
                        entity.entity_type
                    ))
                    .expected(format!("attributes prefixed {own_prefix}"))
                    .source("entiteiten.xsd")
                    .finish(),
            );
        }
        return false;
    }

    if !schema.is_valid_attribute_for_entity(&entity.entity_type, label) {
        let owners = schema.entities_owning(label);
        let expected = if owners.is_empty() {
            format!("a declared attribute of entity {}", entity.entity_type)
        } else {
            format!("{label} is declared on: {}", owners.join(", "))
        };
        findings.push(
            base(Severity::Error, "E1-001", "unknown_attribute", contract, entity, label)
                .description(format!(
                    "attribute {label} is not declared for entity {}",
                    entity.entity_type
                ))
                .expected(expected)
                .source("entiteiten.xsd")
                .finish(),
        );
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// E1-002: coverage codes
// ---------------------------------------------------------------------------

fn check_coverage_code(
    contract: &Contract,
    entity: &EntityNode,
    label: &str,
    value: &str,
    schema: &SchemaLookup,
    findings: &mut Vec<Finding>,
) {
    if !label.ends_with("_CODE") {
        return;
    }
    let code = value.trim();
    if code.is_empty() {
        return;
    }
    let Some(codes) = schema.coverage_codes_for(&entity.entity_type) else { return };
    if codes.contains(code) {
        return;
    }

    let preview: Vec<&str> = codes.iter().take(10).map(String::as_str).collect();
    let expected = if codes.len() > preview.len() {
        format!("{}, ... ({} in total)", preview.join(", "), codes.len())
    } else {
        preview.join(", ")
    };
    findings.push(
        base(Severity::Error, "E1-002", "invalid_coverage_code", contract, entity, label)
            .value(code)
            .description(format!(
                "coverage code {code} is not valid for entity {}",
                entity.entity_type
            ))
            .expected(expected)
            .source("dekkingcodesgroup.xsd")
            .finish(),
    );
}

// ---------------------------------------------------------------------------
// E1-009: code-catalog membership
// ---------------------------------------------------------------------------

fn check_codelist(
    contract: &Contract,
    entity: &EntityNode,
    label: &str,
    value: &str,
    schema: &SchemaLookup,
    findings: &mut Vec<Finding>,
) {
    // Coverage codes have their own check with their own catalog.
    if label.ends_with("_CODE") {
        return;
    }
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    let Some(values) = schema.codelist_for(label) else { return };
    if values.contains(value) {
        return;
    }

    let catalog = schema.codelist_name_for(label).unwrap_or_default();
    let preview: Vec<&str> = values.iter().take(10).map(String::as_str).collect();
    let expected = if values.len() > preview.len() {
        format!("{}, ... ({} in total)", preview.join(", "), values.len())
    } else {
        preview.join(", ")
    };
    findings.push(
        base(Severity::Error, "E1-009", "invalid_code_value", contract, entity, label)
            .value(display_value(value, 50))
            .description(format!("value is not in code catalog {catalog}"))
            .expected(expected)
            .source("codelist.xsd")
            .finish(),
    );
}

// ---------------------------------------------------------------------------
// E1-003: length bounds
// ---------------------------------------------------------------------------

fn check_length(
    contract: &Contract,
    entity: &EntityNode,
    label: &str,
    value: &str,
    schema: &SchemaLookup,
    findings: &mut Vec<Finding>,
) {
    let Some(spec) = schema.format_for(label) else { return };
    let Some(max) = spec.max_length else { return };
    let length = value.chars().count() as u32;
    if length <= max {
        return;
    }
    findings.push(
        base(Severity::Error, "E1-003", "value_too_long", contract, entity, label)
            .value(display_value(value, 50))
            .description(format!("value has {length} characters, format {} allows {max}", spec.name))
            .expected(format!("at most {max} characters"))
            .source("formaten.xsd")
            .finish(),
    );
}

// ---------------------------------------------------------------------------
// E1-004: format rules
// ---------------------------------------------------------------------------

fn check_format(
    contract: &Contract,
    entity: &EntityNode,
    label: &str,
    value: &str,
    schema: &SchemaLookup,
    findings: &mut Vec<Finding>,
) {
    let Some(spec) = schema.format_for(label) else { return };
    let value = value.trim();

    let problem = if spec.base_type == "Numeric" || spec.name.starts_with('N') {
        (!value.chars().all(|c| c.is_ascii_digit()))
            .then(|| ("digits only".to_string(), "value contains non-digit characters".to_string()))
    } else if spec.name == "codeD1" {
        (!is_valid_date(value))
            .then(|| ("a date written as EEJJMMDD".to_string(), "value is not a valid date".to_string()))
    } else if spec.name == "codeJN" {
        (!matches!(value, "J" | "N" | ""))
            .then(|| ("J or N".to_string(), "value is not a J/N indicator".to_string()))
    } else if let Some(pattern) = &spec.pattern {
        match Regex::new(&format!("^(?:{pattern})")) {
            Ok(re) => (!value.is_empty() && !re.is_match(value)).then(|| {
                (format!("a value matching {pattern}"), format!("value does not match pattern {pattern}"))
            }),
            // A pattern the engine cannot compile is a schema-source quirk,
            // not a document problem.
            Err(_) => None,
        }
    } else {
        None
    };

    if let Some((expected, description)) = problem {
        findings.push(
            base(Severity::Error, "E1-004", "invalid_format", contract, entity, label)
                .value(display_value(value, 50))
                .description(format!("{description} (format {})", spec.name))
                .expected(expected)
                .source("formaten.xsd")
                .finish(),
        );
    }
}

/// EEJJMMDD date check: century-aware leap years, real month lengths.
/// Empty values pass; presence is the required-attribute check's concern.
fn is_valid_date(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    if value.len() != 8 || !value.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let year: i32 = value[0..4].parse().unwrap_or(0);
    let month: u32 = value[4..6].parse().unwrap_or(0);
    let day: u32 = value[6..8].parse().unwrap_or(0);
    if !(1..=12).contains(&month) || day == 0 {
        return false;
    }
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    let max_day = match month {
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => 31,
    };
    day <= max_day
}

// ---------------------------------------------------------------------------
// E1-010: decimal precision
// ---------------------------------------------------------------------------

fn check_decimal(
    contract: &Contract,
    entity: &EntityNode,
    label: &str,
    value: &str,
    schema: &SchemaLookup,
    findings: &mut Vec<Finding>,
) {
    if value.trim().is_empty() || !schema.is_decimal_attribute(label) {
        return;
    }
    let Err(violation) = schema.validate_decimal_precision(label, value) else { return };

    let expected = match schema.format_for(label) {
        Some(spec) => format!(
            "at most {} total digits, {} fraction digits",
            spec.effective_total_digits()
                .map_or_else(|| "unlimited".to_string(), |d| d.to_string()),
            spec.effective_fraction_digits()
                .map_or_else(|| "unlimited".to_string(), |d| d.to_string()),
        ),
        None => "a decimal within the format's digit budget".to_string(),
    };
    findings.push(
        base(Severity::Error, "E1-010", "decimal_precision", contract, entity, label)
            .value(display_value(value.trim(), 50))
            .description(violation.to_string())
            .expected(expected)
            .source("formaten.xsd")
            .finish(),
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FORMATS: &str = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:simpleType name="AFDC010">
            <xs:restriction base="xs:string"><xs:maxLength value="10"/></xs:restriction>
          </xs:simpleType>
          <xs:simpleType name="codeB2">
            <xs:restriction base="fm:Bn"><xs:fractionDigits value="2"/></xs:restriction>
          </xs:simpleType>
          <xs:simpleType name="Bn">
            <xs:restriction base="xs:decimal"><xs:totalDigits value="15"/></xs:restriction>
          </xs:simpleType>
          <xs:simpleType name="codeD1">
            <xs:restriction base="xs:string"><xs:length value="8"/></xs:restriction>
          </xs:simpleType>
          <xs:simpleType name="codeJN">
            <xs:restriction base="xs:string"><xs:length value="1"/></xs:restriction>
          </xs:simpleType>
          <xs:simpleType name="N5">
            <xs:restriction base="xs:string"><xs:maxLength value="5"/></xs:restriction>
          </xs:simpleType>
        </xs:schema>"#;

    const CODELISTS: &str = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:simpleType name="ADNBRANCHE">
            <xs:restriction base="xs:string">
              <xs:enumeration value="020"/>
              <xs:enumeration value="037"/>
            </xs:restriction>
          </xs:simpleType>
        </xs:schema>"#;

    const ATTRIBUTES: &str = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:simpleType name="_POLNR">
            <xs:restriction base="fm:AFDC010"/>
          </xs:simpleType>
          <xs:simpleType name="_BTP">
            <xs:restriction base="fm:codeB2"/>
          </xs:simpleType>
          <xs:simpleType name="_INGDAT">
            <xs:restriction base="fm:codeD1"/>
          </xs:simpleType>
          <xs:simpleType name="_MUTEFG">
            <xs:restriction base="fm:codeJN"/>
          </xs:simpleType>
          <xs:simpleType name="_BRANCHE">
            <xs:restriction base="cl:ADNBRANCHE"/>
          </xs:simpleType>
          <xs:simpleType name="_VOLGNUM">
            <xs:restriction base="fm:N5"/>
          </xs:simpleType>
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
              <xs:element name="PP_BRANCHE"/>
              <xs:element name="PP_MUTEFG"/>
            </xs:sequence>
          </xs:complexType>
          <xs:complexType name="AN">
            <xs:sequence>
              <xs:element name="AN_VOLGNUM"/>
              <xs:element name="AN_BTP"/>
              <xs:group ref="dg:AN_CODEGroup"/>
            </xs:sequence>
          </xs:complexType>
        </xs:schema>"#;

    const COVERAGE: &str = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:group name="AN_CODEGroup">
            <xs:sequence>
              <xs:element name="AN_CODE">
                <xs:simpleType>
                  <xs:restriction base="xs:string">
                    <xs:enumeration value="1001"/>
                    <xs:enumeration value="1002"/>
                  </xs:restriction>
                </xs:simpleType>
              </xs:element>
            </xs:sequence>
          </xs:group>
        </xs:schema>"#;

    fn lookup() -> SchemaLookup {
        SchemaLookup::from_sources(FORMATS, CODELISTS, ATTRIBUTES, ENTITIES, COVERAGE).unwrap()
    }

    fn node(kind: &str, ordinal: Option<u32>, attrs: &[(&str, &str)]) -> EntityNode {
        let mut node = EntityNode::new(kind);
        node.ordinal = ordinal;
        for (k, v) in attrs {
            node.attributes.insert((*k).to_string(), (*v).to_string());
        }
        node
    }

    fn batch_of(entities: Vec<EntityNode>) -> Batch {
        Batch {
            contracts: vec![Contract {
                number: "P1".into(),
                branch: "037".into(),
                entities,
            }],
            source: None,
        }
    }

    fn codes(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.code.as_str()).collect()
    }

    fn complete_al() -> EntityNode {
        node(
            "AL",
            Some(1),
            &[
                ("AL_VOLGNUM", "1"),
                ("AL_ENTITEI", "AL"),
                ("AL_CNTRNUM", "P1"),
            ],
        )
    }

    #[test]
    fn clean_entity_yields_no_findings() {
        let batch = batch_of(vec![complete_al()]);
        assert!(check(&batch, &lookup()).is_empty());
    }

    #[test]
    fn required_attributes_are_enforced() {
        let batch = batch_of(vec![node("AL", None, &[("AL_CNTRNUM", "  ")])]);
        let findings = check(&batch, &lookup());
        // VOLGNUM (no ordinal), ENTITEI (absent), CNTRNUM (blank).
        assert_eq!(codes(&findings), ["E1-007", "E1-007", "E1-007"]);
        let labels: Vec<&str> = findings.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, ["AL_VOLGNUM", "AL_ENTITEI", "AL_CNTRNUM"]);
    }

    #[test]
    fn misplaced_label_is_reported_once_and_skips_value_checks() {
        let mut al = complete_al();
        // A PP attribute on an AL entity: misplaced, and its value would
        // also fail the date format if it were checked.
        al.attributes.insert("PP_INGDAT".into(), "notadate".into());
        let batch = batch_of(vec![al]);
        let findings = check(&batch, &lookup());
        assert_eq!(codes(&findings), ["E1-005"]);
    }

    #[test]
    fn unknown_prefix_is_ignored() {
        let mut al = complete_al();
        al.attributes.insert("QQ_WHATEVER".into(), "x".into());
        let batch = batch_of(vec![al]);
        assert!(check(&batch, &lookup()).is_empty());
    }

    #[test]
    fn undeclared_label_for_the_owning_entity() {
        let mut al = complete_al();
        al.attributes.insert("AL_NOSUCH".into(), "x".into());
        let batch = batch_of(vec![al]);
        let findings = check(&batch, &lookup());
        assert_eq!(codes(&findings), ["E1-001"]);
    }

    #[test]
    fn coverage_code_outside_the_registered_set() {
        let an = node("AN", Some(1), &[("AN_VOLGNUM", "1"), ("AN_CODE", "3002")]);
        let batch = batch_of(vec![an]);
        let findings = check(&batch, &lookup());
        assert_eq!(codes(&findings), ["E1-002"]);
        assert_eq!(findings[0].expected, "1001, 1002");
    }

    #[test]
    fn codelist_value_outside_the_catalog() {
        let mut pp = node(
            "PP",
            Some(1),
            &[
                ("PP_VOLGNUM", "1"),
                ("PP_ENTITEI", "PP"),
                ("PP_INGDAT", "20250101"),
                ("PP_BTP", "100.00"),
            ],
        );
        pp.attributes.insert("PP_BRANCHE".into(), "999".into());
        let batch = batch_of(vec![pp]);
        let findings = check(&batch, &lookup());
        assert_eq!(codes(&findings), ["E1-009"]);
        assert!(findings[0].expected.contains("037"));
    }

    #[test]
    fn length_and_format_and_decimal_violations() {
        let mut pp = node(
            "PP",
            Some(1),
            &[
                ("PP_VOLGNUM", "1"),
                ("PP_ENTITEI", "PP"),
                ("PP_INGDAT", "20250230"),
                ("PP_BTP", "100.505"),
                ("PP_MUTEFG", "X"),
            ],
        );
        pp.attributes.insert("PP_BRANCHE".into(), "037".into());
        let batch = batch_of(vec![pp]);
        let findings = check(&batch, &lookup());
        let mut found = codes(&findings);
        found.sort_unstable();
        assert_eq!(found, ["E1-004", "E1-004", "E1-010"]);

        let al = node("AL", Some(1), &[
            ("AL_VOLGNUM", "1"),
            ("AL_ENTITEI", "AL"),
            ("AL_CNTRNUM", "P1"),
            ("AL_POLNR", "WAY-TOO-LONG-POLICY-NUMBER"),
        ]);
        let findings = check(&batch_of(vec![al]), &lookup());
        assert_eq!(codes(&findings), ["E1-003"]);
    }

    #[test]
    fn leap_day_dates() {
        assert!(is_valid_date("20240229"));
        assert!(!is_valid_date("20250229"));
        assert!(is_valid_date("20000229"));
        assert!(!is_valid_date("19000229"));
        assert!(!is_valid_date("20251301"));
        assert!(!is_valid_date("20250100"));
        assert!(is_valid_date(""));
        assert!(!is_valid_date("2025010"));
    }

    #[test]
    fn numeric_formats_reject_non_digits() {
        let mut al = complete_al();
        al.attributes.insert("AL_VOLGNUM".into(), "12a".into());
        let batch = batch_of(vec![al]);
        let findings = check(&batch, &lookup());
        assert_eq!(codes(&findings), ["E1-004"]);
    }
}
