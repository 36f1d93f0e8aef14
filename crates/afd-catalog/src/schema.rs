//! # Schema Lookup
//!
//! The [`SchemaLookup`] aggregates five declarative schema sources into one
//! immutable query surface:
//!
//! - the format catalog (named [`FormatSpec`]s with one-level inheritance of
//!   digit budgets),
//! - code catalogs (enumerated value sets),
//! - attribute bindings (attribute suffix to format or code catalog),
//! - entity definitions (which attributes each entity kind carries),
//! - coverage-code groups (which coverage codes each coverage entity allows).
//!
//! Attribute bindings are keyed by suffix: the entity prefix of a label is
//! stripped before lookup, so `VP_ANAAM` and `HP_ANAAM` share the `_ANAAM`
//! binding.
//!
//! The business-required attribute table is not part of the declarative
//! sources; it comes from the transmission protocol and is compiled in.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use afd_core::xml::{self, XmlElement};

use crate::error::CatalogError;
use crate::formats::{DecimalViolation, FormatSpec};

// ---------------------------------------------------------------------------
// Required attributes (protocol table, not schema-derived)
// ---------------------------------------------------------------------------

const REQUIRED_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("AL", &["VOLGNUM", "ENTITEI", "CNTRNUM"]),
    ("PP", &["VOLGNUM", "ENTITEI", "INGDAT", "BTP"]),
    ("BO", &["VOLGNUM", "ENTITEI", "BRANCHE"]),
    ("VP", &["VOLGNUM", "ENTITEI"]),
    ("AN", &["VOLGNUM", "CODE"]),
    ("CA", &["VOLGNUM", "CODE"]),
    ("AH", &["VOLGNUM", "CODE"]),
    ("DA", &["VOLGNUM"]),
    ("DR", &["VOLGNUM", "CODE"]),
    ("PV", &["VOLGNUM"]),
    ("AD", &["VOLGNUM"]),
    ("RC", &["VOLGNUM"]),
    ("CM", &["VOLGNUM"]),
];

// ---------------------------------------------------------------------------
// Attribute bindings
// ---------------------------------------------------------------------------

/// What an attribute suffix is bound to in the attribute catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeBinding {
    /// Bound to a named format (`fm:` prefix in the source).
    Format(String),
    /// Bound to a code catalog (`cl:` prefix in the source).
    Codelist(String),
}

impl AttributeBinding {
    pub fn target(&self) -> &str {
        match self {
            Self::Format(name) | Self::Codelist(name) => name,
        }
    }
}

// ---------------------------------------------------------------------------
// SchemaLookup
// ---------------------------------------------------------------------------

/// Immutable lookup tables built from the five schema sources.
#[derive(Debug, Default)]
pub struct SchemaLookup {
    formats: HashMap<String, FormatSpec>,
    codelists: HashMap<String, BTreeSet<String>>,
    /// Keyed by attribute suffix including the underscore, e.g. `_ANAAM`.
    attributes: HashMap<String, AttributeBinding>,
    /// Entity kind to the full attribute labels it may carry.
    entities: HashMap<String, BTreeSet<String>>,
    /// Coverage entity kind to its allowed coverage codes.
    coverage_codes: HashMap<String, BTreeSet<String>>,
}

/// Strip the entity prefix of a label, keeping the underscore:
/// `VP_ANAAM` becomes `_ANAAM`.
fn suffix_key(attribute: &str) -> String {
    match attribute.split_once('_') {
        Some((_, rest)) => format!("_{rest}"),
        None => attribute.to_string(),
    }
}

/// The bare suffix without underscore: `AN_CODE` becomes `CODE`.
fn bare_suffix(attribute: &str) -> &str {
    match attribute.split_once('_') {
        Some((_, rest)) => rest,
        None => attribute,
    }
}

impl SchemaLookup {
    /// Build the lookup from the five schema source documents.
    pub fn from_sources(
        formats_src: &str,
        codelists_src: &str,
        attributes_src: &str,
        entities_src: &str,
        coverage_src: &str,
    ) -> Result<Self, CatalogError> {
        let mut lookup = Self::default();
        lookup.load_formats(formats_src, "formats catalog")?;
        lookup.load_codelists(codelists_src, "code catalog")?;
        lookup.load_attributes(attributes_src, "attribute catalog")?;
        lookup.load_entities(entities_src, "entity catalog")?;
        lookup.load_coverage_groups(coverage_src, "coverage-code groups")?;
        debug!(
            formats = lookup.formats.len(),
            codelists = lookup.codelists.len(),
            attributes = lookup.attributes.len(),
            entities = lookup.entities.len(),
            coverage_groups = lookup.coverage_codes.len(),
            "schema lookup built"
        );
        Ok(lookup)
    }

    // -- queries ------------------------------------------------------------

    pub fn has_entity(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    /// Whether the full label is a known attribute of the entity kind. An
    /// unknown entity kind accepts nothing.
    pub fn is_valid_attribute_for_entity(&self, entity: &str, attribute: &str) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|attrs| attrs.contains(attribute))
    }

    pub fn entity_attributes(&self, entity: &str) -> Option<&BTreeSet<String>> {
        self.entities.get(entity)
    }

    /// Entity kinds that own the given full label, for misplaced-label
    /// diagnostics.
    pub fn entities_owning(&self, attribute: &str) -> Vec<&str> {
        let mut owners: Vec<&str> = self
            .entities
            .iter()
            .filter(|(_, attrs)| attrs.contains(attribute))
            .map(|(entity, _)| entity.as_str())
            .collect();
        owners.sort_unstable();
        owners
    }

    /// Entities without a coverage-code group accept any code; the group is
    /// the restriction, not the permission.
    pub fn is_valid_coverage_code(&self, entity: &str, code: &str) -> bool {
        match self.coverage_codes.get(entity) {
            Some(codes) => codes.contains(code),
            None => true,
        }
    }

    pub fn coverage_codes_for(&self, entity: &str) -> Option<&BTreeSet<String>> {
        self.coverage_codes.get(entity)
    }

    pub fn binding_for(&self, attribute: &str) -> Option<&AttributeBinding> {
        self.attributes.get(&suffix_key(attribute))
    }

    /// Format spec bound to the attribute, entity prefix ignored.
    pub fn format_for(&self, attribute: &str) -> Option<&FormatSpec> {
        self.binding_for(attribute)
            .and_then(|binding| self.formats.get(binding.target()))
    }

    pub fn format_by_name(&self, name: &str) -> Option<&FormatSpec> {
        self.formats.get(name)
    }

    pub fn is_codelist_attribute(&self, attribute: &str) -> bool {
        matches!(self.binding_for(attribute), Some(AttributeBinding::Codelist(_)))
    }

    pub fn codelist_name_for(&self, attribute: &str) -> Option<&str> {
        match self.binding_for(attribute)? {
            AttributeBinding::Codelist(name) => Some(name.as_str()),
            AttributeBinding::Format(_) => None,
        }
    }

    pub fn codelist_for(&self, attribute: &str) -> Option<&BTreeSet<String>> {
        self.codelists.get(self.codelist_name_for(attribute)?)
    }

    pub fn required_attributes(&self, entity: &str) -> &'static [&'static str] {
        REQUIRED_ATTRIBUTES
            .iter()
            .find(|(e, _)| *e == entity)
            .map(|(_, attrs)| *attrs)
            .unwrap_or(&[])
    }

    /// The required table holds bare suffixes; both `AN_CODE` and `CODE`
    /// match the `CODE` entry.
    pub fn is_required_attribute(&self, entity: &str, attribute: &str) -> bool {
        let required = self.required_attributes(entity);
        required.contains(&bare_suffix(attribute)) || required.contains(&attribute)
    }

    pub fn is_decimal_attribute(&self, attribute: &str) -> bool {
        self.format_for(attribute).is_some_and(FormatSpec::is_decimal)
    }

    pub fn is_amount_attribute(&self, attribute: &str) -> bool {
        self.format_for(attribute).is_some_and(FormatSpec::is_amount)
    }

    /// Decimal-budget validation for an attribute value. Attributes without
    /// a format binding pass vacuously.
    pub fn validate_decimal_precision(
        &self,
        attribute: &str,
        value: &str,
    ) -> Result<(), DecimalViolation> {
        match self.format_for(attribute) {
            Some(spec) => spec.validate_decimal(value),
            None => Ok(()),
        }
    }

    // -- loaders ------------------------------------------------------------

    fn load_formats(&mut self, src: &str, source_name: &str) -> Result<(), CatalogError> {
        let root = parse_source(src, source_name)?;
        for simple_type in root.find_all("simpleType") {
            let Some(name) = simple_type.attr("name") else { continue };
            let mut spec = FormatSpec { name: name.to_string(), ..FormatSpec::default() };

            if let Some(restriction) = simple_type.find("restriction") {
                let base = restriction.attr("base").unwrap_or("");
                let base_local = base.rsplit_once(':').map_or(base, |(_, l)| l);
                spec.base_type = base_local.to_string();
                if !matches!(base_local, "" | "string" | "decimal" | "gYear" | "base64Binary") {
                    spec.parent_format = Some(base_local.to_string());
                }

                for facet in &restriction.children {
                    let Some(value) = facet.attr("value") else { continue };
                    match facet.name.as_str() {
                        "minLength" => spec.min_length = Some(facet_int(source_name, "minLength", value)?),
                        "maxLength" => spec.max_length = Some(facet_int(source_name, "maxLength", value)?),
                        "length" => {
                            let n = facet_int(source_name, "length", value)?;
                            spec.min_length = Some(n);
                            spec.max_length = Some(n);
                        }
                        "pattern" => spec.pattern = Some(value.to_string()),
                        "totalDigits" => spec.total_digits = Some(facet_int(source_name, "totalDigits", value)?),
                        "fractionDigits" => {
                            spec.fraction_digits = Some(facet_int(source_name, "fractionDigits", value)?)
                        }
                        _ => {}
                    }
                }
            }

            self.formats.insert(name.to_string(), spec);
        }

        self.resolve_format_inheritance()
    }

    /// Pull digit budgets down the parent chain. Chains are short in
    /// practice; a cycle in the sources is a fatal defect.
    fn resolve_format_inheritance(&mut self) -> Result<(), CatalogError> {
        let names: Vec<String> = self.formats.keys().cloned().collect();
        for name in names {
            let Some(start) = self.formats.get(&name) else { continue };
            let mut total = start.total_digits;
            let mut fraction = start.fraction_digits;
            let mut seen = vec![name.clone()];
            let mut next = start.parent_format.clone();

            while let Some(parent_name) = next {
                if seen.contains(&parent_name) {
                    return Err(CatalogError::FormatCycle { format: parent_name });
                }
                let Some(parent) = self.formats.get(&parent_name) else { break };
                total = total.or(parent.total_digits);
                fraction = fraction.or(parent.fraction_digits);
                seen.push(parent_name);
                next = parent.parent_format.clone();
            }

            if let Some(spec) = self.formats.get_mut(&name) {
                spec.total_digits = total;
                spec.fraction_digits = fraction;
            }
        }
        Ok(())
    }

    fn load_codelists(&mut self, src: &str, source_name: &str) -> Result<(), CatalogError> {
        let root = parse_source(src, source_name)?;
        for simple_type in root.find_all("simpleType") {
            let Some(name) = simple_type.attr("name") else { continue };
            let Some(restriction) = simple_type.find("restriction") else { continue };
            let values: BTreeSet<String> = restriction
                .find_all("enumeration")
                .filter_map(|e| e.attr("value"))
                .map(str::to_string)
                .collect();
            if !values.is_empty() {
                self.codelists.insert(name.to_string(), values);
            }
        }
        Ok(())
    }

    fn load_attributes(&mut self, src: &str, source_name: &str) -> Result<(), CatalogError> {
        let root = parse_source(src, source_name)?;
        for simple_type in root.find_all("simpleType") {
            let Some(name) = simple_type.attr("name") else { continue };
            let Some(restriction) = simple_type.find("restriction") else { continue };
            let base = restriction.attr("base").unwrap_or("");
            let binding = match base.split_once(':') {
                Some(("cl", target)) => AttributeBinding::Codelist(target.to_string()),
                Some((_, target)) => AttributeBinding::Format(target.to_string()),
                // Bare references are rare; a known code catalog wins.
                None if self.codelists.contains_key(base) => {
                    AttributeBinding::Codelist(base.to_string())
                }
                None => AttributeBinding::Format(base.to_string()),
            };
            self.attributes.insert(name.to_string(), binding);
        }
        Ok(())
    }

    fn load_entities(&mut self, src: &str, source_name: &str) -> Result<(), CatalogError> {
        let root = parse_source(src, source_name)?;
        for complex_type in root.find_all("complexType") {
            let Some(name) = complex_type.attr("name") else { continue };
            if name.len() != 2 {
                continue;
            }
            let Some(sequence) = complex_type.find("sequence") else { continue };

            let mut attributes = BTreeSet::new();
            for child in &sequence.children {
                match child.name.as_str() {
                    "element" => {
                        if let Some(elem_name) = child.attr("name") {
                            attributes.insert(elem_name.to_string());
                        }
                    }
                    "group" => {
                        // <xs:group ref="dg:AN_CODEGroup"/> stands in for
                        // the AN_CODE attribute.
                        let reference = child.attr("ref").unwrap_or("");
                        let local = reference.rsplit_once(':').map_or(reference, |(_, l)| l);
                        if let Some(stem) = local.strip_suffix("Group") {
                            if stem.ends_with("_CODE") {
                                attributes.insert(stem.to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }

            if !attributes.is_empty() {
                self.entities.insert(name.to_string(), attributes);
            }
        }
        Ok(())
    }

    fn load_coverage_groups(&mut self, src: &str, source_name: &str) -> Result<(), CatalogError> {
        let root = parse_source(src, source_name)?;
        for group in root.find_all("group") {
            let Some(name) = group.attr("name") else { continue };
            let Some(entity) = name.strip_suffix("_CODEGroup") else { continue };

            let mut codes = BTreeSet::new();
            for element in group.descendants() {
                if element.name != "element" {
                    continue;
                }
                let enums = element
                    .find("simpleType")
                    .and_then(|st| st.find("restriction"))
                    .into_iter()
                    .flat_map(|r| r.find_all("enumeration"));
                for enumeration in enums {
                    if let Some(value) = enumeration.attr("value") {
                        codes.insert(value.to_string());
                    }
                }
            }

            if !codes.is_empty() {
                self.coverage_codes.insert(entity.to_string(), codes);
            }
        }
        Ok(())
    }
}

fn parse_source(src: &str, source_name: &str) -> Result<XmlElement, CatalogError> {
    xml::parse(src).map_err(|source| CatalogError::Xml {
        source_name: source_name.to_string(),
        source,
    })
}

fn facet_int(source_name: &str, facet: &'static str, value: &str) -> Result<u32, CatalogError> {
    value.parse().map_err(|_| CatalogError::InvalidFacet {
        source_name: source_name.to_string(),
        facet,
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FORMATS: &str = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:simpleType name="AFDC070">
            <xs:restriction base="xs:string">
              <xs:maxLength value="70"/>
            </xs:restriction>
          </xs:simpleType>
          <xs:simpleType name="Bn">
            <xs:restriction base="xs:decimal">
              <xs:totalDigits value="15"/>
            </xs:restriction>
          </xs:simpleType>
          <xs:simpleType name="codeB2">
            <xs:restriction base="fm:Bn">
              <xs:fractionDigits value="2"/>
            </xs:restriction>
          </xs:simpleType>
          <xs:simpleType name="codeD1">
            <xs:restriction base="xs:string">
              <xs:length value="8"/>
            </xs:restriction>
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
          <xs:simpleType name="_ANAAM">
            <xs:restriction base="fm:AFDC070"/>
          </xs:simpleType>
          <xs:simpleType name="_BTP">
            <xs:restriction base="fm:codeB2"/>
          </xs:simpleType>
          <xs:simpleType name="_BRANCHE">
            <xs:restriction base="cl:ADNBRANCHE"/>
          </xs:simpleType>
        </xs:schema>"#;

    const ENTITIES: &str = r#"
        <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:complexType name="PP">
            <xs:sequence>
              <xs:element name="PP_VOLGNUM"/>
              <xs:element name="PP_BTP"/>
            </xs:sequence>
          </xs:complexType>
          <xs:complexType name="AN">
            <xs:sequence>
              <xs:element name="AN_VOLGNUM"/>
              <xs:group ref="dg:AN_CODEGroup"/>
            </xs:sequence>
          </xs:complexType>
          <xs:complexType name="NotAnEntity">
            <xs:sequence>
              <xs:element name="IGNORED"/>
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

    #[test]
    fn formats_inherit_digit_budgets() {
        let lookup = lookup();
        let derived = lookup.format_by_name("codeB2").unwrap();
        assert_eq!(derived.total_digits, Some(15));
        assert_eq!(derived.fraction_digits, Some(2));
        assert_eq!(derived.parent_format.as_deref(), Some("Bn"));
        let fixed = lookup.format_by_name("codeD1").unwrap();
        assert_eq!((fixed.min_length, fixed.max_length), (Some(8), Some(8)));
    }

    #[test]
    fn inheritance_cycle_is_fatal() {
        let cyclic = r#"
            <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
              <xs:simpleType name="A"><xs:restriction base="fm:B"/></xs:simpleType>
              <xs:simpleType name="B"><xs:restriction base="fm:A"/></xs:simpleType>
            </xs:schema>"#;
        let err = SchemaLookup::from_sources(cyclic, CODELISTS, ATTRIBUTES, ENTITIES, COVERAGE);
        assert!(matches!(err, Err(CatalogError::FormatCycle { .. })));
    }

    #[test]
    fn attribute_lookup_strips_entity_prefix() {
        let lookup = lookup();
        let spec = lookup.format_for("VP_ANAAM").unwrap();
        assert_eq!(spec.name, "AFDC070");
        // Any entity prefix resolves to the same suffix binding.
        assert_eq!(lookup.format_for("HP_ANAAM").unwrap().name, "AFDC070");
        assert!(lookup.format_for("VP_NOSUCH").is_none());
    }

    #[test]
    fn codelist_bindings_resolve_values() {
        let lookup = lookup();
        assert!(lookup.is_codelist_attribute("BO_BRANCHE"));
        assert_eq!(lookup.codelist_name_for("BO_BRANCHE"), Some("ADNBRANCHE"));
        let values = lookup.codelist_for("BO_BRANCHE").unwrap();
        assert!(values.contains("037"));
        assert!(!values.contains("999"));
        assert!(!lookup.is_codelist_attribute("PP_BTP"));
    }

    #[test]
    fn entity_membership_includes_code_groups() {
        let lookup = lookup();
        assert!(lookup.is_valid_attribute_for_entity("PP", "PP_BTP"));
        assert!(!lookup.is_valid_attribute_for_entity("PP", "AN_CODE"));
        // The group reference materializes as the AN_CODE attribute.
        assert!(lookup.is_valid_attribute_for_entity("AN", "AN_CODE"));
        assert!(!lookup.has_entity("NotAnEntity"));
        assert_eq!(lookup.entities_owning("PP_BTP"), vec!["PP"]);
    }

    #[test]
    fn coverage_codes_restrict_only_listed_entities() {
        let lookup = lookup();
        assert!(lookup.is_valid_coverage_code("AN", "1001"));
        assert!(!lookup.is_valid_coverage_code("AN", "3002"));
        // No group for CA in these sources, so any code passes.
        assert!(lookup.is_valid_coverage_code("CA", "9999"));
    }

    #[test]
    fn required_table_matches_bare_and_full_labels() {
        let lookup = lookup();
        assert!(lookup.is_required_attribute("AL", "AL_CNTRNUM"));
        assert!(lookup.is_required_attribute("AL", "CNTRNUM"));
        assert!(lookup.is_required_attribute("AN", "AN_CODE"));
        assert!(!lookup.is_required_attribute("AL", "AL_BTP"));
        assert!(lookup.required_attributes("ZZ").is_empty());
    }

    #[test]
    fn decimal_precision_goes_through_the_binding() {
        let lookup = lookup();
        assert!(lookup.is_decimal_attribute("PP_BTP"));
        assert!(lookup.is_amount_attribute("PP_BTP"));
        assert!(lookup.validate_decimal_precision("PP_BTP", "125,50").is_ok());
        assert!(lookup.validate_decimal_precision("PP_BTP", "125.505").is_err());
        // Unbound attributes pass vacuously.
        assert!(lookup.validate_decimal_precision("XX_UNBOUND", "junk").is_ok());
    }
}
