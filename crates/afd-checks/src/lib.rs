//! # afd-checks — Validation Passes and Certification
//!
//! The validation passes that turn a parsed [`Batch`] into findings:
//!
//! - [`structure`] — placement against the nesting grammar, required
//!   children.
//! - [`schema`] — label ownership, coverage codes, code catalogs, lengths,
//!   formats, decimal precision, required attributes.
//! - [`business`] — cross-entity invariants: ordinal sequences, premium
//!   sums, date ordering, checksums, branch compatibility.
//! - [`relations`] — "if guard then expectation" rules over a path-query
//!   view of the contract.
//! - [`quality`] — encoding and data-quality checks on the raw input and
//!   on individual values.
//! - [`certify`] — the final gate that aggregates everything and issues a
//!   [`Certificate`] when nothing blocks.
//!
//! Each pass is a pure function over `(Batch, lookups)`; none depends on
//! another pass's output. Only certification is sequential, since it
//! consumes the accumulated findings.
//!
//! [`Certificate`]: afd_core::Certificate

pub mod business;
pub mod certify;
pub mod quality;
pub mod relations;
pub mod schema;
pub mod structure;

use tracing::{debug, info};

use afd_catalog::Catalog;
use afd_core::{sort_findings, Finding, Pass, Severity, ValidationOutcome};
use afd_document::{parse_batch, Batch};

pub use relations::RelationRule;

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Runs the full pass sequence against a batch document.
///
/// The catalog is built once and shared; the validator itself is cheap to
/// construct per configuration.
#[derive(Debug, Clone)]
pub struct Validator {
    catalog: Catalog,
    rules: Vec<RelationRule>,
}

impl Validator {
    /// Validator with the built-in relational rule set.
    pub fn new(catalog: Catalog) -> Self {
        Self::with_rules(catalog, relations::builtin_rules())
    }

    /// Validator with a caller-supplied relational rule set.
    pub fn with_rules(catalog: Catalog, rules: Vec<RelationRule>) -> Self {
        Self { catalog, rules }
    }

    /// Validate raw bytes: encoding problems become findings, then the
    /// decoded text goes through [`validate`](Self::validate).
    pub fn validate_bytes(&self, bytes: &[u8]) -> ValidationOutcome {
        let (text, findings) = quality::decode(bytes);
        self.run(&text, findings)
    }

    /// Validate an already-decoded document.
    pub fn validate(&self, input: &str) -> ValidationOutcome {
        self.run(input, Vec::new())
    }

    fn run(&self, input: &str, mut findings: Vec<Finding>) -> ValidationOutcome {
        findings.extend(quality::check_raw(input));

        let batch = match parse_batch(input) {
            Ok(batch) => batch,
            Err(err) => {
                // A document that does not parse still yields a result: one
                // structured finding instead of an abort.
                findings.push(
                    Finding::builder(
                        Severity::Error,
                        Pass::Structure,
                        "E0-001",
                        "document_not_well_formed",
                    )
                    .contract("BATCH")
                    .description(err.to_string())
                    .expected("a well-formed XML batch document")
                    .source("message structure")
                    .finish(),
                );
                sort_findings(&mut findings);
                return ValidationOutcome { findings, certificate: None };
            }
        };

        findings.extend(self.check_batch(&batch));

        let (final_findings, certificate) =
            certify::run(&batch, &findings, input, &self.catalog.structure);
        findings.extend(final_findings);
        sort_findings(&mut findings);

        info!(
            contracts = batch.contracts.len(),
            findings = findings.len(),
            certified = certificate.is_some(),
            "batch run finished"
        );
        ValidationOutcome { findings, certificate }
    }

    /// The order-independent passes over a parsed batch.
    fn check_batch(&self, batch: &Batch) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (pass, result) in [
            ("structure", structure::check(batch, &self.catalog.structure)),
            ("schema", schema::check(batch, &self.catalog.schema)),
            ("business", business::check(batch)),
            ("relations", relations::check(batch, &self.rules)),
            ("quality", quality::check_values(batch)),
        ] {
            debug!(pass, findings = result.len(), "pass finished");
            findings.extend(result);
        }
        findings
    }
}

/// Truncate a value for display in a finding.
pub(crate) fn display_value(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut out: String = value.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_value_truncates_long_values() {
        assert_eq!(display_value("short", 50), "short");
        let long = "x".repeat(60);
        let shown = display_value(&long, 50);
        assert_eq!(shown.chars().count(), 53);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn malformed_document_yields_one_finding_and_no_certificate() {
        let catalog = Catalog::from_sources(
            "<schema/>", "<schema/>", "<schema/>", "<schema/>", "<schema/>", "<schema/>",
        )
        .unwrap();
        let outcome = Validator::new(catalog).validate("<Batch><Contract></Batch>");
        assert!(outcome.certificate.is_none());
        assert_eq!(outcome.findings.iter().filter(|f| f.code == "E0-001").count(), 1);
        assert!(!outcome.is_valid());
    }
}
