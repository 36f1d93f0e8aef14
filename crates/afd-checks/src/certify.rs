//! # Certification Pipeline
//!
//! The final, sequential stage. Pending goes to Rejected as soon as any
//! blocking finding exists among the accumulated results; otherwise the
//! pipeline verifies batch completeness, re-checks the structural grammar
//! against the original input, and issues a [`Certificate`] with a content
//! hash of the document. Rejection is not fatal: all findings are returned
//! either way.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::info;

use afd_catalog::StructureLookup;
use afd_core::certificate::encode_digest;
use afd_core::{Certificate, Finding, Pass, Severity};
use afd_document::{parse_batch, Batch, Contract};

use crate::structure;

const SOURCE: &str = "certification";

/// Entity kinds every transmittable contract must carry.
const REQUIRED_TOP_LEVEL: &[&str] = &["AL", "PP"];

/// Names of the checks a certificate attests to.
const CHECKS_PERFORMED: &[&str] = &[
    "structural grammar",
    "schema labels and formats",
    "business rules",
    "relational rules",
    "encoding and data quality",
    "batch completeness",
];

/// Run the certification stage. Returns the stage's own findings and, when
/// nothing blocks, the certificate.
pub fn run(
    batch: &Batch,
    prior: &[Finding],
    input: &str,
    structure: &StructureLookup,
) -> (Vec<Finding>, Option<Certificate>) {
    let blocking = prior.iter().filter(|f| f.is_blocking()).count();
    if blocking > 0 {
        let finding =
            base(Severity::Error, "EF-001", "blocking_findings_present")
                .contract("BATCH")
                .value(format!("{blocking} blocking findings"))
                .description(format!(
                    "certification refused: {blocking} blocking findings remain unresolved"
                ))
                .expected("zero blocking findings")
                .finish();
        info!(blocking, "batch rejected");
        return (vec![finding], None);
    }

    let mut findings = Vec::new();
    for contract in &batch.contracts {
        check_required_entities(contract, &mut findings);
        check_policy_numbers(contract, &mut findings);
        check_premium_presence(contract, &mut findings);
    }
    check_structure_again(batch, input, structure, &mut findings);

    if findings.iter().any(Finding::is_blocking) {
        info!("batch rejected during final completeness checks");
        return (findings, None);
    }

    let warnings =
        prior.iter().chain(&findings).filter(|f| f.severity == Severity::Warning).count();
    let certificate = Certificate {
        is_valid: true,
        timestamp: Utc::now(),
        source: batch.source.clone().unwrap_or_default(),
        contract_count: batch.contracts.len(),
        checks_performed: CHECKS_PERFORMED.iter().map(|s| s.to_string()).collect(),
        passes_run: passes_run(prior),
        critical_entities_present: REQUIRED_TOP_LEVEL
            .iter()
            .map(|kind| {
                let all_present = batch
                    .contracts
                    .iter()
                    .all(|c| c.entity_types_recursive().contains(kind));
                (kind.to_string(), all_present)
            })
            .collect(),
        warnings_acknowledged: warnings,
        content_sha256: encode_digest(&Sha256::digest(input.as_bytes())),
    };
    info!(contracts = certificate.contract_count, "certificate issued");
    (findings, Some(certificate))
}

fn base(severity: Severity, code: &str, rule_type: &str) -> afd_core::FindingBuilder {
    Finding::builder(severity, Pass::Certification, code, rule_type).source(SOURCE)
}

// ---------------------------------------------------------------------------
// EF-002: required entities per contract
// ---------------------------------------------------------------------------

fn check_required_entities(contract: &Contract, findings: &mut Vec<Finding>) {
    let present = contract.entity_types_recursive();
    let missing: Vec<&str> =
        REQUIRED_TOP_LEVEL.iter().copied().filter(|k| !present.contains(k)).collect();
    if missing.is_empty() {
        return;
    }
    findings.push(
        base(Severity::Error, "EF-002", "missing_required_entity")
            .contract(&contract.number)
            .branch(&contract.branch)
            .entity(missing.join("/"))
            .value(missing.join(", "))
            .description(format!("contract is missing required entities: {}", missing.join(", ")))
            .expected("at least one AL and one PP entity")
            .finish(),
    );
}

// ---------------------------------------------------------------------------
// EF-004: policy numbers
// ---------------------------------------------------------------------------

fn check_policy_numbers(contract: &Contract, findings: &mut Vec<Finding>) {
    for al in contract.entities_of_type_recursive("AL") {
        if al.attr_non_empty("POLNR").is_some() || al.attr_non_empty("CPOLNR").is_some() {
            continue;
        }
        findings.push(
            base(Severity::Error, "EF-004", "missing_policy_number")
                .contract(&contract.number)
                .branch(&contract.branch)
                .entity("AL")
                .label("AL_POLNR")
                .description("administrative entity carries no policy number")
                .expected("AL_POLNR or AL_CPOLNR")
                .line(al.line)
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// EF-005: premium presence (warning only)
// ---------------------------------------------------------------------------

fn check_premium_presence(contract: &Contract, findings: &mut Vec<Finding>) {
    for pp in contract.entities_of_type_recursive("PP") {
        if pp.attr_non_empty("BTP").is_some() {
            continue;
        }
        findings.push(
            base(Severity::Warning, "EF-005", "missing_premium")
                .contract(&contract.number)
                .branch(&contract.branch)
                .entity("PP")
                .label("PP_BTP")
                .description("premium entity carries no gross premium")
                .expected("a PP_BTP value")
                .line(pp.line)
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// EF-003: structural re-check against the original input
// ---------------------------------------------------------------------------

/// The structure pass ran on the same model, so this normally finds
/// nothing; it exists to catch drift between accumulated findings and the
/// document actually being certified.
fn check_structure_again(
    batch: &Batch,
    input: &str,
    structure: &StructureLookup,
    findings: &mut Vec<Finding>,
) {
    let problem = match parse_batch(input) {
        Ok(reparsed) => {
            let errors = structure::check(&reparsed, structure)
                .into_iter()
                .filter(|f| f.is_blocking())
                .count();
            if errors == 0 && reparsed.contracts.len() == batch.contracts.len() {
                return;
            }
            format!("structural re-check found {errors} blocking findings")
        }
        Err(err) => format!("document no longer parses: {err}"),
    };
    findings.push(
        base(Severity::Error, "EF-003", "structure_recheck_failed")
            .contract("BATCH")
            .description(problem)
            .expected("a structurally valid document at certification time")
            .finish(),
    );
}

fn passes_run(prior: &[Finding]) -> Vec<String> {
    let mut passes: Vec<String> = Vec::new();
    for finding in prior {
        let name = finding.pass.as_str().to_string();
        if !passes.contains(&name) {
            passes.push(name);
        }
    }
    passes.push(Pass::Certification.as_str().to_string());
    passes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
