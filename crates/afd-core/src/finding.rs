//! # Findings — the validator's product
//!
//! A [`Finding`] records one problem detected by one validation pass. The
//! batch run produces an ordered list of findings; the certification
//! pipeline consumes them and decides whether a [`Certificate`] may be
//! issued.
//!
//! ## Classification Axes
//!
//! - [`Severity`] is the gate: `Error` blocks certification, `Warning` and
//!   `Info` do not.
//! - [`Criticality`] is the triage axis shown to operators. It is a pure
//!   function of `(pass, code, severity)`, computed once when the finding
//!   is built and never mutated afterwards.
//!
//! [`Certificate`]: crate::certificate::Certificate

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::certificate::Certificate;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity of a finding. `Error` is blocking: a single `Error` prevents
/// certificate issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Blocking — must be fixed before the batch can be sent.
    Error,
    /// Reviewable — technically acceptable, needs human review.
    Warning,
    /// Informational — for awareness only.
    Info,
}

impl Severity {
    /// Whether this severity prevents certificate issuance.
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Warning => write!(f, "WARNING"),
            Self::Info => write!(f, "INFO"),
        }
    }
}

// ---------------------------------------------------------------------------
// Criticality
// ---------------------------------------------------------------------------

/// Operator-facing triage level, derived from `(pass, code, severity)`.
///
/// `Critical` means the receiving system house cannot process the batch.
/// `Attention` means technically transmittable but review is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Criticality {
    Critical,
    Attention,
    Info,
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::Attention => write!(f, "ATTENTION"),
            Self::Info => write!(f, "INFO"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pass
// ---------------------------------------------------------------------------

/// Identifies the validation pass that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    /// Structural-grammar placement and required-children checks.
    Structure,
    /// Schema-derived checks: labels, codes, formats, decimal precision.
    Schema,
    /// Cross-entity business invariants.
    Rules,
    /// Relational "if guard then expectation" rules.
    Relations,
    /// Encoding and data-quality checks on the raw input.
    Quality,
    /// Final certification pipeline.
    Certification,
}

impl Pass {
    /// Stable short name used in reports and certificates.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Schema => "schema",
            Self::Rules => "rules",
            Self::Relations => "relations",
            Self::Quality => "quality",
            Self::Certification => "certification",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Finding
// ---------------------------------------------------------------------------

/// Business-rule codes whose findings cannot be transmitted downstream.
///
/// All structure- and schema-pass findings are critical by construction;
/// rules-pass findings are critical only for this hard subset.
const CRITICAL_RULE_CODES: &[&str] = &[
    "E2-001", // ordinal sequence broken
    "E2-002", // gross premium sum mismatch
    "E2-003", // multiple prolongation months in batch
    "E2-004", // forbidden XD entity
    "E2-005", // BO_BRPRM deviates from PP_BTP
    "E2-006", // date ordering violated
    "E2-008", // national-id checksum failed (Error severity only)
    "E2-010", // PP_TTOT component sum mismatch
    "E2-011", // IBAN checksum failed
    "E2-013", // branch/coverage incompatibility
];

/// A single validation finding.
///
/// Immutable after construction; build via [`Finding::builder`]. The
/// criticality field is derived in `finish()` and is not settable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub pass: Pass,
    /// Stable rule code, e.g. `E1-002`.
    pub code: String,
    /// Machine-readable rule-type tag, e.g. `invalid_coverage_code`.
    pub rule_type: String,
    /// Contract number, or `BATCH` for batch-level findings.
    pub contract: String,
    /// Branch code of the contract, if known.
    pub branch: String,
    /// Entity code the finding applies to, e.g. `AN`.
    pub entity: String,
    /// Full attribute label, e.g. `AN_CODE`.
    pub label: String,
    /// Offending value (may be truncated for display).
    pub value: String,
    /// Human-readable description.
    pub description: String,
    /// What was expected instead.
    pub expected: String,
    /// Provenance: which schema source or rule set the check came from.
    pub source: String,
    /// Line number in the original document, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Derived triage level; computed once at construction.
    pub criticality: Criticality,
}

impl Finding {
    /// Start building a finding. The four arguments are always known at the
    /// call site; everything else is optional context.
    pub fn builder(
        severity: Severity,
        pass: Pass,
        code: impl Into<String>,
        rule_type: impl Into<String>,
    ) -> FindingBuilder {
        FindingBuilder {
            finding: Finding {
                severity,
                pass,
                code: code.into(),
                rule_type: rule_type.into(),
                contract: String::new(),
                branch: String::new(),
                entity: String::new(),
                label: String::new(),
                value: String::new(),
                description: String::new(),
                expected: String::new(),
                source: String::new(),
                line: None,
                criticality: Criticality::Info,
            },
        }
    }

    /// Whether this finding blocks certification.
    pub fn is_blocking(&self) -> bool {
        self.severity.is_blocking()
    }

    fn derive_criticality(pass: Pass, code: &str, severity: Severity) -> Criticality {
        match pass {
            // Grammar and schema violations can never be transmitted.
            Pass::Structure | Pass::Schema => Criticality::Critical,
            Pass::Rules => {
                if CRITICAL_RULE_CODES.contains(&code) {
                    // The national-id check downgrades for its warning-level
                    // variant (chamber-of-commerce number format).
                    if code == "E2-008" && severity != Severity::Error {
                        Criticality::Attention
                    } else {
                        Criticality::Critical
                    }
                } else {
                    Criticality::Attention
                }
            }
            Pass::Relations | Pass::Certification | Pass::Quality => match severity {
                Severity::Error => match pass {
                    Pass::Quality => Criticality::Critical,
                    _ => Criticality::Attention,
                },
                Severity::Warning => Criticality::Attention,
                Severity::Info => Criticality::Info,
            },
        }
    }
}

/// Builder for [`Finding`]. Computes criticality in [`finish`](Self::finish).
#[derive(Debug)]
pub struct FindingBuilder {
    finding: Finding,
}

impl FindingBuilder {
    pub fn contract(mut self, v: impl Into<String>) -> Self {
        self.finding.contract = v.into();
        self
    }

    pub fn branch(mut self, v: impl Into<String>) -> Self {
        self.finding.branch = v.into();
        self
    }

    pub fn entity(mut self, v: impl Into<String>) -> Self {
        self.finding.entity = v.into();
        self
    }

    pub fn label(mut self, v: impl Into<String>) -> Self {
        self.finding.label = v.into();
        self
    }

    pub fn value(mut self, v: impl Into<String>) -> Self {
        self.finding.value = v.into();
        self
    }

    pub fn description(mut self, v: impl Into<String>) -> Self {
        self.finding.description = v.into();
        self
    }

    pub fn expected(mut self, v: impl Into<String>) -> Self {
        self.finding.expected = v.into();
        self
    }

    pub fn source(mut self, v: impl Into<String>) -> Self {
        self.finding.source = v.into();
        self
    }

    pub fn line(mut self, v: Option<u32>) -> Self {
        self.finding.line = v;
        self
    }

    /// Derive the criticality and return the finished, immutable finding.
    pub fn finish(mut self) -> Finding {
        self.finding.criticality = Finding::derive_criticality(
            self.finding.pass,
            &self.finding.code,
            self.finding.severity,
        );
        self.finding
    }
}

/// Sort findings into the stable presentation order (contract, pass, code).
///
/// Pass execution order is not deterministic from the caller's point of
/// view; callers that need reproducible output sort with this.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        (a.contract.as_str(), a.pass, a.code.as_str(), a.line)
            .cmp(&(b.contract.as_str(), b.pass, b.code.as_str(), b.line))
    });
}

// ---------------------------------------------------------------------------
// ValidationOutcome
// ---------------------------------------------------------------------------

/// Result of a full batch run: all findings plus the certificate, if one
/// was issued.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
}

impl ValidationOutcome {
    /// No blocking findings present.
    pub fn is_valid(&self) -> bool {
        !self.findings.iter().any(Finding::is_blocking)
    }

    /// A certificate was issued and is valid.
    pub fn is_ready_to_send(&self) -> bool {
        self.certificate.as_ref().is_some_and(|c| c.is_valid)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn info_count(&self) -> usize {
        self.count(Severity::Info)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
