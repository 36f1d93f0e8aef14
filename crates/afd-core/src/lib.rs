//! # afd-core — Shared Validator Vocabulary
//!
//! Core types shared by every validation crate in the workspace:
//!
//! - [`Finding`]: a single severity-classified validation problem, with a
//!   criticality derived once at construction and never mutated.
//! - [`Severity`] / [`Criticality`]: the two classification axes. Severity
//!   decides whether certification is blocked; criticality is the reporting
//!   axis consumed by downstream renderers.
//! - [`Pass`]: identifies which validation pass produced a finding.
//! - [`Certificate`]: the send-ready statement issued when a batch clears
//!   every blocking check.
//! - [`xml`]: a lightweight XML tree reader (quick-xml based) with line
//!   tracking, shared by the catalog loaders and the document parser.

pub mod certificate;
pub mod finding;
pub mod xml;

pub use certificate::Certificate;
pub use finding::{
    sort_findings, Criticality, Finding, FindingBuilder, Pass, Severity, ValidationOutcome,
};
pub use xml::{XmlElement, XmlError};
