//! Send-ready certificate issued after a batch clears certification.
//!
//! The certificate is the terminal artefact of a validation run. It is only
//! issued when no blocking finding remains, and it binds the decision to the
//! exact input bytes via a SHA-256 content hash.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statement that a batch passed every blocking check at `timestamp`.
///
/// `critical_entities_present` records, per contract, whether the minimal
/// entity pair (policy + premium carrier) was found. BTreeMap keeps the JSON
/// stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub is_valid: bool,
    pub timestamp: DateTime<Utc>,
    /// Source file name or logical identifier of the validated input.
    pub source: String,
    pub contract_count: usize,
    /// Names of the certification checks that ran, in execution order.
    pub checks_performed: Vec<String>,
    /// Short names of the validation passes that contributed findings.
    pub passes_run: Vec<String>,
    /// Per-contract presence of the critical entity pair.
    pub critical_entities_present: BTreeMap<String, bool>,
    /// Number of non-blocking findings acknowledged at issuance.
    pub warnings_acknowledged: usize,
    /// SHA-256 of the original input, hex-encoded.
    pub content_sha256: String,
}

/// Hex-encode a SHA-256 digest for the `content_sha256` field.
pub fn encode_digest(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
