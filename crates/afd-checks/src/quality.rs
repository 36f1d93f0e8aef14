//! # Data-Quality Pass
//!
//! Two layers of checks. The raw layer inspects the input before parsing:
//! byte-order marks, undecodable bytes, control characters, and a
//! misdeclared encoding in the XML declaration. The value layer inspects
//! every attribute value of the parsed batch for replacement characters,
//! whitespace damage, placeholder text, and truncation marks.
//!
//! The raw layer runs even when the document later fails to parse, so a
//! broken file still reports what is wrong with its bytes.

use std::sync::OnceLock;

use regex::Regex;

use afd_core::{Finding, FindingBuilder, Pass, Severity};
use afd_document::Batch;

const RAW_SOURCE: &str = "encoding";
const VALUE_SOURCE: &str = "data quality";

/// At most this many control-character findings per file; a binary blob
/// would otherwise flood the report.
const CONTROL_CHAR_CAP: usize = 10;

/// Attribute suffixes holding names, addresses, and contact details, where
/// placeholder text is worth flagging.
const TEXT_FIELD_SUFFIXES: &[&str] = &[
    "NAAM", "ANAAM", "VNAAM", "ADRES", "STRAAT", "PLAATS", "EMAIL", "TELEFOON", "TELNR",
    "MOBIEL", "WEBSITE",
];

fn is_forbidden_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}')
}

fn placeholder_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^(TEST|TEMP|TODO|XXX|DUMMY|N\.?V\.?T\.?|NVT|ONBEKEND|UNKNOWN)$",
            r"(?i)^X{3,}$",
            r"^0{5,}$",
            r"^\*+$",
            r"^\.{3,}$",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

fn truncation_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"(?i)\[afgebroken\]$", r"(?i)\[truncated\]$", r"\.{2,}$"]
            .iter()
            .map(|p| Regex::new(p).unwrap())
            .collect()
    })
}

fn file_finding(severity: Severity, code: &str, rule_type: &str) -> FindingBuilder {
    Finding::builder(severity, Pass::Quality, code, rule_type)
        .contract("FILE")
        .source(RAW_SOURCE)
}

fn line_of(text: &str, offset: usize) -> u32 {
    text.as_bytes()[..offset].iter().filter(|b| **b == b'\n').count() as u32 + 1
}

// ---------------------------------------------------------------------------
// Raw layer
// ---------------------------------------------------------------------------

/// Decode raw bytes, reporting a byte-order mark and undecodable bytes.
pub fn decode(bytes: &[u8]) -> (String, Vec<Finding>) {
    let mut findings = Vec::new();

    let bytes = match bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        Some(rest) => {
            findings.push(
                file_finding(Severity::Warning, "EE-002", "byte_order_mark")
                    .description("file starts with a UTF-8 byte-order mark")
                    .expected("UTF-8 without a byte-order mark")
                    .finish(),
            );
            rest
        }
        None => bytes,
    };

    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(err) => {
            findings.push(
                file_finding(Severity::Error, "EE-001", "invalid_encoding")
                    .value(format!("byte offset {}", err.valid_up_to()))
                    .description("file contains bytes that are not valid UTF-8")
                    .expected("valid UTF-8")
                    .finish(),
            );
            String::from_utf8_lossy(bytes).into_owned()
        }
    };
    (text, findings)
}

/// Raw-text checks that need no parsed document.
pub fn check_raw(input: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    check_control_characters(input, &mut findings);
    check_suspicious_characters(input, &mut findings);
    check_declared_encoding(input, &mut findings);
    findings
}

fn check_control_characters(input: &str, findings: &mut Vec<Finding>) {
    let mut reported = 0;
    for (offset, c) in input.char_indices() {
        if !is_forbidden_control(c) {
            continue;
        }
        if reported == CONTROL_CHAR_CAP {
            break;
        }
        reported += 1;
        let line = line_of(input, offset);
        findings.push(
            file_finding(Severity::Error, "EE-003", "control_character")
                .value(format!("U+{:04X}", c as u32))
                .description(format!("control character on line {line}"))
                .expected("printable characters, tab, and line breaks only")
                .line(Some(line))
                .finish(),
        );
    }
}

fn check_suspicious_characters(input: &str, findings: &mut Vec<Finding>) {
    let suspicious = input
        .char_indices()
        .find(|(_, c)| matches!(c, '\u{FFFD}' | '\u{FFFE}' | '\u{FFFF}'));
    let Some((offset, c)) = suspicious else { return };
    let line = line_of(input, offset);
    findings.push(
        file_finding(Severity::Warning, "EE-007", "suspicious_character")
            .value(format!("U+{:04X}", c as u32))
            .description(format!(
                "replacement or non-character codepoint on line {line}, usually a sign of earlier re-encoding"
            ))
            .expected("no replacement characters")
            .line(Some(line))
            .finish(),
    );
}

fn declared_encoding_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"<\?xml[^>]*\bencoding\s*=\s*["']([^"']+)["']"#).unwrap())
}

fn check_declared_encoding(input: &str, findings: &mut Vec<Finding>) {
    let Some(captures) = declared_encoding_pattern().captures(input) else { return };
    let declared = &captures[1];
    if declared.eq_ignore_ascii_case("UTF-8") || declared.eq_ignore_ascii_case("UTF8") {
        return;
    }
    findings.push(
        file_finding(Severity::Warning, "EE-001", "invalid_encoding")
            .value(declared)
            .description(format!("XML declaration claims encoding {declared}"))
            .expected("UTF-8")
            .finish(),
    );
}

// ---------------------------------------------------------------------------
// Value layer
// ---------------------------------------------------------------------------

/// Per-value quality checks over the parsed batch.
pub fn check_values(batch: &Batch) -> Vec<Finding> {
    let mut findings = Vec::new();
    for contract in &batch.contracts {
        for entity in contract.all_entities() {
            for (label, value) in &entity.attributes {
                if value.is_empty() {
                    continue;
                }
                let value_finding = |severity: Severity, code: &str, rule_type: &str| {
                    Finding::builder(severity, Pass::Quality, code, rule_type)
                        .contract(&contract.number)
                        .branch(&contract.branch)
                        .entity(&entity.entity_type)
                        .label(label)
                        .value(crate::display_value(value.trim(), 50))
                        .source(VALUE_SOURCE)
                        .line(entity.line)
                };

                if value.contains('\u{FFFD}') {
                    findings.push(
                        value_finding(Severity::Error, "EE-001", "replacement_character")
                            .description("value contains the Unicode replacement character")
                            .expected("correctly encoded text")
                            .finish(),
                    );
                }
                if let Some(c) = value.chars().find(|c| is_forbidden_control(*c)) {
                    findings.push(
                        value_finding(Severity::Error, "EE-003", "control_character")
                            .description(format!("value contains control character U+{:04X}", c as u32))
                            .expected("printable characters only")
                            .finish(),
                    );
                }
                if value != value.trim() {
                    findings.push(
                        value_finding(Severity::Warning, "EE-004", "whitespace_padding")
                            .description("value has leading or trailing whitespace")
                            .expected("no surrounding whitespace")
                            .finish(),
                    );
                }
                if value.contains("  ") {
                    findings.push(
                        value_finding(Severity::Info, "EE-004", "repeated_spaces")
                            .description("value contains consecutive spaces")
                            .expected("single spaces between words")
                            .finish(),
                    );
                }
                if value.contains('\u{A0}') {
                    findings.push(
                        value_finding(Severity::Warning, "EE-004", "non_breaking_space")
                            .description("value contains a non-breaking space")
                            .expected("ordinary spaces")
                            .finish(),
                    );
                }
                check_placeholder(label, value, &value_finding, &mut findings);
                check_truncation(value, &value_finding, &mut findings);
            }
        }
    }
    findings
}

fn check_placeholder(
    label: &str,
    value: &str,
    value_finding: &dyn Fn(Severity, &str, &str) -> FindingBuilder,
    findings: &mut Vec<Finding>,
) {
    let suffix = label.rsplit_once('_').map_or(label, |(_, s)| s);
    if !TEXT_FIELD_SUFFIXES.contains(&suffix) {
        return;
    }
    let trimmed = value.trim();
    if placeholder_patterns().iter().any(|p| p.is_match(trimmed)) {
        findings.push(
            value_finding(Severity::Warning, "EE-005", "placeholder_value")
                .description("value looks like placeholder text")
                .expected("real data instead of a placeholder")
                .finish(),
        );
    }
}

fn check_truncation(
    value: &str,
    value_finding: &dyn Fn(Severity, &str, &str) -> FindingBuilder,
    findings: &mut Vec<Finding>,
) {
    let trimmed = value.trim();
    if truncation_patterns().iter().any(|p| p.is_match(trimmed)) {
        findings.push(
            value_finding(Severity::Warning, "EE-006", "truncated_value")
                .description("value ends in a truncation mark")
                .expected("the complete value")
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
