//! # Business-Rule Pass
//!
//! Cross-entity invariants that no per-attribute schema check can express:
//! ordinal sequences, premium sums, batch-wide prolongation consistency,
//! date ordering, national-id and bank-account checksums, branch/coverage
//! compatibility, and a handful of plausibility limits.
//!
//! Monetary comparisons use a fixed tolerance of 0.01 to absorb rounding
//! in the source systems.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Local, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;

use afd_core::{Finding, FindingBuilder, Pass, Severity};
use afd_document::{Batch, Contract, EntityNode};

const SOURCE: &str = "business rules";

/// Date-pair attributes where the first must not come after the second.
const DATE_PAIRS: &[(&str, &str)] = &[
    ("INGDAT", "EINDDAT"),
    ("DVDAT", "DEDAT"),
    ("PROLDAT", "EINDDAT"),
];

/// Attribute suffixes holding bank-account identifiers.
const IBAN_FIELDS: &[&str] = &["IBAN", "IBANR", "IBANNR", "BANKNR"];

/// Upper plausibility limits for insured sums, per entity kind.
const SUM_LIMITS: &[(&str, &str, i64)] = &[
    ("DA", "VRZSOMJ", 10_000_000),
    ("CA", "NIEUWWRD", 500_000),
    ("AN", "VERZSOM", 5_000_000),
];

/// Branch families and the coverage kinds they exclude.
const BRANCH_COVERAGE: &[(&[&str], &[&str], &str)] = &[
    (&["020", "021", "022", "023"], &["DR"], "motor vehicle"),
    (&["024", "025"], &[], "motor vehicle"),
    (&["030", "031", "032"], &["CA", "WA", "PV"], "fire and contents"),
    (&["035"], &["CA", "WA"], "commercial fire"),
    (&["040", "041"], &["CA", "DA"], "liability"),
    (&["060"], &["CA", "WA", "DA", "AN"], "legal assistance"),
    (&["061"], &["CA", "WA", "DA"], "legal assistance"),
    (&["070", "071"], &["CA", "WA"], "travel"),
];

/// Coverage-code combinations that contradict each other.
const FORBIDDEN_CODE_COMBINATIONS: &[(&str, &str, &str, &str, &str)] = &[(
    "CA",
    "3001",
    "WA",
    "2001",
    "comprehensive casco and basic third-party cover are both active",
)];

/// Run the business-rule pass over the whole batch.
pub fn check(batch: &Batch) -> Vec<Finding> {
    let mut findings = Vec::new();
    check_prolongation_months(batch, &mut findings);
    for contract in &batch.contracts {
        check_ordinal_sequences(contract, &mut findings);
        check_premium_sums(contract, &mut findings);
        check_forbidden_entities(contract, &mut findings);
        check_bo_premium(contract, &mut findings);
        check_date_pairs(contract, &mut findings);
        check_postal_codes(contract, &mut findings);
        check_id_numbers(contract, &mut findings);
        check_duplicate_ordinals(contract, &mut findings);
        check_total_components(contract, &mut findings);
        check_ibans(contract, &mut findings);
        check_prolongation_date(contract, &mut findings);
        check_branch_coverage(contract, &mut findings);
        check_retroactive_start(contract, &mut findings);
        check_sum_limits(contract, &mut findings);
        check_code_combinations(contract, &mut findings);
        check_motor_branch_pv(contract, &mut findings);
    }
    findings
}

fn base(
    severity: Severity,
    code: &str,
    rule_type: &str,
    contract: &Contract,
) -> FindingBuilder {
    Finding::builder(severity, Pass::Rules, code, rule_type)
        .contract(&contract.number)
        .branch(&contract.branch)
        .source(SOURCE)
}

/// Parse a monetary value, accepting both decimal separators.
fn parse_amount(value: &str) -> Option<Decimal> {
    value.trim().replace(',', ".").parse().ok()
}

fn tolerance() -> Decimal {
    Decimal::new(1, 2)
}

fn branch_padded(contract: &Contract) -> String {
    format!("{:0>3}", contract.branch.trim())
}

// ---------------------------------------------------------------------------
// E2-001: ordinal sequences
// ---------------------------------------------------------------------------

fn check_ordinal_sequences(contract: &Contract, findings: &mut Vec<Finding>) {
    let mut by_type: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    for entity in &contract.entities {
        if let Some(ordinal) = entity.ordinal {
            by_type.entry(entity.entity_type.as_str()).or_default().push(ordinal);
        }
    }

    for (kind, mut ordinals) in by_type {
        ordinals.sort_unstable();
        let expected: Vec<u32> = (1..=ordinals.len() as u32).collect();
        if ordinals == expected {
            continue;
        }

        let unique: BTreeSet<u32> = ordinals.iter().copied().collect();
        let description = if unique.len() != ordinals.len() {
            format!("entity {kind} has duplicate ordinals")
        } else {
            let missing: Vec<String> = expected
                .iter()
                .filter(|n| !unique.contains(n))
                .map(u32::to_string)
                .collect();
            if missing.is_empty() {
                format!("entity {kind} ordinals are not sequential from 1")
            } else {
                format!("entity {kind} ordinals have gaps: missing {}", missing.join(", "))
            }
        };
        let actual: Vec<String> = ordinals.iter().map(u32::to_string).collect();
        findings.push(
            base(Severity::Error, "E2-001", "ordinal_sequence", contract)
                .entity(kind)
                .label(format!("{kind}_VOLGNUM"))
                .value(actual.join(", "))
                .description(description)
                .expected(format!("1..{}", ordinals.len()))
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// E2-002: gross premium vs coverage premiums
// ---------------------------------------------------------------------------

fn check_premium_sums(contract: &Contract, findings: &mut Vec<Finding>) {
    let coverages = contract.coverage_entities();
    if coverages.is_empty() {
        return;
    }
    let coverage_sum: Decimal = coverages
        .iter()
        .filter_map(|e| e.attr("BTP").and_then(parse_amount))
        .sum();

    for pp in contract.entities_of_type("PP") {
        let Some(gross) = pp.attr("BTP").and_then(parse_amount) else { continue };
        let diff = (gross - coverage_sum).abs();
        if diff <= tolerance() {
            continue;
        }
        findings.push(
            base(Severity::Error, "E2-002", "premium_sum_mismatch", contract)
                .entity("PP")
                .label("PP_BTP")
                .value(gross.to_string())
                .description(format!(
                    "gross premium {gross} deviates from coverage premium total {coverage_sum}"
                ))
                .expected(format!("sum of coverage premiums: {coverage_sum}"))
                .line(pp.line)
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// E2-003: prolongation months across the batch
// ---------------------------------------------------------------------------

fn check_prolongation_months(batch: &Batch, findings: &mut Vec<Finding>) {
    let months = batch.prolongation_months();
    if months.len() <= 1 {
        return;
    }
    let listed: Vec<&str> = months.iter().map(String::as_str).collect();
    findings.push(
        Finding::builder(Severity::Error, Pass::Rules, "E2-003", "mixed_prolongation_months")
            .contract("BATCH")
            .entity("PP")
            .label("PP_PROLMND")
            .value(listed.join(", "))
            .description("batch mixes contracts with different prolongation months")
            .expected("one prolongation month per batch")
            .source(SOURCE)
            .finish(),
    );
}

// ---------------------------------------------------------------------------
// E2-004: reserved entity kind
// ---------------------------------------------------------------------------

fn check_forbidden_entities(contract: &Contract, findings: &mut Vec<Finding>) {
    for xd in contract.entities_of_type("XD") {
        let value = xd.attr_non_empty("ENTITEI").unwrap_or("XD");
        findings.push(
            base(Severity::Error, "E2-004", "forbidden_entity", contract)
                .entity("XD")
                .label("XD_ENTITEI")
                .value(value)
                .description("reserved entity XD may not appear in a transmission")
                .expected("no XD entities")
                .line(xd.line)
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// E2-005: policy premium vs branch premium
// ---------------------------------------------------------------------------

fn check_bo_premium(contract: &Contract, findings: &mut Vec<Finding>) {
    let pps: Vec<&EntityNode> = contract.entities_of_type("PP").collect();
    let bos: Vec<&EntityNode> = contract.entities_of_type("BO").collect();
    if pps.is_empty() || bos.is_empty() {
        return;
    }

    let pp_total: Decimal = pps.iter().filter_map(|e| e.attr("BTP").and_then(parse_amount)).sum();
    let bo_total: Decimal =
        bos.iter().filter_map(|e| e.attr("BRPRM").and_then(parse_amount)).sum();
    if pp_total.is_zero() && bo_total.is_zero() {
        return;
    }
    if (pp_total - bo_total).abs() <= tolerance() {
        return;
    }
    findings.push(
        base(Severity::Error, "E2-005", "branch_premium_mismatch", contract)
            .entity("BO")
            .label("BO_BRPRM")
            .value(bo_total.to_string())
            .description(format!(
                "branch premium total {bo_total} deviates from policy premium total {pp_total}"
            ))
            .expected(format!("policy premium total: {pp_total}"))
            .finish(),
    );
}

// ---------------------------------------------------------------------------
// E2-006: date ordering
// ---------------------------------------------------------------------------

fn check_date_pairs(contract: &Contract, findings: &mut Vec<Finding>) {
    for entity in contract.all_entities() {
        for (start_name, end_name) in DATE_PAIRS {
            let (Some(start), Some(end)) =
                (entity.attr_non_empty(start_name), entity.attr_non_empty(end_name))
            else {
                continue;
            };
            let (start, end) = (start.trim(), end.trim());
            // Zero-padded EEJJMMDD dates order correctly as strings.
            if start.len() != 8 || end.len() != 8 || start <= end {
                continue;
            }
            let kind = &entity.entity_type;
            findings.push(
                base(Severity::Error, "E2-006", "date_order", contract)
                    .entity(kind)
                    .label(format!("{kind}_{start_name}/{end_name}"))
                    .value(format!("{start} > {end}"))
                    .description(format!(
                        "{kind}_{start_name} {start} lies after {kind}_{end_name} {end}"
                    ))
                    .expected(format!("{kind}_{start_name} on or before {kind}_{end_name}"))
                    .line(entity.line)
                    .finish(),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// E2-007: postal codes
// ---------------------------------------------------------------------------

fn postal_code_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[1-9][0-9]{3}\s?[A-Z]{2}$").unwrap())
}

fn check_postal_codes(contract: &Contract, findings: &mut Vec<Finding>) {
    for entity in contract.all_entities() {
        let Some(value) = entity.attr_non_empty("PCODE") else { continue };
        let normalized = value.trim().to_uppercase();
        if postal_code_pattern().is_match(&normalized) {
            continue;
        }
        let kind = &entity.entity_type;
        findings.push(
            base(Severity::Warning, "E2-007", "invalid_postal_code", contract)
                .entity(kind)
                .label(format!("{kind}_PCODE"))
                .value(value)
                .description("value is not a valid Dutch postal code")
                .expected("four digits (not starting with 0) followed by two letters")
                .line(entity.line)
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// E2-008: national-id and chamber-of-commerce numbers
// ---------------------------------------------------------------------------

/// Dutch BSN check: nine digits, weighted sum with weights 9..2 and -1 for
/// the check digit, divisible by 11.
pub fn is_valid_bsn(value: &str) -> bool {
    let cleaned: String =
        value.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    if cleaned.len() != 9 || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    const WEIGHTS: [i32; 9] = [9, 8, 7, 6, 5, 4, 3, 2, -1];
    let sum: i32 = cleaned
        .chars()
        .zip(WEIGHTS)
        .map(|(c, w)| (c.to_digit(10).unwrap_or(0) as i32) * w)
        .sum();
    sum.rem_euclid(11) == 0
}

fn check_id_numbers(contract: &Contract, findings: &mut Vec<Finding>) {
    for entity in contract.all_entities() {
        let kind = &entity.entity_type;

        let bsn = entity.attr_non_empty("BSN").or_else(|| entity.attr_non_empty("SOFINR"));
        if let Some(value) = bsn {
            if !is_valid_bsn(value) {
                findings.push(
                    base(Severity::Error, "E2-008", "invalid_national_id", contract)
                        .entity(kind)
                        .label(format!("{kind}_BSN"))
                        .value(value)
                        .description("national-id number fails the 11-weighted checksum")
                        .expected("nine digits with a valid checksum")
                        .line(entity.line)
                        .finish(),
                );
            }
        }

        let kvk = entity.attr_non_empty("KVK").or_else(|| entity.attr_non_empty("KVKNR"));
        if let Some(value) = kvk {
            let cleaned: String = value
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
                .collect();
            if cleaned.len() != 8 || !cleaned.chars().all(|c| c.is_ascii_digit()) {
                findings.push(
                    base(Severity::Warning, "E2-008", "invalid_registration_number", contract)
                        .entity(kind)
                        .label(format!("{kind}_KVK"))
                        .value(value)
                        .description("chamber-of-commerce number is not eight digits")
                        .expected("eight digits")
                        .line(entity.line)
                        .finish(),
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// E2-009: duplicate ordinals anywhere in the tree
// ---------------------------------------------------------------------------

fn check_duplicate_ordinals(contract: &Contract, findings: &mut Vec<Finding>) {
    let mut seen: HashMap<(String, u32), Option<u32>> = HashMap::new();
    for entity in contract.all_entities() {
        let Some(ordinal) = entity.ordinal else { continue };
        let key = (entity.entity_type.clone(), ordinal);
        match seen.get(&key) {
            None => {
                seen.insert(key, entity.line);
            }
            Some(first_line) => {
                let kind = &entity.entity_type;
                let where_first = first_line
                    .map_or_else(|| "an earlier occurrence".to_string(), |l| format!("line {l}"));
                findings.push(
                    base(Severity::Warning, "E2-009", "duplicate_ordinal", contract)
                        .entity(kind)
                        .label(format!("{kind}_VOLGNUM"))
                        .value(ordinal.to_string())
                        .description(format!(
                            "entity {kind} with ordinal {ordinal} also appears at {where_first}"
                        ))
                        .expected("unique ordinals per entity kind")
                        .line(entity.line)
                        .finish(),
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// E2-010: total premium components
// ---------------------------------------------------------------------------

fn check_total_components(contract: &Contract, findings: &mut Vec<Finding>) {
    const COMPONENTS: [&str; 5] = ["BTP", "TASS", "TKST", "TKRT", "TTSL"];
    for pp in contract.entities_of_type("PP") {
        let Some(total) = pp.attr("TTOT").and_then(parse_amount) else { continue };
        let mut sum = Decimal::ZERO;
        let mut found = 0;
        for component in COMPONENTS {
            if let Some(amount) = pp.attr(component).and_then(parse_amount) {
                sum += amount;
                found += 1;
            }
        }
        if found == 0 || (total - sum).abs() <= tolerance() {
            continue;
        }
        findings.push(
            base(Severity::Error, "E2-010", "total_premium_mismatch", contract)
                .entity("PP")
                .label("PP_TTOT")
                .value(total.to_string())
                .description(format!(
                    "total premium {total} deviates from the component sum {sum}"
                ))
                .expected(format!("sum of premium components: {sum}"))
                .line(pp.line)
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// E2-011: bank-account identifiers
// ---------------------------------------------------------------------------

/// Standard IBAN check: move the first four characters to the end, expand
/// letters to two-digit numbers, and the result must be 1 modulo 97.
pub fn is_valid_iban(value: &str) -> bool {
    let cleaned: String =
        value.chars().filter(|c| !c.is_whitespace()).map(|c| c.to_ascii_uppercase()).collect();
    if !(15..=34).contains(&cleaned.len()) {
        return false;
    }
    let bytes = cleaned.as_bytes();
    if !bytes[..2].iter().all(u8::is_ascii_uppercase)
        || !bytes[2..4].iter().all(u8::is_ascii_digit)
        || !bytes.iter().all(|b| b.is_ascii_alphanumeric())
    {
        return false;
    }

    let rearranged = cleaned[4..].bytes().chain(cleaned[..4].bytes());
    let mut remainder: u32 = 0;
    for byte in rearranged {
        if byte.is_ascii_digit() {
            remainder = (remainder * 10 + u32::from(byte - b'0')) % 97;
        } else {
            // Letters expand to 10..35, two digits at once.
            remainder = (remainder * 100 + u32::from(byte - b'A') + 10) % 97;
        }
    }
    remainder == 1
}

fn check_ibans(contract: &Contract, findings: &mut Vec<Finding>) {
    for entity in contract.all_entities() {
        for field in IBAN_FIELDS {
            let Some(value) = entity.attr_non_empty(field) else { continue };
            if is_valid_iban(value) {
                continue;
            }
            let kind = &entity.entity_type;
            findings.push(
                base(Severity::Error, "E2-011", "invalid_bank_account", contract)
                    .entity(kind)
                    .label(format!("{kind}_{field}"))
                    .value(value)
                    .description("bank-account identifier fails the mod-97 check")
                    .expected("a valid IBAN")
                    .line(entity.line)
                    .finish(),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// E2-012: prolongation date alignment
// ---------------------------------------------------------------------------

fn check_prolongation_date(contract: &Contract, findings: &mut Vec<Finding>) {
    for pp in contract.entities_of_type("PP") {
        let (Some(ing), Some(prol), Some(term)) = (
            pp.attr_non_empty("INGDAT"),
            pp.attr_non_empty("PROLDAT"),
            pp.attr_non_empty("BETTERM"),
        ) else {
            continue;
        };
        let (ing, prol) = (ing.trim(), prol.trim());
        if ing.len() != 8 || prol.len() != 8 || !ing.is_ascii() || !prol.is_ascii() {
            continue;
        }
        if term.trim().parse::<u32>() != Ok(12) {
            continue;
        }
        // With a yearly term, prolongation keeps either the month or the
        // day of the start date.
        if ing[4..6] == prol[4..6] || ing[6..8] == prol[6..8] {
            continue;
        }
        findings.push(
            base(Severity::Warning, "E2-012", "prolongation_misaligned", contract)
                .entity("PP")
                .label("PP_PROLDAT")
                .value(prol)
                .description(format!(
                    "prolongation date {prol} does not align with start date {ing} for a yearly term"
                ))
                .expected("same month or same day of month as the start date")
                .line(pp.line)
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// E2-013: branch/coverage compatibility
// ---------------------------------------------------------------------------

fn check_branch_coverage(contract: &Contract, findings: &mut Vec<Finding>) {
    let branch = branch_padded(contract);
    let Some((_, forbidden, family)) =
        BRANCH_COVERAGE.iter().find(|(branches, _, _)| branches.contains(&branch.as_str()))
    else {
        return;
    };

    let present = contract.entity_types_recursive();
    for kind in *forbidden {
        if !present.contains(kind) {
            continue;
        }
        findings.push(
            base(Severity::Error, "E2-013", "branch_coverage_conflict", contract)
                .entity(*kind)
                .label(format!("{kind}_ENTITEI"))
                .value(&branch)
                .description(format!(
                    "coverage entity {kind} is not allowed for branch {branch} ({family})"
                ))
                .expected(format!("no {kind} entities in branch {branch}"))
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// E2-014: retroactive start date
// ---------------------------------------------------------------------------

fn check_retroactive_start(contract: &Contract, findings: &mut Vec<Finding>) {
    for pp in contract.entities_of_type("PP") {
        // Only new or unclassified mutations; corrections legitimately
        // carry past dates, and an absent flag is not judged.
        let Some(flag) = pp.attr("MUTEFG") else { continue };
        if !matches!(flag.trim(), "N" | "") {
            continue;
        }
        let Some(ing) = pp.attr_non_empty("INGDAT") else { continue };
        let ing = ing.trim();
        if ing.len() != 8 {
            continue;
        }
        let Ok(date) = NaiveDate::parse_from_str(ing, "%Y%m%d") else { continue };
        if date >= Local::now().date_naive() {
            continue;
        }
        findings.push(
            base(Severity::Warning, "E2-014", "retroactive_start_date", contract)
                .entity("PP")
                .label("PP_INGDAT")
                .value(ing)
                .description(format!("start date {ing} lies in the past for a new policy"))
                .expected("a start date of today or later")
                .line(pp.line)
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// E2-015: plausibility limits
// ---------------------------------------------------------------------------

fn check_sum_limits(contract: &Contract, findings: &mut Vec<Finding>) {
    for entity in contract.all_entities() {
        for (kind, suffix, limit) in SUM_LIMITS {
            if entity.entity_type != *kind {
                continue;
            }
            let Some(value) = entity.attr_non_empty(suffix) else { continue };
            let Some(amount) = parse_amount(value) else { continue };
            if amount <= Decimal::from(*limit) {
                continue;
            }
            findings.push(
                base(Severity::Warning, "E2-015", "implausible_sum", contract)
                    .entity(*kind)
                    .label(format!("{kind}_{suffix}"))
                    .value(value)
                    .description(format!("insured sum {amount} exceeds the plausibility limit"))
                    .expected(format!("at most {limit}"))
                    .line(entity.line)
                    .finish(),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// E2-016: contradictory coverage codes
// ---------------------------------------------------------------------------

fn check_code_combinations(contract: &Contract, findings: &mut Vec<Finding>) {
    let mut codes_by_kind: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for entity in contract.coverage_entities() {
        if let Some(code) = entity.attr_non_empty("CODE") {
            codes_by_kind.entry(entity.entity_type.as_str()).or_default().insert(code.trim());
        }
    }

    for (kind_a, code_a, kind_b, code_b, description) in FORBIDDEN_CODE_COMBINATIONS {
        let hit = codes_by_kind.get(kind_a).is_some_and(|c| c.contains(code_a))
            && codes_by_kind.get(kind_b).is_some_and(|c| c.contains(code_b));
        if !hit {
            continue;
        }
        findings.push(
            base(Severity::Warning, "E2-016", "contradictory_coverages", contract)
                .entity(format!("{kind_a}/{kind_b}"))
                .label(format!("{kind_a}_CODE/{kind_b}_CODE"))
                .value(format!("{code_a}, {code_b}"))
                .description(*description)
                .expected("coverage codes that do not contradict each other")
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// E2-017: motor branches need a vehicle entity
// ---------------------------------------------------------------------------

fn check_motor_branch_pv(contract: &Contract, findings: &mut Vec<Finding>) {
    let branch = branch_padded(contract);
    if !matches!(branch.as_str(), "020" | "021" | "022" | "023" | "024" | "025") {
        return;
    }
    if contract.entity_types_recursive().contains("PV") {
        return;
    }
    findings.push(
        base(Severity::Warning, "E2-017", "missing_vehicle_entity", contract)
            .entity("PV")
            .label("PV_ENTITEI")
            .value(&branch)
            .description(format!("motor branch {branch} contract carries no PV entity"))
            .expected("at least one PV vehicle entity")
            .finish(),
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: &str, ordinal: Option<u32>, attrs: &[(&str, &str)]) -> EntityNode {
        let mut node = EntityNode::new(kind);
        node.ordinal = ordinal;
        for (k, v) in attrs {
            node.attributes.insert((*k).to_string(), (*v).to_string());
        }
        node
    }

    fn contract(branch: &str, entities: Vec<EntityNode>) -> Contract {
        Contract { number: "P1".into(), branch: branch.into(), entities }
    }

    fn batch_of(contracts: Vec<Contract>) -> Batch {
        Batch { contracts, source: None }
    }

    fn codes_of(findings: &[Finding], code: &str) -> usize {
        findings.iter().filter(|f| f.code == code).count()
    }

    #[test]
    fn ordinal_gap_yields_one_finding_and_dense_range_none() {
        let with_gap = batch_of(vec![contract(
            "",
            vec![node("AN", Some(1), &[]), node("AN", Some(3), &[])],
        )]);
        let findings = check(&with_gap);
        assert_eq!(codes_of(&findings, "E2-001"), 1);
        assert!(findings[0].description.contains("missing 2"));

        let dense = batch_of(vec![contract(
            "",
            vec![node("AN", Some(1), &[]), node("AN", Some(2), &[]), node("AN", Some(3), &[])],
        )]);
        assert_eq!(codes_of(&check(&dense), "E2-001"), 0);
    }

    #[test]
    fn duplicate_ordinals_take_precedence_over_gaps() {
        let batch = batch_of(vec![contract(
            "",
            vec![node("AN", Some(1), &[]), node("AN", Some(1), &[])],
        )]);
        let findings = check(&batch);
        let e2001: Vec<&Finding> = findings.iter().filter(|f| f.code == "E2-001").collect();
        assert_eq!(e2001.len(), 1);
        assert!(e2001[0].description.contains("duplicate"));
        // The tree-wide duplicate check fires as well.
        assert_eq!(codes_of(&findings, "E2-009"), 1);
    }

    #[test]
    fn premium_sum_within_tolerance_passes() {
        let pp = node("PP", Some(1), &[("PP_BTP", "100.00")]);
        let an = node("AN", Some(1), &[("AN_BTP", "60,00")]);
        let ca = node("CA", Some(1), &[("CA_BTP", "40.00")]);
        let batch = batch_of(vec![contract("", vec![pp, an, ca])]);
        assert_eq!(codes_of(&check(&batch), "E2-002"), 0);

        let pp = node("PP", Some(1), &[("PP_BTP", "100.00")]);
        let an = node("AN", Some(1), &[("AN_BTP", "60.00")]);
        let ca = node("CA", Some(1), &[("CA_BTP", "50.00")]);
        let batch = batch_of(vec![contract("", vec![pp, an, ca])]);
        assert_eq!(codes_of(&check(&batch), "E2-002"), 1);
    }

    #[test]
    fn premium_check_skips_contracts_without_coverages() {
        let pp = node("PP", Some(1), &[("PP_BTP", "100.00")]);
        let batch = batch_of(vec![contract("", vec![pp])]);
        assert_eq!(codes_of(&check(&batch), "E2-002"), 0);
    }

    #[test]
    fn mixed_prolongation_months_is_one_batch_finding() {
        let c1 = contract("", vec![node("PP", Some(1), &[("PP_PROLMND", "01")])]);
        let c2 = contract("", vec![node("PP", Some(1), &[("PP_PROLMND", "07")])]);
        let findings = check(&batch_of(vec![c1, c2]));
        let hits: Vec<&Finding> = findings.iter().filter(|f| f.code == "E2-003").collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].contract, "BATCH");
    }

    #[test]
    fn reserved_entity_is_always_an_error() {
        let batch = batch_of(vec![contract("", vec![node("XD", Some(1), &[])])]);
        assert_eq!(codes_of(&check(&batch), "E2-004"), 1);
    }

    #[test]
    fn branch_premium_mismatch() {
        let pp = node("PP", Some(1), &[("PP_BTP", "100.00")]);
        let bo = node("BO", Some(1), &[("BO_BRPRM", "90.00")]);
        let batch = batch_of(vec![contract("", vec![pp, bo])]);
        assert_eq!(codes_of(&check(&batch), "E2-005"), 1);

        let pp = node("PP", Some(1), &[("PP_BTP", "100.00")]);
        let bo = node("BO", Some(1), &[("BO_BRPRM", "100,00")]);
        let batch = batch_of(vec![contract("", vec![pp, bo])]);
        assert_eq!(codes_of(&check(&batch), "E2-005"), 0);
    }

    #[test]
    fn date_order_violations_per_declared_pair() {
        let pp = node(
            "PP",
            Some(1),
            &[("PP_INGDAT", "20250601"), ("PP_EINDDAT", "20250101")],
        );
        let batch = batch_of(vec![contract("", vec![pp])]);
        let findings = check(&batch);
        assert_eq!(codes_of(&findings, "E2-006"), 1);
        let hit = findings.iter().find(|f| f.code == "E2-006").unwrap();
        assert_eq!(hit.label, "PP_INGDAT/EINDDAT");
    }

    #[test]
    fn postal_code_accepts_spaced_and_lowercase_forms() {
        let ok = node("VP", Some(1), &[("VP_PCODE", "1234 ab")]);
        let batch = batch_of(vec![contract("", vec![ok])]);
        assert_eq!(codes_of(&check(&batch), "E2-007"), 0);

        let bad = node("VP", Some(1), &[("VP_PCODE", "0123AB")]);
        let batch = batch_of(vec![contract("", vec![bad])]);
        assert_eq!(codes_of(&check(&batch), "E2-007"), 1);
    }

    #[test]
    fn bsn_checksum() {
        // Well-known test numbers that satisfy the 11-weighted checksum.
        assert!(is_valid_bsn("111222333"));
        assert!(is_valid_bsn("123456782"));
        assert!(is_valid_bsn("123 456 782"));
        // Plain ascending digits fail it.
        assert!(!is_valid_bsn("123456789"));
        assert!(!is_valid_bsn("12345678"));
        assert!(!is_valid_bsn("abcdefghi"));
    }

    #[test]
    fn invalid_bsn_is_an_error_and_bad_kvk_a_warning() {
        let vp = node(
            "VP",
            Some(1),
            &[("VP_BSN", "123456789"), ("VP_KVK", "1234567")],
        );
        let batch = batch_of(vec![contract("", vec![vp])]);
        let findings = check(&batch);
        let hits: Vec<&Finding> = findings.iter().filter(|f| f.code == "E2-008").collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].severity, Severity::Error);
        assert_eq!(hits[1].severity, Severity::Warning);
    }

    #[test]
    fn total_premium_components() {
        let pp = node(
            "PP",
            Some(1),
            &[("PP_TTOT", "121.00"), ("PP_BTP", "100.00"), ("PP_TASS", "21.00")],
        );
        let batch = batch_of(vec![contract("", vec![pp])]);
        assert_eq!(codes_of(&check(&batch), "E2-010"), 0);

        let pp = node("PP", Some(1), &[("PP_TTOT", "121.00"), ("PP_BTP", "100.00")]);
        let batch = batch_of(vec![contract("", vec![pp])]);
        assert_eq!(codes_of(&check(&batch), "E2-010"), 1);

        // No components present at all: nothing to compare against.
        let pp = node("PP", Some(1), &[("PP_TTOT", "121.00")]);
        let batch = batch_of(vec![contract("", vec![pp])]);
        assert_eq!(codes_of(&check(&batch), "E2-010"), 0);
    }

    #[test]
    fn iban_checksum() {
        assert!(is_valid_iban("NL91ABNA0417164300"));
        assert!(is_valid_iban("nl91 abna 0417 1643 00"));
        assert!(!is_valid_iban("NL92ABNA0417164300"));
        assert!(!is_valid_iban("NL91ABNA041716430"));
        assert!(!is_valid_iban("1291ABNA0417164300"));
    }

    #[test]
    fn invalid_iban_in_any_declared_field() {
        let vp = node("VP", Some(1), &[("VP_IBANNR", "NL92ABNA0417164300")]);
        let batch = batch_of(vec![contract("", vec![vp])]);
        let findings = check(&batch);
        assert_eq!(codes_of(&findings, "E2-011"), 1);
        let hit = findings.iter().find(|f| f.code == "E2-011").unwrap();
        assert_eq!(hit.label, "VP_IBANNR");
    }

    #[test]
    fn prolongation_alignment_for_yearly_terms() {
        let misaligned = node(
            "PP",
            Some(1),
            &[
                ("PP_INGDAT", "20250315"),
                ("PP_PROLDAT", "20260401"),
                ("PP_BETTERM", "12"),
            ],
        );
        let batch = batch_of(vec![contract("", vec![misaligned])]);
        assert_eq!(codes_of(&check(&batch), "E2-012"), 1);

        let same_day = node(
            "PP",
            Some(1),
            &[
                ("PP_INGDAT", "20250315"),
                ("PP_PROLDAT", "20260415"),
                ("PP_BETTERM", "12"),
            ],
        );
        let batch = batch_of(vec![contract("", vec![same_day])]);
        assert_eq!(codes_of(&check(&batch), "E2-012"), 0);

        // Non-yearly terms are out of scope for this check.
        let monthly = node(
            "PP",
            Some(1),
            &[
                ("PP_INGDAT", "20250315"),
                ("PP_PROLDAT", "20260401"),
                ("PP_BETTERM", "1"),
            ],
        );
        let batch = batch_of(vec![contract("", vec![monthly])]);
        assert_eq!(codes_of(&check(&batch), "E2-012"), 0);
    }

    #[test]
    fn branch_coverage_conflicts_pad_the_branch_code() {
        let batch = batch_of(vec![contract(
            "20",
            vec![node("DR", Some(1), &[("DR_CODE", "6001")])],
        )]);
        let findings = check(&batch);
        assert_eq!(codes_of(&findings, "E2-013"), 1);
        let hit = findings.iter().find(|f| f.code == "E2-013").unwrap();
        assert_eq!(hit.entity, "DR");
        assert_eq!(hit.value, "020");
        // 020 is a motor-vehicle branch; the message names the family.
        assert!(hit.description.contains("motor vehicle"), "{}", hit.description);
    }

    #[test]
    fn fire_branch_forbids_motor_coverages() {
        let batch = batch_of(vec![contract(
            "030",
            vec![node("CA", Some(1), &[]), node("WA", Some(1), &[]), node("AN", Some(1), &[])],
        )]);
        assert_eq!(codes_of(&check(&batch), "E2-013"), 2);
    }

    #[test]
    fn retroactive_start_only_for_new_mutations() {
        let new_policy = node(
            "PP",
            Some(1),
            &[("PP_MUTEFG", "N"), ("PP_INGDAT", "20200101")],
        );
        let batch = batch_of(vec![contract("", vec![new_policy])]);
        assert_eq!(codes_of(&check(&batch), "E2-014"), 1);

        let correction = node(
            "PP",
            Some(1),
            &[("PP_MUTEFG", "R"), ("PP_INGDAT", "20200101")],
        );
        let batch = batch_of(vec![contract("", vec![correction])]);
        assert_eq!(codes_of(&check(&batch), "E2-014"), 0);

        // No mutation flag at all: not judged.
        let unflagged = node("PP", Some(1), &[("PP_INGDAT", "20200101")]);
        let batch = batch_of(vec![contract("", vec![unflagged])]);
        assert_eq!(codes_of(&check(&batch), "E2-014"), 0);
    }

    #[test]
    fn implausible_sums_are_warnings() {
        let da = node("DA", Some(1), &[("DA_VRZSOMJ", "10000001")]);
        let ca = node("CA", Some(1), &[("CA_NIEUWWRD", "400000")]);
        let batch = batch_of(vec![contract("", vec![da, ca])]);
        let findings = check(&batch);
        assert_eq!(codes_of(&findings, "E2-015"), 1);
        let hit = findings.iter().find(|f| f.code == "E2-015").unwrap();
        assert_eq!(hit.severity, Severity::Warning);
        assert_eq!(hit.label, "DA_VRZSOMJ");
    }

    #[test]
    fn contradictory_coverage_codes() {
        let ca = node("CA", Some(1), &[("CA_CODE", "3001")]);
        let wa = node("WA", Some(1), &[("WA_CODE", "2001")]);
        let batch = batch_of(vec![contract("", vec![ca, wa])]);
        let findings = check(&batch);
        assert_eq!(codes_of(&findings, "E2-016"), 1);
        let hit = findings.iter().find(|f| f.code == "E2-016").unwrap();
        assert_eq!(hit.entity, "CA/WA");
    }

    #[test]
    fn motor_branches_require_a_vehicle_entity() {
        let batch = batch_of(vec![contract("021", vec![node("AL", Some(1), &[])])]);
        let findings = check(&batch);
        assert_eq!(codes_of(&findings, "E2-017"), 1);
        let hit = findings.iter().find(|f| f.code == "E2-017").unwrap();
        assert_eq!(hit.rule_type, "missing_vehicle_entity");
        assert!(hit.description.contains("motor branch 021"), "{}", hit.description);

        let batch = batch_of(vec![contract(
            "021",
            vec![node("AL", Some(1), &[]), node("PV", Some(1), &[])],
        )]);
        assert_eq!(codes_of(&check(&batch), "E2-017"), 0);

        let batch = batch_of(vec![contract("037", vec![node("AL", Some(1), &[])])]);
        assert_eq!(codes_of(&check(&batch), "E2-017"), 0);
    }
}
