//! # Structure Pass
//!
//! Checks every entity's placement against the nesting grammar and verifies
//! required children. Entity kinds the grammar never mentions are not
//! structurally constrained when nested; placed directly under the contract
//! root they must be root-legal.

use afd_catalog::{StructureLookup, CONTRACT_ROOT};
use afd_core::{Finding, Pass, Severity};
use afd_document::{Batch, Contract, EntityNode};

const SOURCE: &str = "message structure";

/// Run the structure pass over the whole batch.
pub fn check(batch: &Batch, structure: &StructureLookup) -> Vec<Finding> {
    let mut findings = Vec::new();
    for contract in &batch.contracts {
        check_required_children(contract, CONTRACT_ROOT, &contract.entities, structure, &mut findings);
        for entity in &contract.entities {
            check_entity(contract, entity, CONTRACT_ROOT, structure, &mut findings);
        }
    }
    findings
}

fn check_entity(
    contract: &Contract,
    entity: &EntityNode,
    parent: &str,
    structure: &StructureLookup,
    findings: &mut Vec<Finding>,
) {
    check_placement(contract, entity, parent, structure, findings);
    check_required_children(contract, &entity.entity_type, &entity.children, structure, findings);
    for child in &entity.children {
        check_entity(contract, child, &entity.entity_type, structure, findings);
    }
}

fn check_placement(
    contract: &Contract,
    entity: &EntityNode,
    parent: &str,
    structure: &StructureLookup,
    findings: &mut Vec<Finding>,
) {
    let kind = entity.entity_type.as_str();
    let allowed = structure.allowed_parents(kind).filter(|p| !p.is_empty());

    let misplaced = match allowed {
        Some(parents) => !parents.contains(parent),
        // Not mentioned as anyone's child: unconstrained when nested, but
        // directly under the root it must be root-legal.
        None => parent == CONTRACT_ROOT && !structure.is_valid_at_root(kind),
    };
    if !misplaced {
        return;
    }

    let expected = match allowed {
        Some(parents) => {
            let list: Vec<&str> = parents.iter().map(String::as_str).collect();
            format!("allowed under: {}", list.join(", "))
        }
        None => format!("{kind} is not allowed directly under the contract root"),
    };
    findings.push(
        Finding::builder(Severity::Error, Pass::Structure, "E0-002", "invalid_hierarchy")
            .contract(&contract.number)
            .branch(&contract.branch)
            .entity(kind)
            .label(format!("{kind}_ENTITEI"))
            .value(parent)
            .description(format!("entity {kind} may not be placed under {parent}"))
            .expected(expected)
            .source(SOURCE)
            .line(entity.line)
            .finish(),
    );
}

fn check_required_children(
    contract: &Contract,
    parent: &str,
    children: &[EntityNode],
    structure: &StructureLookup,
    findings: &mut Vec<Finding>,
) {
    let Some(required) = structure.required_children(parent) else { return };
    for missing in required {
        if children.iter().any(|c| &c.entity_type == missing) {
            continue;
        }
        findings.push(
            Finding::builder(Severity::Error, Pass::Structure, "E0-003", "missing_required_child")
                .contract(&contract.number)
                .branch(&contract.branch)
                .entity(missing)
                .label(format!("{missing}_ENTITEI"))
                .description(format!("required entity {missing} is missing under {parent}"))
                .expected(format!("at least one {missing} under every {parent}"))
                .source(SOURCE)
                .finish(),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
