//! # Batch Parser
//!
//! Reads a batch document into the [`Batch`] model. Two layouts exist in
//! the wild:
//!
//! - **Nested**: `Contract` elements whose entity children nest to reflect
//!   the logical hierarchy. Wrapper elements with non-entity names collapse
//!   to their single meaningful child.
//! - **Flat**: a bare sequence of entities where each `AL` opens a new
//!   contract context and later entities attach to the most recently
//!   opened one.
//!
//! The flat reading is only attempted when the nested reading finds no
//! contracts at all. Contracts whose number cannot be resolved are dropped
//! with a warning; that is a data defect the remaining findings will not
//! reference, not a parse failure.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use afd_core::xml::{self, XmlElement, XmlError};

use crate::model::{Batch, Contract, EntityNode};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to read a batch document at all. Everything past
/// well-formedness is reported as findings, not errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("batch document is not well-formed XML: {0}")]
    Malformed(#[from] XmlError),

    #[error("cannot read batch document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse a batch document from a string.
pub fn parse_batch(src: &str) -> Result<Batch, DocumentError> {
    let root = xml::parse(src)?;

    let mut contracts = Vec::new();
    for contract_elem in contract_elements(&root) {
        if let Some(contract) = parse_contract(contract_elem) {
            contracts.push(contract);
        }
    }

    // Legacy flat layout: no Contract elements, entities in sequence.
    if contracts.is_empty() {
        contracts = parse_flat(&root);
    }

    Ok(Batch { contracts, source: None })
}

/// Parse a batch document from a file, recording the file name as source.
pub fn parse_file(path: &Path) -> Result<Batch, DocumentError> {
    let src = std::fs::read_to_string(path)
        .map_err(|source| DocumentError::Io { path: path.to_path_buf(), source })?;
    let mut batch = parse_batch(&src)?;
    batch.source = Some(path.display().to_string());
    Ok(batch)
}

fn contract_elements(root: &XmlElement) -> Vec<&XmlElement> {
    let mut found = Vec::new();
    if root.name == "Contract" {
        found.push(root);
    }
    found.extend(root.descendants().into_iter().filter(|e| e.name == "Contract"));
    found
}

// ---------------------------------------------------------------------------
// Nested layout
// ---------------------------------------------------------------------------

fn parse_contract(contract_elem: &XmlElement) -> Option<Contract> {
    let mut contract = Contract::default();

    for child in &contract_elem.children {
        let Some(entity) = parse_entity(child, "Contract") else { continue };

        if entity.entity_type == "AL" {
            contract.number = entity
                .attr_non_empty("POLNR")
                .or_else(|| entity.attr_non_empty("CPOLNR"))
                .unwrap_or("")
                .to_string();
        }
        extract_branch(&entity, &mut contract);
        contract.entities.push(entity);
    }

    if contract.number.is_empty() {
        warn!(
            line = contract_elem.line,
            "dropping contract without resolvable number"
        );
        return None;
    }
    Some(contract)
}

/// Branch comes from the first premium entity carrying one, anywhere in
/// the subtree.
fn extract_branch(entity: &EntityNode, contract: &mut Contract) {
    if contract.branch.is_empty() && entity.entity_type == "PP" {
        if let Some(branch) = entity.attr_non_empty("BRANCHE").or_else(|| entity.attr_non_empty("BRA")) {
            contract.branch = branch.to_string();
        }
    }
    for child in &entity.children {
        extract_branch(child, contract);
    }
}

fn parse_entity(elem: &XmlElement, path: &str) -> Option<EntityNode> {
    if elem.name.len() != 2 {
        // Wrapper element: meaningful only when it hides exactly one entity.
        let mut unwrapped: Vec<EntityNode> = elem
            .children
            .iter()
            .filter_map(|child| parse_entity(child, path))
            .collect();
        return if unwrapped.len() == 1 { unwrapped.pop() } else { None };
    }

    let mut entity = EntityNode::new(elem.name.clone());
    entity.path = format!("{path}/{}", elem.name);
    entity.line = Some(elem.line);

    let attribute_prefix = format!("{}_", elem.name);
    for child in &elem.children {
        if child.name.starts_with(&attribute_prefix) {
            let value = child.text.clone();
            if child.name.ends_with("_VOLGNUM") {
                // Non-numeric ordinals stay unset; presence is judged later.
                entity.ordinal = value.trim().parse().ok();
            }
            entity.attributes.insert(child.name.clone(), value);
        } else if child.name.len() == 2 {
            if let Some(nested) = parse_entity(child, &entity.path) {
                entity.children.push(nested);
            }
        }
    }

    (!entity.attributes.is_empty() || !entity.children.is_empty()).then_some(entity)
}

// ---------------------------------------------------------------------------
// Flat layout
// ---------------------------------------------------------------------------

fn parse_flat(root: &XmlElement) -> Vec<Contract> {
    let mut contracts: Vec<Contract> = Vec::new();
    let mut current: Option<usize> = None;

    let elements = std::iter::once(root).chain(root.descendants());
    for elem in elements {
        if elem.name.len() != 2 {
            continue;
        }
        let Some(entity) = parse_flat_entity(elem) else { continue };

        if entity.entity_type == "AL" {
            let number = entity
                .attr_non_empty("POLNR")
                .or_else(|| entity.attr_non_empty("CPOLNR"))
                .map(str::to_string)
                .unwrap_or_else(|| format!("contract_{}", contracts.len() + 1));

            current = match contracts.iter().position(|c| c.number == number) {
                Some(idx) => Some(idx),
                None => {
                    contracts.push(Contract { number, ..Contract::default() });
                    Some(contracts.len() - 1)
                }
            };
        }

        let Some(idx) = current else { continue };
        if entity.entity_type == "PP" {
            if let Some(branch) =
                entity.attr_non_empty("BRANCHE").or_else(|| entity.attr_non_empty("BRA"))
            {
                contracts[idx].branch = branch.to_string();
            }
        }
        contracts[idx].entities.push(entity);
    }

    contracts
}

/// Flat entities carry attributes only; nesting does not exist in this
/// layout.
fn parse_flat_entity(elem: &XmlElement) -> Option<EntityNode> {
    let mut entity = EntityNode::new(elem.name.clone());
    entity.path = elem.name.clone();
    entity.line = Some(elem.line);

    let attribute_prefix = format!("{}_", elem.name);
    for child in &elem.children {
        if child.name.starts_with(&attribute_prefix) {
            let value = child.text.clone();
            if child.name.ends_with("_VOLGNUM") {
                entity.ordinal = value.trim().parse().ok();
            }
            entity.attributes.insert(child.name.clone(), value);
        }
    }

    (!entity.attributes.is_empty()).then_some(entity)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
