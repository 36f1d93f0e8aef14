//! Batch, contract, and entity model with the derived views the passes
//! consume. The tree owns its children; the passes thread the parent kind
//! explicitly where they need it, so there are no back pointers.

use std::collections::{BTreeMap, BTreeSet};

/// Entity kinds that represent a coverage with its own premium. Fixed by
/// the transmission protocol, not derivable from the schema sources.
pub const COVERAGE_ENTITY_TYPES: &[&str] = &[
    "AN", "DA", "DR", "CA", "WA", "KA", "VO", "BH", "AO", "CY", "DC", "AU", "AZ", "BI", "BK",
    "BQ", "BR", "BW", "BZ", "CD", "CG", "DD", "DF", "DG", "DH", "DI", "DJ", "DK", "DL", "DM",
    "DN", "DP", "DQ", "DS", "DT", "DU", "DV", "DX", "EA", "EB", "EC", "ED", "EE", "EF", "EG",
    "EH", "EI", "EJ", "EK", "EM", "EN", "EO", "EP", "EQ",
];

/// Whether the entity kind carries a coverage premium.
pub fn is_coverage_type(entity_type: &str) -> bool {
    COVERAGE_ENTITY_TYPES.contains(&entity_type)
}

// ---------------------------------------------------------------------------
// EntityNode
// ---------------------------------------------------------------------------

/// One entity instance in a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityNode {
    /// Two-character entity kind, e.g. `PP`.
    pub entity_type: String,
    /// Parsed ordinal from the `VOLGNUM` attribute; unset when absent or
    /// not numeric. Presence is judged by the required-attribute check.
    pub ordinal: Option<u32>,
    /// Full attribute labels to raw values, e.g. `PP_BTP` to `125,50`.
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<EntityNode>,
    /// Slash-separated location, e.g. `Contract/PP/AN`.
    pub path: String,
    /// 1-based line of the opening tag in the source document.
    pub line: Option<u32>,
}

impl EntityNode {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self { entity_type: entity_type.into(), ..Self::default() }
    }

    /// Attribute value by bare suffix: `attr("BTP")` on a `PP` node reads
    /// `PP_BTP`.
    pub fn attr(&self, suffix: &str) -> Option<&str> {
        self.attributes
            .get(&format!("{}_{}", self.entity_type, suffix))
            .map(String::as_str)
    }

    /// Non-empty attribute value by bare suffix.
    pub fn attr_non_empty(&self, suffix: &str) -> Option<&str> {
        self.attr(suffix).filter(|v| !v.trim().is_empty())
    }

    /// All descendants, depth first, self excluded.
    pub fn descendants(&self) -> Vec<&EntityNode> {
        let mut out = Vec::new();
        for child in &self.children {
            out.push(child);
            out.extend(child.descendants());
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// One contract in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contract {
    /// Policy number extracted from the administrative entity.
    pub number: String,
    /// Branch code from the first premium entity, empty when absent.
    pub branch: String,
    /// Top-level entities in document order.
    pub entities: Vec<EntityNode>,
}

impl Contract {
    /// Top-level entities of one kind.
    pub fn entities_of_type<'a>(
        &'a self,
        entity_type: &'a str,
    ) -> impl Iterator<Item = &'a EntityNode> {
        self.entities.iter().filter(move |e| e.entity_type == entity_type)
    }

    /// Every entity in the contract, nesting flattened, document order.
    pub fn all_entities(&self) -> Vec<&EntityNode> {
        let mut out = Vec::new();
        for entity in &self.entities {
            out.push(entity);
            out.extend(entity.descendants());
        }
        out
    }

    pub fn entities_of_type_recursive(&self, entity_type: &str) -> Vec<&EntityNode> {
        self.all_entities()
            .into_iter()
            .filter(|e| e.entity_type == entity_type)
            .collect()
    }

    /// Entity kinds present at top level.
    pub fn entity_types(&self) -> BTreeSet<&str> {
        self.entities.iter().map(|e| e.entity_type.as_str()).collect()
    }

    /// Entity kinds present anywhere in the contract.
    pub fn entity_types_recursive(&self) -> BTreeSet<&str> {
        self.all_entities().into_iter().map(|e| e.entity_type.as_str()).collect()
    }

    /// All coverage entities, nested included.
    pub fn coverage_entities(&self) -> Vec<&EntityNode> {
        self.all_entities()
            .into_iter()
            .filter(|e| is_coverage_type(&e.entity_type))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// A parsed batch document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub contracts: Vec<Contract>,
    /// File name or logical identifier of the source, when known.
    pub source: Option<String>,
}

impl Batch {
    /// Branch codes across the batch, including the empty one for
    /// contracts without a branch.
    pub fn branches(&self) -> BTreeSet<&str> {
        self.contracts.iter().map(|c| c.branch.as_str()).collect()
    }

    /// Distinct prolongation months declared on top-level premium entities.
    pub fn prolongation_months(&self) -> BTreeSet<String> {
        let mut months = BTreeSet::new();
        for contract in &self.contracts {
            for pp in contract.entities_of_type("PP") {
                if let Some(month) = pp.attr_non_empty("PROLMND") {
                    months.insert(month.to_string());
                }
            }
        }
        months
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
