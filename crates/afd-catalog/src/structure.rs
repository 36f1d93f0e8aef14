//! # Structural Grammar
//!
//! The message-structure source declares which entity kinds may nest under
//! which, starting from the contract root. [`StructureLookup`] materializes
//! that grammar: per-element allowed and required children, occurrence
//! bounds, the set of root-legal kinds, and a derived child-to-parents
//! reverse index for diagnostics.
//!
//! The contract root is not an entity in the document; it is addressed by
//! the [`CONTRACT_ROOT`] sentinel.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use afd_core::xml::{self, XmlElement};

use crate::error::CatalogError;

/// Sentinel parent name for entities sitting directly under a contract.
pub const CONTRACT_ROOT: &str = "Contract";

/// Name of the complex type that anchors the grammar in the source.
const ROOT_TYPE_NAME: &str = "Contractberichtstructuur";

// ---------------------------------------------------------------------------
// Element structure
// ---------------------------------------------------------------------------

/// Grammar entry for one element kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementStructure {
    pub name: String,
    pub min_occurs: u32,
    /// `None` means unbounded.
    pub max_occurs: Option<u32>,
    pub allowed_children: BTreeSet<String>,
    pub required_children: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// StructureLookup
// ---------------------------------------------------------------------------

/// Immutable hierarchy rules derived from the message-structure source.
#[derive(Debug, Default)]
pub struct StructureLookup {
    elements: HashMap<String, ElementStructure>,
    child_to_parents: HashMap<String, BTreeSet<String>>,
    root_elements: BTreeSet<String>,
}

impl StructureLookup {
    /// Build the grammar from the message-structure document.
    pub fn from_source(src: &str, source_name: &str) -> Result<Self, CatalogError> {
        let root = xml::parse(src).map_err(|source| CatalogError::Xml {
            source_name: source_name.to_string(),
            source,
        })?;

        let mut lookup = Self::default();
        lookup.elements.insert(
            CONTRACT_ROOT.to_string(),
            ElementStructure { name: CONTRACT_ROOT.to_string(), ..ElementStructure::default() },
        );

        let anchor = root
            .descendants()
            .into_iter()
            .chain(std::iter::once(&root))
            .find(|el| el.name == "complexType" && el.attr("name") == Some(ROOT_TYPE_NAME));
        if let Some(complex_type) = anchor {
            if let Some(sequence) = first_descendant(complex_type, "sequence") {
                for element in sequence.find_all("element") {
                    lookup.collect_element(element, CONTRACT_ROOT, true, source_name)?;
                }
            }
        }

        lookup.rebuild_reverse_index();
        debug!(
            elements = lookup.elements.len(),
            roots = lookup.root_elements.len(),
            "structure lookup built"
        );
        Ok(lookup)
    }

    fn collect_element(
        &mut self,
        element: &XmlElement,
        parent: &str,
        at_root: bool,
        source_name: &str,
    ) -> Result<(), CatalogError> {
        let Some(name) = element.attr("name") else { return Ok(()) };
        if name.len() != 2 {
            return Ok(());
        }
        let name = name.to_string();

        let min_occurs = occurs(source_name, "minOccurs", element.attr("minOccurs"), 1)?;
        let max_occurs = match element.attr("maxOccurs") {
            Some("unbounded") => None,
            other => Some(occurs(source_name, "maxOccurs", other, 1)?),
        };

        if let Some(parent_entry) = self.elements.get_mut(parent) {
            parent_entry.allowed_children.insert(name.clone());
            if min_occurs >= 1 {
                parent_entry.required_children.insert(name.clone());
            }
        }
        if at_root {
            self.root_elements.insert(name.clone());
        }

        self.elements.insert(
            name.clone(),
            ElementStructure {
                name: name.clone(),
                min_occurs,
                max_occurs,
                ..ElementStructure::default()
            },
        );

        if let Some(nested) = element.find("complexType") {
            self.collect_nested(nested, &name, source_name)?;
        }
        Ok(())
    }

    fn collect_nested(
        &mut self,
        complex_type: &XmlElement,
        parent: &str,
        source_name: &str,
    ) -> Result<(), CatalogError> {
        // Children sit in a direct sequence or behind complexContent/extension.
        let mut sequences: Vec<&XmlElement> = complex_type.find_all("sequence").collect();
        if let Some(extension) = complex_type
            .find("complexContent")
            .and_then(|cc| cc.find("extension"))
        {
            sequences.extend(extension.find_all("sequence"));
        }

        for sequence in sequences {
            for element in sequence.find_all("element") {
                self.collect_element(element, parent, false, source_name)?;
            }
        }
        Ok(())
    }

    fn rebuild_reverse_index(&mut self) {
        self.child_to_parents.clear();
        for (parent, entry) in &self.elements {
            for child in &entry.allowed_children {
                self.child_to_parents
                    .entry(child.clone())
                    .or_default()
                    .insert(parent.clone());
            }
        }
    }

    // -- queries ------------------------------------------------------------

    /// Whether `child` may sit under `parent`. Parents the grammar does not
    /// know are permissive.
    pub fn is_valid_parent(&self, child: &str, parent: &str) -> bool {
        match self.elements.get(parent) {
            Some(entry) => entry.allowed_children.contains(child),
            None => true,
        }
    }

    pub fn is_valid_at_root(&self, element: &str) -> bool {
        self.root_elements.contains(element)
    }

    /// Whether the grammar mentions this element kind at all.
    pub fn knows_element(&self, element: &str) -> bool {
        self.elements.contains_key(element)
    }

    pub fn allowed_parents(&self, child: &str) -> Option<&BTreeSet<String>> {
        self.child_to_parents.get(child)
    }

    pub fn allowed_children(&self, parent: &str) -> Option<&BTreeSet<String>> {
        self.elements.get(parent).map(|e| &e.allowed_children)
    }

    pub fn required_children(&self, parent: &str) -> Option<&BTreeSet<String>> {
        self.elements.get(parent).map(|e| &e.required_children)
    }

    pub fn element(&self, name: &str) -> Option<&ElementStructure> {
        self.elements.get(name)
    }

    /// Entity kinds are two uppercase characters.
    pub fn is_entity_type(name: &str) -> bool {
        name.len() == 2 && name.chars().all(|c| c.is_ascii_uppercase())
    }
}

fn first_descendant<'a>(el: &'a XmlElement, name: &str) -> Option<&'a XmlElement> {
    el.descendants().into_iter().find(|d| d.name == name)
}

fn occurs(
    source_name: &str,
    facet: &'static str,
    value: Option<&str>,
    default: u32,
) -> Result<u32, CatalogError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| CatalogError::InvalidFacet {
            source_name: source_name.to_string(),
            facet,
            value: raw.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
