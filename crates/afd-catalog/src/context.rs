//! # Catalog Configuration and Cache
//!
//! [`CatalogPaths`] names the six schema-source files; [`Catalog`] is the
//! fully built, immutable pair of lookups shared via `Arc`. The process-wide
//! cache keyed by the path configuration makes repeated validations reuse
//! one build; failed builds are not cached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CatalogError;
use crate::schema::SchemaLookup;
use crate::structure::StructureLookup;

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

fn default_formats_file() -> String {
    "formaten.xsd".into()
}
fn default_codelists_file() -> String {
    "codelist.xsd".into()
}
fn default_attributes_file() -> String {
    "attributen.xsd".into()
}
fn default_entities_file() -> String {
    "entiteiten.xsd".into()
}
fn default_coverage_file() -> String {
    "dekkingcodesgroup.xsd".into()
}
fn default_structure_file() -> String {
    "Contractberichtstructuur.xsd".into()
}

/// Where the schema sources live. File names default to the conventional
/// distribution names and can be overridden per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogPaths {
    pub schema_dir: PathBuf,
    #[serde(default = "default_formats_file")]
    pub formats_file: String,
    #[serde(default = "default_codelists_file")]
    pub codelists_file: String,
    #[serde(default = "default_attributes_file")]
    pub attributes_file: String,
    #[serde(default = "default_entities_file")]
    pub entities_file: String,
    #[serde(default = "default_coverage_file")]
    pub coverage_file: String,
    #[serde(default = "default_structure_file")]
    pub structure_file: String,
}

impl CatalogPaths {
    /// Conventional file names under one directory.
    pub fn from_dir(schema_dir: impl Into<PathBuf>) -> Self {
        Self {
            schema_dir: schema_dir.into(),
            formats_file: default_formats_file(),
            codelists_file: default_codelists_file(),
            attributes_file: default_attributes_file(),
            entities_file: default_entities_file(),
            coverage_file: default_coverage_file(),
            structure_file: default_structure_file(),
        }
    }

    fn join(&self, file: &str) -> PathBuf {
        self.schema_dir.join(file)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The immutable catalog pair. Cloning shares the underlying lookups.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub schema: Arc<SchemaLookup>,
    pub structure: Arc<StructureLookup>,
}

impl Catalog {
    /// Build from files, bypassing the cache.
    pub fn load(paths: &CatalogPaths) -> Result<Self, CatalogError> {
        let formats = read_source(&paths.join(&paths.formats_file))?;
        let codelists = read_source(&paths.join(&paths.codelists_file))?;
        let attributes = read_source(&paths.join(&paths.attributes_file))?;
        let entities = read_source(&paths.join(&paths.entities_file))?;
        let coverage = read_source(&paths.join(&paths.coverage_file))?;
        let structure_src = read_source(&paths.join(&paths.structure_file))?;

        let schema =
            SchemaLookup::from_sources(&formats, &codelists, &attributes, &entities, &coverage)?;
        let structure = StructureLookup::from_source(&structure_src, &paths.structure_file)?;

        Ok(Self { schema: Arc::new(schema), structure: Arc::new(structure) })
    }

    /// Build from in-memory sources; used by tests and embedded callers.
    pub fn from_sources(
        formats: &str,
        codelists: &str,
        attributes: &str,
        entities: &str,
        coverage: &str,
        structure: &str,
    ) -> Result<Self, CatalogError> {
        let schema = SchemaLookup::from_sources(formats, codelists, attributes, entities, coverage)?;
        let structure = StructureLookup::from_source(structure, "message structure")?;
        Ok(Self { schema: Arc::new(schema), structure: Arc::new(structure) })
    }

    /// Cached build. The cache lock is held across the build, so concurrent
    /// callers with the same configuration trigger at most one build.
    pub fn shared(paths: &CatalogPaths) -> Result<Self, CatalogError> {
        static CACHE: OnceLock<Mutex<HashMap<CatalogPaths, Catalog>>> = OnceLock::new();
        let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));

        let mut guard = cache.lock();
        if let Some(catalog) = guard.get(paths) {
            return Ok(catalog.clone());
        }
        debug!(dir = %paths.schema_dir.display(), "building catalog");
        let catalog = Self::load(paths)?;
        guard.insert(paths.clone(), catalog.clone());
        Ok(catalog)
    }
}

fn read_source(path: &Path) -> Result<String, CatalogError> {
    std::fs::read_to_string(path)
        .map_err(|source| CatalogError::Io { path: path.to_path_buf(), source })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
