//! # afd-catalog — Schema and Structure Catalogs
//!
//! Loads the declarative schema sources of the AFD standard into immutable
//! in-memory lookup tables:
//!
//! - [`SchemaLookup`]: format specs, code catalogs, attribute bindings,
//!   entity attribute membership, coverage-code groups, and the
//!   business-required attribute table.
//! - [`StructureLookup`]: the structural grammar describing which entity
//!   kinds may nest under which, with a derived child-to-parents index.
//! - [`CatalogPaths`] / [`Catalog`]: configuration plus a process-wide
//!   cache so concurrent validations share one catalog build.
//!
//! Catalog loading is all-or-nothing: any unreadable or malformed source
//! fails the whole build with a [`CatalogError`] naming the source. There is
//! no partial catalog.

pub mod context;
pub mod error;
pub mod formats;
pub mod schema;
pub mod structure;

pub use context::{Catalog, CatalogPaths};
pub use error::CatalogError;
pub use formats::{DecimalKind, DecimalViolation, FormatSpec};
pub use schema::{AttributeBinding, SchemaLookup};
pub use structure::{ElementStructure, StructureLookup, CONTRACT_ROOT};
