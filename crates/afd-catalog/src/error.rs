//! Catalog loading errors. All fatal: a broken schema source means no
//! catalog, never a partially filled one.

use std::path::PathBuf;

use thiserror::Error;

use afd_core::XmlError;

/// Failure to build a catalog from its schema sources.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read schema source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema source {source_name} is not well-formed: {source}")]
    Xml {
        source_name: String,
        #[source]
        source: XmlError,
    },

    #[error("schema source {source_name}: facet {facet}={value:?} is not a number")]
    InvalidFacet {
        source_name: String,
        facet: &'static str,
        value: String,
    },

    #[error("format inheritance cycle involving {format}")]
    FormatCycle { format: String },
}
