//! # afd-document — Batch Document Model and Parser
//!
//! Turns a batch XML document into the in-memory model the validation
//! passes work on: a [`Batch`] of [`Contract`]s, each holding a tree of
//! [`EntityNode`]s with their attribute maps, ordinals, paths, and source
//! lines.
//!
//! The parser accepts both document layouts in the wild: contracts with
//! nested entity trees, and the legacy flat layout where an `AL` entity
//! opens a contract context and subsequent entities attach to it.

pub mod model;
pub mod parser;

pub use model::{Batch, Contract, EntityNode, COVERAGE_ENTITY_TYPES};
pub use parser::{parse_batch, DocumentError};
