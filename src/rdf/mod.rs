//! # RDF Data Model
//!
//! Statements as produced by an external parser and consumed by the ingest
//! pipeline, and as produced by the export mapper for an external serializer.
//! Pure data. No parsing grammars live here.

pub mod term;
pub mod vocab;

pub use term::{
    BlankNode, Literal, Object, ParseError, ParsedStatement, RdfStatement, Subject,
};
