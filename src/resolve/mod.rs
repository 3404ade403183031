//! # Term Resolver
//!
//! Translates IRIs into graph names (inbound) and graph names back into IRIs
//! (outbound) under one captured [`SchemaMapping`].
//!
//! Inbound order:
//!
//! 1. element entry for exactly the IRI
//! 2. namespace entry for the IRI's namespace (`target_name + local`)
//! 3. the mapping's default [`NamingPolicy`] (or `UnresolvedTerm` when `mapped_only`)
//! 4. identity
//!
//! Outbound tries the same rules backwards and keeps the first candidate IRI
//! that resolves inbound to the requested name, so any name produced through a
//! mapping entry round-trips.

pub mod cell;
pub mod literal;

use std::sync::Arc;

use crate::mapping::{ElementKind, MappingScope, NamingPolicy, SchemaMapping, PREFIX_SEPARATOR};
use crate::rdf::vocab;
use crate::{Error, Result};

pub use cell::PropertyCell;
pub use literal::{LiteralPolicy, ResolvedLiteral};

#[derive(Debug, Clone)]
pub struct TermResolver {
    mapping: Option<Arc<SchemaMapping>>,
    default_namespace: String,
}

impl TermResolver {
    pub fn new(mapping: Option<Arc<SchemaMapping>>, default_namespace: impl Into<String>) -> Self {
        let default_namespace = mapping
            .as_ref()
            .and_then(|m| m.options.default_namespace.clone())
            .unwrap_or_else(|| default_namespace.into());
        Self { mapping, default_namespace }
    }

    pub fn mapping(&self) -> Option<&SchemaMapping> {
        self.mapping.as_deref()
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    // ========================================================================
    // Inbound: IRI → name
    // ========================================================================

    pub fn resolve_inbound(&self, iri: &str, kind: ElementKind) -> Result<String> {
        let Some(mapping) = self.mapping.as_deref() else {
            return Ok(iri.to_string());
        };

        if let Some(entry) = mapping.element_entry(iri, kind) {
            return Ok(entry.target_name.clone());
        }

        let (ns, local) = vocab::split_iri(iri);
        if let Some(entry) = mapping.namespace_entry(ns, kind) {
            if local.is_empty() {
                return Err(unresolved(iri, format!("no local name under namespace {ns}")));
            }
            return Ok(format!("{}{local}", entry.target_name));
        }

        if mapping.options.mapped_only {
            return Err(unresolved(iri, format!("no {kind} mapping in schema {}", mapping.name)));
        }

        let name = match mapping.options.default_naming {
            Some(NamingPolicy::LocalName) if !local.is_empty() => local.to_string(),
            Some(NamingPolicy::Prefixed) if !local.is_empty() => match mapping.prefix_of(ns) {
                Some(prefix) => format!("{prefix}{PREFIX_SEPARATOR}{local}"),
                None => iri.to_string(),
            },
            _ => iri.to_string(),
        };
        Ok(name)
    }

    // ========================================================================
    // Outbound: name → IRI
    // ========================================================================

    pub fn resolve_outbound(&self, name: &str, kind: ElementKind) -> Result<String> {
        let Some(mapping) = self.mapping.as_deref() else {
            return Ok(self.fallback_iri(name));
        };

        let mut namespace_entries: Vec<_> = mapping
            .entries_of(kind)
            .filter(|e| e.scope == MappingScope::Namespace && name.starts_with(&e.target_name))
            .collect();
        namespace_entries.sort_by_key(|e| std::cmp::Reverse(e.target_name.len()));

        let element_candidates = mapping
            .entries_of(kind)
            .filter(|e| e.scope == MappingScope::Element && e.target_name == name)
            .map(|e| e.base_iri.clone());
        let namespace_candidates = namespace_entries
            .into_iter()
            .map(|e| format!("{}{}", e.base_iri, &name[e.target_name.len()..]));

        for candidate in element_candidates.chain(namespace_candidates) {
            if self.resolve_inbound(&candidate, kind).is_ok_and(|n| n == name) {
                return Ok(candidate);
            }
        }

        // keys stored under their full IRI (coerced terms) export as-is
        if vocab::is_absolute_iri(name) {
            return Ok(name.to_string());
        }
        if mapping.options.mapped_only {
            return Err(unresolved(name, format!("no {kind} mapping in schema {}", mapping.name)));
        }

        if mapping.options.default_naming == Some(NamingPolicy::Prefixed) {
            if let Some((prefix, local)) = name.split_once(PREFIX_SEPARATOR) {
                if let Some(base) = mapping.namespace(prefix) {
                    return Ok(format!("{base}{local}"));
                }
            }
        }
        Ok(self.fallback_iri(name))
    }

    fn fallback_iri(&self, name: &str) -> String {
        if vocab::is_absolute_iri(name) {
            name.to_string()
        } else {
            format!("{}{name}", self.default_namespace)
        }
    }
}

fn unresolved(term: &str, reason: String) -> Error {
    Error::UnresolvedTerm { term: term.to_string(), reason }
}
