//! One named schema mapping: namespace table plus mapping entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rdf::vocab;
use crate::{Error, Result};

// ============================================================================
// Element kinds and naming policy
// ============================================================================

/// The property-graph construct a term maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    Label,
    RelationshipType,
    PropertyKey,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Label => write!(f, "label"),
            ElementKind::RelationshipType => write!(f, "relationship type"),
            ElementKind::PropertyKey => write!(f, "property key"),
        }
    }
}

/// How an IRI with no mapping entry becomes a graph name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamingPolicy {
    /// `http://ex.org/Person` → `Person`
    LocalName,
    /// `http://ex.org/Person` → `ex__Person`, using the namespace table
    Prefixed,
    /// `http://ex.org/Person` → `http://ex.org/Person`
    FullIri,
}

/// Separator between prefix and local name under [`NamingPolicy::Prefixed`].
pub const PREFIX_SEPARATOR: &str = "__";

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaOptions {
    /// Reject `add_mapping` on an existing `(prefix, kind)` instead of overwriting.
    pub strict: bool,
    /// Fallback for IRIs no entry covers. `None` keeps the full IRI.
    pub default_naming: Option<NamingPolicy>,
    /// Terms no entry covers are unresolved rather than named by the fallback.
    pub mapped_only: bool,
    /// Overrides the engine's default namespace for outbound names.
    pub default_namespace: Option<String>,
    /// Initial namespace table, `(prefix, base IRI)`.
    pub namespaces: Vec<(String, String)>,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            strict: false,
            default_naming: Some(NamingPolicy::LocalName),
            mapped_only: false,
            default_namespace: None,
            namespaces: Vec::new(),
        }
    }
}

impl SchemaOptions {
    pub fn strict() -> Self {
        Self { strict: true, ..Self::default() }
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, base: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), base.into()));
        self
    }

    pub fn with_naming(mut self, policy: Option<NamingPolicy>) -> Self {
        self.default_naming = policy;
        self
    }
}

// ============================================================================
// Entries
// ============================================================================

/// Whether an entry covers every term under a base IRI or exactly one term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingScope {
    Namespace,
    Element,
}

/// One `prefix → graph element` rule.
///
/// For namespace entries `target_name` is prepended to the local name (it is
/// usually empty); for element entries it is the exact graph name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// As given by the caller: `ex`, `ex:Person` or an absolute IRI.
    pub prefix: String,
    pub base_iri: String,
    pub kind: ElementKind,
    pub target_name: String,
    pub scope: MappingScope,
}

impl MappingEntry {
    fn same_key(&self, base_iri: &str, scope: MappingScope, kind: ElementKind) -> bool {
        self.base_iri == base_iri && self.scope == scope && self.kind == kind
    }
}

// ============================================================================
// SchemaMapping
// ============================================================================

/// A named, ordered set of mapping entries with its own namespace table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMapping {
    pub name: String,
    pub options: SchemaOptions,
    pub namespaces: Vec<(String, String)>,
    pub entries: Vec<MappingEntry>,
}

impl SchemaMapping {
    pub fn new(name: impl Into<String>, options: SchemaOptions) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidConfig("schema name must not be empty".into()));
        }
        if let Some(ns) = &options.default_namespace {
            if !vocab::is_absolute_iri(ns) {
                return Err(Error::InvalidConfig(format!("default namespace {ns:?} is not an absolute IRI")));
            }
        }
        let mut schema = Self {
            name,
            namespaces: Vec::new(),
            entries: Vec::new(),
            options: SchemaOptions { namespaces: Vec::new(), ..options.clone() },
        };
        for (prefix, base) in &options.namespaces {
            schema.add_namespace(prefix, base)?;
        }
        schema.options.namespaces = schema.namespaces.clone();
        Ok(schema)
    }

    // ========================================================================
    // Namespace table
    // ========================================================================

    /// Register `prefix → base`, replacing an earlier base for the same prefix.
    pub fn add_namespace(&mut self, prefix: &str, base: &str) -> Result<()> {
        if prefix.is_empty() || prefix.contains(':') {
            return Err(Error::InvalidConfig(format!("invalid namespace prefix {prefix:?}")));
        }
        if !vocab::is_absolute_iri(base) {
            return Err(Error::InvalidConfig(format!("namespace {base:?} is not an absolute IRI")));
        }
        match self.namespaces.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, existing)) => *existing = base.to_string(),
            None => self.namespaces.push((prefix.to_string(), base.to_string())),
        }
        Ok(())
    }

    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces.iter().find(|(p, _)| p == prefix).map(|(_, b)| b.as_str())
    }

    /// First prefix registered for `base`.
    pub fn prefix_of(&self, base: &str) -> Option<&str> {
        self.namespaces.iter().find(|(_, b)| b == base).map(|(p, _)| p.as_str())
    }

    /// Interpret the `prefix` argument of `add_mapping`.
    pub fn parse_prefix(&self, prefix: &str) -> Result<(String, MappingScope)> {
        if let Some((pfx, local)) = prefix.split_once(':') {
            if !local.starts_with("//") {
                if let Some(base) = self.namespace(pfx) {
                    return if local.is_empty() {
                        Ok((base.to_string(), MappingScope::Namespace))
                    } else {
                        Ok((format!("{base}{local}"), MappingScope::Element))
                    };
                }
            }
        }
        if vocab::is_absolute_iri(prefix) {
            let scope = if prefix.ends_with('/') || prefix.ends_with('#') {
                MappingScope::Namespace
            } else {
                MappingScope::Element
            };
            return Ok((prefix.to_string(), scope));
        }
        self.namespace(prefix)
            .map(|base| (base.to_string(), MappingScope::Namespace))
            .ok_or_else(|| Error::NotFound(format!("namespace prefix {prefix:?} in schema {}", self.name)))
    }

    // ========================================================================
    // Entries
    // ========================================================================

    /// Insert or replace the entry for `(prefix, kind)`.
    ///
    /// Returns the entry that was replaced, if any.
    pub fn put_entry(
        &mut self,
        prefix: &str,
        kind: ElementKind,
        target_name: &str,
    ) -> Result<Option<MappingEntry>> {
        let (base_iri, scope) = self.parse_prefix(prefix)?;
        if scope == MappingScope::Element && target_name.is_empty() {
            return Err(Error::InvalidConfig(format!("empty {kind} name for {prefix}")));
        }
        let entry = MappingEntry {
            prefix: prefix.to_string(),
            base_iri,
            kind,
            target_name: target_name.to_string(),
            scope,
        };
        let existing = self
            .entries
            .iter_mut()
            .find(|e| e.same_key(&entry.base_iri, entry.scope, entry.kind));
        match existing {
            Some(slot) if self.options.strict && slot.target_name != entry.target_name => {
                Err(Error::Conflict(format!(
                    "{kind} mapping for {prefix} already targets {:?} in schema {}",
                    slot.target_name, self.name
                )))
            }
            Some(slot) => Ok(Some(std::mem::replace(slot, entry))),
            None => {
                self.entries.push(entry);
                Ok(None)
            }
        }
    }

    pub fn remove_entry(&mut self, prefix: &str, kind: ElementKind) -> Result<MappingEntry> {
        let (base_iri, scope) = self.parse_prefix(prefix)?;
        let pos = self
            .entries
            .iter()
            .position(|e| e.same_key(&base_iri, scope, kind))
            .ok_or_else(|| Error::NotFound(format!("{kind} mapping for {prefix} in schema {}", self.name)))?;
        Ok(self.entries.remove(pos))
    }

    /// Element entry for exactly `iri`.
    pub fn element_entry(&self, iri: &str, kind: ElementKind) -> Option<&MappingEntry> {
        self.entries
            .iter()
            .find(|e| e.scope == MappingScope::Element && e.kind == kind && e.base_iri == iri)
    }

    /// Namespace entry covering `base`.
    pub fn namespace_entry(&self, base: &str, kind: ElementKind) -> Option<&MappingEntry> {
        self.entries
            .iter()
            .find(|e| e.scope == MappingScope::Namespace && e.kind == kind && e.base_iri == base)
    }

    pub fn entries_of(&self, kind: ElementKind) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }
}
