//! Ontology-only ingest: class and property declarations plus the
//! subClassOf / subPropertyOf / domain / range structure between them.
//!
//! Everything else is skipped and reported, so a mixed file can be loaded
//! for its schema alone.

use crate::config::HierarchyPredicates;
use crate::rdf::{vocab, Object, RdfStatement};

/// Why `st` is left out of an ontology import, or `None` if it is kept.
pub fn exclusion_reason(st: &RdfStatement, hierarchy: &HierarchyPredicates) -> Option<&'static str> {
    if st.predicate == vocab::RDF_TYPE {
        return match &st.object {
            Object::Iri(class) if vocab::SCHEMA_TYPES.contains(&class.as_str()) => None,
            _ => Some("not a schema statement"),
        };
    }
    let structural = hierarchy.kind_of(&st.predicate).is_some()
        || st.predicate == vocab::RDFS_DOMAIN
        || st.predicate == vocab::RDFS_RANGE;
    match (&st.object, structural) {
        (Object::Iri(_), true) => None,
        // restrictions and other anonymous class expressions
        (Object::Blank(_), true) => Some("anonymous class expression"),
        _ => Some("not a schema statement"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{BlankNode, Subject};

    const EX: &str = "http://ex.org/";

    fn ex(local: &str) -> String {
        format!("{EX}{local}")
    }

    #[test]
    fn test_schema_statements_kept() {
        let h = HierarchyPredicates::default();
        for st in [
            RdfStatement::iri(&ex("Person"), vocab::RDF_TYPE, vocab::OWL_CLASS),
            RdfStatement::iri(&ex("knows"), vocab::RDF_TYPE, vocab::OWL_OBJECT_PROPERTY),
            RdfStatement::iri(&ex("Person"), vocab::RDFS_SUBCLASS_OF, &ex("Agent")),
            RdfStatement::iri(&ex("hasFather"), vocab::RDFS_SUBPROPERTY_OF, &ex("hasParent")),
            RdfStatement::iri(&ex("knows"), vocab::RDFS_DOMAIN, &ex("Person")),
            RdfStatement::iri(&ex("knows"), vocab::RDFS_RANGE, &ex("Person")),
        ] {
            assert_eq!(exclusion_reason(&st, &h), None, "{st}");
        }
    }

    #[test]
    fn test_instance_data_and_restrictions_dropped() {
        let h = HierarchyPredicates::default();
        let restriction = RdfStatement::new(
            Subject::Iri(ex("Person")),
            vocab::RDFS_SUBCLASS_OF,
            Object::Blank(BlankNode::new("r1")),
        );
        assert_eq!(exclusion_reason(&restriction, &h), Some("anonymous class expression"));
        assert!(exclusion_reason(&RdfStatement::iri(&ex("alice"), vocab::RDF_TYPE, &ex("Person")), &h).is_some());
        assert!(exclusion_reason(&RdfStatement::literal(&ex("Person"), vocab::RDFS_LABEL, "Person"), &h).is_some());
        assert!(exclusion_reason(&RdfStatement::iri(&ex("alice"), &ex("knows"), &ex("bob")), &h).is_some());
    }

    #[test]
    fn test_custom_hierarchy_predicate_is_structural() {
        let mut h = HierarchyPredicates::default();
        h.class.push("http://www.w3.org/2004/02/skos/core#broader".into());
        let st = RdfStatement::iri(&ex("Cats"), "http://www.w3.org/2004/02/skos/core#broader", &ex("Animals"));
        assert_eq!(exclusion_reason(&st, &h), None);
    }
}
