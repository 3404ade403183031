//! Well-known vocabulary IRIs.

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL: &str = "http://www.w3.org/2002/07/owl#";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
pub const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";
pub const DC: &str = "http://purl.org/dc/elements/1.1/";
pub const DCTERMS: &str = "http://purl.org/dc/terms/";
pub const FOAF: &str = "http://xmlns.com/foaf/0.1/";
pub const SCHEMA: &str = "http://schema.org/";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
pub const RDF_PROPERTY: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#Property";

pub const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
pub const RDFS_SUBPROPERTY_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subPropertyOf";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const RDFS_DOMAIN: &str = "http://www.w3.org/2000/01/rdf-schema#domain";
pub const RDFS_RANGE: &str = "http://www.w3.org/2000/01/rdf-schema#range";
pub const RDFS_CLASS: &str = "http://www.w3.org/2000/01/rdf-schema#Class";

pub const OWL_CLASS: &str = "http://www.w3.org/2002/07/owl#Class";
pub const OWL_OBJECT_PROPERTY: &str = "http://www.w3.org/2002/07/owl#ObjectProperty";
pub const OWL_DATATYPE_PROPERTY: &str = "http://www.w3.org/2002/07/owl#DatatypeProperty";

/// `rdf:type` objects that declare a class or a property.
pub const SCHEMA_TYPES: [&str; 5] = [RDFS_CLASS, OWL_CLASS, RDF_PROPERTY, OWL_OBJECT_PROPERTY, OWL_DATATYPE_PROPERTY];

pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#int";
pub const XSD_LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
pub const XSD_SHORT: &str = "http://www.w3.org/2001/XMLSchema#short";
pub const XSD_BYTE: &str = "http://www.w3.org/2001/XMLSchema#byte";
pub const XSD_NON_NEGATIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#nonNegativeInteger";
pub const XSD_POSITIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#positiveInteger";
pub const XSD_NEGATIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#negativeInteger";
pub const XSD_NON_POSITIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#nonPositiveInteger";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
pub const XSD_DATE: &str = "http://www.w3.org/2001/XMLSchema#date";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// Prefixes seeded by `add_common_schemas`.
pub const COMMON_PREFIXES: [(&str, &str); 9] = [
    ("rdf", RDF),
    ("rdfs", RDFS),
    ("owl", OWL),
    ("xsd", XSD),
    ("skos", SKOS),
    ("dc", DC),
    ("dcterms", DCTERMS),
    ("foaf", FOAF),
    ("schema", SCHEMA),
];

/// Integer-valued XSD datatypes.
pub const XSD_INTEGER_FAMILY: [&str; 9] = [
    XSD_INTEGER,
    XSD_INT,
    XSD_LONG,
    XSD_SHORT,
    XSD_BYTE,
    XSD_NON_NEGATIVE_INTEGER,
    XSD_POSITIVE_INTEGER,
    XSD_NEGATIVE_INTEGER,
    XSD_NON_POSITIVE_INTEGER,
];

/// Floating-point XSD datatypes.
pub const XSD_FLOAT_FAMILY: [&str; 3] = [XSD_DECIMAL, XSD_DOUBLE, XSD_FLOAT];

/// True for IRIs that carry a scheme (`http:`, `urn:`, `neo4j:` ...).
pub fn is_absolute_iri(iri: &str) -> bool {
    let Some(colon) = iri.find(':') else { return false };
    let scheme = &iri[..colon];
    !scheme.is_empty()
        && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !iri.chars().any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}'))
}

/// Split an IRI into namespace and local name at the last `#`, else `/`, else `:`.
pub fn split_iri(iri: &str) -> (&str, &str) {
    let cut = iri
        .rfind('#')
        .or_else(|| iri.rfind('/'))
        .or_else(|| iri.rfind(':'))
        .map(|i| i + 1)
        .unwrap_or(0);
    iri.split_at(cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_iri() {
        assert_eq!(split_iri("http://ex.org/Person"), ("http://ex.org/", "Person"));
        assert_eq!(split_iri("http://ex.org/ns#Person"), ("http://ex.org/ns#", "Person"));
        assert_eq!(split_iri("urn:isbn:123"), ("urn:isbn:", "123"));
        assert_eq!(split_iri("http://ex.org/"), ("http://ex.org/", ""));
    }

    #[test]
    fn test_absolute_iri() {
        assert!(is_absolute_iri("http://ex.org/a"));
        assert!(is_absolute_iri("urn:isbn:1"));
        assert!(is_absolute_iri("bnode://b0"));
        assert!(!is_absolute_iri("Person"));
        assert!(!is_absolute_iri("ex Person:x"));
        assert!(!is_absolute_iri(":x"));
    }
}
