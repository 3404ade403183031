//! RDF terms and statements as handed over by the parser collaborator.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::vocab;

/// Anonymous resource, scoped to one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlankNode(pub String);

impl BlankNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// A literal with optional datatype IRI and language tag.
///
/// A literal with neither is a simple literal (`xsd:string`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Literal {
    pub fn simple(lexical: impl Into<String>) -> Self {
        Self { lexical: lexical.into(), datatype: None, language: None }
    }

    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self { lexical: lexical.into(), datatype: Some(datatype.into()), language: None }
    }

    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self { lexical: lexical.into(), datatype: None, language: Some(language.into()) }
    }

    /// Effective datatype: `rdf:langString` for tagged strings, `xsd:string` when absent.
    pub fn effective_datatype(&self) -> &str {
        match (&self.datatype, &self.language) {
            (_, Some(_)) => vocab::RDF_LANG_STRING,
            (Some(dt), None) => dt,
            (None, None) => vocab::XSD_STRING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    Iri(String),
    Blank(BlankNode),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Object {
    Iri(String),
    Blank(BlankNode),
    Literal(Literal),
}

impl Object {
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Object::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Object::Literal(_))
    }
}

impl From<Subject> for Object {
    fn from(s: Subject) -> Self {
        match s {
            Subject::Iri(iri) => Object::Iri(iri),
            Subject::Blank(b) => Object::Blank(b),
        }
    }
}

impl From<Literal> for Object {
    fn from(l: Literal) -> Self {
        Object::Literal(l)
    }
}

/// One parsed statement, optionally in a named graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RdfStatement {
    pub subject: Subject,
    pub predicate: String,
    pub object: Object,
    pub graph: Option<String>,
}

impl RdfStatement {
    pub fn new(subject: Subject, predicate: impl Into<String>, object: impl Into<Object>) -> Self {
        Self { subject, predicate: predicate.into(), object: object.into(), graph: None }
    }

    /// `<s> <p> <o>` between three IRIs.
    pub fn iri(subject: &str, predicate: &str, object: &str) -> Self {
        Self::new(Subject::Iri(subject.into()), predicate, Object::Iri(object.into()))
    }

    /// `<s> <p> "lexical"` with a simple literal.
    pub fn literal(subject: &str, predicate: &str, lexical: &str) -> Self {
        Self::new(Subject::Iri(subject.into()), predicate, Literal::simple(lexical))
    }

    pub fn in_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }
}

/// Failure reported by the parser collaborator. Always fatal for an ingest call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}{message}", .position.map(|p| format!("line {p}: ")).unwrap_or_default())]
pub struct ParseError {
    pub position: Option<u64>,
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { position: None, message: message.into() }
    }

    pub fn at(position: u64, message: impl Into<String>) -> Self {
        Self { position: Some(position), message: message.into() }
    }
}

/// What the parser yields for each statement.
pub type ParsedStatement = std::result::Result<RdfStatement, ParseError>;

// ============================================================================
// N-Triples rendering (diagnostics)
// ============================================================================

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.0)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", escape(&self.lexical))?;
        match (&self.language, &self.datatype) {
            (Some(lang), _) => write!(f, "@{lang}"),
            (None, Some(dt)) if dt != vocab::XSD_STRING => write!(f, "^^<{dt}>"),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Iri(iri) => write!(f, "<{iri}>"),
            Subject::Blank(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Iri(iri) => write!(f, "<{iri}>"),
            Object::Blank(b) => write!(f, "{b}"),
            Object::Literal(l) => write!(f, "{l}"),
        }
    }
}

impl fmt::Display for RdfStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {}", self.subject, self.predicate, self.object)?;
        if let Some(g) = &self.graph {
            write!(f, " <{g}>")?;
        }
        write!(f, " .")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_ntriples() {
        let st = RdfStatement::literal("http://ex.org/a", "http://ex.org/name", "say \"hi\"");
        assert_eq!(
            st.to_string(),
            r#"<http://ex.org/a> <http://ex.org/name> "say \"hi\"" ."#
        );
    }

    #[test]
    fn test_display_quad_and_typed() {
        let st = RdfStatement::new(
            Subject::Blank(BlankNode::new("b0")),
            "http://ex.org/age",
            Literal::typed("42", vocab::XSD_INTEGER),
        )
        .in_graph("http://ex.org/g");
        assert_eq!(
            st.to_string(),
            "_:b0 <http://ex.org/age> \"42\"^^<http://www.w3.org/2001/XMLSchema#integer> <http://ex.org/g> ."
        );
    }

    #[test]
    fn test_effective_datatype() {
        assert_eq!(Literal::simple("x").effective_datatype(), vocab::XSD_STRING);
        assert_eq!(Literal::lang("x", "en").effective_datatype(), vocab::RDF_LANG_STRING);
    }

    #[test]
    fn test_parse_error_display() {
        assert_eq!(ParseError::at(7, "unexpected EOF").to_string(), "line 7: unexpected EOF");
        assert_eq!(ParseError::new("bad").to_string(), "bad");
    }
}
