//! Storage encoding of literal-valued properties.
//!
//! A property `key` holds the value (or a list of values). The recorded
//! datatype lives under `key^^` and the language tag under `key@`; for
//! multi-valued keys both siblings are lists parallel to the value list, with
//! `Null` where an element has none.

use serde::{Deserialize, Serialize};

use super::literal::{canonical_datatype, ResolvedLiteral};
use crate::model::{PropertyMap, Value};
use crate::rdf::{vocab, Literal};

pub const DATATYPE_SUFFIX: &str = "^^";
pub const LANGUAGE_SUFFIX: &str = "@";

/// One literal value as stored on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyCell {
    pub value: Value,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl PropertyCell {
    pub fn text(lexical: impl Into<String>) -> Self {
        Self { value: Value::String(lexical.into()), datatype: None, language: None }
    }

    /// Rebuild the RDF literal this cell was ingested from.
    pub fn to_literal(&self) -> Literal {
        let lexical = self.value.lexical_form();
        if let Some(lang) = &self.language {
            return Literal::lang(lexical, lang.clone());
        }
        let datatype = self
            .datatype
            .clone()
            .unwrap_or_else(|| canonical_datatype(&self.value).to_string());
        if datatype == vocab::XSD_STRING {
            Literal::simple(lexical)
        } else {
            Literal::typed(lexical, datatype)
        }
    }
}

impl From<ResolvedLiteral> for PropertyCell {
    fn from(lit: ResolvedLiteral) -> Self {
        match lit {
            ResolvedLiteral::Native { value, datatype } => Self { value, datatype, language: None },
            ResolvedLiteral::Unresolved { lexical, datatype, language } => {
                Self { value: Value::String(lexical), datatype, language }
            }
        }
    }
}

pub fn datatype_key(key: &str) -> String {
    format!("{key}{DATATYPE_SUFFIX}")
}

pub fn language_key(key: &str) -> String {
    format!("{key}{LANGUAGE_SUFFIX}")
}

/// True for the `^^` / `@` companions of a value property.
pub fn is_sibling_key(key: &str) -> bool {
    key.ends_with(DATATYPE_SUFFIX) || key.ends_with(LANGUAGE_SUFFIX)
}

/// Write `cells` under `key`. Siblings that do not apply are set to `Null`
/// so that stale ones are cleared on merge.
pub fn encode_cells(key: &str, cells: &[PropertyCell], out: &mut PropertyMap) {
    let (value, datatype, language) = match cells {
        [] => (Value::Null, Value::Null, Value::Null),
        [cell] => (
            cell.value.clone(),
            Value::from(cell.datatype.clone()),
            Value::from(cell.language.clone()),
        ),
        many => {
            let column = |f: fn(&PropertyCell) -> Option<&String>| {
                if many.iter().any(|c| f(c).is_some()) {
                    Value::List(many.iter().map(|c| Value::from(f(c).cloned())).collect())
                } else {
                    Value::Null
                }
            };
            (
                Value::List(many.iter().map(|c| c.value.clone()).collect()),
                column(|c| c.datatype.as_ref()),
                column(|c| c.language.as_ref()),
            )
        }
    };
    out.insert(key.to_string(), value);
    out.insert(datatype_key(key), datatype);
    out.insert(language_key(key), language);
}

/// Read back the cells stored under `key`.
pub fn decode_cells(props: &PropertyMap, key: &str) -> Vec<PropertyCell> {
    let Some(value) = props.get(key) else { return Vec::new() };
    let sibling = |k: String, i: usize, single: bool| -> Option<String> {
        match props.get(&k)? {
            Value::List(items) => items.get(i).and_then(Value::as_str).map(str::to_string),
            Value::String(s) if single => Some(s.clone()),
            _ => None,
        }
    };
    match value {
        Value::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| PropertyCell {
                value: v.clone(),
                datatype: sibling(datatype_key(key), i, false),
                language: sibling(language_key(key), i, false),
            })
            .collect(),
        v => vec![PropertyCell {
            value: v.clone(),
            datatype: sibling(datatype_key(key), 0, true),
            language: sibling(language_key(key), 0, true),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_cell_clears_siblings() {
        let mut out = PropertyMap::new();
        encode_cells("name", &[PropertyCell::text("Alice")], &mut out);
        assert_eq!(out.get("name"), Some(&Value::from("Alice")));
        assert_eq!(out.get("name^^"), Some(&Value::Null));
        assert_eq!(out.get("name@"), Some(&Value::Null));
    }

    #[test]
    fn test_multi_cell_parallel_lists() {
        let cells = vec![
            PropertyCell { value: Value::from("cat"), datatype: None, language: Some("en".into()) },
            PropertyCell { value: Value::from("chat"), datatype: None, language: Some("fr".into()) },
            PropertyCell { value: Value::Int(3), datatype: Some(vocab::XSD_INT.into()), language: None },
        ];
        let mut out = PropertyMap::new();
        encode_cells("label", &cells, &mut out);

        assert_eq!(
            out.get("label@"),
            Some(&Value::List(vec![Value::from("en"), Value::from("fr"), Value::Null]))
        );
        assert_eq!(decode_cells(&out, "label"), cells);
    }

    #[test]
    fn test_decode_plain_property() {
        let mut props = PropertyMap::new();
        props.insert("age".into(), Value::Int(30));
        assert_eq!(
            decode_cells(&props, "age"),
            vec![PropertyCell { value: Value::Int(30), datatype: None, language: None }]
        );
        assert!(decode_cells(&props, "missing").is_empty());
    }

    #[test]
    fn test_to_literal() {
        assert_eq!(PropertyCell::text("x").to_literal(), Literal::simple("x"));
        let cell = PropertyCell { value: Value::Int(5), datatype: None, language: None };
        assert_eq!(cell.to_literal(), Literal::typed("5", vocab::XSD_INTEGER));
        let cell = PropertyCell { value: Value::from("hi"), datatype: None, language: Some("en".into()) };
        assert_eq!(cell.to_literal(), Literal::lang("hi", "en"));
    }
}
