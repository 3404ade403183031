//! Literal → property value conversion.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Value;
use crate::rdf::{vocab, Literal};

/// Outcome of resolving one literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedLiteral {
    /// Converted to a native scalar. `datatype` is kept when it is not the
    /// canonical datatype of `value` (e.g. `xsd:int` for an `Int`).
    Native { value: Value, datatype: Option<String> },
    /// Kept as opaque text: unknown datatype, failed conversion, or a
    /// language-tagged string.
    Unresolved {
        lexical: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

/// Which datatypes are converted to native scalars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiteralPolicy {
    pub native_datatypes: Vec<String>,
}

impl Default for LiteralPolicy {
    fn default() -> Self {
        let native_datatypes = vocab::XSD_INTEGER_FAMILY
            .iter()
            .chain(vocab::XSD_FLOAT_FAMILY.iter())
            .chain([vocab::XSD_BOOLEAN, vocab::XSD_DATE, vocab::XSD_DATE_TIME].iter())
            .map(|s| s.to_string())
            .collect();
        Self { native_datatypes }
    }
}

impl LiteralPolicy {
    /// Keep every typed literal as text.
    pub fn text_only() -> Self {
        Self { native_datatypes: Vec::new() }
    }

    pub fn allows(&self, datatype: &str) -> bool {
        self.native_datatypes.iter().any(|d| d == datatype)
    }

    pub fn resolve(&self, literal: &Literal) -> ResolvedLiteral {
        if literal.language.is_some() {
            return ResolvedLiteral::Unresolved {
                lexical: literal.lexical.clone(),
                datatype: None,
                language: literal.language.clone(),
            };
        }
        let datatype = match literal.datatype.as_deref() {
            None | Some(vocab::XSD_STRING) => {
                return ResolvedLiteral::Native { value: Value::from(literal.lexical.as_str()), datatype: None };
            }
            Some(dt) => dt,
        };
        let converted = if self.allows(datatype) {
            convert(&literal.lexical, datatype)
        } else {
            None
        };
        match converted {
            Some(value) => {
                let recorded = (canonical_datatype(&value) != datatype).then(|| datatype.to_string());
                ResolvedLiteral::Native { value, datatype: recorded }
            }
            None => ResolvedLiteral::Unresolved {
                lexical: literal.lexical.clone(),
                datatype: Some(datatype.to_string()),
                language: None,
            },
        }
    }
}

/// The datatype a native value is exported with when none was recorded.
pub fn canonical_datatype(value: &Value) -> &'static str {
    match value {
        Value::Int(_) => vocab::XSD_INTEGER,
        Value::Float(_) => vocab::XSD_DOUBLE,
        Value::Bool(_) => vocab::XSD_BOOLEAN,
        Value::Date(_) => vocab::XSD_DATE,
        Value::DateTime(_) | Value::LocalDateTime(_) => vocab::XSD_DATE_TIME,
        Value::Null | Value::String(_) | Value::List(_) => vocab::XSD_STRING,
    }
}

fn convert(lexical: &str, datatype: &str) -> Option<Value> {
    let lexical = lexical.trim();
    if vocab::XSD_INTEGER_FAMILY.contains(&datatype) {
        return lexical.parse::<i64>().ok().map(Value::Int);
    }
    if vocab::XSD_FLOAT_FAMILY.contains(&datatype) {
        return match lexical {
            "INF" | "+INF" => Some(Value::Float(f64::INFINITY)),
            "-INF" => Some(Value::Float(f64::NEG_INFINITY)),
            "NaN" => Some(Value::Float(f64::NAN)),
            _ if lexical.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E')) => None,
            _ => lexical.parse::<f64>().ok().map(Value::Float),
        };
    }
    match datatype {
        vocab::XSD_BOOLEAN => match lexical {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        vocab::XSD_DATE => NaiveDate::parse_from_str(lexical, "%Y-%m-%d").ok().map(Value::Date),
        vocab::XSD_DATE_TIME => DateTime::parse_from_rfc3339(lexical)
            .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(lexical, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(Value::LocalDateTime)
            }),
        _ => None,
    }
}
