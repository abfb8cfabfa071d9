//! Field projection rules
//!
//! A projection turns one raw JSON document into a [`NormalizedRecord`] with a
//! fixed, ordered field set. Every rule is total: missing keys and unexpected
//! shapes fall back to a default instead of failing.
//!
//! # Rules
//!
//! - `number` - numeric value, absent when missing (never zero)
//! - `text` - trimmed string, empty when missing, optional case folding
//! - `raw` - scalar passthrough
//! - `join` - flatten a list of objects into a delimiter-joined string
//! - `first` - nested value of the first list element
//!
//! # Example
//!
//! ```yaml
//! fields:
//!   - name: id
//!     rule: number
//!   - name: name
//!     rule: text
//!     case: capitalize
//!   - name: types
//!     rule: join
//!     path: type.name
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{FieldValue, NormalizedRecord};

/// Case folding applied by the `text` rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextCase {
    /// Leave the text untouched
    #[default]
    None,
    /// First character upper case, the rest lower case
    Capitalize,
    /// All lower case
    Lower,
    /// All upper case
    Upper,
}

impl TextCase {
    fn apply(self, s: &str) -> String {
        match self {
            Self::None => s.to_string(),
            Self::Lower => s.to_lowercase(),
            Self::Upper => s.to_uppercase(),
            Self::Capitalize => {
                let mut chars = s.chars();
                match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect(),
                    None => String::new(),
                }
            }
        }
    }
}

fn default_separator() -> String {
    ",".to_string()
}

/// How a single output field is derived from a raw document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldRule {
    /// Numeric value; absent when missing or not numeric
    Number {
        /// Dotted source path (defaults to the field name)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    /// Trimmed text; empty string when missing
    Text {
        /// Dotted source path (defaults to the field name)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        /// Case folding
        #[serde(default)]
        case: TextCase,
    },

    /// Scalar passthrough; nested values are rendered as JSON text
    Raw {
        /// Dotted source path (defaults to the field name)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    /// Join a nested value of every list element
    Join {
        /// Dotted path to the list (defaults to the field name)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        /// Dotted path inside each element
        path: String,
        /// Delimiter placed between values
        #[serde(default = "default_separator")]
        separator: String,
    },

    /// Nested value of the first list element
    First {
        /// Dotted path to the list (defaults to the field name)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        /// Dotted path inside the element
        path: String,
    },
}

impl FieldRule {
    fn source(&self) -> Option<&str> {
        match self {
            Self::Number { source }
            | Self::Text { source, .. }
            | Self::Raw { source }
            | Self::Join { source, .. }
            | Self::First { source, .. } => source.as_deref(),
        }
    }
}

/// One output field of a projection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    /// Output field name (also the CSV header and the table column name)
    pub name: String,

    /// Derivation rule
    #[serde(flatten)]
    pub rule: FieldRule,
}

impl FieldSpec {
    fn evaluate(&self, doc: &Value) -> FieldValue {
        let source = lookup(doc, self.rule.source().unwrap_or(&self.name));
        match &self.rule {
            FieldRule::Number { .. } => source.map_or(FieldValue::Null, number_value),
            FieldRule::Text { case, .. } => {
                let text = source.map(text_value).unwrap_or_default();
                FieldValue::Text(case.apply(text.trim()))
            }
            FieldRule::Raw { .. } => source.map_or(FieldValue::Null, raw_value),
            FieldRule::Join {
                path, separator, ..
            } => {
                let joined = source
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| lookup(item, path).and_then(scalar_text))
                            .collect::<Vec<_>>()
                            .join(separator)
                    })
                    .unwrap_or_default();
                FieldValue::Text(joined)
            }
            FieldRule::First { path, .. } => {
                let first = source
                    .and_then(Value::as_array)
                    .and_then(|items| items.first())
                    .and_then(|item| lookup(item, path))
                    .and_then(scalar_text)
                    .unwrap_or_default();
                FieldValue::Text(first)
            }
        }
    }
}

/// An ordered set of field rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Projection {
    fields: Vec<FieldSpec>,
}

impl Projection {
    /// Create a projection from its field rules
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Field rules in output order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Output field names in order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Project one raw document into a flat record.
    ///
    /// Never fails: a document of any shape yields a record with exactly the
    /// projection's fields, in the projection's order.
    pub fn normalize(&self, doc: &Value) -> NormalizedRecord {
        let mut record = NormalizedRecord::new();
        for field in &self.fields {
            record.insert(field.name.clone(), field.evaluate(doc));
        }
        record
    }
}

/// Resolve a dotted path. Numeric segments index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn number_value(value: &Value) -> FieldValue {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Integer(i),
            None => n.as_f64().map_or(FieldValue::Null, FieldValue::Float),
        },
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                FieldValue::Integer(i)
            } else {
                match s.parse::<f64>() {
                    Ok(x) if x.is_finite() => FieldValue::Float(x),
                    _ => FieldValue::Null,
                }
            }
        }
        _ => FieldValue::Null,
    }
}

fn raw_value(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Number(_) => number_value(value),
        Value::String(s) => FieldValue::Text(s.clone()),
        Value::Bool(b) => FieldValue::Text(b.to_string()),
        Value::Array(_) | Value::Object(_) => FieldValue::Text(value.to_string()),
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
