//! Client-side post-filtering.
//!
//! Some predicates have no backend representation: substring search across
//! several fields, conditions derived from two stored fields, and OR-style
//! inclusion lists. They run over each raw page after it is fetched.
//!
//! Filtering can shrink a page to nothing without the upstream being
//! exhausted, so callers must never read end-of-data from the filtered size.

use serde_json::Value;

use super::predicate::PredicateSet;
use super::value::compare_values;
use crate::models::Document;

/// A predicate evaluated in memory.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFilter {
    /// Case-insensitive substring match in any of the listed fields.
    Contains { fields: Vec<String>, needle: String },
    /// Numeric `field <= threshold_field` on the same document.
    AtOrBelowField {
        field: String,
        threshold_field: String,
    },
    /// The field equals one of the values. An empty list imposes no
    /// constraint.
    AnyOf { field: String, values: Vec<Value> },
}

impl ClientFilter {
    pub fn contains<I, S>(fields: I, needle: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Contains {
            fields: fields.into_iter().map(Into::into).collect(),
            needle: needle.into(),
        }
    }

    pub fn at_or_below(field: impl Into<String>, threshold_field: impl Into<String>) -> Self {
        Self::AtOrBelowField {
            field: field.into(),
            threshold_field: threshold_field.into(),
        }
    }

    pub fn any_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::AnyOf {
            field: field.into(),
            values,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Contains { fields, needle } => {
                let needle = needle.to_lowercase();
                if needle.is_empty() {
                    return true;
                }
                fields.iter().any(|field| {
                    doc.field(field)
                        .and_then(|value| searchable_text(&value))
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
                })
            }
            Self::AtOrBelowField {
                field,
                threshold_field,
            } => {
                let value = doc.field(field).and_then(|v| v.as_f64());
                let threshold = doc.field(threshold_field).and_then(|v| v.as_f64());
                matches!((value, threshold), (Some(v), Some(t)) if v <= t)
            }
            Self::AnyOf { field, values } => {
                if values.is_empty() {
                    return true;
                }
                let Some(actual) = doc.field(field) else {
                    return false;
                };
                values
                    .iter()
                    .any(|candidate| compare_values(&actual, candidate).is_eq())
            }
        }
    }
}

fn searchable_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Applies a predicate set's client filters to a raw page.
pub struct PostFilter;

impl PostFilter {
    /// Keep the documents that pass every client filter, in order.
    pub fn apply<'a>(raw: &'a [Document], predicates: &PredicateSet) -> Vec<&'a Document> {
        let filters = predicates.client_filters();
        raw.iter()
            .filter(|doc| filters.iter().all(|filter| filter.matches(doc)))
            .collect()
    }
}
