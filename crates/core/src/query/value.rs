//! Total ordering over stored JSON values.
//!
//! Follows PostgreSQL's `jsonb` ordering so the cache and the remote store
//! agree on cursor positions for mixed-type fields: null < string < number <
//! bool < array < object, except that an empty top-level array sorts before
//! null. Numbers compare numerically and strings by UTF-8 bytes (a `C`
//! collation). Arrays compare by length, then element-wise. Objects compare
//! by pair count, then key and value pairwise with keys in `jsonb` storage
//! order (shorter keys first).

use std::cmp::Ordering;

use serde_json::Value;

use super::predicate::{OrderDirection, SortKey};
use crate::models::Document;

/// Sentinel appended to a prefix to form the exclusive upper bound of a
/// prefix range. Sorts after every character used in names.
pub const PREFIX_SENTINEL: char = '\u{f8ff}';

/// Exclusive upper bound of the prefix range starting at `prefix`.
pub fn prefix_upper_bound(prefix: &str) -> String {
    let mut bound = String::with_capacity(prefix.len() + PREFIX_SENTINEL.len_utf8());
    bound.push_str(prefix);
    bound.push(PREFIX_SENTINEL);
    bound
}

pub(crate) fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Compare two stored values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Array(x), Value::Null) if x.is_empty() => Ordering::Less,
        (Value::Null, Value::Array(y)) if y.is_empty() => Ordering::Greater,
        _ => compare_nested(a, b),
    }
}

fn compare_nested(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y)
                .map(|(l, r)| compare_nested(l, r))
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()).then_with(|| {
            let left = storage_order(x);
            let right = storage_order(y);
            left.iter()
                .zip(&right)
                .map(|((lk, lv), (rk, rv))| {
                    compare_keys(lk, rk).then_with(|| compare_nested(lv, rv))
                })
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// `jsonb` stores object keys shortest first, then bytewise.
fn compare_keys(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.as_bytes().cmp(b.as_bytes()))
}

fn storage_order(object: &serde_json::Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = object.iter().collect();
    entries.sort_by(|(l, _), (r, _)| compare_keys(l, r));
    entries
}

/// Compare two documents under an ordered list of sort keys. Missing fields
/// compare as null.
pub fn compare_documents(a: &Document, b: &Document, order: &[SortKey]) -> Ordering {
    for key in order {
        let left = a.field(&key.field);
        let right = b.field(&key.field);
        let ord = compare_values(
            left.as_deref().unwrap_or(&Value::Null),
            right.as_deref().unwrap_or(&Value::Null),
        );
        let ord = match key.direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
