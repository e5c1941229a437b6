//! Predicate model for list queries.
//!
//! These types describe what a caller wants to see, independent of how the
//! backend can execute it. They carry no I/O and are rebuilt whenever the
//! caller's filter or search state changes.

use std::collections::BTreeMap;

use serde_json::Value;

use super::post_filter::ClientFilter;
use super::value::prefix_upper_bound;

/// Ordering direction for sorted queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    /// Ascending order (smallest first).
    #[default]
    Asc,
    /// Descending order (largest first).
    Desc,
}

/// One sort clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub field: String,
    pub direction: OrderDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// One end of a range constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBound {
    pub value: Value,
    pub inclusive: bool,
}

/// A bounded or half-open range on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub field: String,
    pub lower: Option<RangeBound>,
    pub upper: Option<RangeBound>,
}

impl RangeFilter {
    /// `[start, end)`.
    pub fn between(field: impl Into<String>, start: Value, end: Value) -> Self {
        Self {
            field: field.into(),
            lower: Some(RangeBound {
                value: start,
                inclusive: true,
            }),
            upper: Some(RangeBound {
                value: end,
                inclusive: false,
            }),
        }
    }

    /// `>= start`.
    pub fn at_least(field: impl Into<String>, start: Value) -> Self {
        Self {
            field: field.into(),
            lower: Some(RangeBound {
                value: start,
                inclusive: true,
            }),
            upper: None,
        }
    }

    /// `< end`.
    pub fn below(field: impl Into<String>, end: Value) -> Self {
        Self {
            field: field.into(),
            lower: None,
            upper: Some(RangeBound {
                value: end,
                inclusive: false,
            }),
        }
    }

    /// Strings starting with `prefix`: `[prefix, prefix + U+F8FF)`.
    pub fn prefix(field: impl Into<String>, prefix: &str) -> Self {
        Self::between(
            field,
            Value::String(prefix.to_string()),
            Value::String(prefix_upper_bound(prefix)),
        )
    }
}

/// Everything a caller asked for in one list query.
///
/// Equality filters are keyed by field, so asking twice for the same field
/// keeps the last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateSet {
    equality: BTreeMap<String, Value>,
    search: Option<String>,
    ranges: Vec<RangeFilter>,
    sort: Vec<SortKey>,
    client_filters: Vec<ClientFilter>,
}

impl PredicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equality(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equality.insert(field.into(), value.into());
        self
    }

    /// Free-text search. Blank terms are ignored.
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        self.search = if term.trim().is_empty() {
            None
        } else {
            Some(term)
        };
        self
    }

    pub fn with_range(mut self, range: RangeFilter) -> Self {
        self.ranges.push(range);
        self
    }

    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn with_client_filter(mut self, filter: ClientFilter) -> Self {
        self.client_filters.push(filter);
        self
    }

    pub fn equality(&self) -> &BTreeMap<String, Value> {
        &self.equality
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn ranges(&self) -> &[RangeFilter] {
        &self.ranges
    }

    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn client_filters(&self) -> &[ClientFilter] {
        &self.client_filters
    }
}
