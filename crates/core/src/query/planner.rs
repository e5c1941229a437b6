//! Query planner.
//!
//! Turns a [`PredicateSet`] into a [`ResolvedQuery`] the backend will accept.
//! Document stores only execute a query when every filtered field is part of
//! the sort order and at most one field carries a range constraint, which must
//! then lead the sort. The planner builds the sort clause in a fixed
//! precedence and then asks the backend's [`OrderingRule`] to confirm it.
//!
//! # Sort precedence
//!
//! With a range (or prefix search) on field `R`:
//!
//! ```text
//! R asc, <equality fields> asc, <creation field> desc, <requested keys>, __name__ asc
//! ```
//!
//! Without one:
//!
//! ```text
//! <primary requested or default key>, <equality fields> asc, <other requested keys>,
//! <stable tie-break>, __name__ asc
//! ```
//!
//! A field already present is never added twice.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::predicate::{PredicateSet, RangeBound, RangeFilter, SortKey};
use super::value::{compare_values, type_rank};
use crate::error::{PlanError, PlanResult};
use crate::metrics::record_plan_rejected;
use crate::models::{DOCUMENT_ID_FIELD, Document, Entity};

// =============================================================================
// Configuration
// =============================================================================

/// Per-collection planning profile.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    /// Lower-cased name field used for prefix search.
    pub name_search_field: String,
    /// Field matched exactly when the search term looks like a phone number.
    /// `None` disables phone lookup.
    pub phone_field: Option<String>,
    /// Minimum number of digits for a term to count as a phone number.
    pub min_phone_digits: usize,
    /// Creation timestamp, used as tie-break after a range key.
    pub creation_field: String,
    /// Sort used when the caller requests none.
    pub default_sort: Vec<SortKey>,
    /// Appended when no range is active so ordering never rests on a single
    /// key.
    pub stable_tie_break: SortKey,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            name_search_field: "name_lower".to_string(),
            phone_field: None,
            min_phone_digits: 7,
            creation_field: "created_at".to_string(),
            default_sort: vec![SortKey::desc("created_at")],
            stable_tie_break: SortKey::asc("name"),
        }
    }
}

/// How a free-text search term is pushed into the backend query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRoute {
    /// Exact match on the phone field.
    Phone { field: String, number: String },
    /// Lower-cased prefix range on the name field.
    Prefix { field: String, prefix: String },
}

impl PlannerConfig {
    /// Pick the search path for a term. Returns `None` for blank terms.
    pub fn route_search(&self, term: &str) -> Option<SearchRoute> {
        let term = term.trim();
        if term.is_empty() {
            return None;
        }

        if let Some(field) = &self.phone_field
            && term.len() >= self.min_phone_digits
            && term.bytes().all(|b| b.is_ascii_digit())
        {
            return Some(SearchRoute::Phone {
                field: field.clone(),
                number: term.to_string(),
            });
        }

        Some(SearchRoute::Prefix {
            field: self.name_search_field.clone(),
            prefix: term.to_lowercase(),
        })
    }
}

// =============================================================================
// Resolved Query
// =============================================================================

/// A filter the backend evaluates.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    Equal { field: String, value: Value },
    Range(RangeFilter),
}

impl FilterClause {
    pub fn field(&self) -> &str {
        match self {
            Self::Equal { field, .. } => field,
            Self::Range(range) => &range.field,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Self::Range(_))
    }

    /// Evaluate the clause against a document. Missing fields never match,
    /// and range bounds only match values of the bound's type.
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.field(self.field()) else {
            return false;
        };

        match self {
            Self::Equal { value, .. } => compare_values(&actual, value).is_eq(),
            Self::Range(range) => {
                let within = |bound: &RangeBound, lower: bool| {
                    if type_rank(&actual) != type_rank(&bound.value) {
                        return false;
                    }
                    let ord = compare_values(&actual, &bound.value);
                    match (lower, bound.inclusive) {
                        (true, true) => ord.is_ge(),
                        (true, false) => ord.is_gt(),
                        (false, true) => ord.is_le(),
                        (false, false) => ord.is_lt(),
                    }
                };
                range.lower.as_ref().is_none_or(|b| within(b, true))
                    && range.upper.as_ref().is_none_or(|b| within(b, false))
            }
        }
    }
}

/// A validated, backend-executable query.
///
/// Only the planner builds these; they are never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    filters: Vec<FilterClause>,
    order: Vec<SortKey>,
    fingerprint: u64,
}

impl ResolvedQuery {
    fn new(filters: Vec<FilterClause>, order: Vec<SortKey>) -> Self {
        let mut hasher = DefaultHasher::new();
        format!("{filters:?}|{order:?}").hash(&mut hasher);
        Self {
            filters,
            order,
            fingerprint: hasher.finish(),
        }
    }

    /// Filter clauses: equality clauses first, then the range clause if any.
    pub fn filters(&self) -> &[FilterClause] {
        &self.filters
    }

    /// Sort clauses, always ending with the document id.
    pub fn order(&self) -> &[SortKey] {
        &self.order
    }

    /// Stable identity of this query, used to bind cursors to it.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn range(&self) -> Option<&RangeFilter> {
        self.filters.iter().find_map(|clause| match clause {
            FilterClause::Range(range) => Some(range),
            FilterClause::Equal { .. } => None,
        })
    }

    pub fn primary_sort(&self) -> Option<&SortKey> {
        self.order.first()
    }

    /// Whether a document passes every filter clause.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|clause| clause.matches(doc))
    }

    fn validate_field_names(&self) -> PlanResult<()> {
        let fields = self
            .filters
            .iter()
            .map(FilterClause::field)
            .chain(self.order.iter().map(|key| key.field.as_str()));
        for field in fields {
            if !is_valid_field_name(field) {
                return Err(PlanError::InvalidFieldName(field.to_string()));
            }
        }
        Ok(())
    }
}

/// Field names must match `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

// =============================================================================
// Ordering Rules
// =============================================================================

/// Backend-specific constraint between filters and sort order.
///
/// Each backend adapter supplies the rule its query engine enforces; the
/// planner rejects any query the rule refuses.
pub trait OrderingRule: fmt::Debug + Send + Sync {
    fn check(&self, query: &ResolvedQuery) -> PlanResult<()>;
}

/// Ordering constraints of indexed document stores.
///
/// - at most one field carries a range constraint
/// - that field is the first sort key
/// - every filtered field appears in the sort order
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentStoreOrdering;

impl OrderingRule for DocumentStoreOrdering {
    fn check(&self, query: &ResolvedQuery) -> PlanResult<()> {
        let mut range_fields: Vec<&str> = query
            .filters()
            .iter()
            .filter(|clause| clause.is_range())
            .map(FilterClause::field)
            .collect();
        range_fields.dedup();

        if range_fields.len() > 1 {
            return Err(PlanError::UnsupportedQueryShape(format!(
                "range constraints on multiple fields: {}",
                range_fields.join(", ")
            )));
        }

        if let Some(field) = range_fields.first()
            && query.primary_sort().map(|key| key.field.as_str()) != Some(*field)
        {
            return Err(PlanError::UnsupportedQueryShape(format!(
                "range field {field} must be the first sort key"
            )));
        }

        for clause in query.filters() {
            if !query.order().iter().any(|key| key.field == clause.field()) {
                return Err(PlanError::UnsupportedQueryShape(format!(
                    "filtered field {} is missing from the sort order",
                    clause.field()
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Builds backend-valid queries for one collection.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    config: PlannerConfig,
    rule: Arc<dyn OrderingRule>,
}

impl QueryPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            rule: Arc::new(DocumentStoreOrdering),
        }
    }

    /// Planner using the entity's own profile.
    pub fn for_entity<E: Entity>() -> Self {
        Self::new(E::planner_config())
    }

    /// Replace the ordering rule with a backend-specific one.
    pub fn with_rule(mut self, rule: Arc<dyn OrderingRule>) -> Self {
        self.rule = rule;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Resolve a predicate set into an executable query.
    pub fn plan(&self, predicates: &PredicateSet) -> PlanResult<ResolvedQuery> {
        let result = self.build(predicates).and_then(|query| {
            self.rule.check(&query)?;
            Ok(query)
        });

        match &result {
            Ok(query) => debug!(
                filters = query.filters().len(),
                sort_keys = query.order().len(),
                "Query planned"
            ),
            Err(e) => {
                debug!(error = %e, "Query plan rejected");
                record_plan_rejected();
            }
        }

        result
    }

    fn build(&self, predicates: &PredicateSet) -> PlanResult<ResolvedQuery> {
        let mut equality: Vec<(String, Value)> = predicates
            .equality()
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        let mut ranges: Vec<RangeFilter> = predicates.ranges().to_vec();

        match predicates
            .search()
            .and_then(|term| self.config.route_search(term))
        {
            Some(SearchRoute::Phone { field, number }) => {
                let number = Value::String(number);
                match equality.iter().find(|(f, _)| *f == field) {
                    Some((_, existing)) if *existing != number => {
                        return Err(PlanError::UnsupportedQueryShape(format!(
                            "phone search conflicts with the equality filter on {field}"
                        )));
                    }
                    Some(_) => {}
                    None => equality.push((field, number)),
                }
            }
            Some(SearchRoute::Prefix { field, prefix }) => {
                ranges.push(RangeFilter::prefix(field, &prefix));
            }
            None => {}
        }

        if ranges.len() > 1 {
            let fields: Vec<&str> = ranges.iter().map(|r| r.field.as_str()).collect();
            return Err(PlanError::UnsupportedQueryShape(format!(
                "at most one range constraint per query, got {} ({})",
                ranges.len(),
                fields.join(", ")
            )));
        }
        let range = ranges.pop();

        let mut order = OrderBuilder::default();
        match &range {
            Some(range) => {
                order.push(SortKey::asc(&range.field));
                for (field, _) in &equality {
                    order.push(SortKey::asc(field));
                }
                order.push(SortKey::desc(&self.config.creation_field));
                for key in predicates.sort() {
                    order.push(key.clone());
                }
            }
            None => {
                let requested = if predicates.sort().is_empty() {
                    &self.config.default_sort[..]
                } else {
                    predicates.sort()
                };
                let mut keys = requested.iter();
                if let Some(primary) = keys.next() {
                    order.push(primary.clone());
                }
                for (field, _) in &equality {
                    order.push(SortKey::asc(field));
                }
                for key in keys {
                    order.push(key.clone());
                }
                order.push(self.config.stable_tie_break.clone());
            }
        }
        order.push(SortKey::asc(DOCUMENT_ID_FIELD));

        let mut filters: Vec<FilterClause> = equality
            .into_iter()
            .map(|(field, value)| FilterClause::Equal { field, value })
            .collect();
        if let Some(range) = range {
            filters.push(FilterClause::Range(range));
        }

        let query = ResolvedQuery::new(filters, order.keys);
        query.validate_field_names()?;
        Ok(query)
    }
}

/// Sort clause accumulator that ignores repeated fields.
#[derive(Default)]
struct OrderBuilder {
    keys: Vec<SortKey>,
}

impl OrderBuilder {
    fn push(&mut self, key: SortKey) {
        if !self.keys.iter().any(|k| k.field == key.field) {
            self.keys.push(key);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Customer;
    use crate::query::predicate::OrderDirection;
    use serde_json::json;

    fn customer_planner() -> QueryPlanner {
        QueryPlanner::for_entity::<Customer>()
    }

    fn fields(query: &ResolvedQuery) -> Vec<&str> {
        query.order().iter().map(|k| k.field.as_str()).collect()
    }

    // Test critique: un filtre d'égalité apparaît toujours dans le tri,
    // avec un départage secondaire
    #[test]
    fn test_equality_filter_is_sorted_and_tie_broken() {
        let predicates = PredicateSet::new().with_equality("type", "Wholesaler");
        let query = customer_planner().plan(&predicates).unwrap();

        assert_eq!(
            fields(&query),
            vec!["created_at", "type", "name", DOCUMENT_ID_FIELD]
        );
        assert_eq!(query.order()[0].direction, OrderDirection::Desc);
        assert!(query.range().is_none());
    }

    #[test]
    fn test_requested_sort_becomes_primary() {
        let predicates = PredicateSet::new()
            .with_equality("type", "Wholesaler")
            .sort_by(SortKey::asc("name"));
        let query = customer_planner().plan(&predicates).unwrap();

        // name is both the requested key and the tie-break; it appears once
        assert_eq!(fields(&query), vec!["name", "type", DOCUMENT_ID_FIELD]);
    }

    #[test]
    fn test_equality_on_primary_key_is_not_repeated() {
        let predicates = PredicateSet::new()
            .with_equality("created_at", 5)
            .sort_by(SortKey::desc("created_at"));
        let query = customer_planner().plan(&predicates).unwrap();
        assert_eq!(
            fields(&query),
            vec!["created_at", "name", DOCUMENT_ID_FIELD]
        );
    }

    // Test critique: la recherche par préfixe impose son champ en tête du tri
    #[test]
    fn test_prefix_search_leads_the_sort() {
        let predicates = PredicateSet::new()
            .with_search("Sharma")
            .with_equality("type", "Retailer")
            .sort_by(SortKey::asc("name"));
        let query = customer_planner().plan(&predicates).unwrap();

        assert_eq!(
            fields(&query),
            vec!["name_lower", "type", "created_at", "name", DOCUMENT_ID_FIELD]
        );
        assert_eq!(query.order()[0].direction, OrderDirection::Asc);
        assert_eq!(query.order()[2].direction, OrderDirection::Desc);

        let range = query.range().unwrap();
        assert_eq!(range.lower.as_ref().unwrap().value, json!("sharma"));
    }

    // Test critique: deux contraintes d'intervalle sont refusées, jamais
    // une requête malformée
    #[test]
    fn test_two_ranges_are_unsupported() {
        let predicates = PredicateSet::new()
            .with_search("ram")
            .with_range(RangeFilter::at_least("balance", json!(100)));
        let err = customer_planner().plan(&predicates).unwrap_err();
        assert!(matches!(err, PlanError::UnsupportedQueryShape(_)));

        let predicates = PredicateSet::new()
            .with_range(RangeFilter::at_least("balance", json!(100)))
            .with_range(RangeFilter::below("created_at", json!(10)));
        let err = customer_planner().plan(&predicates).unwrap_err();
        assert!(err.to_string().contains("balance"));
    }

    #[test]
    fn test_explicit_range_without_search() {
        let predicates = PredicateSet::new()
            .with_range(RangeFilter::at_least("balance", json!(100)))
            .sort_by(SortKey::asc("name"));
        let query = customer_planner().plan(&predicates).unwrap();
        assert_eq!(
            fields(&query),
            vec!["balance", "created_at", "name", DOCUMENT_ID_FIELD]
        );
    }

    #[test]
    fn test_long_digit_terms_route_to_phone() {
        let config = Customer::planner_config();
        assert_eq!(
            config.route_search("98765432"),
            Some(SearchRoute::Phone {
                field: "phone".into(),
                number: "98765432".into()
            })
        );
        // too short for a phone number
        assert_eq!(
            config.route_search("987654"),
            Some(SearchRoute::Prefix {
                field: "name_lower".into(),
                prefix: "987654".into()
            })
        );
        assert!(matches!(
            config.route_search("98765-432"),
            Some(SearchRoute::Prefix { .. })
        ));
        assert_eq!(config.route_search("  "), None);
    }

    #[test]
    fn test_phone_route_disabled_without_phone_field() {
        let config = PlannerConfig::default();
        assert!(matches!(
            config.route_search("98765432"),
            Some(SearchRoute::Prefix { .. })
        ));
    }

    #[test]
    fn test_phone_search_becomes_equality() {
        let predicates = PredicateSet::new().with_search("98765432");
        let query = customer_planner().plan(&predicates).unwrap();

        assert!(query.range().is_none());
        assert_eq!(
            query.filters(),
            &[FilterClause::Equal {
                field: "phone".into(),
                value: json!("98765432")
            }]
        );
        assert!(fields(&query).contains(&"phone"));
    }

    #[test]
    fn test_phone_search_conflicting_with_equality() {
        let predicates = PredicateSet::new()
            .with_equality("phone", "11111111")
            .with_search("98765432");
        assert!(customer_planner().plan(&predicates).is_err());

        let predicates = PredicateSet::new()
            .with_equality("phone", "98765432")
            .with_search("98765432");
        let query = customer_planner().plan(&predicates).unwrap();
        assert_eq!(query.filters().len(), 1);
    }

    #[test]
    fn test_invalid_field_names_are_rejected() {
        let predicates = PredicateSet::new().with_equality("type'); --", "x");
        let err = customer_planner().plan(&predicates).unwrap_err();
        assert!(matches!(err, PlanError::InvalidFieldName(_)));
        assert!(is_valid_field_name(DOCUMENT_ID_FIELD));
        assert!(!is_valid_field_name("1st"));
        assert!(!is_valid_field_name(""));
    }

    #[derive(Debug)]
    struct NoFiltersRule;

    impl OrderingRule for NoFiltersRule {
        fn check(&self, query: &ResolvedQuery) -> PlanResult<()> {
            if query.filters().is_empty() {
                Ok(())
            } else {
                Err(PlanError::UnsupportedQueryShape("filters unsupported".into()))
            }
        }
    }

    #[test]
    fn test_backend_rule_is_consulted() {
        let planner = customer_planner().with_rule(Arc::new(NoFiltersRule));
        assert!(planner.plan(&PredicateSet::new()).is_ok());
        let err = planner
            .plan(&PredicateSet::new().with_equality("type", "Retailer"))
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::UnsupportedQueryShape("filters unsupported".into())
        );
    }

    #[test]
    fn test_document_store_rule_rejects_unsorted_filter() {
        let query = ResolvedQuery::new(
            vec![FilterClause::Equal {
                field: "type".into(),
                value: json!("Retailer"),
            }],
            vec![SortKey::asc("name")],
        );
        assert!(DocumentStoreOrdering.check(&query).is_err());

        let query = ResolvedQuery::new(
            vec![FilterClause::Range(RangeFilter::prefix("name_lower", "a"))],
            vec![SortKey::asc("created_at"), SortKey::asc("name_lower")],
        );
        let err = DocumentStoreOrdering.check(&query).unwrap_err();
        assert!(err.to_string().contains("first sort key"));
    }

    #[test]
    fn test_fingerprint_tracks_query_shape() {
        let planner = customer_planner();
        let a = planner
            .plan(&PredicateSet::new().with_equality("type", "Retailer"))
            .unwrap();
        let b = planner
            .plan(&PredicateSet::new().with_equality("type", "Retailer"))
            .unwrap();
        let c = planner
            .plan(&PredicateSet::new().with_equality("type", "Wholesaler"))
            .unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_filter_clause_evaluation() {
        let doc = Document::from_value(
            "c-1",
            json!({"name_lower": "sharma traders", "balance": 250, "type": "Retailer"}),
        )
        .unwrap();

        assert!(FilterClause::Range(RangeFilter::prefix("name_lower", "sha")).matches(&doc));
        assert!(!FilterClause::Range(RangeFilter::prefix("name_lower", "shb")).matches(&doc));
        assert!(FilterClause::Range(RangeFilter::at_least("balance", json!(250))).matches(&doc));
        // string bound never matches a number
        assert!(!FilterClause::Range(RangeFilter::below("balance", json!("z"))).matches(&doc));
        assert!(
            !FilterClause::Equal {
                field: "phone".into(),
                value: json!(null)
            }
            .matches(&doc)
        );
    }
}
