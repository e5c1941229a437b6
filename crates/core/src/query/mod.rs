//! Query composition: predicates, planning and in-memory evaluation.
//!
//! - [`predicate`] - Caller-facing filter, search and sort value objects
//! - [`planner`] - Turns a [`PredicateSet`] into a backend-valid [`ResolvedQuery`]
//! - [`post_filter`] - Predicates applied to fetched pages in memory
//! - [`value`] - Total ordering over stored JSON values
//! - [`eval`] - Reference execution of a resolved query over documents

pub mod eval;
pub mod planner;
pub mod post_filter;
pub mod predicate;
pub mod value;

pub use eval::evaluate;
pub use planner::{
    DocumentStoreOrdering, FilterClause, OrderingRule, PlannerConfig, QueryPlanner, ResolvedQuery,
    SearchRoute, is_valid_field_name,
};
pub use post_filter::{ClientFilter, PostFilter};
pub use predicate::{OrderDirection, PredicateSet, RangeBound, RangeFilter, SortKey};
pub use value::{compare_documents, compare_values, prefix_upper_bound};
