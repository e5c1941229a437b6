//! Reference execution of a resolved query over in-memory documents.
//!
//! Mirrors what an indexed document store does with a query: documents
//! missing a sort field are skipped, the rest are filtered, sorted, resumed
//! strictly after the cursor document and truncated to the limit.

use std::cmp::Ordering;

use super::planner::ResolvedQuery;
use super::value::compare_documents;
use crate::models::{DOCUMENT_ID_FIELD, Document};

/// Run `query` over `documents`.
pub fn evaluate<'a, I>(
    documents: I,
    query: &ResolvedQuery,
    limit: usize,
    start_after: Option<&Document>,
) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Document>,
{
    let order = query.order();
    let mut matched: Vec<&Document> = documents
        .into_iter()
        .filter(|doc| {
            order
                .iter()
                .all(|key| key.field == DOCUMENT_ID_FIELD || doc.fields.contains_key(&key.field))
        })
        .filter(|doc| query.matches(doc))
        .collect();

    matched.sort_by(|a, b| compare_documents(a, b, order));

    matched
        .into_iter()
        .filter(|doc| {
            start_after.is_none_or(|after| compare_documents(doc, after, order) == Ordering::Greater)
        })
        .take(limit)
        .cloned()
        .collect()
}
