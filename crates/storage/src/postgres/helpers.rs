//! SQL generation for document queries.
//!
//! Documents live in one `documents` table keyed by shop, collection and id,
//! with their fields in a JSONB `data` column. A resolved query becomes a
//! single SELECT with keyset pagination over its sort order.

use serde_json::Value;
use shopbook_core::error::{StorageError, StorageResult};
use shopbook_core::models::{DOCUMENT_ID_FIELD, Document};
use shopbook_core::ports::FetchRequest;
use shopbook_core::query::{FilterClause, OrderDirection, SortKey, is_valid_field_name};

/// A bind parameter, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Json(Value),
}

/// SQL text plus its parameters.
#[derive(Debug, Clone)]
pub struct SelectStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

struct Builder {
    conditions: Vec<String>,
    params: Vec<SqlParam>,
}

impl Builder {
    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    /// Bind a value for comparison with `field`.
    fn bind_for(&mut self, field: &str, value: &Value) -> String {
        if field == DOCUMENT_ID_FIELD {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.bind(SqlParam::Text(text))
        } else {
            self.bind(SqlParam::Json(value.clone()))
        }
    }
}

/// Column expression for a document field.
fn column(field: &str) -> String {
    if field == DOCUMENT_ID_FIELD {
        "id".to_string()
    } else {
        format!("data->'{field}'")
    }
}

fn check_field(field: &str) -> StorageResult<()> {
    if field == DOCUMENT_ID_FIELD || is_valid_field_name(field) {
        Ok(())
    } else {
        Err(StorageError::QueryError(format!(
            "refusing to interpolate field name {field:?}"
        )))
    }
}

/// Build the SELECT for one page fetch.
///
/// SAFETY: field names are interpolated into the SQL text, so every one is
/// checked to be a plain identifier first. All values are bound parameters
/// and sort directions come from an enum.
pub fn build_select(request: &FetchRequest<'_>) -> StorageResult<SelectStatement> {
    let query = request.query;
    let mut b = Builder {
        conditions: Vec::new(),
        params: Vec::new(),
    };

    let shop = b.bind(SqlParam::Text(request.scope.shop_id.clone()));
    b.conditions.push(format!("shop_id = {shop}"));
    let collection = b.bind(SqlParam::Text(request.collection.to_string()));
    b.conditions.push(format!("collection = {collection}"));

    for clause in query.filters() {
        check_field(clause.field())?;
        match clause {
            FilterClause::Equal { field, value } => {
                let p = b.bind_for(field, value);
                b.conditions.push(format!("{} = {p}", column(field)));
            }
            FilterClause::Range(range) => {
                let col = column(&range.field);
                if let Some(lower) = &range.lower {
                    let op = if lower.inclusive { ">=" } else { ">" };
                    push_bound(&mut b, &range.field, &col, op, &lower.value);
                }
                if let Some(upper) = &range.upper {
                    let op = if upper.inclusive { "<=" } else { "<" };
                    push_bound(&mut b, &range.field, &col, op, &upper.value);
                }
            }
        }
    }

    // Documents missing a sort field are not part of the result.
    for key in query.order() {
        check_field(&key.field)?;
        if key.field != DOCUMENT_ID_FIELD {
            b.conditions.push(format!("data ? '{}'", key.field));
        }
    }

    if let Some(after) = request.start_after {
        let keyset = keyset_condition(&mut b, query.order(), after);
        b.conditions.push(keyset);
    }

    let order_by = query
        .order()
        .iter()
        .map(|key| {
            let dir = match key.direction {
                OrderDirection::Asc => "ASC",
                OrderDirection::Desc => "DESC",
            };
            format!("{} {dir}", column(&key.field))
        })
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "SELECT id, data FROM documents WHERE {} ORDER BY {} LIMIT {}",
        b.conditions.join(" AND "),
        order_by,
        request.limit
    );

    Ok(SelectStatement {
        sql,
        params: b.params,
    })
}

/// Range bounds only match values of the same JSON type. Sort and keyset
/// comparisons use plain `jsonb` operators, whose cross-type order the
/// in-memory evaluator follows.
fn push_bound(b: &mut Builder, field: &str, col: &str, op: &str, value: &Value) {
    let p = b.bind_for(field, value);
    if field == DOCUMENT_ID_FIELD {
        b.conditions.push(format!("{col} {op} {p}"));
    } else {
        b.conditions.push(format!(
            "({col} {op} {p} AND jsonb_typeof({col}) = jsonb_typeof({p}))"
        ));
    }
}

/// `(k1 > v1) OR (k1 = v1 AND k2 > v2) OR ...`, with `<` for descending keys.
fn keyset_condition(b: &mut Builder, order: &[SortKey], after: &Document) -> String {
    let mut branches = Vec::with_capacity(order.len());
    let mut equal_prefix: Vec<String> = Vec::new();

    for key in order {
        let value = after
            .field(&key.field)
            .map(|v| v.into_owned())
            .unwrap_or(Value::Null);
        let col = column(&key.field);
        let p = b.bind_for(&key.field, &value);
        let op = match key.direction {
            OrderDirection::Asc => ">",
            OrderDirection::Desc => "<",
        };

        let mut parts = equal_prefix.clone();
        parts.push(format!("{col} {op} {p}"));
        branches.push(format!("({})", parts.join(" AND ")));
        equal_prefix.push(format!("{col} = {p}"));
    }

    format!("({})", branches.join(" OR "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shopbook_core::models::{Customer, ShopScope};
    use shopbook_core::query::{PredicateSet, QueryPlanner, RangeFilter, evaluate};

    fn doc(id: &str, value: Value) -> Document {
        Document::from_value(id, value).unwrap()
    }

    #[test]
    fn test_first_page_select() {
        let planner = QueryPlanner::for_entity::<Customer>();
        let query = planner
            .plan(&PredicateSet::new().with_equality("type", "Wholesaler"))
            .unwrap();
        let scope = ShopScope::new("shop-1");
        let request = FetchRequest {
            scope: &scope,
            collection: "customers",
            query: &query,
            limit: 20,
            start_after: None,
        };

        let stmt = build_select(&request).unwrap();
        assert!(stmt.sql.starts_with("SELECT id, data FROM documents WHERE shop_id = $1"));
        assert!(stmt.sql.contains("data->'type' = $3"));
        assert!(stmt.sql.contains("data ? 'created_at'"));
        assert!(stmt.sql.ends_with("LIMIT 20"));
        assert!(stmt.sql.contains("ORDER BY data->'created_at' DESC"));
        assert!(stmt.sql.contains("id ASC LIMIT"));
        assert_eq!(stmt.params[0], SqlParam::Text("shop-1".into()));
        assert_eq!(stmt.params[2], SqlParam::Json(json!("Wholesaler")));
    }

    // Test critique: la reprise après curseur respecte le sens de chaque clé
    #[test]
    fn test_keyset_follows_sort_directions() {
        let order = vec![SortKey::desc("created_at"), SortKey::asc(DOCUMENT_ID_FIELD)];
        let after = doc("c4", json!({"created_at": 42}));
        let mut b = Builder {
            conditions: Vec::new(),
            params: Vec::new(),
        };

        let sql = keyset_condition(&mut b, &order, &after);
        assert_eq!(
            sql,
            "((data->'created_at' < $1) OR (data->'created_at' = $1 AND id > $2))"
        );
        assert_eq!(
            b.params,
            vec![SqlParam::Json(json!(42)), SqlParam::Text("c4".into())]
        );
    }

    // Test critique: clé de tri de types mélangés, le cache et PostgreSQL
    // reprennent après le même enregistrement
    #[test]
    fn test_mixed_type_keyset_matches_memory_order() {
        let planner = QueryPlanner::for_entity::<Customer>();
        let query = planner
            .plan(&PredicateSet::new().sort_by(SortKey::asc("balance")))
            .unwrap();
        let docs = vec![
            doc("a", json!({"name": "A", "balance": "120"})),
            doc("b", json!({"name": "B", "balance": 5})),
            doc("c", json!({"name": "C", "balance": true})),
            doc("d", json!({"name": "D", "balance": [1]})),
        ];
        let scope = ShopScope::new("s");
        let request = FetchRequest {
            scope: &scope,
            collection: "customers",
            query: &query,
            limit: 10,
            start_after: Some(&docs[2]),
        };

        // jsonb: string < number < bool < array, so only the array follows `true`
        let after: Vec<String> = evaluate(&docs, &query, 10, Some(&docs[2]))
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(after, vec!["d"]);

        let ordered: Vec<String> = evaluate(&docs, &query, 10, None)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ordered, vec!["a", "b", "c", "d"]);

        let stmt = build_select(&request).unwrap();
        assert!(stmt.sql.contains("((data->'balance' > $3) OR (data->'balance' = $3 AND"));
        assert!(stmt.sql.contains("ORDER BY data->'balance' ASC"));
        assert_eq!(stmt.params[2], SqlParam::Json(json!(true)));
    }

    #[test]
    fn test_prefix_range_checks_type() {
        let planner = QueryPlanner::for_entity::<Customer>();
        let query = planner
            .plan(&PredicateSet::new().with_range(RangeFilter::prefix("name_lower", "an")))
            .unwrap();
        let scope = ShopScope::new("s");
        let request = FetchRequest {
            scope: &scope,
            collection: "customers",
            query: &query,
            limit: 5,
            start_after: None,
        };

        let stmt = build_select(&request).unwrap();
        assert!(stmt.sql.contains(
            "(data->'name_lower' >= $3 AND jsonb_typeof(data->'name_lower') = jsonb_typeof($3))"
        ));
        assert!(stmt.sql.contains("data->'name_lower' < $4"));
        assert!(stmt.sql.contains("ORDER BY data->'name_lower' ASC"));
    }

    #[test]
    fn test_rejects_unsafe_field_name() {
        assert!(check_field("name'; DROP TABLE documents; --").is_err());
        assert!(check_field(DOCUMENT_ID_FIELD).is_ok());
        assert!(check_field("name_lower").is_ok());
    }
}
