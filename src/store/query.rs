//! # Queries
//!
//! A query is a collection plus equality/range filters, an ordering and
//! an optional limit. Two queries are the same subscription handle when
//! they compare equal.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::path::CollectionPath;
use super::snapshot::{DocumentSnapshot, Fields};

/// Filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

/// Field predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// Check a document's fields against this filter.
    ///
    /// A missing field never matches.
    pub fn matches(&self, fields: &Fields) -> bool {
        let Some(field_value) = fields.get(&self.field) else {
            return false;
        };

        match self.op {
            FilterOp::Eq => field_value == &self.value,
            FilterOp::Neq => field_value != &self.value,
            FilterOp::Gt => compare_values(Some(field_value), Some(&self.value)) == Ordering::Greater
                && same_kind(field_value, &self.value),
            FilterOp::Gte => compare_values(Some(field_value), Some(&self.value)) != Ordering::Less
                && same_kind(field_value, &self.value),
            FilterOp::Lt => compare_values(Some(field_value), Some(&self.value)) == Ordering::Less
                && same_kind(field_value, &self.value),
            FilterOp::Lte => compare_values(Some(field_value), Some(&self.value)) != Ordering::Greater
                && same_kind(field_value, &self.value),
            FilterOp::In => self
                .value
                .as_array()
                .map(|arr| arr.contains(field_value))
                .unwrap_or(false),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Ordering clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// Query over a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    collection: CollectionPath,
    #[serde(default)]
    filters: Vec<Filter>,
    #[serde(default)]
    order_by: Vec<OrderBy>,
    #[serde(default)]
    limit: Option<usize>,
}

impl Query {
    /// Every document in `collection`, ordered by id
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Whether the query pins `field` to exactly `value`
    pub fn constrains(&self, field: &str, value: &Value) -> bool {
        self.filters
            .iter()
            .any(|f| f.field == field && f.op == FilterOp::Eq && &f.value == value)
    }

    /// Whether an existing document satisfies every filter
    pub fn matches(&self, snapshot: &DocumentSnapshot) -> bool {
        if !self.collection.contains(snapshot.path()) {
            return false;
        }
        match snapshot.data() {
            Some(fields) => self.filters.iter().all(|f| f.matches(fields)),
            None => false,
        }
    }

    /// Filter, order and truncate candidate documents.
    ///
    /// Ties on every ordering clause fall back to document id so results
    /// are stable.
    pub fn apply(&self, candidates: Vec<DocumentSnapshot>) -> Vec<DocumentSnapshot> {
        let mut docs: Vec<DocumentSnapshot> =
            candidates.into_iter().filter(|d| self.matches(d)).collect();

        docs.sort_by(|a, b| {
            for clause in &self.order_by {
                let ordering = compare_values(a.get(&clause.field), b.get(&clause.field));
                let ordering = match clause.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.id().cmp(b.id())
        });

        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}

/// Ordering for JSON values: missing < null < bool < number < string.
/// Arrays and objects compare equal within their kind.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a_val), Some(b_val)) => {
            let rank = type_rank(a_val).cmp(&type_rank(b_val));
            if rank != Ordering::Equal {
                return rank;
            }
            match (a_val, b_val) {
                (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                (Value::Number(x), Value::Number(y)) => {
                    let x = x.as_f64().unwrap_or(0.0);
                    let y = y.as_f64().unwrap_or(0.0);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
                (Value::String(x), Value::String(y)) => x.cmp(y),
                _ => Ordering::Equal,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::snapshot::into_fields;
    use crate::store::DocumentPath;
    use serde_json::json;

    fn doc(path: &str, data: Value) -> DocumentSnapshot {
        DocumentSnapshot::new(DocumentPath::parse(path).unwrap(), Some(into_fields(data)))
    }

    fn customers() -> CollectionPath {
        CollectionPath::parse("orgs/org1/customers").unwrap()
    }

    #[test]
    fn test_filter_eq_and_in() {
        let fields = into_fields(json!({"status": "active"}));

        let eq = Filter {
            field: "status".into(),
            op: FilterOp::Eq,
            value: json!("active"),
        };
        assert!(eq.matches(&fields));

        let within = Filter {
            field: "status".into(),
            op: FilterOp::In,
            value: json!(["lead", "active"]),
        };
        assert!(within.matches(&fields));

        let missing = Filter {
            field: "tier".into(),
            op: FilterOp::Neq,
            value: json!("gold"),
        };
        assert!(!missing.matches(&fields));
    }

    #[test]
    fn test_range_filters_do_not_cross_types() {
        let fields = into_fields(json!({"total": 1200}));
        let gt = Filter {
            field: "total".into(),
            op: FilterOp::Gt,
            value: json!(1000),
        };
        assert!(gt.matches(&fields));

        let gt_string = Filter {
            field: "total".into(),
            op: FilterOp::Gt,
            value: json!("1000"),
        };
        assert!(!gt_string.matches(&fields));
    }

    #[test]
    fn test_apply_orders_and_limits() {
        let query = Query::new(customers())
            .filter("status", FilterOp::Eq, json!("active"))
            .order_by("name", SortDirection::Desc)
            .limit(2);

        let docs = vec![
            doc("orgs/org1/customers/a", json!({"name": "Acme", "status": "active"})),
            doc("orgs/org1/customers/b", json!({"name": "Birch", "status": "active"})),
            doc("orgs/org1/customers/c", json!({"name": "Cobalt", "status": "active"})),
            doc("orgs/org1/customers/d", json!({"name": "Delta", "status": "lead"})),
            doc("orgs/org2/customers/e", json!({"name": "Echo", "status": "active"})),
        ];

        let result = query.apply(docs);
        let ids: Vec<&str> = result.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn test_apply_defaults_to_id_order() {
        let query = Query::new(customers());
        let docs = vec![
            doc("orgs/org1/customers/z", json!({})),
            doc("orgs/org1/customers/m", json!({})),
        ];
        let ids: Vec<String> = query.apply(docs).iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["m", "z"]);
    }

    #[test]
    fn test_query_equality_is_structural() {
        let a = Query::new(customers()).filter("status", FilterOp::Eq, json!("active"));
        let b = Query::new(customers()).filter("status", FilterOp::Eq, json!("active"));
        let c = a.clone().limit(5);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_constrains() {
        let query = Query::new(customers()).filter("ownerId", FilterOp::Eq, json!("u1"));
        assert!(query.constrains("ownerId", &json!("u1")));
        assert!(!query.constrains("ownerId", &json!("u2")));
    }
}
