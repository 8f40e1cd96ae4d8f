//! Typed document queries.
//!
//! A [`Query`] is a list of `(field, operator, value)` conditions plus sort keys,
//! a projection and an optional limit. It compiles to a CouchDB Mango `_find`
//! body via [`Query::to_mango`] and can be evaluated in-process with
//! [`Query::matches`] for stores that have no native query language.

use serde_json::{json, Map, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    /// Field is present (value is ignored)
    Exists,
    /// Field equals one of the values in an array
    In,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    fn mango(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Exists => "$exists",
            Operator::In => "$in",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Dotted path, e.g. `data.tracked.data.response.decoded.prediction_id`
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub sort: Vec<SortKey>,
    pub fields: Vec<String>,
    pub limit: Option<usize>,
    pub use_index: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    fn condition(mut self, field: &str, op: Operator, value: Value) -> Self {
        self.conditions.push(Condition {
            field: field.to_string(),
            op,
            value,
        });
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Eq, value.into())
    }

    pub fn exists(self, field: &str) -> Self {
        self.condition(field, Operator::Exists, Value::Bool(true))
    }

    pub fn one_of<V: Into<Value>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.condition(field, Operator::In, Value::Array(values))
    }

    pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Gt, value.into())
    }

    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Gte, value.into())
    }

    pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Lt, value.into())
    }

    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Lte, value.into())
    }

    pub fn sort_asc(mut self, field: &str) -> Self {
        self.sort.push(SortKey {
            field: field.to_string(),
            direction: SortDirection::Asc,
        });
        self
    }

    pub fn sort_desc(mut self, field: &str) -> Self {
        self.sort.push(SortKey {
            field: field.to_string(),
            direction: SortDirection::Desc,
        });
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn use_index(mut self, index: &str) -> Self {
        self.use_index = Some(index.to_string());
        self
    }

    /// Compile into a CouchDB Mango `_find` request body
    pub fn to_mango(&self) -> Value {
        let mut selector = Map::new();
        for condition in &self.conditions {
            let entry = selector
                .entry(condition.field.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(ops) = entry {
                ops.insert(condition.op.mango().to_string(), condition.value.clone());
            }
        }

        let mut body = Map::new();
        body.insert("selector".to_string(), Value::Object(selector));
        if !self.fields.is_empty() {
            body.insert("fields".to_string(), json!(self.fields));
        }
        if !self.sort.is_empty() {
            let sort: Vec<Value> = self
                .sort
                .iter()
                .map(|key| {
                    let direction = match key.direction {
                        SortDirection::Asc => "asc",
                        SortDirection::Desc => "desc",
                    };
                    let mut entry = Map::new();
                    entry.insert(key.field.clone(), json!(direction));
                    Value::Object(entry)
                })
                .collect();
            body.insert("sort".to_string(), Value::Array(sort));
        }
        if let Some(limit) = self.limit {
            body.insert("limit".to_string(), json!(limit));
        }
        if let Some(ref index) = self.use_index {
            body.insert("use_index".to_string(), json!(index));
        }
        Value::Object(body)
    }

    /// Whether a document satisfies every condition
    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|condition| {
            let field = lookup(doc, &condition.field);
            match condition.op {
                Operator::Exists => {
                    let wanted = condition.value.as_bool().unwrap_or(true);
                    field.is_some() == wanted
                }
                Operator::Eq => field.is_some_and(|v| values_equal(v, &condition.value)),
                Operator::In => match (field, &condition.value) {
                    (Some(v), Value::Array(options)) => {
                        options.iter().any(|option| values_equal(v, option))
                    }
                    _ => false,
                },
                Operator::Gt => {
                    field.and_then(|v| compare_values(v, &condition.value)) == Some(Ordering::Greater)
                }
                Operator::Gte => matches!(
                    field.and_then(|v| compare_values(v, &condition.value)),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                Operator::Lt => {
                    field.and_then(|v| compare_values(v, &condition.value)) == Some(Ordering::Less)
                }
                Operator::Lte => matches!(
                    field.and_then(|v| compare_values(v, &condition.value)),
                    Some(Ordering::Less | Ordering::Equal)
                ),
            }
        })
    }

    /// Ordering of two documents under this query's sort keys
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for key in &self.sort {
            let ordering = match (lookup(a, &key.field), lookup(b, &key.field)) {
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            let ordering = match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Keep only the projected fields (all fields when no projection is set)
    pub fn project(&self, doc: &Value) -> Value {
        if self.fields.is_empty() {
            return doc.clone();
        }
        let mut projected = Map::new();
        for field in &self.fields {
            if let Some(value) = lookup(doc, field) {
                projected.insert(field.clone(), value.clone());
            }
        }
        Value::Object(projected)
    }
}

/// Resolve a dotted path inside a JSON document
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(doc, |current, segment| current.as_object()?.get(segment))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
