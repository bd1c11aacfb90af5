//! The queryable-collection seam.
//!
//! Capabilities only *describe* a query through [`Queryable`]; materializing
//! rows belongs to the persistence layer. [`MemoryCollection`] is the in-process
//! implementation used by the CLI and tests.

use std::cmp::Ordering;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::filter::Operator;

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { field: String, op: Operator, value: Value },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self::Compare { field: field.into(), op, value: value.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
    pub field: String,
    pub direction: SortDirection,
}

/// What the persistence layer must offer. Every mutator only records intent.
pub trait Queryable {
    fn filter(&mut self, predicate: Predicate);
    fn order(&mut self, clause: OrderClause);
    fn limit(&mut self, n: u64);
    fn offset(&mut self, n: u64);
    fn eager_load(&mut self, association: &str);
    /// True when the query joins other relations, so rows may repeat.
    fn has_joins(&self) -> bool;
    /// Matching rows, ignoring any limit/offset/grouping.
    fn count(&self) -> anyhow::Result<u64>;
    /// Matching distinct primary keys, ignoring any limit/offset/grouping.
    fn distinct_count(&self) -> anyhow::Result<u64>;
}

/// Accumulated query description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    pub predicates: Vec<Predicate>,
    pub order: Vec<OrderClause>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub includes: Vec<String>,
}

// ————————————————————————————————————————————————————————————————————————————
// IN-MEMORY COLLECTION
// ————————————————————————————————————————————————————————————————————————————

/// A `Vec` of JSON records evaluated against a [`QueryPlan`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCollection {
    records: Vec<Value>,
    primary_key: String,
    joined: bool,
    plan: QueryPlan,
}

impl MemoryCollection {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records, primary_key: "id".to_owned(), joined: false, plan: QueryPlan::default() }
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    /// Pretend the records came from a join (they may repeat a primary key).
    pub fn joined(mut self) -> Self {
        self.joined = true;
        self
    }

    pub fn plan(&self) -> &QueryPlan { &self.plan }

    /// Apply the plan: filter, order, then offset and limit.
    pub fn fetch(&self) -> Vec<Value> {
        let mut rows = self.matching();
        if !self.plan.order.is_empty() {
            rows.sort_by(|a, b| {
                self.plan.order.iter()
                    .map(|c| {
                        let ord = compare_values(a.get(&c.field), b.get(&c.field));
                        match c.direction {
                            SortDirection::Asc => ord,
                            SortDirection::Desc => ord.reverse(),
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        let skip = usize::try_from(self.plan.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let take = self.plan.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        rows.into_iter().skip(skip).take(take).cloned().collect()
    }

    fn matching(&self) -> Vec<&Value> {
        self.records.iter().filter(|r| self.plan.predicates.iter().all(|p| eval(p, r))).collect()
    }
}

impl Queryable for MemoryCollection {
    fn filter(&mut self, predicate: Predicate) { self.plan.predicates.push(predicate); }
    fn order(&mut self, clause: OrderClause) { self.plan.order.push(clause); }
    fn limit(&mut self, n: u64) { self.plan.limit = Some(n); }
    fn offset(&mut self, n: u64) { self.plan.offset = Some(n); }

    fn eager_load(&mut self, association: &str) {
        if !self.plan.includes.iter().any(|i| i == association) {
            self.plan.includes.push(association.to_owned());
        }
    }

    fn has_joins(&self) -> bool { self.joined }

    fn count(&self) -> anyhow::Result<u64> {
        u64::try_from(self.matching().len()).context("row count overflow")
    }

    fn distinct_count(&self) -> anyhow::Result<u64> {
        let mut seen: Vec<&Value> = Vec::new();
        for row in self.matching() {
            let key = row.get(&self.primary_key).unwrap_or(&Value::Null);
            if !seen.contains(&key) {
                seen.push(key);
            }
        }
        u64::try_from(seen.len()).context("row count overflow")
    }
}

// ---- evaluation ----

fn eval(predicate: &Predicate, record: &Value) -> bool {
    match predicate {
        Predicate::And(all) => all.iter().all(|p| eval(p, record)),
        Predicate::Or(any) => any.iter().any(|p| eval(p, record)),
        Predicate::Not(inner) => !eval(inner, record),
        Predicate::Compare { field, op, value } => {
            let actual = record.get(field).unwrap_or(&Value::Null);
            compare(*op, actual, value)
        }
    }
}

fn compare(op: Operator, actual: &Value, expected: &Value) -> bool {
    let ord = || compare_values(Some(actual), Some(expected));
    let text = |f: fn(&str, &str) -> bool| match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(e)) => f(a, e),
        _ => false,
    };
    match op {
        Operator::Eq => equal(actual, expected),
        Operator::NotEq => !equal(actual, expected),
        Operator::Gt => !actual.is_null() && ord() == Ordering::Greater,
        Operator::Gte => !actual.is_null() && ord() != Ordering::Less,
        Operator::Lt => !actual.is_null() && ord() == Ordering::Less,
        Operator::Lte => !actual.is_null() && ord() != Ordering::Greater,
        Operator::In => expected.as_array().is_some_and(|xs| xs.iter().any(|x| equal(actual, x))),
        Operator::NotIn => expected.as_array().is_some_and(|xs| !xs.iter().any(|x| equal(actual, x))),
        Operator::Contains => text(|a, e| a.contains(e)),
        Operator::StartsWith => text(|a, e| a.starts_with(e)),
        Operator::EndsWith => text(|a, e| a.ends_with(e)),
        Operator::Null => expected.as_bool().is_some_and(|want| actual.is_null() == want),
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Total order over JSON scalars: null first, then numbers, then strings.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x.as_f64().zip(y.as_f64()).and_then(|(x, y)| x.partial_cmp(&y)).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
