//! Pagination, offset or cursor based.
//!
//! Offset: `limit = max(size, 1)`, `offset = (page - 1) * limit`, and the
//! response block is `{current, next, prev, total, items}`. Counting ignores
//! any window on the query and counts distinct rows when the query joins.
//!
//! Cursor: tokens are URL-safe base64 of `{"id": <pk>}`; `size + 1` rows are
//! fetched to learn whether another page exists.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::Capability;
use crate::error::{ConfigError, ConfigResult};
use crate::ir::Param;
use crate::issue::{child, Issue, IssueCode, PathSegment};
use crate::query::{OrderClause, Predicate, Queryable, SortDirection};
use crate::registry::{Scope, TypeDecl, TypeRegistry};
use crate::shape::{ObjectBlock, ObjectBuilder};
use crate::capability::filter::Operator;

pub const OFFSET_TYPE: &str = "offset_pagination";
pub const CURSOR_TYPE: &str = "cursor_pagination";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum PaginationStrategy {
    #[default]
    Offset,
    Cursor,
}

impl FromStr for PaginationStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "offset" => Ok(Self::Offset),
            "cursor" => Ok(Self::Cursor),
            other => Err(ConfigError::PaginationStrategyInvalid(other.to_owned())),
        }
    }
}

impl TryFrom<String> for PaginationStrategy {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, ConfigError> { s.parse() }
}

impl fmt::Display for PaginationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offset => "offset",
            Self::Cursor => "cursor",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub strategy: PaginationStrategy,
    pub default_size: u64,
    pub max_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { strategy: PaginationStrategy::Offset, default_size: 20, max_size: 100 }
    }
}

impl PaginationConfig {
    pub fn check(&self) -> ConfigResult<()> {
        if self.default_size == 0 || self.max_size < self.default_size {
            return Err(ConfigError::PaginationSizeInvalid {
                default_size: self.default_size,
                max_size: self.max_size,
            });
        }
        Ok(())
    }
}

// ---- cursor tokens ----

pub fn encode_cursor(pk: &Value) -> String {
    URL_SAFE_NO_PAD.encode(json!({ "id": pk }).to_string())
}

pub fn decode_cursor(token: &str) -> Option<Value> {
    let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    value.get("id").filter(|id| !id.is_null()).cloned()
}

/// Offset-window arithmetic, `(limit, offset)` for a 1-based page.
pub fn window(page: u64, size: u64) -> (u64, u64) {
    let limit = size.max(1);
    (limit, page.saturating_sub(1).saturating_mul(limit))
}

/// `{current, next, prev, total, items}` for an offset page.
pub fn offset_metadata(page: u64, size: u64, items: u64) -> Value {
    let limit = size.max(1);
    let total = items.div_ceil(limit);
    let next = (page < total).then(|| page + 1);
    let prev = (page > 1).then(|| page - 1);
    json!({ "current": page, "next": next, "prev": prev, "total": total, "items": items })
}

// ---- capability ----

#[derive(Debug, Clone)]
pub struct Pagination {
    config: PaginationConfig,
    primary_key: String,
}

impl Pagination {
    pub fn new(config: PaginationConfig, primary_key: impl Into<String>) -> ConfigResult<Self> {
        config.check()?;
        Ok(Self { config, primary_key: primary_key.into() })
    }

    pub fn config(&self) -> &PaginationConfig { &self.config }

    fn size(&self, params: Option<&Value>) -> u64 {
        params
            .and_then(|p| p.get("size"))
            .and_then(Value::as_u64)
            .unwrap_or(self.config.default_size)
            .clamp(1, self.config.max_size)
    }

    fn page(params: Option<&Value>) -> u64 {
        params.and_then(|p| p.get("number")).and_then(Value::as_u64).unwrap_or(1).max(1)
    }

    fn token(params: Option<&Value>, key: &str) -> Option<Value> {
        params.and_then(|p| p.get(key)).and_then(Value::as_str).and_then(decode_cursor)
    }
}

impl Capability for Pagination {
    fn name(&self) -> &'static str { "pagination" }

    fn query_key(&self) -> Option<&'static str> { Some("page") }

    fn register_types(&self, registry: &mut TypeRegistry) -> ConfigResult<()> {
        let (name, shape) = match self.config.strategy {
            PaginationStrategy::Offset => {
                let mut o = ObjectBuilder::new();
                o.param("current", Param::integer().required())
                    .param("next", Param::integer().required().nullable())
                    .param("prev", Param::integer().required().nullable())
                    .param("total", Param::integer().required())
                    .param("items", Param::integer().required());
                (OFFSET_TYPE, o.build())
            }
            PaginationStrategy::Cursor => {
                let mut o = ObjectBuilder::new();
                o.param("next_cursor", Param::string().required().nullable())
                    .param("prev_cursor", Param::string().required().nullable());
                (CURSOR_TYPE, o.build())
            }
        };
        if !registry.contains_type(&Scope::Global, name) {
            registry.register_type(Scope::Global, TypeDecl::object(name, ObjectBlock::from_shape(shape)))?;
        }
        Ok(())
    }

    fn query_param(&self) -> Option<Param> {
        let size = Param::integer().min(1.0).max(self.config.max_size as f64);
        let mut o = ObjectBuilder::new();
        match self.config.strategy {
            PaginationStrategy::Offset => {
                o.param("number", Param::integer().min(1.0)).param("size", size);
            }
            PaginationStrategy::Cursor => {
                o.param("after", Param::string()).param("before", Param::string()).param("size", size);
            }
        }
        Some(Param::object(o.build()))
    }

    fn response_fragment(&self) -> Option<(&'static str, Param)> {
        let name = match self.config.strategy {
            PaginationStrategy::Offset => OFFSET_TYPE,
            PaginationStrategy::Cursor => CURSOR_TYPE,
        };
        Some(("pagination", Param::reference(name).required()))
    }

    fn extract(&self, raw: &Value, path: &[PathSegment], issues: &mut Vec<Issue>) -> Value {
        let (PaginationStrategy::Cursor, Some(map)) = (self.config.strategy, raw.as_object()) else {
            return raw.clone();
        };
        let mut out: Map<String, Value> = map.clone();
        if out.contains_key("after") && out.contains_key("before") {
            issues.push(Issue::new(IssueCode::CursorInvalid, path.to_vec(), "`after` and `before` are mutually exclusive"));
            out.remove("before");
        }
        for key in ["after", "before"] {
            let Some(Value::String(token)) = out.get(key) else { continue };
            if decode_cursor(token).is_none() {
                issues.push(Issue::new(IssueCode::CursorInvalid, child(path, key), "is not a valid cursor"));
                out.remove(key);
            }
        }
        Value::Object(out)
    }

    fn apply(&self, params: Option<&Value>, query: &mut dyn Queryable) -> anyhow::Result<()> {
        let size = self.size(params);
        match self.config.strategy {
            PaginationStrategy::Offset => {
                let (limit, offset) = window(Self::page(params), size);
                query.limit(limit);
                query.offset(offset);
            }
            PaginationStrategy::Cursor => {
                let pk = self.primary_key.clone();
                let direction = match (Self::token(params, "after"), Self::token(params, "before")) {
                    (Some(after), _) => {
                        query.filter(Predicate::compare(pk.clone(), Operator::Gt, after));
                        SortDirection::Asc
                    }
                    (None, Some(before)) => {
                        query.filter(Predicate::compare(pk.clone(), Operator::Lt, before));
                        SortDirection::Desc
                    }
                    (None, None) => SortDirection::Asc,
                };
                query.order(OrderClause { field: pk, direction });
                query.limit(size + 1);
            }
        }
        Ok(())
    }

    fn finalize(
        &self,
        params: Option<&Value>,
        query: &dyn Queryable,
        rows: &mut Vec<Value>,
    ) -> anyhow::Result<Option<(&'static str, Value)>> {
        let size = self.size(params);
        let block = match self.config.strategy {
            PaginationStrategy::Offset => {
                let items = if query.has_joins() { query.distinct_count()? } else { query.count()? };
                offset_metadata(Self::page(params), size, items)
            }
            PaginationStrategy::Cursor => {
                let limit = usize::try_from(size)?;
                let more = rows.len() > limit;
                rows.truncate(limit);
                let backwards = Self::token(params, "before").is_some() && Self::token(params, "after").is_none();
                if backwards {
                    rows.reverse();
                }
                let pk = |row: Option<&Value>| row.and_then(|r| r.get(&self.primary_key)).map(encode_cursor);
                let (next, prev) = if backwards {
                    (pk(rows.last()), if more { pk(rows.first()) } else { None })
                } else {
                    let came_from = Self::token(params, "after").is_some();
                    (if more { pk(rows.last()) } else { None }, if came_from { pk(rows.first()) } else { None })
                };
                json!({ "next_cursor": next, "prev_cursor": prev })
            }
        };
        Ok(Some(("pagination", block)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MemoryCollection;

    #[test]
    fn offset_metadata_boundaries() {
        assert_eq!(offset_metadata(1, 20, 95), json!({ "current": 1, "next": 2, "prev": null, "total": 5, "items": 95 }));
        assert_eq!(offset_metadata(5, 20, 95), json!({ "current": 5, "next": null, "prev": 4, "total": 5, "items": 95 }));
        assert_eq!(offset_metadata(1, 0, 0)["total"], json!(0));
        let keys: Vec<_> = offset_metadata(2, 20, 95).as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["current", "next", "prev", "total", "items"]);
    }

    #[test]
    fn window_math() {
        assert_eq!(window(1, 20), (20, 0));
        assert_eq!(window(3, 20), (20, 40));
        assert_eq!(window(2, 0), (1, 1));
    }

    #[test]
    fn count_is_distinct_under_joins() {
        let p = Pagination::new(PaginationConfig::default(), "id").unwrap();
        let rows: Vec<Value> = (1..=3).flat_map(|i| [json!({ "id": i }), json!({ "id": i })]).collect();
        let mut q = MemoryCollection::new(rows).joined();
        let params = json!({ "number": 1, "size": 2 });
        p.apply(Some(&params), &mut q).unwrap();
        let mut fetched = q.fetch();
        let (_, block) = p.finalize(Some(&params), &q, &mut fetched).unwrap().unwrap();
        assert_eq!(block["items"], json!(3));
        assert_eq!(block["total"], json!(2));
    }

    #[test]
    fn cursor_pages_forward() {
        let p = Pagination::new(PaginationConfig { strategy: PaginationStrategy::Cursor, default_size: 2, max_size: 10 }, "id").unwrap();
        let rows: Vec<Value> = (1..=5).map(|i| json!({ "id": i })).collect();

        let mut q = MemoryCollection::new(rows.clone());
        p.apply(None, &mut q).unwrap();
        let mut page = q.fetch();
        let (_, block) = p.finalize(None, &q, &mut page).unwrap().unwrap();
        assert_eq!(page, vec![json!({ "id": 1 }), json!({ "id": 2 })]);
        assert_eq!(block["prev_cursor"], Value::Null);
        let next = block["next_cursor"].as_str().unwrap().to_owned();
        assert_eq!(decode_cursor(&next), Some(json!(2)));

        let params = json!({ "after": next });
        let mut q = MemoryCollection::new(rows);
        p.apply(Some(&params), &mut q).unwrap();
        let mut page = q.fetch();
        p.finalize(Some(&params), &q, &mut page).unwrap();
        assert_eq!(page, vec![json!({ "id": 3 }), json!({ "id": 4 })]);
    }

    #[test]
    fn cursor_extraction_rejects_bad_tokens() {
        let p = Pagination::new(PaginationConfig { strategy: PaginationStrategy::Cursor, ..Default::default() }, "id").unwrap();
        let mut issues = Vec::new();
        let good = encode_cursor(&json!(7));
        let out = p.extract(&json!({ "after": good, "before": good }), &[PathSegment::from("page")], &mut issues);
        assert_eq!(issues.len(), 1);
        assert!(out.get("before").is_none());

        let mut issues = Vec::new();
        p.extract(&json!({ "after": "%%%" }), &[PathSegment::from("page")], &mut issues);
        assert_eq!(issues[0].code, IssueCode::CursorInvalid);
        assert_eq!(issues[0].path, vec![PathSegment::from("page"), PathSegment::from("after")]);
    }

    #[test]
    fn strategy_and_sizes_are_checked() {
        assert!(matches!("keyset".parse::<PaginationStrategy>(), Err(ConfigError::PaginationStrategyInvalid(_))));
        let bad = PaginationConfig { default_size: 50, max_size: 10, ..Default::default() };
        assert!(matches!(Pagination::new(bad, "id").unwrap_err(), ConfigError::PaginationSizeInvalid { .. }));
    }
}
