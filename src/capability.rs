//! Cross-cutting capabilities: filtering, sorting, pagination, includes and
//! key casing.
//!
//! A capability is configured once per contract and is stateless across
//! requests. For each request it may:
//! - rekey the inbound payload and the outbound response;
//! - clean its own slice of the query before shape validation;
//! - describe clauses on the [`Queryable`];
//! - add a block to collection responses.
pub mod casing;
pub mod filter;
pub mod include;
pub mod page;
pub mod sort;

use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::contract::{ActionOn, HttpMethod};
use crate::error::ConfigResult;
use crate::ir::Param;
use crate::issue::{Issue, PathSegment};
use crate::query::{OrderClause, Queryable, SortDirection};
use crate::registry::TypeRegistry;
use crate::schema::ResourceSchema;

pub use casing::{KeyCase, KeyCasing};
pub use filter::{Filtering, Operator};
pub use include::Includes;
pub use page::{Pagination, PaginationConfig, PaginationStrategy};
pub use sort::Sorting;

pub trait Capability: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Top-level query key this capability owns, if any.
    fn query_key(&self) -> Option<&'static str> { None }

    /// Collection reads by default.
    fn applies_to(&self, method: HttpMethod, on: ActionOn) -> bool {
        method == HttpMethod::Get && on == ActionOn::Collection
    }

    /// Register shared named types the fragments below refer to.
    fn register_types(&self, _registry: &mut TypeRegistry) -> ConfigResult<()> { Ok(()) }

    fn query_param(&self) -> Option<Param> { None }

    fn response_fragment(&self) -> Option<(&'static str, Param)> { None }

    fn transform_inbound(&self, value: Value) -> Value { value }

    fn transform_outbound(&self, value: Value) -> Value { value }

    /// Semantic checks on the raw query slice that shape validation cannot
    /// express. Returns the cleaned slice.
    fn extract(&self, raw: &Value, _path: &[PathSegment], _issues: &mut Vec<Issue>) -> Value {
        raw.clone()
    }

    fn apply(&self, _params: Option<&Value>, _query: &mut dyn Queryable) -> anyhow::Result<()> { Ok(()) }

    /// Runs after the host fetched `rows`; may trim them and return a
    /// response block.
    fn finalize(
        &self,
        _params: Option<&Value>,
        _query: &dyn Queryable,
        _rows: &mut Vec<Value>,
    ) -> anyhow::Result<Option<(&'static str, Value)>> {
        Ok(None)
    }
}

/// Per-contract capability switches.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub filtering: bool,
    pub sorting: bool,
    pub includes: bool,
    pub pagination: Option<PaginationConfig>,
    /// Applied when a request sends no `sort`.
    pub default_sort: IndexMap<String, SortDirection>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            filtering: true,
            sorting: true,
            includes: true,
            pagination: None,
            default_sort: IndexMap::new(),
        }
    }
}

/// Capabilities for one contract, in application order. Pagination comes
/// last so it windows the filtered, ordered query.
pub fn for_contract(
    schema: Option<&ResourceSchema>,
    config: &CapabilityConfig,
    pagination: PaginationConfig,
    key_case: KeyCase,
) -> ConfigResult<Vec<Box<dyn Capability>>> {
    let mut out: Vec<Box<dyn Capability>> = Vec::new();
    if key_case != KeyCase::None {
        out.push(Box::new(KeyCasing(key_case)));
    }
    let Some(schema) = schema else { return Ok(out) };

    let filtering = Filtering::new(schema)?;
    if config.filtering && !filtering.is_empty() {
        out.push(Box::new(filtering));
    }
    let default_sort = config
        .default_sort
        .iter()
        .map(|(field, direction)| OrderClause { field: field.clone(), direction: *direction })
        .collect();
    let sorting = Sorting::new(schema, default_sort);
    if config.sorting && !sorting.is_empty() {
        out.push(Box::new(sorting));
    }
    let includes = Includes::new(schema);
    if config.includes && !includes.is_empty() {
        out.push(Box::new(includes));
    }
    let pagination = config.pagination.unwrap_or(pagination);
    out.push(Box::new(Pagination::new(pagination, schema.primary_key_name())?));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;

    #[test]
    fn contract_capability_order() {
        let schema = ResourceSchema::new("post").attribute(Attribute::string("title").filterable().sortable());
        let caps = for_contract(Some(&schema), &CapabilityConfig::default(), PaginationConfig::default(), KeyCase::CamelizeLower).unwrap();
        let names: Vec<_> = caps.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["key_casing", "filtering", "sorting", "pagination"]);
    }

    #[test]
    fn switches_and_schema_less_contracts() {
        let schema = ResourceSchema::new("post").attribute(Attribute::string("title").filterable());
        let config = CapabilityConfig { filtering: false, ..Default::default() };
        let caps = for_contract(Some(&schema), &config, PaginationConfig::default(), KeyCase::None).unwrap();
        assert_eq!(caps.iter().map(|c| c.name()).collect::<Vec<_>>(), ["pagination"]);
        assert!(for_contract(None, &config, PaginationConfig::default(), KeyCase::None).unwrap().is_empty());
    }
}
