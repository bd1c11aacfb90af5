//! Sorting: `sort[field]=asc|desc`, or an ordered array of such objects.

use serde_json::Value;

use super::Capability;
use crate::error::ConfigResult;
use crate::ir::Param;
use crate::issue::{Issue, PathSegment};
use crate::query::{OrderClause, Queryable, SortDirection};
use crate::registry::{EnumDecl, Scope, TypeDecl, TypeRegistry};
use crate::schema::ResourceSchema;
use crate::shape::{self, ObjectBlock, ObjectBuilder};

pub const DIRECTION_ENUM: &str = "sort_direction";

#[derive(Debug, Clone)]
pub struct Sorting {
    type_name: String,
    fields: Vec<String>,
    default: Vec<OrderClause>,
}

impl Sorting {
    pub fn new(schema: &ResourceSchema, default: Vec<OrderClause>) -> Self {
        Self {
            type_name: format!("{}_sort", schema.name()),
            fields: schema.all_attributes().filter(|a| a.sortable).map(|a| a.name.clone()).collect(),
            default,
        }
    }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    /// Split multi-key objects into one-key objects so request order
    /// survives shape validation, which rebuilds objects in declared order.
    fn split(raw: &Value) -> Value {
        fn one_key_objects(map: &serde_json::Map<String, Value>) -> impl Iterator<Item = Value> + '_ {
            map.iter().map(|(field, dir)| {
                let mut single = serde_json::Map::new();
                single.insert(field.clone(), dir.clone());
                Value::Object(single)
            })
        }
        match raw {
            Value::Object(map) if map.len() > 1 => Value::Array(one_key_objects(map).collect()),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .flat_map(|item| match item {
                        Value::Object(map) if map.len() > 1 => one_key_objects(map).collect::<Vec<_>>(),
                        other => vec![other.clone()],
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn clauses(params: &Value) -> Vec<OrderClause> {
        let objects: Vec<&Value> = match params {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        objects
            .into_iter()
            .filter_map(Value::as_object)
            .flatten()
            .filter_map(|(field, dir)| {
                let direction = serde_json::from_value::<SortDirection>(dir.clone()).ok()?;
                Some(OrderClause { field: field.clone(), direction })
            })
            .collect()
    }
}

impl Capability for Sorting {
    fn name(&self) -> &'static str { "sorting" }

    fn query_key(&self) -> Option<&'static str> { Some("sort") }

    fn register_types(&self, registry: &mut TypeRegistry) -> ConfigResult<()> {
        if !registry.contains_enum(&Scope::Global, DIRECTION_ENUM) {
            registry.register_enum(Scope::Global, EnumDecl::new(DIRECTION_ENUM, ["asc", "desc"]))?;
        }
        if !registry.contains_type(&Scope::Global, &self.type_name) {
            let mut o = ObjectBuilder::new();
            for field in &self.fields {
                o.param(field.clone(), Param::enum_ref(DIRECTION_ENUM));
            }
            registry.register_type(Scope::Global, TypeDecl::object(self.type_name.clone(), ObjectBlock::from_shape(o.build())))?;
        }
        Ok(())
    }

    fn query_param(&self) -> Option<Param> {
        let by_name = Param::reference(self.type_name.clone());
        shape::union(None, |u| {
            u.untagged(by_name.clone())?;
            u.untagged(Param::array(by_name.clone()))?;
            Ok(())
        })
        .ok()
    }

    fn extract(&self, raw: &Value, _path: &[PathSegment], _issues: &mut Vec<Issue>) -> Value {
        Self::split(raw)
    }

    fn apply(&self, params: Option<&Value>, query: &mut dyn Queryable) -> anyhow::Result<()> {
        let clauses = match params {
            Some(p) => Self::clauses(p),
            None => self.default.clone(),
        };
        for clause in clauses {
            query.order(clause);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MemoryCollection;
    use crate::schema::Attribute;
    use serde_json::json;

    fn sorting() -> Sorting {
        let schema = ResourceSchema::new("post")
            .attribute(Attribute::string("title").sortable())
            .attribute(Attribute::integer("views").sortable());
        Sorting::new(&schema, vec![OrderClause { field: "id".into(), direction: SortDirection::Asc }])
    }

    #[test]
    fn array_form_keeps_order() {
        let mut q = MemoryCollection::new(Vec::new());
        sorting().apply(Some(&json!([{ "views": "desc" }, { "title": "asc" }])), &mut q).unwrap();
        let fields: Vec<_> = q.plan().order.iter().map(|c| (c.field.as_str(), c.direction)).collect();
        assert_eq!(fields, [("views", SortDirection::Desc), ("title", SortDirection::Asc)]);
    }

    #[test]
    fn multi_key_object_keeps_request_order() {
        let split = sorting().extract(&json!({ "views": "desc", "title": "asc" }), &[], &mut Vec::new());
        assert_eq!(split, json!([{ "views": "desc" }, { "title": "asc" }]));
        let nested = sorting().extract(&json!([{ "views": "desc", "id": "asc" }, { "title": "asc" }]), &[], &mut Vec::new());
        assert_eq!(nested, json!([{ "views": "desc" }, { "id": "asc" }, { "title": "asc" }]));
        assert_eq!(sorting().extract(&json!({ "views": "desc" }), &[], &mut Vec::new()), json!({ "views": "desc" }));
    }

    #[test]
    fn default_applies_only_without_params() {
        let mut q = MemoryCollection::new(Vec::new());
        sorting().apply(None, &mut q).unwrap();
        assert_eq!(q.plan().order[0].field, "id");
    }

    #[test]
    fn registers_direction_enum_once() {
        let mut reg = TypeRegistry::new();
        sorting().register_types(&mut reg).unwrap();
        sorting().register_types(&mut reg).unwrap();
        let graph = reg.seal().unwrap();
        assert_eq!(graph.enum_values(DIRECTION_ENUM, &Scope::Global).unwrap(), &[json!("asc"), json!("desc")]);
    }
}
