//! Response projection: records are walked through the compiled response
//! tree so only declared keys go out, in declaration order.
//!
//! Records of discriminated schemas carry their storage type, not the wire
//! tag; the tag is filled in from the schema before the union dispatches.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::ConfigResult;
use crate::ir::{Param, ParamKind};
use crate::registry::{Scope, TypeGraph};
use crate::schema::ResourceSchema;

#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    graph: &'a TypeGraph,
    schemas: &'a IndexMap<String, ResourceSchema>,
}

impl<'a> Renderer<'a> {
    pub fn new(graph: &'a TypeGraph, schemas: &'a IndexMap<String, ResourceSchema>) -> Self {
        Self { graph, schemas }
    }

    pub fn project(&self, param: &Param, value: &Value, scope: &Scope) -> ConfigResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match param.kind() {
            ParamKind::Object(shape) => {
                let Some(record) = value.as_object() else { return Ok(value.clone()) };
                let mut out = Map::new();
                for (key, field) in shape.iter() {
                    if let Some(v) = record.get(key) {
                        out.insert(key.to_owned(), self.project(field, v, scope)?);
                    }
                }
                Ok(Value::Object(out))
            }
            ParamKind::Array(array) => match value.as_array() {
                Some(items) => items
                    .iter()
                    .map(|item| self.project(&array.of, item, scope))
                    .collect::<ConfigResult<Vec<_>>>()
                    .map(Value::Array),
                None => Ok(value.clone()),
            },
            ParamKind::Reference(name) => {
                let tagged = self.tag(name, value);
                let (target, target_scope) = self.graph.shape_of(name, scope)?;
                self.project(target, tagged.as_ref().unwrap_or(value), target_scope)
            }
            ParamKind::Union(union) => match union.discriminator() {
                Some(disc) => {
                    let tag = value.get(disc).and_then(Value::as_str).unwrap_or_default();
                    match union.variant(tag) {
                        Some(variant) => self.project(&variant.param, value, scope),
                        None => Ok(value.clone()),
                    }
                }
                None => {
                    let object_like = value.is_object();
                    let variant = union.variants().iter().find(|v| self.is_object_like(&v.param, scope) == object_like);
                    match variant {
                        Some(v) => self.project(&v.param, value, scope),
                        None => Ok(value.clone()),
                    }
                }
            },
            _ => Ok(value.clone()),
        }
    }

    /// Set the wire tag on a record of a discriminated schema.
    fn tag(&self, type_name: &str, value: &Value) -> Option<Value> {
        let schema = self.schemas.get(type_name)?;
        let disc = schema.discriminator_def()?;
        if let Some(tag) = value.get(&disc.field).and_then(Value::as_str) {
            if disc.variants.contains_key(tag) {
                return None;
            }
        }
        let tag = schema.tag_for_record(value)?;
        let mut record = value.as_object()?.clone();
        record.insert(disc.field.clone(), Value::String(tag.to_owned()));
        Some(Value::Object(record))
    }

    fn is_object_like(&self, param: &Param, scope: &Scope) -> bool {
        match param.kind() {
            ParamKind::Object(_) => true,
            ParamKind::Union(u) => u.discriminator().is_some(),
            ParamKind::Reference(name) => self
                .graph
                .shape_of(name, scope)
                .is_ok_and(|(target, s)| self.is_object_like(target, s)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::register_schema_types;
    use crate::registry::TypeRegistry;
    use crate::schema::{Attribute, SchemaVariant};
    use serde_json::json;

    fn setup() -> (TypeGraph, IndexMap<String, ResourceSchema>) {
        let vehicle = ResourceSchema::new("vehicle")
            .attribute(Attribute::integer("id"))
            .attribute(Attribute::string("brand"))
            .attribute(Attribute::string("vin").hidden())
            .discriminator("kind", "type")
            .variant(SchemaVariant::new("car", "Car").attribute(Attribute::integer("seats"))).unwrap()
            .variant(SchemaVariant::new("truck", "Truck").attribute(Attribute::integer("payload_capacity"))).unwrap();
        let schemas: IndexMap<_, _> = [("vehicle".to_owned(), vehicle)].into_iter().collect();
        let mut reg = TypeRegistry::new();
        register_schema_types(&mut reg, &schemas["vehicle"], &schemas).unwrap();
        (reg.seal().unwrap(), schemas)
    }

    #[test]
    fn storage_type_becomes_wire_tag_and_hidden_fields_drop() {
        let (graph, schemas) = setup();
        let r = Renderer::new(&graph, &schemas);
        let record = json!({ "id": 1, "type": "Truck", "brand": "Volvo", "vin": "X", "payload_capacity": 10, "seats": 2 });
        let out = r.project(&Param::reference("vehicle"), &record, &Scope::Global).unwrap();
        assert_eq!(out, json!({ "kind": "truck", "id": 1, "brand": "Volvo", "payload_capacity": 10 }));
    }

    #[test]
    fn arrays_and_nulls() {
        let (graph, schemas) = setup();
        let r = Renderer::new(&graph, &schemas);
        let rows = json!([{ "id": 1, "type": "Car", "seats": 4 }, null]);
        let out = r.project(&Param::array(Param::reference("vehicle")), &rows, &Scope::Global).unwrap();
        assert_eq!(out, json!([{ "kind": "car", "id": 1, "seats": 4 }, null]));
    }
}
