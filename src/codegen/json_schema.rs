//! JSON Schema (draft 2020-12) for the sealed graph.
//!
//! The same writer backs the OpenAPI generator; only the `$ref` prefix and
//! the `discriminator` keyword differ.

use serde_json::{json, Map, Value};

use crate::api::Api;
use crate::capability::KeyCase;
use crate::ir::{EnumSource, Param, ParamKind, Scalar, ScalarType, Shape, UnionParam};
use crate::registry::{Scope, TypeGraph};

pub const DRAFT: &str = "https://json-schema.org/draft/2020-12/schema";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    JsonSchema,
    OpenApi,
}

impl Flavor {
    fn ref_prefix(self) -> &'static str {
        match self {
            Self::JsonSchema => "#/$defs/",
            Self::OpenApi => "#/components/schemas/",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchemaWriter<'a> {
    graph: &'a TypeGraph,
    flavor: Flavor,
    case: KeyCase,
}

impl<'a> SchemaWriter<'a> {
    pub fn new(graph: &'a TypeGraph, flavor: Flavor, case: KeyCase) -> Self {
        Self { graph, flavor, case }
    }

    pub fn wire(&self, key: &str) -> String { self.case.to_wire(key) }

    pub fn reference(&self, qualified: &str) -> Value {
        json!({ "$ref": format!("{}{qualified}", self.flavor.ref_prefix()) })
    }

    /// Every enum and type, keyed by qualified name.
    pub fn definitions(&self) -> Map<String, Value> {
        let mut defs = Map::new();
        for def in self.graph.enums() {
            let mut schema = json!({ "enum": def.values() });
            annotate(&mut schema, def.description(), def.is_deprecated(), None);
            defs.insert(TypeGraph::qualified_name(def.scope(), def.name()), schema);
        }
        for def in self.graph.types() {
            let Ok(shape) = def.shape() else { continue };
            let mut schema = self.kind(shape, def.scope());
            annotate(&mut schema, def.description(), def.is_deprecated(), def.example());
            defs.insert(TypeGraph::qualified_name(def.scope(), def.name()), schema);
        }
        defs
    }

    /// Schema for one slot, metadata and nullability included.
    pub fn param(&self, param: &Param, scope: &Scope) -> Value {
        let mut schema = self.kind(param, scope);
        annotate(&mut schema, param.description_text(), param.is_deprecated(), param.example_value());
        if let (Some(d), Value::Object(map)) = (param.default(), &mut schema) {
            map.insert("default".into(), d.clone());
        }
        if param.is_nullable() { nullable(schema) } else { schema }
    }

    /// True when a query parameter needs bracket (deepObject) serialization.
    pub fn is_structured(&self, param: &Param) -> bool {
        matches!(param.kind(), ParamKind::Object(_) | ParamKind::Reference(_) | ParamKind::Union(_))
    }

    fn kind(&self, param: &Param, scope: &Scope) -> Value {
        match param.kind() {
            ParamKind::Scalar(s) => scalar(s),
            ParamKind::Literal(v) => json!({ "const": v }),
            ParamKind::Enum(EnumSource::Inline(values)) => json!({ "enum": values }),
            ParamKind::Enum(EnumSource::Ref(name)) => self.reference(&self.graph.qualify_enum_ref(name, scope)),
            ParamKind::Array(a) => {
                let mut o = json!({ "type": "array", "items": self.param(&a.of, scope) });
                if let Some(mn) = a.min_items { o["minItems"] = Value::from(mn); }
                if let Some(mx) = a.max_items { o["maxItems"] = Value::from(mx); }
                o
            }
            ParamKind::Object(shape) => self.object(shape, scope, None),
            ParamKind::Reference(name) => self.reference(&self.graph.qualify_type_ref(name, scope)),
            ParamKind::Union(u) => self.union(u, scope),
            ParamKind::Unknown => json!({}),
        }
    }

    fn object(&self, shape: &Shape, scope: &Scope, tag: Option<(&str, &str)>) -> Value {
        let mut props = Vec::new();
        let mut required = Vec::new();
        if let Some((field, value)) = tag {
            let wire = self.wire(field);
            required.push(wire.clone());
            props.push((wire, json!({ "const": value })));
        }
        for (key, field) in shape.iter() {
            let wire = self.wire(key);
            if tag.is_some_and(|(f, _)| f == key) {
                continue;
            }
            if field.is_required() {
                required.push(wire.clone());
            }
            props.push((wire, self.param(field, scope)));
        }
        obj_of(props, required)
    }

    fn union(&self, union: &UnionParam, scope: &Scope) -> Value {
        let arms: Vec<Value> = union
            .variants()
            .iter()
            .map(|v| match (union.discriminator(), v.tag.as_deref()) {
                (Some(disc), Some(tag)) => match v.param.kind() {
                    ParamKind::Object(shape) => self.object(shape, scope, Some((disc, tag))),
                    _ => json!({
                        "allOf": [
                            obj_of(vec![(self.wire(disc), json!({ "const": tag }))], vec![self.wire(disc)]),
                            self.param(&v.param, scope),
                        ]
                    }),
                },
                _ => self.param(&v.param, scope),
            })
            .collect();
        let mut o = json!({ "oneOf": arms });
        if let (Flavor::OpenApi, Some(disc)) = (self.flavor, union.discriminator()) {
            o["discriminator"] = json!({ "propertyName": self.wire(disc) });
        }
        o
    }
}

/// `{"$schema", "$defs"}` for every named definition of `api`.
pub fn json_schema(api: &Api) -> Value {
    let writer = SchemaWriter::new(api.graph(), Flavor::JsonSchema, api.config().key_case);
    json!({ "$schema": DRAFT, "$defs": writer.definitions() })
}

// ---- helpers ----

fn obj_of(props: Vec<(String, Value)>, required: Vec<String>) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), Value::from("object"));
    map.insert("properties".into(), Value::Object(props.into_iter().collect()));
    if !required.is_empty() {
        map.insert("required".into(), Value::Array(required.into_iter().map(Value::from).collect()));
    }
    Value::Object(map)
}

fn nullable(inner: Value) -> Value {
    json!({ "oneOf": [inner, { "type": "null" }] })
}

fn annotate(schema: &mut Value, description: Option<&str>, deprecated: bool, example: Option<&Value>) {
    let Value::Object(map) = schema else { return };
    if let Some(d) = description {
        map.insert("description".into(), Value::from(d));
    }
    if deprecated {
        map.insert("deprecated".into(), Value::Bool(true));
    }
    if let Some(e) = example {
        map.insert("examples".into(), json!([e]));
    }
}

/// Integral bounds print as integers.
fn number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 9.0e15 { Value::from(v as i64) } else { json!(v) }
}

fn scalar(s: &Scalar) -> Value {
    let (ty, format) = match s.ty {
        ScalarType::String | ScalarType::Binary => ("string", None),
        ScalarType::Integer => ("integer", None),
        ScalarType::Float => ("number", None),
        ScalarType::Decimal => ("string", Some("decimal")),
        ScalarType::Boolean => ("boolean", None),
        ScalarType::Date => ("string", Some("date")),
        ScalarType::DateTime => ("string", Some("date-time")),
        ScalarType::Time => ("string", Some("time")),
        ScalarType::Uuid => ("string", Some("uuid")),
    };
    let mut o = json!({ "type": ty });
    if let Some(f) = s.format.map(|f| f.as_str()).or(format) {
        o["format"] = Value::from(f);
    }
    if s.ty == ScalarType::Binary {
        o["contentEncoding"] = Value::from("base64");
    }
    let (min_key, max_key) = if s.ty.is_length_bounded() { ("minLength", "maxLength") } else { ("minimum", "maximum") };
    if let Some(m) = s.min { o[min_key] = number(m); }
    if let Some(m) = s.max { o[max_key] = number(m); }
    if let Some(rx) = &s.pattern {
        o["pattern"] = Value::from(rx.clone());
    }
    o
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EnumDecl, TypeDecl, TypeRegistry};
    use crate::shape::{ObjectBlock, UnionBlock};

    fn graph() -> TypeGraph {
        let mut reg = TypeRegistry::new();
        reg.register_enum(Scope::Global, EnumDecl::new("status", ["draft", "published"])).unwrap();
        reg.register_type(
            Scope::Global,
            TypeDecl::object("address", ObjectBlock::new(|o| {
                o.param("street_name", Param::string().required().max(80.0));
                o.param("zip", Param::string().nullable().pattern("^[0-9]{5}$"));
                o.param("status", Param::enum_ref("status"));
                Ok(())
            }))
            .description("Postal address"),
        )
        .unwrap();
        reg.register_type(
            Scope::Global,
            TypeDecl::union("shape", Some("kind"), UnionBlock::new(|u| {
                u.tagged("circle", Param::object({
                    let mut o = crate::shape::ObjectBuilder::new();
                    o.param("radius", Param::float().required().min(0.0));
                    o.build()
                }))?;
                u.tagged("home", Param::reference("address"))?;
                Ok(())
            })),
        )
        .unwrap();
        reg.register_type(
            Scope::contract("orders"),
            TypeDecl::object("address", ObjectBlock::new(|o| {
                o.param("line", Param::string());
                Ok(())
            })),
        )
        .unwrap();
        reg.seal().unwrap()
    }

    #[test]
    fn definitions_in_declaration_order() {
        let g = graph();
        let defs = SchemaWriter::new(&g, Flavor::JsonSchema, KeyCase::None).definitions();
        let names: Vec<_> = defs.keys().cloned().collect();
        assert_eq!(names, ["status", "address", "shape", "orders_address"]);
        assert_eq!(defs["status"], json!({ "enum": ["draft", "published"] }));
        assert_eq!(
            defs["address"],
            json!({
                "type": "object",
                "properties": {
                    "street_name": { "type": "string", "maxLength": 80 },
                    "zip": { "oneOf": [{ "type": "string", "pattern": "^[0-9]{5}$" }, { "type": "null" }] },
                    "status": { "$ref": "#/$defs/status" }
                },
                "required": ["street_name"],
                "description": "Postal address"
            })
        );
    }

    #[test]
    fn discriminated_union_puts_tag_first() {
        let g = graph();
        let defs = SchemaWriter::new(&g, Flavor::OpenApi, KeyCase::CamelizeLower).definitions();
        let shape = &defs["shape"];
        assert_eq!(shape["discriminator"], json!({ "propertyName": "kind" }));
        let circle = &shape["oneOf"][0];
        let keys: Vec<_> = circle["properties"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["kind", "radius"]);
        assert_eq!(circle["required"], json!(["kind", "radius"]));
        assert_eq!(shape["oneOf"][1]["allOf"][1], json!({ "$ref": "#/components/schemas/address" }));
        assert!(defs["address"]["properties"].get("streetName").is_some());
    }

    #[test]
    fn scalar_formats() {
        let s = |p: Param| SchemaWriter::new(&graph(), Flavor::JsonSchema, KeyCase::None).param(&p, &Scope::Global);
        assert_eq!(s(Param::datetime()), json!({ "type": "string", "format": "date-time" }));
        assert_eq!(s(Param::integer().min(1.0).max(100.0)), json!({ "type": "integer", "minimum": 1, "maximum": 100 }));
        assert_eq!(s(Param::string().format(crate::ir::Format::Email)), json!({ "type": "string", "format": "email" }));
        assert_eq!(s(Param::decimal()), json!({ "type": "string", "format": "decimal" }));
        assert_eq!(s(Param::literal("x")), json!({ "const": "x" }));
    }
}
