//! JSON definition documents.
//!
//! Everything the builder API can declare can also be read from one JSON
//! file:
//!
//! ```json
//! {
//!   "config":    { "key_case": "camelize_lower" },
//!   "enums":     { "status": ["draft", "published"] },
//!   "types":     { "address": { "kind": "object", "fields": { "city": { "type": "string" } } } },
//!   "catalog":   { "posts": { "views": { "type": "integer" } } },
//!   "schemas":   { "post": { "attributes": { "title": { "type": "string", "writable": true } } } },
//!   "contracts": { "posts": { "schema": "post", "resources": true } }
//! }
//! ```
//!
//! Malformed documents fail with the JSON path of the offending node.

use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::api::{Api, ApiBuilder, ApiConfig};
use crate::capability::{CapabilityConfig, KeyCase, Operator};
use crate::contract::{ActionDecl, ActionOn, ContractDecl, HttpMethod};
use crate::error::{ConfigError, ConfigResult};
use crate::ir::{EnumSource, Format, Param, ScalarType, Shape};
use crate::path_de;
use crate::registry::{EnumDecl, TypeDecl};
use crate::schema::{
    pluralize, Association, Attribute, AttributeType, Cardinality, IncludeMode, ResourceSchema,
    SchemaVariant, StaticCatalog,
};
use crate::shape::{self, ObjectBlock, ObjectBuilder, UnionBlock};

// ————————————————————————————————————————————————————————————————————————————
// DOCUMENT MODEL
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Document {
    pub config: ApiConfig,
    pub enums: IndexMap<String, EnumDoc>,
    pub types: IndexMap<String, TypeDoc>,
    /// `table → column → metadata`
    pub catalog: IndexMap<String, IndexMap<String, ColumnDoc>>,
    pub schemas: IndexMap<String, SchemaDoc>,
    pub contracts: IndexMap<String, ContractDoc>,
}

/// Bare value list, or values with metadata.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EnumDoc {
    Values(Vec<Value>),
    Described {
        values: Vec<Value>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        deprecated: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDoc {
    Object {
        fields: IndexMap<String, ParamDoc>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        example: Option<Value>,
        #[serde(default)]
        deprecated: bool,
    },
    Union {
        #[serde(default)]
        discriminator: Option<String>,
        variants: Vec<VariantDoc>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        deprecated: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantDoc {
    #[serde(default)]
    pub tag: Option<String>,
    pub param: ParamDoc,
}

/// One field. `type` is a scalar name or one of `literal`, `enum`, `array`,
/// `object`, `ref`, `union`, `unknown`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamDoc {
    #[serde(rename = "type")]
    pub ty: String,
    pub required: bool,
    pub nullable: bool,
    pub deprecated: bool,
    pub description: Option<String>,
    pub example: Option<Value>,
    pub default: Option<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub format: Option<Format>,
    pub pattern: Option<String>,
    /// `literal` value.
    pub value: Option<Value>,
    /// Inline `enum` values.
    pub values: Option<Vec<Value>>,
    /// Named `enum` reference.
    #[serde(rename = "enum")]
    pub enum_ref: Option<String>,
    /// `ref` target.
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    /// `array` element.
    pub of: Option<Box<ParamDoc>>,
    /// `object` fields.
    pub fields: Option<IndexMap<String, ParamDoc>>,
    pub discriminator: Option<String>,
    pub variants: Option<Vec<VariantDoc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDoc {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaDoc {
    pub singular: Option<String>,
    pub plural: Option<String>,
    pub table: Option<String>,
    pub primary_key: Option<String>,
    pub description: Option<String>,
    pub attributes: IndexMap<String, AttributeDoc>,
    pub associations: IndexMap<String, AssociationDoc>,
    pub discriminator: Option<DiscriminatorDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttributeDoc {
    /// Scalar name; absent means "ask the catalog".
    #[serde(rename = "type")]
    pub ty: Option<String>,
    #[serde(rename = "enum")]
    pub enum_ref: Option<String>,
    pub values: Option<Vec<Value>>,
    pub writable: bool,
    pub writable_on_create: bool,
    pub writable_on_update: bool,
    pub filterable: bool,
    pub sortable: bool,
    pub hidden: bool,
    pub nullable: bool,
    pub required: bool,
    pub deprecated: bool,
    pub format: Option<Format>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub description: Option<String>,
    pub example: Option<Value>,
    pub operators: Option<Vec<Operator>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssociationDoc {
    pub schema: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub include: IncludeMode,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscriminatorDoc {
    pub field: String,
    pub storage_field: String,
    pub variants: IndexMap<String, SchemaVariantDoc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaVariantDoc {
    pub storage_type: String,
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContractDoc {
    pub schema: Option<String>,
    pub resources: bool,
    pub key_case: Option<KeyCase>,
    pub capabilities: Option<CapabilityConfig>,
    pub enums: IndexMap<String, EnumDoc>,
    pub types: IndexMap<String, TypeDoc>,
    pub actions: IndexMap<String, ActionDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionDoc {
    pub method: Option<HttpMethod>,
    pub on: Option<ActionOn>,
    pub query: Option<IndexMap<String, ParamDoc>>,
    pub body: Option<IndexMap<String, ParamDoc>>,
    pub response: Option<IndexMap<String, ParamDoc>>,
    pub no_content: bool,
    pub description: Option<String>,
    pub deprecated: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// LOADING
// ————————————————————————————————————————————————————————————————————————————

impl FromStr for Document {
    type Err = ConfigError;

    fn from_str(src: &str) -> ConfigResult<Self> {
        path_de::from_str_with_path(src)
    }
}

impl Document {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| ConfigError::Document(format!("failed to read {}: {e}", path.display())))?;
        debug!(path = %path.display(), "loading definition document");
        path_de::from_slice_with_path(&bytes)
    }

    pub fn from_value(value: Value) -> ConfigResult<Self> {
        path_de::from_value_with_path(value)
    }

    /// Replay every declaration onto a fresh builder.
    pub fn into_builder(self) -> ConfigResult<ApiBuilder> {
        let mut builder = ApiBuilder::new(self.config);

        if !self.catalog.is_empty() {
            let mut catalog = StaticCatalog::new();
            for (table, columns) in &self.catalog {
                for (column, doc) in columns {
                    let ty = scalar_type(&doc.ty, &format!("catalog.{table}.{column}"))?;
                    catalog = catalog.column(table, column, ty, doc.nullable);
                }
            }
            builder.catalog(catalog);
        }
        for (name, doc) in self.enums {
            builder.register_enum(enum_decl(name, doc))?;
        }
        for (name, doc) in self.types {
            let decl = type_decl(&name, doc)?;
            builder.register_type(decl)?;
        }
        for (name, doc) in self.schemas {
            let schema = resource_schema(&name, doc)?;
            builder.schema(schema);
        }
        for (name, doc) in self.contracts {
            let contract = contract_decl(&name, doc)?;
            builder.contract(contract);
        }
        Ok(builder)
    }

    pub fn seal(self) -> ConfigResult<Api> {
        self.into_builder()?.seal()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CONVERSION
// ————————————————————————————————————————————————————————————————————————————

fn invalid(at: &str, msg: impl std::fmt::Display) -> ConfigError {
    ConfigError::Document(format!("at {at} → {msg}"))
}

fn scalar_type(name: &str, at: &str) -> ConfigResult<ScalarType> {
    ScalarType::from_str(name).map_err(|()| invalid(at, format!("unknown scalar type `{name}`")))
}

fn enum_decl(name: String, doc: EnumDoc) -> EnumDecl {
    match doc {
        EnumDoc::Values(values) => EnumDecl::new(name, values),
        EnumDoc::Described { values, description, deprecated } => {
            let decl = EnumDecl::new(name, values).deprecated(deprecated);
            match description {
                Some(d) => decl.description(d),
                None => decl,
            }
        }
    }
}

fn type_decl(name: &str, doc: TypeDoc) -> ConfigResult<TypeDecl> {
    let at = format!("types.{name}");
    let (decl, description) = match doc {
        TypeDoc::Object { fields, description, example, deprecated } => {
            let shape = shape_of(&fields, &at)?;
            let decl = TypeDecl::object(name, ObjectBlock::from_shape(shape)).deprecated(deprecated);
            let decl = match example {
                Some(e) => decl.example(e),
                None => decl,
            };
            (decl, description)
        }
        TypeDoc::Union { discriminator, variants, description, deprecated } => {
            let variants = variant_params(&variants, &at)?;
            let block = UnionBlock::new(move |u| {
                for (tag, param) in &variants {
                    u.variant(tag.as_deref(), param.clone())?;
                }
                Ok(())
            });
            (TypeDecl::union(name, discriminator.as_deref(), block).deprecated(deprecated), description)
        }
    };
    Ok(match description {
        Some(d) => decl.description(d),
        None => decl,
    })
}

fn variant_params(variants: &[VariantDoc], at: &str) -> ConfigResult<Vec<(Option<String>, Param)>> {
    variants
        .iter()
        .enumerate()
        .map(|(i, v)| Ok((v.tag.clone(), param(&v.param, &format!("{at}.variants[{i}]"))?)))
        .collect()
}

fn shape_of(fields: &IndexMap<String, ParamDoc>, at: &str) -> ConfigResult<Shape> {
    let mut o = ObjectBuilder::new();
    for (key, doc) in fields {
        o.param(key.clone(), param(doc, &format!("{at}.{key}"))?);
    }
    Ok(o.build())
}

fn param(doc: &ParamDoc, at: &str) -> ConfigResult<Param> {
    let base = match doc.ty.as_str() {
        "literal" => Param::literal(doc.value.clone().ok_or_else(|| invalid(at, "`literal` needs `value`"))?),
        "enum" => match (&doc.values, &doc.enum_ref) {
            (Some(values), None) => Param::enum_values(values.iter().cloned()),
            (None, Some(name)) => Param::enum_ref(name.clone()),
            _ => return Err(invalid(at, "`enum` needs exactly one of `values` or `enum`")),
        },
        "array" => {
            let of = doc.of.as_deref().ok_or_else(|| invalid(at, "`array` needs `of`"))?;
            Param::array(param(of, &format!("{at}.of"))?)
        }
        "object" => Param::object(shape_of(doc.fields.as_ref().unwrap_or(&IndexMap::new()), at)?),
        "ref" => Param::reference(doc.reference.clone().ok_or_else(|| invalid(at, "`ref` needs `ref`"))?),
        "union" => {
            let variants = variant_params(doc.variants.as_deref().unwrap_or_default(), at)?;
            shape::union(doc.discriminator.as_deref(), |u| {
                for (tag, param) in variants {
                    u.variant(tag.as_deref(), param)?;
                }
                Ok(())
            })?
        }
        "unknown" => Param::unknown(),
        other => Param::scalar(scalar_type(other, at)?),
    };

    let mut p = base
        .set_required(doc.required)
        .set_nullable(doc.nullable)
        .set_deprecated(doc.deprecated);
    if let Some(min) = doc.min {
        p = p.min(min);
    }
    if let Some(max) = doc.max {
        p = p.max(max);
    }
    if let Some(format) = doc.format {
        p = p.format(format);
    }
    if let Some(pattern) = &doc.pattern {
        regex::Regex::new(pattern).map_err(|e| invalid(at, e))?;
        p = p.pattern(pattern.clone());
    }
    if let Some(d) = &doc.description {
        p = p.description(d.clone());
    }
    if let Some(e) = &doc.example {
        p = p.example(e.clone());
    }
    if let Some(d) = &doc.default {
        p = p.default_value(d.clone());
    }
    Ok(p)
}

fn attribute(name: &str, doc: AttributeDoc, at: &str) -> ConfigResult<Attribute> {
    let ty = match (doc.ty.as_deref(), doc.enum_ref, doc.values) {
        (Some(ty), None, None) => AttributeType::Scalar(scalar_type(ty, at)?),
        (None, Some(enum_name), None) => AttributeType::Enum(EnumSource::Ref(enum_name)),
        (None, None, Some(values)) => AttributeType::Enum(EnumSource::Inline(values)),
        (None, None, None) => AttributeType::Inferred,
        _ => return Err(invalid(at, "use only one of `type`, `enum` or `values`")),
    };
    let mut attr = Attribute::new(name, ty);
    attr.writable_on_create = doc.writable || doc.writable_on_create;
    attr.writable_on_update = doc.writable || doc.writable_on_update;
    attr.filterable = doc.filterable;
    attr.sortable = doc.sortable;
    attr.hidden = doc.hidden;
    attr.nullable = doc.nullable;
    attr.required = doc.required;
    attr.deprecated = doc.deprecated;
    attr.format = doc.format;
    attr.min = doc.min;
    attr.max = doc.max;
    attr.description = doc.description;
    attr.example = doc.example;
    attr.operators = doc.operators;
    Ok(attr)
}

fn resource_schema(name: &str, doc: SchemaDoc) -> ConfigResult<ResourceSchema> {
    let at = format!("schemas.{name}");
    let mut schema = ResourceSchema::new(name);
    if doc.singular.is_some() || doc.plural.is_some() {
        let singular = doc.singular.unwrap_or_else(|| name.to_owned());
        let plural = doc.plural.unwrap_or_else(|| pluralize(&singular));
        schema = schema.root(singular, plural);
    }
    if let Some(table) = doc.table {
        schema = schema.table(table);
    }
    if let Some(pk) = doc.primary_key {
        schema = schema.primary_key(pk);
    }
    if let Some(d) = doc.description {
        schema = schema.description(d);
    }
    for (attr_name, attr_doc) in doc.attributes {
        let attr = attribute(&attr_name, attr_doc, &format!("{at}.attributes.{attr_name}"))?;
        schema = schema.attribute(attr);
    }
    for (assoc_name, a) in doc.associations {
        let mut assoc = Association::one(assoc_name, a.schema);
        assoc.cardinality = a.cardinality;
        assoc.include = a.include;
        assoc.nullable = a.nullable;
        assoc.description = a.description;
        schema = schema.association(assoc);
    }
    if let Some(disc) = doc.discriminator {
        schema = schema.discriminator(disc.field, disc.storage_field);
        for (tag, v) in disc.variants {
            let mut variant = SchemaVariant::new(tag.clone(), v.storage_type);
            for (attr_name, attr_doc) in v.attributes {
                let at = format!("{at}.discriminator.variants.{tag}.attributes.{attr_name}");
                variant = variant.attribute(attribute(&attr_name, attr_doc, &at)?);
            }
            schema = schema.variant(variant)?;
        }
    }
    Ok(schema)
}

fn contract_decl(name: &str, doc: ContractDoc) -> ConfigResult<ContractDecl> {
    let at = format!("contracts.{name}");
    let mut decl = ContractDecl::new(name);
    if let Some(schema) = doc.schema {
        decl = decl.schema(schema);
    }
    if doc.resources {
        decl = decl.resources();
    }
    if let Some(case) = doc.key_case {
        decl = decl.key_case(case);
    }
    if let Some(config) = doc.capabilities {
        decl = decl.capabilities(config);
    }
    for (enum_name, e) in doc.enums {
        decl = decl.enum_decl(enum_decl(enum_name, e));
    }
    for (type_name, t) in doc.types {
        decl = decl.type_decl(type_decl(&type_name, t)?);
    }
    for (action_name, a) in doc.actions {
        let at = format!("{at}.actions.{action_name}");
        decl = decl.action(action_decl(&action_name, a, &at)?);
    }
    Ok(decl)
}

fn action_decl(name: &str, doc: ActionDoc, at: &str) -> ConfigResult<ActionDecl> {
    let mut decl = ActionDecl::new(name);
    if let Some(method) = doc.method {
        decl = decl.method(method);
    }
    if let Some(on) = doc.on {
        decl = decl.on(on);
    }
    if let Some(fields) = &doc.query {
        let shape = shape_of(fields, &format!("{at}.query"))?;
        decl = decl.query(move |o| {
            o.extend(&shape);
            Ok(())
        });
    }
    if let Some(fields) = &doc.body {
        let shape = shape_of(fields, &format!("{at}.body"))?;
        decl = decl.body(move |o| {
            o.extend(&shape);
            Ok(())
        });
    }
    if let Some(fields) = &doc.response {
        let shape = shape_of(fields, &format!("{at}.response"))?;
        decl = decl.response(move |o| {
            o.extend(&shape);
            Ok(())
        });
    }
    if doc.no_content {
        decl = decl.no_content();
    }
    if let Some(d) = doc.description {
        decl = decl.description(d);
    }
    if doc.deprecated {
        decl = decl.deprecated();
    }
    Ok(decl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ResponseBody;
    use crate::registry::Scope;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "config": { "base_path": "/api", "key_case": "camelize_lower" },
            "enums": { "status": ["draft", "published"] },
            "types": {
                "shape": {
                    "kind": "union",
                    "discriminator": "kind",
                    "variants": [
                        { "tag": "circle", "param": { "type": "object", "fields": { "radius": { "type": "float", "required": true } } } },
                        { "tag": "square", "param": { "type": "object", "fields": { "side": { "type": "float", "required": true } } } }
                    ]
                }
            },
            "catalog": { "posts": { "views": { "type": "integer" } } },
            "schemas": {
                "post": {
                    "attributes": {
                        "id": { "type": "integer", "sortable": true },
                        "title": { "type": "string", "writable": true, "required": true, "filterable": true, "max": 80 },
                        "status": { "enum": "status", "filterable": true },
                        "views": { "sortable": true }
                    }
                }
            },
            "contracts": {
                "posts": {
                    "schema": "post",
                    "resources": true,
                    "capabilities": { "default_sort": { "id": "desc" } },
                    "actions": {
                        "archive": { "method": "POST", "on": "member", "no_content": true },
                        "preview": {
                            "method": "POST",
                            "on": "collection",
                            "body": { "shape": { "type": "ref", "ref": "shape", "required": true } },
                            "response": { "area": { "type": "float" } }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn document_seals_into_an_api() {
        let api = Document::from_value(doc()).unwrap().seal().unwrap();
        assert_eq!(api.config().key_case, KeyCase::CamelizeLower);
        assert!(api.graph().resolve_enum("status", &Scope::Global).is_ok());

        let archive = api.endpoint("posts", "archive").unwrap();
        assert_eq!(archive.action().path, "/api/posts/{id}/archive");
        assert!(matches!(archive.action().response, ResponseBody::NoContent));

        let preview = api.endpoint("posts", "preview").unwrap();
        let body = json!({ "shape": { "kind": "square", "side": 2.0 } });
        let outcome = preview.validate(crate::pipeline::RawRequest::new().with_body(body)).unwrap();
        assert!(outcome.is_valid(), "{:?}", outcome.issues);

        let views = api.schema("post").unwrap().attribute_named("views").unwrap();
        assert_eq!(views.scalar_type(), Some(ScalarType::Integer));
    }

    #[test]
    fn malformed_document_reports_path() {
        let mut d = doc();
        d["schemas"]["post"]["attributes"]["title"]["filterable"] = json!("yes");
        let err = Document::from_value(d).unwrap_err().to_string();
        assert!(err.contains("schemas.post.attributes.title.filterable"), "{err}");
    }

    #[test]
    fn semantic_errors_name_the_node() {
        let mut d = doc();
        d["schemas"]["post"]["attributes"]["title"]["type"] = json!("text");
        let err = Document::from_value(d).unwrap().seal().unwrap_err().to_string();
        assert!(err.contains("schemas.post.attributes.title"), "{err}");
        assert!(err.contains("`text`"), "{err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = "{ \"schemas\": {}, \"extra\": 1 }".parse::<Document>().unwrap_err();
        assert!(matches!(err, ConfigError::Document(_)));
    }
}
