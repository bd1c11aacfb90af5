//! Lowering: resource schemas and contract declarations → named types and
//! compiled actions.
//!
//! Schema-derived types are registered once, in the global scope, under the
//! schema name (`post`, `post_create_payload`, `post_update_payload`).
//! Associations always refer to their target by name, so cyclic schemas
//! never inline a shape twice.

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::capability::{self, Capability, KeyCase, PaginationConfig};
use crate::contract::{crud_routing, Action, ActionDecl, ActionOn, CompiledContract, ContractDecl, HttpMethod, ResponseBody, CRUD};
use crate::error::{ConfigError, ConfigResult};
use crate::ir::{Param, Shape};
use crate::registry::{Scope, TypeDecl, TypeRegistry};
use crate::schema::{Attribute, ResourceSchema};
use crate::shape::{self, ObjectBlock, ObjectBuilder, UnionBlock};

pub fn create_payload_name(schema: &str) -> String { format!("{schema}_create_payload") }
pub fn update_payload_name(schema: &str) -> String { format!("{schema}_update_payload") }

// ————————————————————————————————————————————————————————————————————————————
// SCHEMA TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Copy)]
enum Side {
    Representation,
    Create,
    Update,
}

impl Side {
    fn type_name(self, base: &str) -> String {
        match self {
            Self::Representation => base.to_owned(),
            Self::Create => create_payload_name(base),
            Self::Update => update_payload_name(base),
        }
    }

    fn includes(self, attr: &Attribute) -> bool {
        match self {
            Self::Representation => !attr.hidden,
            Self::Create => attr.writable_on_create,
            Self::Update => attr.writable_on_update,
        }
    }

    fn param(self, attr: &Attribute) -> Param {
        match self {
            Self::Representation => attr.representation_param(),
            Self::Create => attr.payload_param(true),
            Self::Update => attr.payload_param(false),
        }
    }
}

/// Register representation and payload types for one schema.
pub fn register_schema_types(
    registry: &mut TypeRegistry,
    schema: &ResourceSchema,
    schemas: &IndexMap<String, ResourceSchema>,
) -> ConfigResult<()> {
    for assoc in schema.associations() {
        if !schemas.contains_key(&assoc.schema) {
            return Err(ConfigError::SchemaUnknown { name: assoc.schema.clone() });
        }
    }
    for side in [Side::Representation, Side::Create, Side::Update] {
        let name = side.type_name(schema.name());
        if registry.contains_type(&Scope::Global, &name) {
            continue;
        }
        let base = base_shape(schema, side);
        let mut decl = match schema.discriminator_def() {
            None => TypeDecl::object(name.clone(), ObjectBlock::from_shape(base)),
            Some(disc) => {
                // 1) one object type per variant: tag literal ⊕ base ⊕ variant fields
                let mut variants = Vec::new();
                for variant in disc.variants.values() {
                    let variant_name = side.type_name(&format!("{}_{}", schema.name(), variant.tag));
                    let mut o = ObjectBuilder::new();
                    o.param(disc.field.clone(), Param::literal(variant.tag.clone()).required());
                    o.extend(&base);
                    for attr in variant.attributes.values().filter(|a| side.includes(a)) {
                        o.param(attr.name.clone(), side.param(attr));
                    }
                    registry.register_type(Scope::Global, TypeDecl::object(variant_name.clone(), ObjectBlock::from_shape(o.build())))?;
                    variants.push((variant.tag.clone(), variant_name));
                }
                // 2) the union dispatching on the tag
                TypeDecl::union(
                    name.clone(),
                    Some(disc.field.as_str()),
                    UnionBlock::new(move |u| {
                        for (tag, type_name) in &variants {
                            u.tagged(tag, Param::reference(type_name.clone()))?;
                        }
                        Ok(())
                    }),
                )
            }
        };
        if let (Side::Representation, Some(d)) = (side, schema.description_text()) {
            decl = decl.description(d);
        }
        registry.register_type(Scope::Global, decl)?;
    }
    debug!(schema = schema.name(), "schema types registered");
    Ok(())
}

fn base_shape(schema: &ResourceSchema, side: Side) -> Shape {
    let mut o = ObjectBuilder::new();
    if let Side::Representation = side {
        if schema.attributes().all(|a| a.name != schema.primary_key_name()) {
            o.param(schema.primary_key_name(), Param::scalar(schema.primary_key_type()).required());
        }
    }
    for attr in schema.attributes().filter(|a| side.includes(a)) {
        o.param(attr.name.clone(), side.param(attr));
    }
    if let Side::Representation = side {
        for assoc in schema.associations() {
            o.param(assoc.name.clone(), assoc.representation_param());
        }
    }
    o.build()
}

// ————————————————————————————————————————————————————————————————————————————
// CONTRACTS
// ————————————————————————————————————————————————————————————————————————————

pub struct ContractContext<'a> {
    pub schemas: &'a IndexMap<String, ResourceSchema>,
    pub pagination: PaginationConfig,
    pub key_case: KeyCase,
    pub base_path: &'a str,
}

pub fn compile_contract(
    registry: &mut TypeRegistry,
    mut decl: ContractDecl,
    ctx: &ContractContext<'_>,
) -> ConfigResult<CompiledContract> {
    let scope = Scope::contract(decl.name.clone());

    // 1) contract-local declarations
    for e in decl.enums.drain(..) {
        registry.register_enum(scope.clone(), e)?;
    }
    for t in decl.types.drain(..) {
        registry.register_type(scope.clone(), t)?;
    }

    // 2) schema + capabilities
    let schema = match &decl.schema {
        Some(name) => Some(ctx.schemas.get(name).ok_or_else(|| ConfigError::SchemaUnknown { name: name.clone() })?),
        None => None,
    };
    let capability_config = decl.capabilities.clone().unwrap_or_default();
    if let Some(schema) = schema {
        for field in capability_config.default_sort.keys() {
            if schema.attribute_named(field).is_none_or(|a| !a.sortable) {
                return Err(ConfigError::AttributeUnknown { schema: schema.name().to_owned(), attribute: field.clone() });
            }
        }
    }
    let key_case = decl.key_case.unwrap_or(ctx.key_case);
    let capabilities = capability::for_contract(schema, &capability_config, ctx.pagination, key_case)?;
    for cap in &capabilities {
        cap.register_types(registry)?;
    }

    // 3) actions: CRUD first when requested, explicit declarations merged in
    let mut decls: IndexMap<String, ActionDecl> = IndexMap::new();
    if decl.resources {
        for name in CRUD {
            decls.insert(name.to_owned(), ActionDecl::new(name));
        }
    }
    for (name, action) in decl.actions {
        match decls.get_mut(&name) {
            Some(existing) => existing.absorb(action),
            None => {
                decls.insert(name, action);
            }
        }
    }

    let mut actions = IndexMap::new();
    for (name, action) in decls {
        let compiled = compile_action(&decl.name, action, schema, &capabilities, ctx.base_path)?;
        actions.insert(name, compiled);
    }

    info!(contract = %decl.name, actions = actions.len(), capabilities = capabilities.len(), "contract compiled");
    Ok(CompiledContract {
        name: decl.name,
        scope,
        schema: decl.schema,
        key_case,
        actions,
        capabilities,
    })
}

fn compile_action(
    contract: &str,
    decl: ActionDecl,
    schema: Option<&ResourceSchema>,
    capabilities: &[Box<dyn Capability>],
    base_path: &str,
) -> ConfigResult<Action> {
    let (method, on) = match (decl.method, crud_routing(&decl.name)) {
        (Some(method), crud) => (method, decl.on.or(crud.map(|c| c.1)).unwrap_or(ActionOn::Member)),
        (None, Some((method, on))) => (method, decl.on.unwrap_or(on)),
        (None, None) => {
            return Err(ConfigError::ActionMethodUndeclared {
                contract: contract.to_owned(),
                action: decl.name.clone(),
            });
        }
    };
    let crud = crud_routing(&decl.name).is_some();
    let applying: Vec<&dyn Capability> = capabilities
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| c.applies_to(method, on))
        .collect();

    // Merge order: capability fragments, then schema-derived, then explicit blocks.

    // query
    let mut capability_keys = Vec::new();
    let mut cap_query = ObjectBuilder::new();
    for cap in &applying {
        if let (Some(key), Some(param)) = (cap.query_key(), cap.query_param()) {
            cap_query.param(key, param);
            capability_keys.push(key);
        }
    }
    let explicit_query = shape::build_object(&decl.query)?;
    let query = cap_query.build().merged(&explicit_query);

    // body
    let derived_body = match (schema, decl.name.as_str()) {
        (Some(s), "create") => Some(root_shape(s.singular_root(), Param::reference(create_payload_name(s.name())).required())),
        (Some(s), "update") => Some(root_shape(s.singular_root(), Param::reference(update_payload_name(s.name())).required())),
        _ => None,
    };
    let explicit_body = shape::build_object(&decl.body)?;
    let body = match derived_body {
        Some(derived) => Some(derived.merged(&explicit_body)),
        None if !decl.body.is_empty() => Some(explicit_body),
        None => None,
    };

    // response
    let response = if decl.no_content || (decl.response.is_empty() && (decl.name == "destroy" || (schema.is_none() || !crud))) {
        ResponseBody::NoContent
    } else {
        let derived = match (schema, decl.name.as_str()) {
            (Some(s), "index") => root_shape(s.plural_root(), Param::array(Param::reference(s.name())).required()),
            (Some(s), "show" | "create" | "update") => root_shape(s.singular_root(), Param::reference(s.name()).required()),
            _ => Shape::default(),
        };
        // capability blocks follow the root key; the root key wins a clash
        let mut fragments = ObjectBuilder::new();
        if on == ActionOn::Collection && decl.name == "index" {
            for cap in &applying {
                if let Some((key, param)) = cap.response_fragment().filter(|(k, _)| !derived.contains(k)) {
                    fragments.param(key, param);
                }
            }
        }
        let explicit = shape::build_object(&decl.response)?;
        ResponseBody::Body(Param::object(derived.merged(&fragments.build()).merged(&explicit)))
    };

    let status = match (&response, method) {
        (ResponseBody::NoContent, _) => 204,
        (_, HttpMethod::Post) if decl.name == "create" => 201,
        _ => 200,
    };

    let pk_param = schema.map_or_else(Param::string, |s| Param::scalar(s.primary_key_type())).required();
    let (path, path_params) = match (on, crud) {
        (ActionOn::Collection, true) => (format!("{base_path}/{contract}"), None),
        (ActionOn::Collection, false) => (format!("{base_path}/{contract}/{}", decl.name), None),
        (ActionOn::Member, true) => (format!("{base_path}/{contract}/{{id}}"), Some(root_param("id", pk_param))),
        (ActionOn::Member, false) => {
            (format!("{base_path}/{contract}/{{id}}/{}", decl.name), Some(root_param("id", pk_param)))
        }
    };

    debug!(contract, action = %decl.name, %method, %path, "action compiled");
    Ok(Action {
        name: decl.name,
        method,
        on,
        path,
        path_params,
        query: (!query.is_empty()).then(|| Param::object(query)),
        body: body.map(|b| Param::object(b).required()),
        response,
        status,
        description: decl.description,
        deprecated: decl.deprecated,
        capability_keys,
    })
}

fn root_shape(key: &str, param: Param) -> Shape {
    let mut o = ObjectBuilder::new();
    o.param(key, param);
    o.build()
}

fn root_param(key: &str, param: Param) -> Param {
    Param::object(root_shape(key, param))
}
