//! The api: registration phase ([`ApiBuilder`]) and the sealed, read-only
//! result ([`Api`]) every request reads.

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::info;

use crate::capability::{KeyCase, PaginationConfig};
use crate::contract::{Action, CompiledContract, ContractDecl};
use crate::error::{ConfigError, ConfigResult};
use crate::lower::{self, ContractContext};
use crate::pipeline::Endpoint;
use crate::registry::{EnumDecl, Scope, TypeDecl, TypeGraph, TypeRegistry};
use crate::schema::{ColumnCatalog, ResourceSchema};
use crate::validate::Limits;

static INSTALLED: OnceCell<Api> = OnceCell::new();

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Prefix for every route, e.g. `/api/v1`.
    pub base_path: String,
    pub key_case: KeyCase,
    pub pagination: PaginationConfig,
    pub limits: Limits,
}

// ————————————————————————————————————————————————————————————————————————————
// REGISTRATION
// ————————————————————————————————————————————————————————————————————————————

pub struct ApiBuilder {
    config: ApiConfig,
    registry: TypeRegistry,
    schemas: IndexMap<String, ResourceSchema>,
    contracts: IndexMap<String, ContractDecl>,
    catalog: Option<Box<dyn ColumnCatalog>>,
}

impl ApiBuilder {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            registry: TypeRegistry::new(),
            schemas: IndexMap::new(),
            contracts: IndexMap::new(),
            catalog: None,
        }
    }

    pub fn config(&self) -> &ApiConfig { &self.config }

    /// Column metadata consulted once, at seal time, for attributes declared
    /// without a type.
    pub fn catalog(&mut self, catalog: impl ColumnCatalog + 'static) -> &mut Self {
        self.catalog = Some(Box::new(catalog));
        self
    }

    pub fn schema(&mut self, schema: ResourceSchema) -> &mut Self {
        self.schemas.insert(schema.name().to_owned(), schema);
        self
    }

    pub fn register_type(&mut self, decl: TypeDecl) -> ConfigResult<&mut Self> {
        self.registry.register_type(Scope::Global, decl)?;
        Ok(self)
    }

    pub fn register_enum(&mut self, decl: EnumDecl) -> ConfigResult<&mut Self> {
        self.registry.register_enum(Scope::Global, decl)?;
        Ok(self)
    }

    /// Re-declaring a contract merges into the earlier declaration.
    pub fn contract(&mut self, decl: ContractDecl) -> &mut Self {
        match self.contracts.get_mut(decl.name()) {
            Some(existing) => existing.absorb(decl),
            None => {
                self.contracts.insert(decl.name().to_owned(), decl);
            }
        }
        self
    }

    pub fn seal(self) -> ConfigResult<Api> {
        let Self { config, mut registry, mut schemas, contracts, catalog } = self;
        config.pagination.check()?;

        // 1) schemas: catalog lookups happen here and never again
        for schema in schemas.values_mut() {
            schema.resolve(catalog.as_deref())?;
        }
        for schema in schemas.values() {
            lower::register_schema_types(&mut registry, schema, &schemas)?;
        }

        // 2) contracts
        let ctx = ContractContext {
            schemas: &schemas,
            pagination: config.pagination,
            key_case: config.key_case,
            base_path: config.base_path.trim_end_matches('/'),
        };
        let mut compiled = IndexMap::new();
        for (name, decl) in contracts {
            compiled.insert(name, lower::compile_contract(&mut registry, decl, &ctx)?);
        }

        // 3) freeze, then check what actions refer to
        let graph = registry.seal()?;
        for contract in compiled.values() {
            for action in contract.actions() {
                for param in action_params(action) {
                    graph.check_declaration(param, contract.scope())?;
                }
            }
        }

        info!(schemas = schemas.len(), contracts = compiled.len(), "api sealed");
        Ok(Api { config, graph, schemas, contracts: compiled })
    }
}

fn action_params(action: &Action) -> impl Iterator<Item = &crate::ir::Param> {
    [action.path_params.as_ref(), action.query.as_ref(), action.body.as_ref(), action.response.param()]
        .into_iter()
        .flatten()
}

// ————————————————————————————————————————————————————————————————————————————
// SEALED
// ————————————————————————————————————————————————————————————————————————————

/// Immutable after [`ApiBuilder::seal`]; shared by every request without
/// locking.
#[derive(Debug)]
pub struct Api {
    config: ApiConfig,
    graph: TypeGraph,
    schemas: IndexMap<String, ResourceSchema>,
    contracts: IndexMap<String, CompiledContract>,
}

impl Api {
    pub fn builder(config: ApiConfig) -> ApiBuilder { ApiBuilder::new(config) }

    pub fn config(&self) -> &ApiConfig { &self.config }
    pub fn graph(&self) -> &TypeGraph { &self.graph }
    pub fn schemas(&self) -> &IndexMap<String, ResourceSchema> { &self.schemas }
    pub fn schema(&self, name: &str) -> Option<&ResourceSchema> { self.schemas.get(name) }
    pub fn contracts(&self) -> impl Iterator<Item = &CompiledContract> { self.contracts.values() }

    pub fn contract(&self, name: &str) -> ConfigResult<&CompiledContract> {
        self.contracts.get(name).ok_or_else(|| ConfigError::ContractUnknown(name.to_owned()))
    }

    pub fn endpoint(&self, contract: &str, action: &str) -> ConfigResult<Endpoint<'_>> {
        let compiled = self.contract(contract)?;
        let found = compiled.action(action).ok_or_else(|| ConfigError::ActionUnknown {
            contract: contract.to_owned(),
            action: action.to_owned(),
        })?;
        Ok(Endpoint::new(self, compiled, found))
    }

    /// `posts#create` → the `create` endpoint of `posts`.
    pub fn endpoint_for(&self, target: &str) -> ConfigResult<Endpoint<'_>> {
        let (contract, action) = target
            .split_once('#')
            .ok_or_else(|| ConfigError::ActionUnknown { contract: target.to_owned(), action: String::new() })?;
        self.endpoint(contract, action)
    }

    /// Publish this api process-wide. Only the first install succeeds.
    pub fn install(self) -> ConfigResult<&'static Api> {
        INSTALLED.set(self).map_err(|_| ConfigError::AlreadyInstalled)?;
        INSTALLED.get().ok_or(ConfigError::AlreadyInstalled)
    }

    pub fn installed() -> Option<&'static Api> { INSTALLED.get() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ActionDecl;
    use crate::ir::Param;
    use crate::schema::{Attribute, StaticCatalog};
    use crate::ir::ScalarType;

    fn builder() -> ApiBuilder {
        let mut b = Api::builder(ApiConfig { base_path: "/api/".into(), ..Default::default() });
        b.catalog(StaticCatalog::new().column("posts", "views", ScalarType::Integer, false))
            .schema(
                ResourceSchema::new("post")
                    .attribute(Attribute::string("title").writable().filterable())
                    .attribute(Attribute::inferred("views").sortable()),
            )
            .contract(ContractDecl::new("posts").schema("post").resources());
        b
    }

    #[test]
    fn seal_compiles_contracts_and_resolves_catalog() {
        let api = builder().seal().unwrap();
        assert_eq!(api.schema("post").unwrap().attribute_named("views").unwrap().scalar_type(), Some(ScalarType::Integer));
        let ep = api.endpoint_for("posts#show").unwrap();
        assert_eq!(ep.action().path, "/api/posts/{id}");
        assert!(matches!(api.endpoint("posts", "publish"), Err(ConfigError::ActionUnknown { .. })));
        assert!(matches!(api.contract("users"), Err(ConfigError::ContractUnknown(_))));
    }

    #[test]
    fn unresolved_action_reference_fails_at_seal() {
        let mut b = builder();
        b.contract(ContractDecl::new("posts").action(ActionDecl::show().response(|o| {
            o.param("author", Param::reference("user"));
            Ok(())
        })));
        assert!(matches!(b.seal().unwrap_err(), ConfigError::ReferenceUnresolved { .. }));
    }

    #[test]
    fn action_pattern_that_does_not_compile_fails_at_seal() {
        let mut b = builder();
        b.contract(ContractDecl::new("posts").action(ActionDecl::new("redeem").method(crate::contract::HttpMethod::Post).body(|o| {
            o.param("code", Param::string().pattern("([a-z"));
            Ok(())
        })));
        assert!(matches!(b.seal().unwrap_err(), ConfigError::PatternInvalid { .. }));
    }

    #[test]
    fn reopened_contract_keeps_its_capability_switches() {
        let mut b = builder();
        b.contract(
            ContractDecl::new("posts").capabilities(crate::capability::CapabilityConfig { filtering: false, ..Default::default() }),
        );
        b.contract(ContractDecl::new("posts").action(ActionDecl::new("publish").method(crate::contract::HttpMethod::Post)));
        let api = b.seal().unwrap();
        let index = api.endpoint("posts", "index").unwrap();
        assert!(!index.action().capability_keys.contains(&"filter"));
        assert!(index.action().capability_keys.contains(&"page"));
    }

    #[test]
    fn contract_local_types_resolve_locally() {
        let mut b = builder();
        b.contract(
            ContractDecl::new("posts")
                .type_decl(TypeDecl::object("stats", crate::shape::ObjectBlock::new(|o| {
                    o.param("reads", Param::integer());
                    Ok(())
                })))
                .action(ActionDecl::new("stats").method(crate::contract::HttpMethod::Get).collection().response(|o| {
                    o.param("stats", Param::reference("stats").required());
                    Ok(())
                })),
        );
        let api = b.seal().unwrap();
        assert!(api.graph().resolve_type("stats", &Scope::contract("posts")).is_ok());
        assert!(api.graph().resolve_type("stats", &Scope::Global).is_err());
    }

    #[test]
    fn invalid_pagination_config() {
        let config = ApiConfig {
            pagination: PaginationConfig { default_size: 0, ..Default::default() },
            ..Default::default()
        };
        assert!(matches!(Api::builder(config).seal().unwrap_err(), ConfigError::PaginationSizeInvalid { .. }));
    }

    #[test]
    fn config_defaults_from_json() {
        let config: ApiConfig = serde_json::from_str(r#"{ "key_case": "camelize_lower", "pagination": { "strategy": "cursor" } }"#).unwrap();
        assert_eq!(config.key_case, KeyCase::CamelizeLower);
        assert_eq!(config.pagination.default_size, 20);
        assert_eq!(config.limits, Limits::default());
        assert!(serde_json::from_str::<ApiConfig>(r#"{ "pagination": { "strategy": "keyset" } }"#).is_err());
    }
}
