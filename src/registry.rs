//! Named, scoped type and enum definitions.
//!
//! Lifecycle:
//! - registration: [`TypeRegistry`] accepts declarations; re-declaring a
//!   name in the same scope merges instead of replacing.
//! - seal: [`TypeRegistry::seal`] builds every shape, checks every
//!   reference and pattern and returns a read-only [`TypeGraph`].
//!
//! Lookups try the contract scope first, then the global scope.

use std::fmt;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::ir::{EnumSource, Param, ParamKind, Scalar};
use crate::shape::{self, ObjectBlock, UnionBlock};

// ————————————————————————————————————————————————————————————————————————————
// SCOPE
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Global,
    Contract(String),
}

impl Scope {
    pub fn contract(name: impl Into<String>) -> Self { Self::Contract(name.into()) }

    /// The chain a lookup walks: local first, then global.
    fn chain(&self) -> Vec<Scope> {
        match self {
            Self::Global => vec![Self::Global],
            Self::Contract(_) => vec![self.clone(), Self::Global],
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Contract(name) => f.write_str(name),
        }
    }
}

type Key = (Scope, String);

// ————————————————————————————————————————————————————————————————————————————
// DECLARATIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    Union,
}

impl TypeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Union => "union",
        }
    }
}

#[derive(Debug, Clone)]
enum Body {
    Object(ObjectBlock),
    Union(UnionBlock),
}

/// One `type`/`union` declaration as written.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    name: String,
    discriminator: Option<String>,
    deprecated: Option<bool>,
    description: Option<String>,
    example: Option<Value>,
    body: Body,
}

impl TypeDecl {
    pub fn object(name: impl Into<String>, block: ObjectBlock) -> Self {
        Self {
            name: name.into(),
            discriminator: None,
            deprecated: None,
            description: None,
            example: None,
            body: Body::Object(block),
        }
    }

    pub fn union(name: impl Into<String>, discriminator: Option<&str>, block: UnionBlock) -> Self {
        Self {
            name: name.into(),
            discriminator: discriminator.map(str::to_owned),
            deprecated: None,
            description: None,
            example: None,
            body: Body::Union(block),
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn example(mut self, value: impl Into<Value>) -> Self {
        self.example = Some(value.into());
        self
    }

    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = Some(deprecated);
        self
    }

    fn kind(&self) -> TypeKind {
        match self.body {
            Body::Object(_) => TypeKind::Object,
            Body::Union(_) => TypeKind::Union,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    name: String,
    values: Option<Vec<Value>>,
    deprecated: Option<bool>,
    description: Option<String>,
    example: Option<Value>,
}

impl EnumDecl {
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            name: name.into(),
            values: Some(values.into_iter().map(Into::into).collect()),
            deprecated: None,
            description: None,
            example: None,
        }
    }

    /// Re-open an enum without touching its values.
    pub fn reopen(name: impl Into<String>) -> Self {
        Self { name: name.into(), values: None, deprecated: None, description: None, example: None }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn example(mut self, value: impl Into<Value>) -> Self {
        self.example = Some(value.into());
        self
    }

    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = Some(deprecated);
        self
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DEFINITIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug)]
pub struct TypeDefinition {
    name: String,
    kind: TypeKind,
    scope: Scope,
    discriminator: Option<String>,
    deprecated: bool,
    description: Option<String>,
    example: Option<Value>,
    object_blocks: Vec<ObjectBlock>,
    union_blocks: Vec<UnionBlock>,
    shape: OnceCell<ConfigResult<Param>>,
}

impl TypeDefinition {
    fn from_decl(scope: Scope, decl: TypeDecl) -> Self {
        let mut def = Self {
            name: decl.name.clone(),
            kind: decl.kind(),
            scope,
            discriminator: None,
            deprecated: false,
            description: None,
            example: None,
            object_blocks: Vec::new(),
            union_blocks: Vec::new(),
            shape: OnceCell::new(),
        };
        def.absorb(decl);
        def
    }

    fn absorb(&mut self, decl: TypeDecl) {
        if decl.discriminator.is_some() { self.discriminator = decl.discriminator; }
        if let Some(d) = decl.deprecated { self.deprecated = d; }
        if decl.description.is_some() { self.description = decl.description; }
        if decl.example.is_some() { self.example = decl.example; }
        match decl.body {
            Body::Object(block) => self.object_blocks.push(block),
            Body::Union(block) => self.union_blocks.push(block),
        }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn kind(&self) -> TypeKind { self.kind }
    pub fn scope(&self) -> &Scope { &self.scope }
    pub fn discriminator(&self) -> Option<&str> { self.discriminator.as_deref() }
    pub fn is_deprecated(&self) -> bool { self.deprecated }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn example(&self) -> Option<&Value> { self.example.as_ref() }

    pub fn is_built(&self) -> bool { self.shape.get().is_some() }

    /// Lazily built, memoized shape. The first call freezes the definition.
    pub fn shape(&self) -> ConfigResult<&Param> {
        self.shape
            .get_or_init(|| self.build())
            .as_ref()
            .map_err(Clone::clone)
    }

    fn build(&self) -> ConfigResult<Param> {
        match self.kind {
            TypeKind::Object => Ok(Param::object(shape::build_object(&self.object_blocks)?)),
            TypeKind::Union => {
                let union = shape::build_union(&self.name, self.discriminator(), &self.union_blocks)?;
                Ok(Param::union(union))
            }
        }
    }
}

/// Definitions compare by metadata and built shape, not by block identity.
impl PartialEq for TypeDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.scope == other.scope
            && self.discriminator == other.discriminator
            && self.deprecated == other.deprecated
            && self.description == other.description
            && self.example == other.example
            && self.shape() == other.shape()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDefinition {
    name: String,
    scope: Scope,
    values: Vec<Value>,
    deprecated: bool,
    description: Option<String>,
    example: Option<Value>,
}

impl EnumDefinition {
    fn from_decl(scope: Scope, decl: EnumDecl) -> Self {
        let mut def = Self {
            name: decl.name.clone(),
            scope,
            values: Vec::new(),
            deprecated: false,
            description: None,
            example: None,
        };
        def.absorb(decl);
        def
    }

    fn absorb(&mut self, decl: EnumDecl) {
        if let Some(values) = decl.values { self.values = values; }
        if let Some(d) = decl.deprecated { self.deprecated = d; }
        if decl.description.is_some() { self.description = decl.description; }
        if decl.example.is_some() { self.example = decl.example; }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn scope(&self) -> &Scope { &self.scope }
    pub fn values(&self) -> &[Value] { &self.values }
    pub fn is_deprecated(&self) -> bool { self.deprecated }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn example(&self) -> Option<&Value> { self.example.as_ref() }
}

// ————————————————————————————————————————————————————————————————————————————
// REGISTRY (registration phase)
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: IndexMap<Key, TypeDefinition>,
    enums: IndexMap<Key, EnumDefinition>,
}

impl TypeRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn register_type(&mut self, scope: Scope, decl: TypeDecl) -> ConfigResult<&TypeDefinition> {
        let key = (scope.clone(), decl.name.clone());
        match self.types.entry(key) {
            indexmap::map::Entry::Occupied(entry) => {
                let def = entry.into_mut();
                if def.is_built() {
                    return Err(ConfigError::DefinitionFrozen { name: def.name.clone(), scope: scope.to_string() });
                }
                if def.kind != decl.kind() {
                    return Err(ConfigError::KindConflict {
                        name: def.name.clone(),
                        scope: scope.to_string(),
                        existing: def.kind.as_str(),
                        requested: decl.kind().as_str(),
                    });
                }
                debug!(name = %def.name, %scope, "merging re-declared type");
                def.absorb(decl);
                Ok(def)
            }
            indexmap::map::Entry::Vacant(entry) => {
                debug!(name = %decl.name, %scope, kind = decl.kind().as_str(), "registering type");
                Ok(entry.insert(TypeDefinition::from_decl(scope, decl)))
            }
        }
    }

    pub fn register_enum(&mut self, scope: Scope, decl: EnumDecl) -> ConfigResult<&EnumDefinition> {
        let key = (scope.clone(), decl.name.clone());
        match self.enums.entry(key) {
            indexmap::map::Entry::Occupied(entry) => {
                let def = entry.into_mut();
                debug!(name = %def.name, %scope, "merging re-declared enum");
                def.absorb(decl);
                Ok(def)
            }
            indexmap::map::Entry::Vacant(entry) => {
                debug!(name = %decl.name, %scope, "registering enum");
                Ok(entry.insert(EnumDefinition::from_decl(scope, decl)))
            }
        }
    }

    pub fn contains_type(&self, scope: &Scope, name: &str) -> bool {
        self.types.contains_key(&(scope.clone(), name.to_owned()))
    }

    pub fn contains_enum(&self, scope: &Scope, name: &str) -> bool {
        self.enums.contains_key(&(scope.clone(), name.to_owned()))
    }

    pub fn resolve_type(&self, name: &str, scope: &Scope) -> ConfigResult<&TypeDefinition> {
        resolve(&self.types, name, scope).ok_or_else(|| ConfigError::ReferenceUnresolved {
            name: name.to_owned(),
            scope: scope.to_string(),
        })
    }

    pub fn resolve_enum(&self, name: &str, scope: &Scope) -> ConfigResult<&EnumDefinition> {
        resolve(&self.enums, name, scope).ok_or_else(|| ConfigError::EnumUnresolved {
            name: name.to_owned(),
            scope: scope.to_string(),
        })
    }

    /// Build every shape and check every reference, then freeze.
    pub fn seal(self) -> ConfigResult<TypeGraph> {
        for def in self.types.values() {
            let param = def.shape()?;
            check_declaration(&self, param, def.scope())?;
        }
        info!(types = self.types.len(), enums = self.enums.len(), "type registry sealed");
        Ok(TypeGraph { registry: self })
    }
}

fn resolve<'a, T>(map: &'a IndexMap<Key, T>, name: &str, scope: &Scope) -> Option<&'a T> {
    scope.chain()
        .into_iter()
        .find_map(|s| map.get(&(s, name.to_owned())))
}

/// Every type and enum reference inside `param` must resolve from `scope`,
/// and every declared pattern must compile.
pub(crate) fn check_declaration(registry: &TypeRegistry, param: &Param, scope: &Scope) -> ConfigResult<()> {
    let mut result = Ok(());
    param.walk(&mut |node| {
        if result.is_err() { return; }
        match node.kind() {
            ParamKind::Scalar(Scalar { pattern: Some(pattern), .. }) => {
                if let Err(e) = Regex::new(pattern) {
                    result = Err(ConfigError::PatternInvalid { pattern: pattern.clone(), reason: e.to_string() });
                }
            }
            ParamKind::Reference(name) => {
                if let Err(e) = registry.resolve_type(name, scope) { result = Err(e); }
            }
            ParamKind::Enum(EnumSource::Ref(name)) => {
                if let Err(e) = registry.resolve_enum(name, scope) { result = Err(e); }
            }
            _ => {}
        }
    });
    result
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE GRAPH (sealed)
// ————————————————————————————————————————————————————————————————————————————

/// Read-only after boot; safe to share across threads without locking.
#[derive(Debug)]
pub struct TypeGraph {
    registry: TypeRegistry,
}

impl TypeGraph {
    pub fn resolve_type(&self, name: &str, scope: &Scope) -> ConfigResult<&TypeDefinition> {
        self.registry.resolve_type(name, scope)
    }

    pub fn resolve_enum(&self, name: &str, scope: &Scope) -> ConfigResult<&EnumDefinition> {
        self.registry.resolve_enum(name, scope)
    }

    /// Shape of a referenced type plus the scope its own references resolve in.
    pub fn shape_of(&self, name: &str, scope: &Scope) -> ConfigResult<(&Param, &Scope)> {
        let def = self.resolve_type(name, scope)?;
        Ok((def.shape()?, def.scope()))
    }

    pub fn enum_values(&self, name: &str, scope: &Scope) -> ConfigResult<&[Value]> {
        Ok(self.resolve_enum(name, scope)?.values())
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.registry.types.values()
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDefinition> {
        self.registry.enums.values()
    }

    /// Name used by generators. Contract-local names are prefixed with the
    /// contract so they cannot collide with global ones.
    pub fn qualified_name(scope: &Scope, name: &str) -> String {
        match scope {
            Scope::Global => name.to_owned(),
            Scope::Contract(contract) => format!("{contract}_{name}"),
        }
    }

    /// Qualified name a reference resolves to from `scope`.
    pub fn qualify_type_ref(&self, name: &str, scope: &Scope) -> String {
        match self.resolve_type(name, scope) {
            Ok(def) => Self::qualified_name(def.scope(), def.name()),
            Err(_) => name.to_owned(),
        }
    }

    pub fn qualify_enum_ref(&self, name: &str, scope: &Scope) -> String {
        match self.resolve_enum(name, scope) {
            Ok(def) => Self::qualified_name(def.scope(), def.name()),
            Err(_) => name.to_owned(),
        }
    }

    pub(crate) fn check_declaration(&self, param: &Param, scope: &Scope) -> ConfigResult<()> {
        check_declaration(&self.registry, param, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn address_block() -> ObjectBlock {
        ObjectBlock::new(|o| {
            o.param("street", Param::string().required());
            o.param("city", Param::string());
            Ok(())
        })
    }

    #[test]
    fn local_scope_shadows_global() {
        let mut reg = TypeRegistry::new();
        reg.register_type(Scope::Global, TypeDecl::object("address", address_block())).unwrap();
        reg.register_type(
            Scope::contract("orders"),
            TypeDecl::object("address", ObjectBlock::new(|o| { o.param("line", Param::string()); Ok(()) })),
        ).unwrap();

        let local = reg.resolve_type("address", &Scope::contract("orders")).unwrap();
        assert_eq!(local.scope(), &Scope::contract("orders"));
        let fallback = reg.resolve_type("address", &Scope::contract("users")).unwrap();
        assert_eq!(fallback.scope(), &Scope::Global);
    }

    #[test]
    fn unknown_reference_is_a_config_error() {
        let reg = TypeRegistry::new();
        let err = reg.resolve_type("ghost", &Scope::Global).unwrap_err();
        assert!(matches!(err, ConfigError::ReferenceUnresolved { .. }));
    }

    #[test]
    fn redeclaration_merges_blocks_and_metadata() {
        let mut reg = TypeRegistry::new();
        reg.register_type(Scope::Global, TypeDecl::object("address", address_block()).description("postal")).unwrap();
        reg.register_type(
            Scope::Global,
            TypeDecl::object("address", ObjectBlock::new(|o| { o.param("zip", Param::string()); Ok(()) }))
                .example(json!({ "street": "Main" })),
        ).unwrap();
        let def = reg.resolve_type("address", &Scope::Global).unwrap();
        assert_eq!(def.description(), Some("postal"));
        assert_eq!(def.example(), Some(&json!({ "street": "Main" })));
        let keys: Vec<_> = def.shape().unwrap().shape().unwrap().keys().collect();
        assert_eq!(keys, ["street", "city", "zip"]);
    }

    #[test]
    fn registering_twice_is_idempotent() {
        let mut once = TypeRegistry::new();
        once.register_type(Scope::Global, TypeDecl::object("address", address_block()).description("d")).unwrap();
        let mut twice = TypeRegistry::new();
        twice.register_type(Scope::Global, TypeDecl::object("address", address_block()).description("d")).unwrap();
        twice.register_type(Scope::Global, TypeDecl::object("address", address_block()).description("d")).unwrap();
        assert_eq!(
            once.resolve_type("address", &Scope::Global).unwrap(),
            twice.resolve_type("address", &Scope::Global).unwrap(),
        );
    }

    #[test]
    fn built_definition_cannot_be_reopened() {
        let mut reg = TypeRegistry::new();
        reg.register_type(Scope::Global, TypeDecl::object("address", address_block())).unwrap();
        reg.resolve_type("address", &Scope::Global).unwrap().shape().unwrap();
        let err = reg.register_type(Scope::Global, TypeDecl::object("address", address_block())).unwrap_err();
        assert!(matches!(err, ConfigError::DefinitionFrozen { .. }));
    }

    #[test]
    fn kind_conflict_is_rejected() {
        let mut reg = TypeRegistry::new();
        reg.register_type(Scope::Global, TypeDecl::object("thing", address_block())).unwrap();
        let err = reg.register_type(
            Scope::Global,
            TypeDecl::union("thing", None, UnionBlock::new(|u| { u.untagged(Param::string())?; Ok(()) })),
        ).unwrap_err();
        assert!(matches!(err, ConfigError::KindConflict { .. }));
    }

    #[test]
    fn enum_merge_keeps_values_unless_replaced() {
        let mut reg = TypeRegistry::new();
        reg.register_enum(Scope::Global, EnumDecl::new("status", ["draft", "live"])).unwrap();
        reg.register_enum(Scope::Global, EnumDecl::reopen("status").description("lifecycle")).unwrap();
        let def = reg.resolve_enum("status", &Scope::Global).unwrap();
        assert_eq!(def.values(), [json!("draft"), json!("live")]);
        assert_eq!(def.description(), Some("lifecycle"));

        reg.register_enum(Scope::Global, EnumDecl::new("status", ["archived"])).unwrap();
        assert_eq!(reg.resolve_enum("status", &Scope::Global).unwrap().values(), [json!("archived")]);
    }

    #[test]
    fn seal_fails_on_dangling_reference() {
        let mut reg = TypeRegistry::new();
        reg.register_type(
            Scope::Global,
            TypeDecl::object("order", ObjectBlock::new(|o| { o.param("ship_to", Param::reference("address")); Ok(()) })),
        ).unwrap();
        let err = reg.seal().unwrap_err();
        assert_eq!(err, ConfigError::ReferenceUnresolved { name: "address".into(), scope: "global".into() });
    }

    #[test]
    fn seal_fails_on_pattern_that_does_not_compile() {
        let mut reg = TypeRegistry::new();
        reg.register_type(
            Scope::Global,
            TypeDecl::object("coupon", ObjectBlock::new(|o| { o.param("code", Param::string().pattern("([a-z")); Ok(()) })),
        ).unwrap();
        assert!(matches!(reg.seal().unwrap_err(), ConfigError::PatternInvalid { pattern, .. } if pattern == "([a-z"));
    }

    #[test]
    fn seal_fails_on_bad_union_declaration() {
        let mut reg = TypeRegistry::new();
        reg.register_type(
            Scope::Global,
            TypeDecl::union("vehicle", Some("kind"), UnionBlock::new(|u| { u.untagged(Param::string())?; Ok(()) })),
        ).unwrap();
        assert!(matches!(reg.seal().unwrap_err(), ConfigError::DiscriminatorTagMissing { .. }));
    }

    #[test]
    fn qualified_names() {
        assert_eq!(TypeGraph::qualified_name(&Scope::Global, "address"), "address");
        assert_eq!(TypeGraph::qualified_name(&Scope::contract("orders"), "line"), "orders_line");
    }
}
