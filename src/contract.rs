//! Contracts and actions: declarations as written, and the compiled form the
//! request pipeline and generators read.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::capability::{Capability, CapabilityConfig, KeyCase};
use crate::error::ConfigResult;
use crate::ir::Param;
use crate::registry::{EnumDecl, Scope, TypeDecl};
use crate::shape::{ObjectBlock, ObjectBuilder};

// ————————————————————————————————————————————————————————————————————————————
// ROUTING VOCABULARY
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unknown http method `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOn {
    Member,
    Collection,
}

pub const CRUD: [&str; 5] = ["index", "show", "create", "update", "destroy"];

/// Inferred routing for the CRUD action names.
pub fn crud_routing(name: &str) -> Option<(HttpMethod, ActionOn)> {
    match name {
        "index" => Some((HttpMethod::Get, ActionOn::Collection)),
        "show" => Some((HttpMethod::Get, ActionOn::Member)),
        "create" => Some((HttpMethod::Post, ActionOn::Collection)),
        "update" => Some((HttpMethod::Patch, ActionOn::Member)),
        "destroy" => Some((HttpMethod::Delete, ActionOn::Member)),
        _ => None,
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DECLARATIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub struct ActionDecl {
    pub(crate) name: String,
    pub(crate) method: Option<HttpMethod>,
    pub(crate) on: Option<ActionOn>,
    pub(crate) query: Vec<ObjectBlock>,
    pub(crate) body: Vec<ObjectBlock>,
    pub(crate) response: Vec<ObjectBlock>,
    pub(crate) no_content: bool,
    pub(crate) description: Option<String>,
    pub(crate) deprecated: bool,
}

impl ActionDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: None,
            on: None,
            query: Vec::new(),
            body: Vec::new(),
            response: Vec::new(),
            no_content: false,
            description: None,
            deprecated: false,
        }
    }

    pub fn index() -> Self { Self::new("index") }
    pub fn show() -> Self { Self::new("show") }
    pub fn create() -> Self { Self::new("create") }
    pub fn update() -> Self { Self::new("update") }
    pub fn destroy() -> Self { Self::new("destroy") }

    pub fn name(&self) -> &str { &self.name }

    pub fn method(mut self, method: HttpMethod) -> Self { self.method = Some(method); self }
    pub fn on(mut self, on: ActionOn) -> Self { self.on = Some(on); self }
    pub fn member(self) -> Self { self.on(ActionOn::Member) }
    pub fn collection(self) -> Self { self.on(ActionOn::Collection) }

    pub fn query(mut self, block: impl Fn(&mut ObjectBuilder) -> ConfigResult<()> + Send + Sync + 'static) -> Self {
        self.query.push(ObjectBlock::new(block));
        self
    }

    pub fn body(mut self, block: impl Fn(&mut ObjectBuilder) -> ConfigResult<()> + Send + Sync + 'static) -> Self {
        self.body.push(ObjectBlock::new(block));
        self
    }

    pub fn response(mut self, block: impl Fn(&mut ObjectBuilder) -> ConfigResult<()> + Send + Sync + 'static) -> Self {
        self.response.push(ObjectBlock::new(block));
        self
    }

    /// The action answers `204` with no body, which is not the same as an
    /// empty object body.
    pub fn no_content(mut self) -> Self { self.no_content = true; self }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn deprecated(mut self) -> Self { self.deprecated = true; self }

    /// Re-declaring an action concatenates its blocks; scalar settings of the
    /// later declaration win when present.
    pub(crate) fn absorb(&mut self, other: ActionDecl) {
        if other.method.is_some() { self.method = other.method; }
        if other.on.is_some() { self.on = other.on; }
        if other.description.is_some() { self.description = other.description; }
        self.no_content |= other.no_content;
        self.deprecated |= other.deprecated;
        self.query.extend(other.query);
        self.body.extend(other.body);
        self.response.extend(other.response);
    }
}

#[derive(Debug, Clone)]
pub struct ContractDecl {
    pub(crate) name: String,
    pub(crate) schema: Option<String>,
    pub(crate) resources: bool,
    pub(crate) key_case: Option<KeyCase>,
    pub(crate) capabilities: Option<CapabilityConfig>,
    pub(crate) types: Vec<TypeDecl>,
    pub(crate) enums: Vec<EnumDecl>,
    pub(crate) actions: IndexMap<String, ActionDecl>,
}

impl ContractDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            resources: false,
            key_case: None,
            capabilities: None,
            types: Vec::new(),
            enums: Vec::new(),
            actions: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    /// Derive bodies for CRUD actions from a resource schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Declare all five CRUD actions.
    pub fn resources(mut self) -> Self {
        self.resources = true;
        self
    }

    pub fn key_case(mut self, case: KeyCase) -> Self {
        self.key_case = Some(case);
        self
    }

    pub fn capabilities(mut self, config: CapabilityConfig) -> Self {
        self.capabilities = Some(config);
        self
    }

    /// Contract-local type, visible as `{contract}_{name}` to generators.
    pub fn type_decl(mut self, decl: TypeDecl) -> Self {
        self.types.push(decl);
        self
    }

    pub fn enum_decl(mut self, decl: EnumDecl) -> Self {
        self.enums.push(decl);
        self
    }

    pub fn action(mut self, decl: ActionDecl) -> Self {
        match self.actions.get_mut(&decl.name) {
            Some(existing) => existing.absorb(decl),
            None => {
                self.actions.insert(decl.name.clone(), decl);
            }
        }
        self
    }

    pub(crate) fn absorb(&mut self, other: ContractDecl) {
        if other.schema.is_some() { self.schema = other.schema; }
        if other.key_case.is_some() { self.key_case = other.key_case; }
        self.resources |= other.resources;
        if other.capabilities.is_some() { self.capabilities = other.capabilities; }
        self.types.extend(other.types);
        self.enums.extend(other.enums);
        for (_, action) in other.actions {
            match self.actions.get_mut(&action.name) {
                Some(existing) => existing.absorb(action),
                None => {
                    self.actions.insert(action.name.clone(), action);
                }
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// COMPILED
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Body(Param),
    NoContent,
}

impl ResponseBody {
    pub fn param(&self) -> Option<&Param> {
        match self {
            Self::Body(p) => Some(p),
            Self::NoContent => None,
        }
    }

    pub fn is_no_content(&self) -> bool { matches!(self, Self::NoContent) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub method: HttpMethod,
    pub on: ActionOn,
    /// Route template, e.g. `/posts/{id}`.
    pub path: String,
    pub path_params: Option<Param>,
    pub query: Option<Param>,
    pub body: Option<Param>,
    pub response: ResponseBody,
    pub status: u16,
    pub description: Option<String>,
    pub deprecated: bool,
    /// Query keys owned by capabilities, in application order.
    pub capability_keys: Vec<&'static str>,
}

#[derive(Debug)]
pub struct CompiledContract {
    pub(crate) name: String,
    pub(crate) scope: Scope,
    pub(crate) schema: Option<String>,
    pub(crate) key_case: KeyCase,
    pub(crate) actions: IndexMap<String, Action>,
    pub(crate) capabilities: Vec<Box<dyn Capability>>,
}

impl CompiledContract {
    pub fn name(&self) -> &str { &self.name }
    pub fn scope(&self) -> &Scope { &self.scope }
    pub fn schema_name(&self) -> Option<&str> { self.schema.as_deref() }
    pub fn key_case(&self) -> KeyCase { self.key_case }
    pub fn actions(&self) -> impl Iterator<Item = &Action> { self.actions.values() }
    pub fn action(&self, name: &str) -> Option<&Action> { self.actions.get(name) }
    pub fn capabilities(&self) -> &[Box<dyn Capability>] { &self.capabilities }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crud_inference() {
        assert_eq!(crud_routing("index"), Some((HttpMethod::Get, ActionOn::Collection)));
        assert_eq!(crud_routing("update"), Some((HttpMethod::Patch, ActionOn::Member)));
        assert_eq!(crud_routing("publish"), None);
    }

    #[test]
    fn redeclared_actions_merge() {
        let c = ContractDecl::new("posts")
            .action(ActionDecl::new("publish").method(HttpMethod::Post).body(|o| {
                o.param("at", Param::datetime());
                Ok(())
            }))
            .action(ActionDecl::new("publish").description("Publish a post").body(|o| {
                o.param("notify", Param::boolean());
                Ok(())
            }));
        let publish = &c.actions["publish"];
        assert_eq!(publish.method, Some(HttpMethod::Post));
        assert_eq!(publish.description.as_deref(), Some("Publish a post"));
        assert_eq!(publish.body.len(), 2);
    }

    #[test]
    fn reopening_keeps_capability_switches() {
        let off = CapabilityConfig { filtering: false, ..Default::default() };
        let mut c = ContractDecl::new("posts").capabilities(off.clone());
        c.absorb(ContractDecl::new("posts").action(ActionDecl::new("publish").method(HttpMethod::Post)));
        assert_eq!(c.capabilities.as_ref(), Some(&off));
        assert!(c.actions.contains_key("publish"));

        let sorted = CapabilityConfig { sorting: false, ..Default::default() };
        c.absorb(ContractDecl::new("posts").capabilities(sorted.clone()));
        assert_eq!(c.capabilities, Some(sorted));
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("patch".parse::<HttpMethod>(), Ok(HttpMethod::Patch));
        assert!("BREW".parse::<HttpMethod>().is_err());
    }
}
