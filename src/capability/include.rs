//! Eager loading of associations: `include[comments]=true`.

use serde_json::Value;
use tracing::debug;

use super::Capability;
use crate::contract::{ActionOn, HttpMethod};
use crate::error::ConfigResult;
use crate::ir::Param;
use crate::query::Queryable;
use crate::registry::{Scope, TypeDecl, TypeRegistry};
use crate::schema::{IncludeMode, ResourceSchema};
use crate::shape::{ObjectBlock, ObjectBuilder};

#[derive(Debug, Clone)]
pub struct Includes {
    type_name: String,
    optional: Vec<String>,
    always: Vec<String>,
}

impl Includes {
    pub fn new(schema: &ResourceSchema) -> Self {
        let (always, optional): (Vec<_>, Vec<_>) =
            schema.associations().partition(|a| a.include == IncludeMode::Always);
        Self {
            type_name: format!("{}_include", schema.name()),
            optional: optional.into_iter().map(|a| a.name.clone()).collect(),
            always: always.into_iter().map(|a| a.name.clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool { self.optional.is_empty() && self.always.is_empty() }
}

impl Capability for Includes {
    fn name(&self) -> &'static str { "includes" }

    fn query_key(&self) -> Option<&'static str> {
        (!self.optional.is_empty()).then_some("include")
    }

    fn applies_to(&self, method: HttpMethod, _on: ActionOn) -> bool {
        method == HttpMethod::Get
    }

    fn register_types(&self, registry: &mut TypeRegistry) -> ConfigResult<()> {
        if self.optional.is_empty() || registry.contains_type(&Scope::Global, &self.type_name) {
            return Ok(());
        }
        let mut o = ObjectBuilder::new();
        for name in &self.optional {
            o.param(name.clone(), Param::boolean());
        }
        registry.register_type(Scope::Global, TypeDecl::object(self.type_name.clone(), ObjectBlock::from_shape(o.build())))?;
        Ok(())
    }

    fn query_param(&self) -> Option<Param> {
        (!self.optional.is_empty()).then(|| Param::reference(self.type_name.clone()))
    }

    fn apply(&self, params: Option<&Value>, query: &mut dyn Queryable) -> anyhow::Result<()> {
        for name in &self.always {
            query.eager_load(name);
        }
        let requested = params.and_then(Value::as_object).into_iter().flatten();
        for (name, wanted) in requested {
            if wanted.as_bool() == Some(true) && self.optional.contains(name) {
                debug!(association = %name, "eager loading");
                query.eager_load(name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MemoryCollection;
    use crate::schema::Association;
    use serde_json::json;

    #[test]
    fn always_and_requested_associations_are_loaded() {
        let schema = ResourceSchema::new("post")
            .association(Association::one("author", "user").always())
            .association(Association::many("comments", "comment"))
            .association(Association::many("tags", "tag"));
        let inc = Includes::new(&schema);
        let mut q = MemoryCollection::new(Vec::new());
        inc.apply(Some(&json!({ "comments": true, "tags": false, "author": true })), &mut q).unwrap();
        assert_eq!(q.plan().includes, ["author", "comments"]);
    }
}
