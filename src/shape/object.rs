use indexmap::IndexMap;

use crate::error::ConfigResult;
use crate::ir::{Param, Shape};

/// Appends named params in declaration order. A repeated name replaces the
/// earlier definition but keeps its position.
#[derive(Debug, Default)]
pub struct ObjectBuilder {
    fields: IndexMap<String, Param>,
}

impl ObjectBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn param(&mut self, name: impl Into<String>, param: Param) -> &mut Self {
        self.fields.insert(name.into(), param);
        self
    }

    /// Nested anonymous object. Presence metadata goes through `meta`.
    pub fn object(
        &mut self,
        name: impl Into<String>,
        meta: impl FnOnce(Param) -> Param,
        build: impl FnOnce(&mut ObjectBuilder) -> ConfigResult<()>,
    ) -> ConfigResult<&mut Self> {
        let param = super::object(build)?;
        Ok(self.param(name, meta(param)))
    }

    /// Array of anonymous objects.
    pub fn array_of_objects(
        &mut self,
        name: impl Into<String>,
        meta: impl FnOnce(Param) -> Param,
        build: impl FnOnce(&mut ObjectBuilder) -> ConfigResult<()>,
    ) -> ConfigResult<&mut Self> {
        let element = super::object(build)?;
        Ok(self.param(name, meta(Param::array(element))))
    }

    pub fn extend(&mut self, shape: &Shape) -> &mut Self {
        for (k, p) in shape.iter() {
            self.fields.insert(k.to_owned(), p.clone());
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool { self.fields.contains_key(name) }

    pub fn build(self) -> Shape {
        Shape::from_fields(self.fields)
    }
}
