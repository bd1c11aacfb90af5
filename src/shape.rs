//! Mutable builders that run while a declaration executes.
//!
//! Two phases: a builder accumulates fields or variants in declaration
//! order, then `build(self)` consumes it and hands back an immutable
//! [`Shape`] or [`UnionParam`]. Mutation after the snapshot is impossible by
//! construction because the builder no longer exists.
pub mod object;
pub mod union;

use std::fmt;
use std::sync::Arc;

use crate::error::ConfigResult;
use crate::ir::{Param, Shape, UnionParam};

pub use object::ObjectBuilder;
pub use union::UnionBuilder;

/// A declaration body for an object type. Re-opened declarations keep every
/// block and run them in order.
#[derive(Clone)]
pub struct ObjectBlock(Arc<dyn Fn(&mut ObjectBuilder) -> ConfigResult<()> + Send + Sync>);

/// A declaration body for a union type.
#[derive(Clone)]
pub struct UnionBlock(Arc<dyn Fn(&mut UnionBuilder) -> ConfigResult<()> + Send + Sync>);

impl ObjectBlock {
    pub fn new(f: impl Fn(&mut ObjectBuilder) -> ConfigResult<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A block that appends an already-built shape.
    pub fn from_shape(shape: Shape) -> Self {
        Self::new(move |o| {
            o.extend(&shape);
            Ok(())
        })
    }

    pub fn run(&self, builder: &mut ObjectBuilder) -> ConfigResult<()> {
        (self.0)(builder)
    }
}

impl UnionBlock {
    pub fn new(f: impl Fn(&mut UnionBuilder) -> ConfigResult<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn run(&self, builder: &mut UnionBuilder) -> ConfigResult<()> {
        (self.0)(builder)
    }
}

impl fmt::Debug for ObjectBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("ObjectBlock(..)") }
}

impl fmt::Debug for UnionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("UnionBlock(..)") }
}

/// Build an anonymous nested object param.
pub fn object(build: impl FnOnce(&mut ObjectBuilder) -> ConfigResult<()>) -> ConfigResult<Param> {
    let mut builder = ObjectBuilder::new();
    build(&mut builder)?;
    Ok(Param::object(builder.build()))
}

/// Build an anonymous union param.
pub fn union(
    discriminator: Option<&str>,
    build: impl FnOnce(&mut UnionBuilder) -> ConfigResult<()>,
) -> ConfigResult<Param> {
    let mut builder = UnionBuilder::new("(anonymous)", discriminator);
    build(&mut builder)?;
    Ok(Param::union(builder.build()?))
}

/// Run every block in order over one fresh builder.
pub fn build_object(blocks: &[ObjectBlock]) -> ConfigResult<Shape> {
    let mut builder = ObjectBuilder::new();
    for block in blocks {
        block.run(&mut builder)?;
    }
    Ok(builder.build())
}

pub fn build_union(name: &str, discriminator: Option<&str>, blocks: &[UnionBlock]) -> ConfigResult<UnionParam> {
    let mut builder = UnionBuilder::new(name, discriminator);
    for block in blocks {
        block.run(&mut builder)?;
    }
    builder.build()
}
