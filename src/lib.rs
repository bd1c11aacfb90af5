//! Declarative API contracts.
//!
//! Declare named types, resource schemas and contracts once; seal them into
//! an immutable [`Api`]; then, per request, validate input against the
//! compiled shapes, describe filtering/sorting/pagination on a host-owned
//! [`Queryable`], and render records through the declared response shape.
//!
//! ```text
//! ApiBuilder ──seal──▶ Api ──endpoint──▶ Endpoint
//!                                          ├─ validate(RawRequest) → RequestOutcome
//!                                          ├─ apply(&outcome, &mut dyn Queryable)
//!                                          └─ render_collection / render_record / render_error
//! ```
pub mod api;
pub mod capability;
pub mod codegen;
pub mod contract;
pub mod document;
pub mod error;
pub mod ir;
pub mod issue;
pub mod lower;
pub mod path_de;
pub mod pipeline;
pub mod query;
pub mod query_string;
pub mod registry;
pub mod render;
pub mod schema;
pub mod shape;
pub mod validate;

pub use api::{Api, ApiBuilder, ApiConfig};
pub use capability::{CapabilityConfig, KeyCase, Operator, PaginationConfig, PaginationStrategy};
pub use contract::{ActionDecl, ActionOn, ContractDecl, HttpMethod};
pub use document::Document;
pub use error::{ConfigError, ConfigResult};
pub use ir::{Format, Param, ScalarType, Shape};
pub use issue::{ErrorResponse, Issue, IssueCode};
pub use pipeline::{Endpoint, RawRequest, RequestOutcome, Response};
pub use query::{MemoryCollection, Predicate, Queryable, SortDirection};
pub use registry::{EnumDecl, Scope, TypeDecl};
pub use schema::{Association, Attribute, ColumnCatalog, ResourceSchema, SchemaVariant, StaticCatalog};
pub use shape::{ObjectBlock, UnionBlock};
pub use validate::{Limits, ValidationResult, Validator};
