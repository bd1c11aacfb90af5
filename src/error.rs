//! Configuration errors.
//!
//! Everything here is a programmer error in a declaration: it surfaces while
//! types, schemas and contracts are registered or sealed, never while a
//! request is validated. Per-request problems are [`crate::issue::Issue`]s.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("union `{union}` has discriminator `{discriminator}` but a variant declares no tag")]
    DiscriminatorTagMissing { union: String, discriminator: String },

    #[error("union `{union}` has no discriminator but variant declares tag `{tag}`")]
    TagWithoutDiscriminator { union: String, tag: String },

    #[error("union `{union}` declares tag `{tag}` more than once")]
    DuplicateVariantTag { union: String, tag: String },

    #[error("union `{union}` declares no variants")]
    UnionEmpty { union: String },

    #[error("reference to unknown type `{name}` (scope {scope})")]
    ReferenceUnresolved { name: String, scope: String },

    #[error("reference to unknown enum `{name}` (scope {scope})")]
    EnumUnresolved { name: String, scope: String },

    #[error("`{name}` (scope {scope}) was already built and cannot be re-opened")]
    DefinitionFrozen { name: String, scope: String },

    #[error("`{name}` (scope {scope}) was declared as {existing} and cannot be re-declared as {requested}")]
    KindConflict { name: String, scope: String, existing: &'static str, requested: &'static str },

    #[error("unknown resource schema `{name}`")]
    SchemaUnknown { name: String },

    #[error("schema `{schema}` has no attribute `{attribute}`")]
    AttributeUnknown { schema: String, attribute: String },

    #[error("schema `{schema}` attribute `{attribute}` has no declared type and no catalog column")]
    AttributeTypeUnknown { schema: String, attribute: String },

    #[error("schema `{schema}` maps storage type `{storage_type}` to more than one variant")]
    StorageTypeConflict { schema: String, storage_type: String },

    #[error("invalid pagination strategy `{0}` (expected offset or cursor)")]
    PaginationStrategyInvalid(String),

    #[error("invalid pagination sizes: default {default_size}, max {max_size}")]
    PaginationSizeInvalid { default_size: u64, max_size: u64 },

    #[error("action `{contract}#{action}` is not a CRUD action and declares no http method")]
    ActionMethodUndeclared { contract: String, action: String },

    #[error("unknown contract `{0}`")]
    ContractUnknown(String),

    #[error("contract `{contract}` has no action `{action}`")]
    ActionUnknown { contract: String, action: String },

    #[error("schema `{schema}` cannot filter on reserved name `{attribute}`")]
    ReservedFilterName { schema: String, attribute: String },

    #[error("pattern `{pattern}` does not compile: {reason}")]
    PatternInvalid { pattern: String, reason: String },

    #[error("an api is already installed for this process")]
    AlreadyInstalled,

    #[error("definition document: {0}")]
    Document(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
