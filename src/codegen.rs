//! Generators over a sealed [`Api`](crate::api::Api): JSON Schema, OpenAPI
//! and TypeScript declarations.
//!
//! Every generator is a pure function of the sealed graph. Declaration order
//! is preserved everywhere (enums, then types, then contract actions).
//! Contract-local definitions are emitted under their qualified name
//! (`{contract}_{name}`) so they cannot collide with global ones. Property
//! names are written in wire casing: the api-wide casing for shared
//! definitions, the contract's casing for action parameters.
pub mod json_schema;
pub mod openapi;
pub mod typescript;

pub use json_schema::{json_schema, Flavor, SchemaWriter};
pub use openapi::openapi;
pub use typescript::typescript;

use crate::capability::casing::camelize;
use crate::contract::{Action, CompiledContract};

/// `posts` + `create` → `posts_create`
pub fn operation_id(contract: &CompiledContract, action: &Action) -> String {
    format!("{}_{}", contract.name(), action.name)
}

/// `order_line` → `OrderLine`
pub fn pascal_case(name: &str) -> String {
    camelize(&name.replace('-', "_"), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal() {
        assert_eq!(pascal_case("posts_sort"), "PostsSort");
        assert_eq!(pascal_case("vehicle_car_create_payload"), "VehicleCarCreatePayload");
        assert_eq!(pascal_case("sort-direction"), "SortDirection");
    }
}
