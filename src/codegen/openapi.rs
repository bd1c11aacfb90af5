//! OpenAPI 3.1 document: one path item per route, one operation per action.
//!
//! Structured query parameters (`filter`, `sort`, `page`, ...) are described
//! as `deepObject` so clients serialize them in bracket notation. Every
//! operation that takes input answers 422 with the shared `error_response`
//! component.

use serde_json::{json, Map, Value};

use super::json_schema::{Flavor, SchemaWriter};
use super::operation_id;
use crate::api::Api;
use crate::contract::{Action, ActionOn, CompiledContract, ResponseBody};
use crate::ir::Param;
use crate::issue::IssueCode;

pub const VERSION: &str = "3.1.0";
pub const ISSUE: &str = "issue";
pub const ERROR_RESPONSE: &str = "error_response";

pub fn openapi(api: &Api, title: &str, version: &str) -> Value {
    let shared = SchemaWriter::new(api.graph(), Flavor::OpenApi, api.config().key_case);
    let mut schemas = shared.definitions();
    schemas.insert(ISSUE.into(), issue_schema());
    schemas.insert(ERROR_RESPONSE.into(), error_response_schema(&shared));

    let mut paths = Map::new();
    for contract in api.contracts() {
        let writer = SchemaWriter::new(api.graph(), Flavor::OpenApi, contract.key_case());
        for action in contract.actions() {
            let item = paths.entry(action.path.clone()).or_insert_with(|| json!({}));
            if let Value::Object(item) = item {
                let method = action.method.as_str().to_ascii_lowercase();
                item.insert(method, operation(&writer, contract, action));
            }
        }
    }

    json!({
        "openapi": VERSION,
        "info": { "title": title, "version": version },
        "paths": paths,
        "components": { "schemas": schemas },
    })
}

fn operation(writer: &SchemaWriter<'_>, contract: &CompiledContract, action: &Action) -> Value {
    let scope = contract.scope();
    let mut op = Map::new();
    op.insert("operationId".into(), Value::from(operation_id(contract, action)));
    op.insert("tags".into(), json!([contract.name()]));
    if let Some(d) = &action.description {
        op.insert("description".into(), Value::from(d.clone()));
    }
    if action.deprecated {
        op.insert("deprecated".into(), Value::Bool(true));
    }

    let mut parameters = Vec::new();
    if let Some(shape) = action.path_params.as_ref().and_then(Param::shape) {
        for (key, p) in shape.iter() {
            parameters.push(json!({ "name": key, "in": "path", "required": true, "schema": writer.param(p, scope) }));
        }
    }
    if let Some(shape) = action.query.as_ref().and_then(Param::shape) {
        for (key, p) in shape.iter() {
            let mut param = json!({
                "name": writer.wire(key),
                "in": "query",
                "required": p.is_required(),
                "schema": writer.param(p, scope),
            });
            if writer.is_structured(p) {
                param["style"] = Value::from("deepObject");
                param["explode"] = Value::Bool(true);
            }
            parameters.push(param);
        }
    }
    let has_input = !parameters.is_empty() || action.body.is_some();
    if !parameters.is_empty() {
        op.insert("parameters".into(), Value::Array(parameters));
    }

    if let Some(body) = &action.body {
        let required = body.shape().is_some_and(|s| s.iter().any(|(_, p)| p.is_required()));
        op.insert(
            "requestBody".into(),
            json!({ "required": required, "content": { "application/json": { "schema": writer.param(body, scope) } } }),
        );
    }

    let mut responses = Map::new();
    match &action.response {
        ResponseBody::NoContent => {
            responses.insert("204".into(), json!({ "description": "No Content" }));
        }
        ResponseBody::Body(param) => {
            responses.insert(
                action.status.to_string(),
                json!({
                    "description": reason(action.status),
                    "content": { "application/json": { "schema": writer.param(param, scope) } },
                }),
            );
        }
    }
    if action.on == ActionOn::Member {
        responses.insert("404".into(), error_response(writer, "Not Found"));
    }
    if has_input {
        responses.insert("422".into(), error_response(writer, "Unprocessable Entity"));
    }
    op.insert("responses".into(), Value::Object(responses));
    Value::Object(op)
}

fn reason(status: u16) -> &'static str {
    match status {
        201 => "Created",
        204 => "No Content",
        _ => "OK",
    }
}

fn error_response(writer: &SchemaWriter<'_>, description: &str) -> Value {
    json!({
        "description": description,
        "content": { "application/json": { "schema": writer.reference(ERROR_RESPONSE) } },
    })
}

fn issue_schema() -> Value {
    let codes: Vec<&str> = IssueCode::ALL.iter().map(|c| c.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "code": { "enum": codes },
            "detail": { "type": "string" },
            "field": { "type": "string" },
            "path": { "type": "array", "items": { "type": "string" } },
            "meta": { "type": "object" },
        },
        "required": ["code", "detail", "field", "path"],
    })
}

fn error_response_schema(writer: &SchemaWriter<'_>) -> Value {
    json!({
        "type": "object",
        "properties": {
            "layer": { "enum": ["http", "contract", "domain"] },
            "issues": { "type": "array", "items": writer.reference(ISSUE) },
        },
        "required": ["layer", "issues"],
    })
}
