//! TypeScript declarations: string-literal unions for enums, interfaces for
//! object types, discriminated unions for tagged unions, and request /
//! response aliases per action.

use std::fmt::Write as _;

use serde_json::Value;

use super::{operation_id, pascal_case};
use crate::api::Api;
use crate::capability::KeyCase;
use crate::contract::ResponseBody;
use crate::ir::{EnumSource, Param, ParamKind, ScalarType, Shape, UnionParam};
use crate::issue::IssueCode;
use crate::registry::{Scope, TypeGraph};

const HEADER: &str = "// Generated by json-contract. Do not edit.\n";

#[derive(Debug, Clone, Copy)]
struct TsWriter<'a> {
    graph: &'a TypeGraph,
    case: KeyCase,
}

impl TsWriter<'_> {
    fn ty(&self, param: &Param, scope: &Scope) -> String {
        let base = self.kind(param, scope);
        if param.is_nullable() { format!("{base} | null") } else { base }
    }

    fn kind(&self, param: &Param, scope: &Scope) -> String {
        match param.kind() {
            ParamKind::Scalar(s) => match s.ty {
                ScalarType::Integer | ScalarType::Float => "number".into(),
                ScalarType::Boolean => "boolean".into(),
                _ => "string".into(),
            },
            ParamKind::Literal(v) => literal(v),
            ParamKind::Enum(EnumSource::Inline(values)) => values.iter().map(literal).collect::<Vec<_>>().join(" | "),
            ParamKind::Enum(EnumSource::Ref(name)) => pascal_case(&self.graph.qualify_enum_ref(name, scope)),
            ParamKind::Array(a) => {
                let item = self.ty(&a.of, scope);
                if is_simple(&item) { format!("{item}[]") } else { format!("Array<{item}>") }
            }
            ParamKind::Object(shape) => self.inline_object(shape, scope, None),
            ParamKind::Reference(name) => pascal_case(&self.graph.qualify_type_ref(name, scope)),
            ParamKind::Union(u) => self.arms(u, scope).join(" | "),
            ParamKind::Unknown => "unknown".into(),
        }
    }

    fn member(&self, key: &str, param: &Param, scope: &Scope) -> String {
        let optional = if param.is_required() { "" } else { "?" };
        format!("{}{optional}: {}", property(&self.case.to_wire(key)), self.ty(param, scope))
    }

    fn inline_object(&self, shape: &Shape, scope: &Scope, tag: Option<(&str, &str)>) -> String {
        let mut members = Vec::new();
        if let Some((field, value)) = tag {
            members.push(format!("{}: {}", property(&self.case.to_wire(field)), literal(&Value::from(value))));
        }
        for (key, field) in shape.iter() {
            if tag.is_some_and(|(f, _)| f == key) {
                continue;
            }
            members.push(self.member(key, field, scope));
        }
        if members.is_empty() { "{}".into() } else { format!("{{ {} }}", members.join("; ")) }
    }

    fn arms(&self, union: &UnionParam, scope: &Scope) -> Vec<String> {
        union
            .variants()
            .iter()
            .map(|v| match (union.discriminator(), v.tag.as_deref()) {
                (Some(disc), Some(tag)) => match v.param.kind() {
                    ParamKind::Object(shape) => self.inline_object(shape, scope, Some((disc, tag))),
                    _ => {
                        let head = format!("{{ {}: {} }}", property(&self.case.to_wire(disc)), literal(&Value::from(tag)));
                        format!("({head} & {})", self.ty(&v.param, scope))
                    }
                },
                _ => self.ty(&v.param, scope),
            })
            .collect()
    }

    /// `export interface` for objects, `export type` otherwise.
    fn declaration(&self, out: &mut String, name: &str, param: &Param, scope: &Scope, doc: Option<&str>) {
        doc_comment(out, doc, param.is_deprecated());
        match param.kind() {
            ParamKind::Object(shape) => {
                let _ = writeln!(out, "export interface {name} {{");
                for (key, field) in shape.iter() {
                    doc_comment_indented(out, field.description_text(), field.is_deprecated());
                    let _ = writeln!(out, "  {};", self.member(key, field, scope));
                }
                let _ = writeln!(out, "}}");
            }
            ParamKind::Union(u) => {
                let _ = writeln!(out, "export type {name} =");
                let arms = self.arms(u, scope);
                let last = arms.len().saturating_sub(1);
                for (i, arm) in arms.iter().enumerate() {
                    let _ = writeln!(out, "  | {arm}{}", if i == last { ";" } else { "" });
                }
            }
            _ => {
                let _ = writeln!(out, "export type {name} = {};", self.ty(param, scope));
            }
        }
        out.push('\n');
    }
}

pub fn typescript(api: &Api) -> String {
    let graph = api.graph();
    let shared = TsWriter { graph, case: api.config().key_case };
    let mut out = String::from(HEADER);
    out.push('\n');

    for def in graph.enums() {
        doc_comment(&mut out, def.description(), def.is_deprecated());
        let values = def.values().iter().map(literal).collect::<Vec<_>>().join(" | ");
        let name = pascal_case(&TypeGraph::qualified_name(def.scope(), def.name()));
        let _ = writeln!(out, "export type {name} = {values};\n");
    }
    for def in graph.types() {
        let Ok(shape) = def.shape() else { continue };
        let name = pascal_case(&TypeGraph::qualified_name(def.scope(), def.name()));
        let doc = def.description();
        if def.is_deprecated() {
            doc_comment(&mut out, doc, true);
            shared.declaration(&mut out, &name, shape, def.scope(), None);
        } else {
            shared.declaration(&mut out, &name, shape, def.scope(), doc);
        }
    }

    for contract in api.contracts() {
        let writer = TsWriter { graph, case: contract.key_case() };
        let scope = contract.scope();
        for action in contract.actions() {
            let base = pascal_case(&operation_id(contract, action));
            let doc = action.description.as_deref();
            if let Some(p) = &action.path_params {
                writer.declaration(&mut out, &format!("{base}Path"), p, scope, doc);
            }
            if let Some(q) = &action.query {
                writer.declaration(&mut out, &format!("{base}Query"), q, scope, doc);
            }
            if let Some(b) = &action.body {
                writer.declaration(&mut out, &format!("{base}Body"), b, scope, doc);
            }
            match &action.response {
                ResponseBody::Body(r) => writer.declaration(&mut out, &format!("{base}Response"), r, scope, doc),
                ResponseBody::NoContent => {
                    let _ = writeln!(out, "export type {base}Response = void;\n");
                }
            }
        }
    }

    let codes = IssueCode::ALL.iter().map(|c| format!("\"{}\"", c.as_str())).collect::<Vec<_>>().join(" | ");
    let _ = writeln!(out, "export type IssueCode = {codes};\n");
    out.push_str(
        "export interface Issue {\n  code: IssueCode;\n  detail: string;\n  field: string;\n  path: string[];\n  meta?: Record<string, unknown>;\n}\n\n",
    );
    out.push_str("export interface ErrorResponse {\n  layer: \"http\" | \"contract\" | \"domain\";\n  issues: Issue[];\n}\n");
    out
}

// ---- helpers ----

fn literal(v: &Value) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "unknown".into())
}

fn is_simple(ty: &str) -> bool {
    ty.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn property(key: &str) -> String {
    let mut chars = key.chars();
    let ident = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if ident { key.to_owned() } else { literal(&Value::from(key)) }
}

fn doc_comment(out: &mut String, doc: Option<&str>, deprecated: bool) {
    match (doc, deprecated) {
        (None, false) => {}
        (Some(d), false) => { let _ = writeln!(out, "/** {d} */"); }
        (None, true) => out.push_str("/** @deprecated */\n"),
        (Some(d), true) => { let _ = writeln!(out, "/**\n * {d}\n * @deprecated\n */"); }
    }
}

fn doc_comment_indented(out: &mut String, doc: Option<&str>, deprecated: bool) {
    let mut block = String::new();
    doc_comment(&mut block, doc, deprecated);
    for line in block.lines() {
        let _ = writeln!(out, "  {line}");
    }
}
