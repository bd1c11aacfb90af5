//! Request/response validation against a resolved [`Param`] tree.
//!
//! Traversal follows the declared tree, not the payload:
//! - keys the tree does not declare are dropped (closed world);
//! - a missing required key is a `required` issue at that path;
//! - a node that fails records its issues and its children are skipped;
//! - siblings keep validating, so every independent problem is reported.
//!
//! Unresolvable references are configuration errors and come back as `Err`;
//! everything a client can cause comes back as an [`Issue`].
pub mod scalar;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ConfigResult;
use crate::ir::{EnumSource, Param, ParamKind, UnionParam};
use crate::issue::{child, Issue, IssueCode, PathSegment};
use crate::registry::{Scope, TypeGraph};

/// Guards against resource exhaustion on hostile payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_depth: usize,
    pub max_array_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_depth: 32, max_array_length: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Normalized, coerced values; only declared keys survive.
    pub params: Value,
    pub issues: Vec<Issue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool { self.issues.is_empty() }
}

#[derive(Debug, Clone, Copy)]
pub struct Validator<'g> {
    graph: &'g TypeGraph,
    limits: Limits,
}

impl<'g> Validator<'g> {
    pub fn new(graph: &'g TypeGraph, limits: Limits) -> Self {
        Self { graph, limits }
    }

    pub fn graph(&self) -> &'g TypeGraph { self.graph }

    /// Validate a whole payload. `value` is `None` when the payload is absent.
    pub fn validate(&self, param: &Param, value: Option<&Value>, scope: &Scope) -> ConfigResult<ValidationResult> {
        let mut issues = Vec::new();
        let params = self.validate_at(param, value, scope, &[], &mut issues)?;
        Ok(ValidationResult { params: params.unwrap_or(Value::Null), issues })
    }

    /// Validate one slot under `path`, applying presence rules (required,
    /// nullable, default). `Ok(None)` means absent or invalid.
    pub fn validate_at(
        &self,
        param: &Param,
        value: Option<&Value>,
        scope: &Scope,
        path: &[PathSegment],
        issues: &mut Vec<Issue>,
    ) -> ConfigResult<Option<Value>> {
        self.slot(param, value, scope, path, 0, issues)
    }

    fn slot(
        &self,
        param: &Param,
        value: Option<&Value>,
        scope: &Scope,
        path: &[PathSegment],
        depth: usize,
        issues: &mut Vec<Issue>,
    ) -> ConfigResult<Option<Value>> {
        match value {
            None => {
                if let Some(default) = param.default() {
                    return Ok(Some(default.clone()));
                }
                if param.is_required() {
                    issues.push(Issue::new(IssueCode::Required, path.to_vec(), "is required"));
                }
                Ok(None)
            }
            Some(Value::Null) => {
                if param.is_nullable() {
                    Ok(Some(Value::Null))
                } else {
                    issues.push(Issue::new(IssueCode::NullInvalid, path.to_vec(), "must not be null"));
                    Ok(None)
                }
            }
            Some(v) => self.node(param, v, scope, path, depth, issues),
        }
    }

    fn node(
        &self,
        param: &Param,
        value: &Value,
        scope: &Scope,
        path: &[PathSegment],
        depth: usize,
        issues: &mut Vec<Issue>,
    ) -> ConfigResult<Option<Value>> {
        if depth > self.limits.max_depth {
            issues.push(
                Issue::new(IssueCode::DepthExceeded, path.to_vec(), "nesting is too deep")
                    .with_meta("max_depth", self.limits.max_depth),
            );
            return Ok(None);
        }
        match param.kind() {
            ParamKind::Unknown => Ok(Some(value.clone())),
            ParamKind::Scalar(s) => Ok(scalar::check(s, value, path, issues)),
            ParamKind::Literal(expected) => Ok(self.literal(expected, value, path, issues)),
            ParamKind::Enum(source) => self.enumeration(source, value, scope, path, issues),
            ParamKind::Array(array) => {
                let Some(items) = value.as_array() else {
                    issues.push(mismatch("array", value, path));
                    return Ok(None);
                };
                if items.len() > self.limits.max_array_length {
                    issues.push(
                        Issue::new(IssueCode::ArrayLimitExceeded, path.to_vec(), "array is too long")
                            .with_meta("max", self.limits.max_array_length),
                    );
                    return Ok(None);
                }
                let before = issues.len();
                if let Some(min) = array.min_items.filter(|m| items.len() < *m) {
                    issues.push(
                        Issue::new(IssueCode::LengthTooShort, path.to_vec(), format!("must have at least {min} items"))
                            .with_meta("min", min),
                    );
                }
                if let Some(max) = array.max_items.filter(|m| items.len() > *m) {
                    issues.push(
                        Issue::new(IssueCode::LengthTooLong, path.to_vec(), format!("must have at most {max} items"))
                            .with_meta("max", max),
                    );
                }
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    if let Some(v) = self.slot(&array.of, Some(item), scope, &child(path, i), depth + 1, issues)? {
                        out.push(v);
                    }
                }
                Ok((issues.len() == before).then_some(Value::Array(out)))
            }
            ParamKind::Object(shape) => {
                let Some(map) = value.as_object() else {
                    issues.push(mismatch("object", value, path));
                    return Ok(None);
                };
                let mut out = Map::new();
                for (key, field) in shape.iter() {
                    if let Some(v) = self.slot(field, map.get(key), scope, &child(path, key), depth + 1, issues)? {
                        out.insert(key.to_owned(), v);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            ParamKind::Reference(name) => {
                let (target, target_scope) = self.graph.shape_of(name, scope)?;
                self.node(target, value, target_scope, path, depth + 1, issues)
            }
            ParamKind::Union(union) => self.union(union, value, scope, path, depth, issues),
        }
    }

    fn literal(&self, expected: &Value, value: &Value, path: &[PathSegment], issues: &mut Vec<Issue>) -> Option<Value> {
        if loosely_equal(expected, value) {
            return Some(expected.clone());
        }
        issues.push(
            Issue::new(IssueCode::LiteralInvalid, path.to_vec(), format!("must be {expected}"))
                .with_meta("expected", expected.clone()),
        );
        None
    }

    fn enumeration(
        &self,
        source: &EnumSource,
        value: &Value,
        scope: &Scope,
        path: &[PathSegment],
        issues: &mut Vec<Issue>,
    ) -> ConfigResult<Option<Value>> {
        let allowed: &[Value] = match source {
            EnumSource::Inline(values) => values,
            EnumSource::Ref(name) => self.graph.enum_values(name, scope)?,
        };
        if let Some(hit) = allowed.iter().find(|a| loosely_equal(a, value)) {
            return Ok(Some(hit.clone()));
        }
        issues.push(
            Issue::new(IssueCode::EnumInvalid, path.to_vec(), "is not an allowed value")
                .with_meta("allowed", allowed.to_vec()),
        );
        Ok(None)
    }

    fn union(
        &self,
        union: &UnionParam,
        value: &Value,
        scope: &Scope,
        path: &[PathSegment],
        depth: usize,
        issues: &mut Vec<Issue>,
    ) -> ConfigResult<Option<Value>> {
        let Some(discriminator) = union.discriminator() else {
            return self.untagged_union(union, value, scope, path, depth, issues);
        };
        let Some(map) = value.as_object() else {
            issues.push(mismatch("object", value, path));
            return Ok(None);
        };
        let tag_path = child(path, discriminator);
        let tag = match map.get(discriminator) {
            None | Some(Value::Null) => {
                issues.push(
                    Issue::new(IssueCode::DiscriminatorMissing, tag_path, "is required to select a variant")
                        .with_meta("discriminator", discriminator)
                        .with_meta("allowed", union.tags()),
                );
                return Ok(None);
            }
            Some(Value::String(tag)) => tag.as_str(),
            Some(_) => "",
        };
        let Some(variant) = union.variant(tag) else {
            issues.push(
                Issue::new(IssueCode::DiscriminatorInvalid, tag_path, "does not name a variant")
                    .with_meta("discriminator", discriminator)
                    .with_meta("allowed", union.tags()),
            );
            return Ok(None);
        };
        let validated = self.node(&variant.param, value, scope, path, depth + 1, issues)?;
        Ok(validated.map(|v| with_tag_first(v, discriminator, tag)))
    }

    /// First variant that validates cleanly wins.
    fn untagged_union(
        &self,
        union: &UnionParam,
        value: &Value,
        scope: &Scope,
        path: &[PathSegment],
        depth: usize,
        issues: &mut Vec<Issue>,
    ) -> ConfigResult<Option<Value>> {
        for variant in union.variants() {
            let mut scratch = Vec::new();
            let out = self.node(&variant.param, value, scope, path, depth + 1, &mut scratch)?;
            if scratch.is_empty() {
                return Ok(out);
            }
        }
        let expected: Vec<String> = union.variants().iter().map(|v| v.param.type_name().to_owned()).collect();
        issues.push(
            Issue::new(IssueCode::UnionMismatch, path.to_vec(), "matches none of the allowed shapes")
                .with_meta("expected", expected),
        );
        Ok(None)
    }
}

fn mismatch(expected: &str, value: &Value, path: &[PathSegment]) -> Issue {
    Issue::new(
        IssueCode::TypeMismatch,
        path.to_vec(),
        format!("expected {expected}, got {}", scalar::json_kind(value)),
    )
    .with_meta("expected", expected)
}

/// Enum and literal matching tolerates query-string numbers and booleans.
fn loosely_equal(expected: &Value, value: &Value) -> bool {
    if expected == value {
        return true;
    }
    match (expected, value) {
        (Value::Number(n), Value::String(s)) => s.parse::<f64>().ok() == n.as_f64(),
        (Value::Bool(b), Value::String(s)) => s == if *b { "true" } else { "false" },
        _ => false,
    }
}

/// Put the discriminator first so normalized output reads tag-then-fields.
fn with_tag_first(value: Value, discriminator: &str, tag: &str) -> Value {
    let Value::Object(map) = value else { return value };
    let mut out = Map::with_capacity(map.len() + 1);
    out.insert(discriminator.to_owned(), Value::String(tag.to_owned()));
    for (k, v) in map {
        if k != discriminator {
            out.insert(k, v);
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EnumDecl, TypeDecl, TypeRegistry};
    use crate::shape::{ObjectBlock, UnionBlock};
    use serde_json::json;

    fn vehicle_graph() -> TypeGraph {
        let mut reg = TypeRegistry::new();
        for (name, extra) in [("car", "seats"), ("truck", "payload_capacity"), ("motorcycle", "sidecar")] {
            let extra = extra.to_owned();
            reg.register_type(
                Scope::Global,
                TypeDecl::object(name, ObjectBlock::new(move |o| {
                    o.param("brand", Param::string().required());
                    o.param(extra.clone(), Param::integer());
                    Ok(())
                })),
            ).unwrap();
        }
        reg.register_type(
            Scope::Global,
            TypeDecl::union("vehicle", Some("kind"), UnionBlock::new(|u| {
                u.tagged("car", Param::reference("car"))?;
                u.tagged("truck", Param::reference("truck"))?;
                u.tagged("motorcycle", Param::reference("motorcycle"))?;
                Ok(())
            })),
        ).unwrap();
        reg.register_enum(Scope::Global, EnumDecl::new("status", ["draft", "published"])).unwrap();
        reg.seal().unwrap()
    }

    fn run(graph: &TypeGraph, param: &Param, value: Value) -> ValidationResult {
        Validator::new(graph, Limits::default()).validate(param, Some(&value), &Scope::Global).unwrap()
    }

    fn codes(result: &ValidationResult) -> Vec<&'static str> {
        result.issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn discriminator_selects_variant_shape() {
        let graph = vehicle_graph();
        let r = run(&graph, &Param::reference("vehicle"),
            json!({ "kind": "truck", "brand": "Volvo", "payload_capacity": 10 }));
        assert!(r.is_valid(), "{:?}", r.issues);
        assert_eq!(r.params, json!({ "kind": "truck", "brand": "Volvo", "payload_capacity": 10 }));
    }

    #[test]
    fn field_from_another_variant_is_silently_dropped() {
        let graph = vehicle_graph();
        let r = run(&graph, &Param::reference("vehicle"),
            json!({ "kind": "car", "brand": "Volvo", "payload_capacity": 10 }));
        assert!(r.is_valid());
        assert!(r.params.get("payload_capacity").is_none());
        assert_eq!(r.params, json!({ "kind": "car", "brand": "Volvo" }));
    }

    #[test]
    fn discriminator_missing_and_invalid() {
        let graph = vehicle_graph();
        let r = run(&graph, &Param::reference("vehicle"), json!({ "brand": "Volvo" }));
        assert_eq!(codes(&r), ["discriminator_missing"]);

        let r = run(&graph, &Param::reference("vehicle"), json!({ "kind": "boat" }));
        assert_eq!(codes(&r), ["discriminator_invalid"]);
        assert_eq!(r.issues[0].path, vec![PathSegment::from("kind")]);
        assert_eq!(r.issues[0].meta["allowed"], json!(["car", "truck", "motorcycle"]));
    }

    #[test]
    fn validation_is_exhaustive() {
        let graph = vehicle_graph();
        let mut o = crate::shape::ObjectBuilder::new();
        o.param("title", Param::string().required())
            .param("views", Param::integer().min(0.0))
            .param("status", Param::enum_ref("status"))
            .param("tags", Param::array(Param::string().max(3.0)))
            .param("published_at", Param::datetime().nullable());
        let param = Param::object(o.build());

        let r = run(&graph, &param, json!({
            "views": -1,
            "status": "gone",
            "tags": ["ok", "toolong", "no", "nope!"],
            "published_at": null,
            "extra": true,
        }));
        assert_eq!(codes(&r), ["required", "value_too_small", "enum_invalid", "length_too_long", "length_too_long"]);
        let tag_paths: Vec<_> = r.issues[3..].iter().map(|i| i.path.clone()).collect();
        assert_eq!(tag_paths, vec![
            vec![PathSegment::from("tags"), PathSegment::from(1)],
            vec![PathSegment::from("tags"), PathSegment::from(3)],
        ]);
        assert_eq!(r.issues[2].meta["allowed"], json!(["draft", "published"]));
    }

    #[test]
    fn extraneous_keys_dropped_and_coercions_applied() {
        let graph = vehicle_graph();
        let mut o = crate::shape::ObjectBuilder::new();
        o.param("page", Param::integer()).param("active", Param::boolean().default_value(true));
        let r = run(&graph, &Param::object(o.build()), json!({ "page": "3", "junk": 1 }));
        assert!(r.is_valid());
        assert_eq!(r.params, json!({ "page": 3, "active": true }));
    }

    #[test]
    fn untagged_union_takes_first_match() {
        let graph = vehicle_graph();
        let param = crate::shape::union(None, |u| {
            u.untagged(Param::integer())?;
            u.untagged(Param::array(Param::integer()))?;
            Ok(())
        }).unwrap();
        assert_eq!(run(&graph, &param, json!([1, 2])).params, json!([1, 2]));
        assert_eq!(codes(&run(&graph, &param, json!("x"))), ["union_mismatch"]);
    }

    #[test]
    fn depth_guard() {
        let graph = vehicle_graph();
        let mut nested = Param::integer();
        for _ in 0..5 {
            let mut o = crate::shape::ObjectBuilder::new();
            o.param("n", nested);
            nested = Param::object(o.build());
        }
        let limits = Limits { max_depth: 2, ..Limits::default() };
        let value = json!({ "n": { "n": { "n": { "n": { "n": 1 } } } } });
        let r = Validator::new(&graph, limits).validate(&nested, Some(&value), &Scope::Global).unwrap();
        assert_eq!(codes(&r), ["depth_exceeded"]);
    }

    #[test]
    fn required_root_payload() {
        let graph = vehicle_graph();
        let r = Validator::new(&graph, Limits::default())
            .validate(&Param::object(Default::default()).required(), None, &Scope::Global)
            .unwrap();
        assert_eq!(codes(&r), ["required"]);
        assert!(r.issues[0].path.is_empty());
    }
}
