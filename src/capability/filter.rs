//! Filtering: `filter[field][op]=value` clauses turned into predicates.
//!
//! Every filterable attribute carries an operator allow-list. A clause with an
//! operator outside that list is reported as `operator_invalid` and dropped;
//! the remaining clauses still apply.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::Capability;
use crate::error::{ConfigError, ConfigResult};
use crate::ir::{Param, ScalarType};
use crate::issue::{child, Issue, IssueCode, PathSegment};
use crate::query::{Predicate, Queryable};
use crate::registry::{Scope, TypeDecl, TypeRegistry};
use crate::schema::{Attribute, AttributeType, ResourceSchema};
use crate::shape::{ObjectBlock, ObjectBuilder};

/// Keys with combinator meaning inside a filter object.
pub const RESERVED: [&str; 3] = ["and", "or", "not"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    Null,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Self::Eq, Self::NotEq, Self::Gt, Self::Gte, Self::Lt, Self::Lte,
        Self::In, Self::NotIn, Self::Contains, Self::StartsWith, Self::EndsWith, Self::Null,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::NotEq => "not_eq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Null => "null",
        }
    }

    /// Operator allow-list an attribute gets when it declares none.
    pub fn defaults_for(ty: &AttributeType, nullable: bool) -> Vec<Operator> {
        use Operator::*;
        let mut ops = match ty {
            AttributeType::Scalar(ScalarType::String) => vec![Eq, NotEq, In, NotIn, Contains, StartsWith, EndsWith],
            AttributeType::Scalar(t) if t.is_numeric() || t.is_temporal() => vec![Eq, NotEq, Gt, Gte, Lt, Lte, In, NotIn],
            AttributeType::Scalar(ScalarType::Boolean | ScalarType::Binary) => vec![Eq, NotEq],
            _ => vec![Eq, NotEq, In, NotIn],
        };
        if nullable {
            ops.push(Null);
        }
        ops
    }

    /// Param an operand of this operator must satisfy.
    fn operand(self, value: &Param) -> Param {
        match self {
            Self::In | Self::NotIn => Param::array(value.clone()),
            Self::Contains | Self::StartsWith | Self::EndsWith => Param::string(),
            Self::Null => Param::boolean(),
            _ => value.clone(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Self::ALL.into_iter().find(|op| op.as_str() == s).ok_or(())
    }
}

#[derive(Debug, Clone)]
struct FilterField {
    value: Param,
    allowed: Vec<Operator>,
    /// Shared `<scalar>_filter` type when the field uses its type's defaults.
    shared: Option<ScalarType>,
}

impl FilterField {
    fn operators_param(&self) -> Param {
        let mut o = ObjectBuilder::new();
        for op in &self.allowed {
            o.param(op.as_str(), op.operand(&self.value));
        }
        Param::object(o.build())
    }
}

#[derive(Debug, Clone)]
pub struct Filtering {
    type_name: String,
    fields: IndexMap<String, FilterField>,
}

impl Filtering {
    pub fn new(schema: &ResourceSchema) -> ConfigResult<Self> {
        let mut fields = IndexMap::new();
        for attr in schema.all_attributes().filter(|a| a.filterable) {
            if RESERVED.contains(&attr.name.as_str()) {
                return Err(ConfigError::ReservedFilterName {
                    schema: schema.name().to_owned(),
                    attribute: attr.name.clone(),
                });
            }
            fields.insert(attr.name.clone(), Self::field(attr));
        }
        Ok(Self { type_name: format!("{}_filter", schema.name()), fields })
    }

    fn field(attr: &Attribute) -> FilterField {
        let defaults = Operator::defaults_for(&attr.ty, attr.nullable);
        let mut allowed = attr.operators.clone().unwrap_or_else(|| defaults.clone());
        allowed.retain(|op| *op != Operator::Null || attr.nullable);
        let plain = attr.format.is_none() && attr.min.is_none() && attr.max.is_none();
        let shared = match attr.ty {
            AttributeType::Scalar(ty) if plain && !attr.nullable && allowed == defaults => Some(ty),
            _ => None,
        };
        FilterField { value: attr.value_param(), allowed, shared }
    }

    pub fn type_name(&self) -> &str { &self.type_name }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    pub fn allowed(&self, field: &str) -> Option<&[Operator]> {
        self.fields.get(field).map(|f| f.allowed.as_slice())
    }

    // ---- extraction ----

    fn clean(&self, raw: &Value, path: &[PathSegment], issues: &mut Vec<Issue>) -> Value {
        let Some(map) = raw.as_object() else { return raw.clone() };
        let mut out = Map::new();
        for (key, value) in map {
            let here = child(path, key.as_str());
            match key.as_str() {
                "and" | "or" => {
                    let cleaned = match value.as_array() {
                        Some(items) => Value::Array(
                            items.iter().enumerate().map(|(i, v)| self.clean(v, &child(&here, i), issues)).collect(),
                        ),
                        None => value.clone(),
                    };
                    out.insert(key.clone(), cleaned);
                }
                "not" => {
                    out.insert(key.clone(), self.clean(value, &here, issues));
                }
                name => {
                    let Some(field) = self.fields.get(name) else { continue };
                    let clause = self.clause(name, field, value, &here, issues);
                    if !clause.is_empty() {
                        out.insert(key.clone(), Value::Object(clause));
                    }
                }
            }
        }
        Value::Object(out)
    }

    fn clause(
        &self,
        name: &str,
        field: &FilterField,
        value: &Value,
        path: &[PathSegment],
        issues: &mut Vec<Issue>,
    ) -> Map<String, Value> {
        let pairs: Vec<(String, Value)> = match value {
            Value::Object(ops) => ops.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Value::Array(_) => vec![(Operator::In.as_str().to_owned(), value.clone())],
            _ => vec![(Operator::Eq.as_str().to_owned(), value.clone())],
        };
        let mut out = Map::new();
        for (op, operand) in pairs {
            match op.parse::<Operator>() {
                Ok(parsed) if field.allowed.contains(&parsed) => {
                    out.insert(op, operand);
                }
                _ => {
                    let allowed: Vec<&str> = field.allowed.iter().map(|o| o.as_str()).collect();
                    debug!(field = name, operator = %op, "dropping filter clause");
                    issues.push(
                        Issue::new(IssueCode::OperatorInvalid, path.to_vec(), format!("operator `{op}` is not allowed"))
                            .with_meta("operator", op.as_str())
                            .with_meta("allowed", allowed)
                            .with_meta("field", name),
                    );
                }
            }
        }
        out
    }

    // ---- application ----

    fn predicates(&self, params: &Value) -> Vec<Predicate> {
        let Some(map) = params.as_object() else { return Vec::new() };
        let mut out = Vec::new();
        for (key, value) in map {
            match key.as_str() {
                "and" => {
                    let all = value.as_array().into_iter().flatten().map(|v| Predicate::And(self.predicates(v)));
                    out.push(Predicate::And(all.collect()));
                }
                "or" => {
                    let any = value.as_array().into_iter().flatten().map(|v| Predicate::And(self.predicates(v)));
                    out.push(Predicate::Or(any.collect()));
                }
                "not" => out.push(Predicate::Not(Box::new(Predicate::And(self.predicates(value))))),
                field => {
                    for (op, operand) in value.as_object().into_iter().flatten() {
                        if let Ok(op) = op.parse::<Operator>() {
                            out.push(Predicate::compare(field, op, operand.clone()));
                        }
                    }
                }
            }
        }
        out
    }
}

/// Per-schema filter types end in `_filter`; shared operator sets end in
/// `_filter_operators`, so a schema named after a scalar keeps its own type.
fn shared_type_name(ty: ScalarType) -> String {
    format!("{}_filter_operators", ty.as_str())
}

impl Capability for Filtering {
    fn name(&self) -> &'static str { "filtering" }

    fn query_key(&self) -> Option<&'static str> { Some("filter") }

    fn register_types(&self, registry: &mut TypeRegistry) -> ConfigResult<()> {
        let mut o = ObjectBuilder::new();
        for (name, field) in &self.fields {
            let param = match field.shared {
                Some(ty) => {
                    let shared = shared_type_name(ty);
                    if !registry.contains_type(&Scope::Global, &shared) {
                        let shape = match field.operators_param().shape() {
                            Some(s) => s.clone(),
                            None => Default::default(),
                        };
                        registry.register_type(Scope::Global, TypeDecl::object(shared.clone(), ObjectBlock::from_shape(shape)))?;
                    }
                    Param::reference(shared)
                }
                None => field.operators_param(),
            };
            o.param(name.clone(), param);
        }
        o.param("and", Param::array(Param::reference(self.type_name.clone())))
            .param("or", Param::array(Param::reference(self.type_name.clone())))
            .param("not", Param::reference(self.type_name.clone()));

        if !registry.contains_type(&Scope::Global, &self.type_name) {
            registry.register_type(Scope::Global, TypeDecl::object(self.type_name.clone(), ObjectBlock::from_shape(o.build())))?;
        }
        Ok(())
    }

    fn query_param(&self) -> Option<Param> {
        Some(Param::reference(self.type_name.clone()))
    }

    fn extract(&self, raw: &Value, path: &[PathSegment], issues: &mut Vec<Issue>) -> Value {
        self.clean(raw, path, issues)
    }

    fn apply(&self, params: Option<&Value>, query: &mut dyn Queryable) -> anyhow::Result<()> {
        let Some(params) = params else { return Ok(()) };
        let predicates = self.predicates(params);
        debug!(clauses = predicates.len(), "applying filters");
        for p in predicates {
            query.filter(p);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MemoryCollection;
    use serde_json::json;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("post")
            .attribute(Attribute::string("title").filterable())
            .attribute(Attribute::string("status").filterable().operators([Operator::Eq, Operator::In]))
            .attribute(Attribute::integer("views").filterable())
            .attribute(Attribute::datetime("published_at").filterable().nullable())
            .attribute(Attribute::string("body"))
    }

    fn clean(raw: Value) -> (Value, Vec<Issue>) {
        let f = Filtering::new(&schema()).unwrap();
        let mut issues = Vec::new();
        let out = f.extract(&raw, &[PathSegment::from("filter")], &mut issues);
        (out, issues)
    }

    #[test]
    fn unknown_operator_is_reported_and_dropped() {
        let (out, issues) = clean(json!({ "status": { "bogus_op": "x" }, "views": { "gt": 3 } }));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::OperatorInvalid);
        assert_eq!(issues[0].meta["allowed"], json!(["eq", "in"]));
        assert_eq!(issues[0].meta["field"], json!("status"));
        assert_eq!(issues[0].meta["operator"], json!("bogus_op"));
        assert_eq!(issues[0].field(), "status");
        assert_eq!(issues[0].path, vec![PathSegment::from("filter"), PathSegment::from("status")]);
        assert_eq!(out, json!({ "views": { "gt": 3 } }));

        let f = Filtering::new(&schema()).unwrap();
        let mut q = MemoryCollection::new(Vec::new());
        f.apply(Some(&out), &mut q).unwrap();
        assert_eq!(q.plan().predicates, vec![Predicate::compare("views", Operator::Gt, 3)]);
    }

    #[test]
    fn shorthand_and_closed_world() {
        let (out, issues) = clean(json!({ "title": "Hello", "status": ["a", "b"], "body": { "eq": "x" } }));
        assert!(issues.is_empty());
        assert_eq!(out, json!({ "title": { "eq": "Hello" }, "status": { "in": ["a", "b"] } }));
    }

    #[test]
    fn default_allow_lists() {
        let f = Filtering::new(&schema()).unwrap();
        assert!(f.allowed("title").unwrap().contains(&Operator::Contains));
        assert!(!f.allowed("views").unwrap().contains(&Operator::Contains));
        assert!(f.allowed("published_at").unwrap().contains(&Operator::Null));
        assert!(!f.allowed("views").unwrap().contains(&Operator::Null));
        assert!(f.allowed("body").is_none());
    }

    #[test]
    fn combinators_build_nested_predicates() {
        let f = Filtering::new(&schema()).unwrap();
        let params = json!({ "or": [{ "views": { "lt": 5 } }, { "title": { "eq": "x" } }], "not": { "views": { "eq": 9 } } });
        let mut q = MemoryCollection::new(Vec::new());
        f.apply(Some(&params), &mut q).unwrap();
        assert_eq!(q.plan().predicates, vec![
            Predicate::Or(vec![
                Predicate::And(vec![Predicate::compare("views", Operator::Lt, 5)]),
                Predicate::And(vec![Predicate::compare("title", Operator::Eq, "x")]),
            ]),
            Predicate::Not(Box::new(Predicate::And(vec![Predicate::compare("views", Operator::Eq, 9)]))),
        ]);
    }

    #[test]
    fn schema_named_after_a_scalar_keeps_its_own_filter_type() {
        let string_schema = ResourceSchema::new("string").attribute(Attribute::string("label").filterable());
        let mut reg = TypeRegistry::new();
        Filtering::new(&schema()).unwrap().register_types(&mut reg).unwrap();
        Filtering::new(&string_schema).unwrap().register_types(&mut reg).unwrap();
        let graph = reg.seal().unwrap();
        let (own, _) = graph.shape_of("string_filter", &Scope::Global).unwrap();
        assert!(own.shape().unwrap().get("label").is_some());
        let (shared, _) = graph.shape_of("string_filter_operators", &Scope::Global).unwrap();
        assert!(shared.shape().unwrap().get("contains").is_some());
    }

    #[test]
    fn reserved_attribute_names() {
        let s = ResourceSchema::new("rule").attribute(Attribute::string("or").filterable());
        assert!(matches!(Filtering::new(&s).unwrap_err(), ConfigError::ReservedFilterName { .. }));
    }

    #[test]
    fn shared_scalar_filter_types() {
        let f = Filtering::new(&schema()).unwrap();
        let mut reg = TypeRegistry::new();
        f.register_types(&mut reg).unwrap();
        assert!(reg.contains_type(&Scope::Global, "string_filter_operators"));
        assert!(reg.contains_type(&Scope::Global, "integer_filter_operators"));
        assert!(reg.contains_type(&Scope::Global, "post_filter"));
        let graph = reg.seal().unwrap();
        let (post_filter, _) = graph.shape_of("post_filter", &Scope::Global).unwrap();
        let shape = post_filter.shape().unwrap();
        assert_eq!(shape.get("title").unwrap().reference_name(), Some("string_filter_operators"));
        // overridden allow-list stays inline
        assert!(shape.get("status").unwrap().shape().is_some());
    }
}
