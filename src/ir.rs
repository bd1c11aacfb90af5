//! Frozen, queryable shape tree.
//!
//! A [`Param`] describes one field: its kind, constraints and metadata. The
//! validator, the capabilities and every generator read this tree; nothing
//! mutates it once a builder has produced it. The chaining constructors
//! (`Param::string().required().max(80.0)`) consume `self`, so a `&Param`
//! borrowed out of a sealed graph cannot be changed in place.

use std::fmt;
use std::str::FromStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ————————————————————————————————————————————————————————————————————————————
// KINDS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Time,
    Uuid,
    Binary,
}

impl ScalarType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Time => "time",
            Self::Uuid => "uuid",
            Self::Binary => "binary",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::Time)
    }

    /// min/max bound a length rather than a value.
    pub fn is_length_bounded(self) -> bool {
        matches!(self, Self::String | Self::Binary)
    }
}

impl FromStr for ScalarType {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "string" => Self::String,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "decimal" => Self::Decimal,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "time" => Self::Time,
            "uuid" => Self::Uuid,
            "binary" => Self::Binary,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Int32,
    Int64,
    Float,
    Double,
    Email,
    Uri,
    Uuid,
    Hostname,
    Ipv4,
    Ipv6,
    Password,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Email => "email",
            Self::Uri => "uri",
            Self::Uuid => "uuid",
            Self::Hostname => "hostname",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::Password => "password",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub ty: ScalarType,
    /// Value bound for numbers, length bound for strings.
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub format: Option<Format>,
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnumSource {
    Inline(Vec<Value>),
    /// Name of a registered `EnumDefinition`.
    Ref(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayParam {
    pub of: Box<Param>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Scalar(Scalar),
    Literal(Value),
    Enum(EnumSource),
    Array(ArrayParam),
    Object(Shape),
    /// Name of a registered `TypeDefinition`.
    Reference(String),
    Union(UnionParam),
    /// Any JSON value, passed through untouched.
    Unknown,
}

// ————————————————————————————————————————————————————————————————————————————
// SHAPE
// ————————————————————————————————————————————————————————————————————————————

/// Ordered `name → Param` mapping. Order is declaration order and survives
/// into validation output and every generator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    fields: IndexMap<String, Param>,
}

impl Shape {
    pub(crate) fn from_fields(fields: IndexMap<String, Param>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Param> { self.fields.get(name) }
    pub fn contains(&self, name: &str) -> bool { self.fields.contains_key(name) }
    pub fn len(&self) -> usize { self.fields.len() }
    pub fn is_empty(&self) -> bool { self.fields.is_empty() }
    pub fn keys(&self) -> impl Iterator<Item = &str> { self.fields.keys().map(String::as_str) }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `self ⊕ other`: fields of `other` are appended, a conflicting name is
    /// replaced in place so the base order is kept.
    pub fn merged(&self, other: &Shape) -> Shape {
        let mut fields = self.fields.clone();
        for (k, v) in &other.fields {
            fields.insert(k.clone(), v.clone());
        }
        Shape { fields }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// UNION
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub tag: Option<String>,
    pub param: Param,
}

/// Only `shape::UnionBuilder` constructs these, so the tag invariant
/// (`discriminator present ⇔ every variant tagged`) always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionParam {
    discriminator: Option<String>,
    variants: Vec<Variant>,
}

impl UnionParam {
    pub(crate) fn from_parts(discriminator: Option<String>, variants: Vec<Variant>) -> Self {
        Self { discriminator, variants }
    }

    pub fn discriminator(&self) -> Option<&str> { self.discriminator.as_deref() }
    pub fn variants(&self) -> &[Variant] { &self.variants }

    pub fn variant(&self, tag: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.tag.as_deref() == Some(tag))
    }

    pub fn tags(&self) -> Vec<&str> {
        self.variants.iter().filter_map(|v| v.tag.as_deref()).collect()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PARAM
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    kind: ParamKind,
    required: bool,
    nullable: bool,
    deprecated: bool,
    description: Option<String>,
    example: Option<Value>,
    default: Option<Value>,
}

impl Param {
    pub fn new(kind: ParamKind) -> Self {
        Self {
            kind,
            required: false,
            nullable: false,
            deprecated: false,
            description: None,
            example: None,
            default: None,
        }
    }

    pub fn scalar(ty: ScalarType) -> Self {
        Self::new(ParamKind::Scalar(Scalar { ty, min: None, max: None, format: None, pattern: None }))
    }

    pub fn string() -> Self { Self::scalar(ScalarType::String) }
    pub fn integer() -> Self { Self::scalar(ScalarType::Integer) }
    pub fn float() -> Self { Self::scalar(ScalarType::Float) }
    pub fn decimal() -> Self { Self::scalar(ScalarType::Decimal) }
    pub fn boolean() -> Self { Self::scalar(ScalarType::Boolean) }
    pub fn date() -> Self { Self::scalar(ScalarType::Date) }
    pub fn datetime() -> Self { Self::scalar(ScalarType::DateTime) }
    pub fn time() -> Self { Self::scalar(ScalarType::Time) }
    pub fn uuid() -> Self { Self::scalar(ScalarType::Uuid) }
    pub fn binary() -> Self { Self::scalar(ScalarType::Binary) }
    pub fn unknown() -> Self { Self::new(ParamKind::Unknown) }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::new(ParamKind::Literal(value.into()))
    }

    pub fn enum_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(ParamKind::Enum(EnumSource::Inline(values.into_iter().map(Into::into).collect())))
    }

    pub fn enum_ref(name: impl Into<String>) -> Self {
        Self::new(ParamKind::Enum(EnumSource::Ref(name.into())))
    }

    pub fn array(of: Param) -> Self {
        Self::new(ParamKind::Array(ArrayParam { of: Box::new(of), min_items: None, max_items: None }))
    }

    pub fn object(shape: Shape) -> Self {
        Self::new(ParamKind::Object(shape))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(ParamKind::Reference(name.into()))
    }

    pub fn union(union: UnionParam) -> Self {
        Self::new(ParamKind::Union(union))
    }

    // ---- builder-phase modifiers (consume self) ----

    pub fn required(mut self) -> Self { self.required = true; self }
    pub fn optional(mut self) -> Self { self.required = false; self }
    pub fn nullable(mut self) -> Self { self.nullable = true; self }
    pub fn deprecated(mut self) -> Self { self.deprecated = true; self }

    pub fn set_required(mut self, required: bool) -> Self { self.required = required; self }
    pub fn set_nullable(mut self, nullable: bool) -> Self { self.nullable = nullable; self }
    pub fn set_deprecated(mut self, deprecated: bool) -> Self { self.deprecated = deprecated; self }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn example(mut self, value: impl Into<Value>) -> Self {
        self.example = Some(value.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Numeric minimum, string minimum length, or array minimum item count.
    pub fn min(mut self, bound: f64) -> Self {
        match &mut self.kind {
            ParamKind::Scalar(s) => s.min = Some(bound),
            ParamKind::Array(a) => a.min_items = Some(bound.max(0.0) as usize),
            _ => {}
        }
        self
    }

    /// Numeric maximum, string maximum length, or array maximum item count.
    pub fn max(mut self, bound: f64) -> Self {
        match &mut self.kind {
            ParamKind::Scalar(s) => s.max = Some(bound),
            ParamKind::Array(a) => a.max_items = Some(bound.max(0.0) as usize),
            _ => {}
        }
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        if let ParamKind::Scalar(s) = &mut self.kind {
            s.format = Some(format);
        }
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        if let ParamKind::Scalar(s) = &mut self.kind {
            s.pattern = Some(pattern.into());
        }
        self
    }

    // ---- introspection ----

    pub fn kind(&self) -> &ParamKind { &self.kind }
    pub fn is_required(&self) -> bool { self.required }
    pub fn is_optional(&self) -> bool { !self.required }
    pub fn is_nullable(&self) -> bool { self.nullable }
    pub fn is_deprecated(&self) -> bool { self.deprecated }
    pub fn description_text(&self) -> Option<&str> { self.description.as_deref() }
    pub fn example_value(&self) -> Option<&Value> { self.example.as_ref() }
    pub fn default(&self) -> Option<&Value> { self.default.as_ref() }

    /// Kind name; for references, the referenced type name.
    pub fn type_name(&self) -> &str {
        match &self.kind {
            ParamKind::Scalar(s) => s.ty.as_str(),
            ParamKind::Literal(_) => "literal",
            ParamKind::Enum(_) => "enum",
            ParamKind::Array(_) => "array",
            ParamKind::Object(_) => "object",
            ParamKind::Reference(name) => name,
            ParamKind::Union(_) => "union",
            ParamKind::Unknown => "unknown",
        }
    }

    pub fn scalar_def(&self) -> Option<&Scalar> {
        match &self.kind { ParamKind::Scalar(s) => Some(s), _ => None }
    }

    /// Array element type.
    pub fn of(&self) -> Option<&Param> {
        match &self.kind { ParamKind::Array(a) => Some(&a.of), _ => None }
    }

    pub fn reference_name(&self) -> Option<&str> {
        match &self.kind { ParamKind::Reference(name) => Some(name), _ => None }
    }

    pub fn shape(&self) -> Option<&Shape> {
        match &self.kind { ParamKind::Object(shape) => Some(shape), _ => None }
    }

    pub fn union_def(&self) -> Option<&UnionParam> {
        match &self.kind { ParamKind::Union(u) => Some(u), _ => None }
    }

    pub fn enum_source(&self) -> Option<&EnumSource> {
        match &self.kind { ParamKind::Enum(e) => Some(e), _ => None }
    }

    /// Inline enum values (`inline?`) versus a registered enum (`ref?`).
    pub fn is_inline_enum(&self) -> bool {
        matches!(self.kind, ParamKind::Enum(EnumSource::Inline(_)))
    }

    pub fn is_enum_ref(&self) -> bool {
        matches!(self.kind, ParamKind::Enum(EnumSource::Ref(_)))
    }

    /// Depth-first walk over this node and every nested node.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Param)) {
        visit(self);
        match &self.kind {
            ParamKind::Array(a) => a.of.walk(visit),
            ParamKind::Object(shape) => {
                for (_, p) in shape.iter() { p.walk(visit); }
            }
            ParamKind::Union(u) => {
                for v in u.variants() { v.param.walk(visit); }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn modifiers_land_on_the_right_kind() {
        let p = Param::string().required().min(2.0).max(10.0).format(Format::Email);
        let s = p.scalar_def().unwrap();
        assert!(p.is_required());
        assert_eq!((s.min, s.max, s.format), (Some(2.0), Some(10.0), Some(Format::Email)));

        let arr = Param::array(Param::integer()).max(3.0);
        match arr.kind() {
            ParamKind::Array(a) => assert_eq!(a.max_items, Some(3)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(arr.of().unwrap().type_name(), "integer");
    }

    #[test]
    fn type_name_of_reference_is_target() {
        assert_eq!(Param::reference("address").type_name(), "address");
        assert_eq!(Param::reference("address").reference_name(), Some("address"));
    }

    #[test]
    fn enum_flavours() {
        assert!(Param::enum_values(["a", "b"]).is_inline_enum());
        assert!(Param::enum_ref("status").is_enum_ref());
    }

    #[test]
    fn merged_shape_keeps_base_order() {
        let mut a = IndexMap::new();
        a.insert("id".to_string(), Param::integer());
        a.insert("name".to_string(), Param::string());
        let mut b = IndexMap::new();
        b.insert("extra".to_string(), Param::boolean());
        b.insert("id".to_string(), Param::string());
        let m = Shape::from_fields(a).merged(&Shape::from_fields(b));
        assert_eq!(m.keys().collect::<Vec<_>>(), ["id", "name", "extra"]);
        assert_eq!(m.get("id").unwrap().type_name(), "string");
    }

    #[test]
    fn walk_visits_nested_nodes() {
        let mut fields = IndexMap::new();
        fields.insert("tags".to_string(), Param::array(Param::reference("tag")));
        let p = Param::object(Shape::from_fields(fields)).example(json!({}));
        let mut refs = Vec::new();
        p.walk(&mut |n| if let Some(r) = n.reference_name() { refs.push(r.to_string()) });
        assert_eq!(refs, ["tag"]);
    }
}
