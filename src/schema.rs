//! Resource schemas: attribute metadata a contract derives its actions from.
//!
//! A schema is a static declaration. Column types that are not spelled out
//! are looked up once in a [`ColumnCatalog`] while the api is sealed, never
//! per request.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::capability::filter::Operator;
use crate::error::{ConfigError, ConfigResult};
use crate::ir::{EnumSource, Format, Param, ParamKind, ScalarType};

// ————————————————————————————————————————————————————————————————————————————
// ATTRIBUTES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    Scalar(ScalarType),
    Enum(EnumSource),
    /// Filled in from the column catalog at seal time.
    Inferred,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub ty: AttributeType,
    pub writable_on_create: bool,
    pub writable_on_update: bool,
    pub filterable: bool,
    pub sortable: bool,
    pub hidden: bool,
    pub nullable: bool,
    /// Required in create payloads.
    pub required: bool,
    pub deprecated: bool,
    pub format: Option<Format>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub description: Option<String>,
    pub example: Option<Value>,
    /// Overrides the default operator allow-list for filtering.
    pub operators: Option<Vec<Operator>>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
            writable_on_create: false,
            writable_on_update: false,
            filterable: false,
            sortable: false,
            hidden: false,
            nullable: false,
            required: false,
            deprecated: false,
            format: None,
            min: None,
            max: None,
            description: None,
            example: None,
            operators: None,
        }
    }

    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, AttributeType::Scalar(ty))
    }

    pub fn string(name: impl Into<String>) -> Self { Self::scalar(name, ScalarType::String) }
    pub fn integer(name: impl Into<String>) -> Self { Self::scalar(name, ScalarType::Integer) }
    pub fn boolean(name: impl Into<String>) -> Self { Self::scalar(name, ScalarType::Boolean) }
    pub fn datetime(name: impl Into<String>) -> Self { Self::scalar(name, ScalarType::DateTime) }
    pub fn inferred(name: impl Into<String>) -> Self { Self::new(name, AttributeType::Inferred) }

    pub fn enumeration(name: impl Into<String>, enum_name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Enum(EnumSource::Ref(enum_name.into())))
    }

    pub fn writable(mut self) -> Self {
        self.writable_on_create = true;
        self.writable_on_update = true;
        self
    }

    pub fn writable_on_create(mut self) -> Self { self.writable_on_create = true; self }
    pub fn filterable(mut self) -> Self { self.filterable = true; self }
    pub fn sortable(mut self) -> Self { self.sortable = true; self }
    pub fn hidden(mut self) -> Self { self.hidden = true; self }
    pub fn nullable(mut self) -> Self { self.nullable = true; self }
    pub fn required(mut self) -> Self { self.required = true; self }
    pub fn deprecated(mut self) -> Self { self.deprecated = true; self }
    pub fn format(mut self, format: Format) -> Self { self.format = Some(format); self }
    pub fn min(mut self, bound: f64) -> Self { self.min = Some(bound); self }
    pub fn max(mut self, bound: f64) -> Self { self.max = Some(bound); self }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn example(mut self, value: impl Into<Value>) -> Self {
        self.example = Some(value.into());
        self
    }

    pub fn operators(mut self, operators: impl IntoIterator<Item = Operator>) -> Self {
        self.operators = Some(operators.into_iter().collect());
        self
    }

    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self.ty {
            AttributeType::Scalar(ty) => Some(ty),
            _ => None,
        }
    }

    /// Value param (no presence flags) for this attribute.
    pub fn value_param(&self) -> Param {
        let mut param = match &self.ty {
            AttributeType::Scalar(ty) => Param::scalar(*ty),
            AttributeType::Enum(source) => Param::new(ParamKind::Enum(source.clone())),
            AttributeType::Inferred => Param::unknown(),
        };
        if let Some(f) = self.format { param = param.format(f); }
        if let Some(m) = self.min { param = param.min(m); }
        if let Some(m) = self.max { param = param.max(m); }
        param
    }

    /// Param as it appears in a response body: always present, nullable
    /// when the column is.
    pub fn representation_param(&self) -> Param {
        let mut param = self.value_param()
            .required()
            .set_nullable(self.nullable)
            .set_deprecated(self.deprecated);
        if let Some(d) = &self.description { param = param.description(d.clone()); }
        if let Some(e) = &self.example { param = param.example(e.clone()); }
        param
    }

    /// Param as it appears in a create/update payload.
    pub fn payload_param(&self, create: bool) -> Param {
        let mut param = self.value_param()
            .set_required(create && self.required)
            .set_nullable(self.nullable)
            .set_deprecated(self.deprecated);
        if let Some(d) = &self.description { param = param.description(d.clone()); }
        param
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ASSOCIATIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeMode {
    /// Loaded only when requested through `include`.
    #[default]
    Optional,
    /// Loaded on every request.
    Always,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    pub name: String,
    /// Name of the target resource schema.
    pub schema: String,
    pub cardinality: Cardinality,
    pub include: IncludeMode,
    pub nullable: bool,
    pub description: Option<String>,
}

impl Association {
    pub fn one(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            cardinality: Cardinality::One,
            include: IncludeMode::Optional,
            nullable: false,
            description: None,
        }
    }

    pub fn many(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self { cardinality: Cardinality::Many, ..Self::one(name, schema) }
    }

    pub fn always(mut self) -> Self { self.include = IncludeMode::Always; self }
    pub fn nullable(mut self) -> Self { self.nullable = true; self }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Reference-by-name to the target representation; the nested shape is
    /// never inlined.
    pub fn representation_param(&self) -> Param {
        let target = Param::reference(self.schema.clone());
        let param = match self.cardinality {
            Cardinality::One => target.set_nullable(self.nullable),
            Cardinality::Many => Param::array(target),
        };
        let param = match self.include {
            IncludeMode::Always => param.required(),
            IncludeMode::Optional => param.optional(),
        };
        match &self.description {
            Some(d) => param.description(d.clone()),
            None => param,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DISCRIMINATED VARIANTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaVariant {
    pub tag: String,
    /// Storage-side type identifier (e.g. an STI class name).
    pub storage_type: String,
    pub attributes: IndexMap<String, Attribute>,
}

impl SchemaVariant {
    pub fn new(tag: impl Into<String>, storage_type: impl Into<String>) -> Self {
        Self { tag: tag.into(), storage_type: storage_type.into(), attributes: IndexMap::new() }
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Discriminator {
    /// Wire field carrying the tag.
    pub field: String,
    /// Record field carrying the storage type.
    pub storage_field: String,
    pub variants: IndexMap<String, SchemaVariant>,
}

impl Discriminator {
    /// Exactly one variant per storage type; checked at seal.
    pub fn variant_for_storage_type(&self, storage_type: &str) -> Option<&SchemaVariant> {
        self.variants.values().find(|v| v.storage_type == storage_type)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// COLUMN CATALOG
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInfo {
    pub ty: ScalarType,
    pub nullable: bool,
}

/// Persistence-side column metadata, consulted once at boot.
pub trait ColumnCatalog: Send + Sync {
    fn column(&self, table: &str, column: &str) -> Option<ColumnInfo>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    columns: IndexMap<(String, String), ColumnInfo>,
}

impl StaticCatalog {
    pub fn new() -> Self { Self::default() }

    pub fn column(mut self, table: &str, column: &str, ty: ScalarType, nullable: bool) -> Self {
        self.columns.insert((table.to_owned(), column.to_owned()), ColumnInfo { ty, nullable });
        self
    }
}

impl ColumnCatalog for StaticCatalog {
    fn column(&self, table: &str, column: &str) -> Option<ColumnInfo> {
        self.columns.get(&(table.to_owned(), column.to_owned())).copied()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SCHEMA
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    name: String,
    singular: String,
    plural: String,
    table: String,
    primary_key: String,
    description: Option<String>,
    attributes: IndexMap<String, Attribute>,
    associations: IndexMap<String, Association>,
    discriminator: Option<Discriminator>,
}

impl ResourceSchema {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let plural = pluralize(&name);
        Self {
            singular: name.clone(),
            table: plural.clone(),
            plural,
            name,
            primary_key: "id".to_owned(),
            description: None,
            attributes: IndexMap::new(),
            associations: IndexMap::new(),
            discriminator: None,
        }
    }

    pub fn root(mut self, singular: impl Into<String>, plural: impl Into<String>) -> Self {
        self.singular = singular.into();
        self.plural = plural.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self { self.table = table.into(); self }
    pub fn primary_key(mut self, key: impl Into<String>) -> Self { self.primary_key = key.into(); self }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    pub fn association(mut self, association: Association) -> Self {
        self.associations.insert(association.name.clone(), association);
        self
    }

    /// Declare the wire discriminator field and the record field holding the
    /// storage type.
    pub fn discriminator(mut self, field: impl Into<String>, storage_field: impl Into<String>) -> Self {
        self.discriminator = Some(Discriminator {
            field: field.into(),
            storage_field: storage_field.into(),
            variants: IndexMap::new(),
        });
        self
    }

    pub fn variant(mut self, variant: SchemaVariant) -> ConfigResult<Self> {
        let name = self.name.clone();
        let disc = self.discriminator.get_or_insert_with(|| Discriminator {
            field: "type".to_owned(),
            storage_field: "type".to_owned(),
            variants: IndexMap::new(),
        });
        if disc.variants.contains_key(&variant.tag) {
            return Err(ConfigError::DuplicateVariantTag { union: name, tag: variant.tag });
        }
        disc.variants.insert(variant.tag.clone(), variant);
        Ok(self)
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn singular_root(&self) -> &str { &self.singular }
    pub fn plural_root(&self) -> &str { &self.plural }
    pub fn table_name(&self) -> &str { &self.table }
    pub fn primary_key_name(&self) -> &str { &self.primary_key }
    pub fn description_text(&self) -> Option<&str> { self.description.as_deref() }
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> { self.attributes.values() }
    pub fn associations(&self) -> impl Iterator<Item = &Association> { self.associations.values() }
    pub fn discriminator_def(&self) -> Option<&Discriminator> { self.discriminator.as_ref() }

    /// Base attributes first, then every variant's own attributes.
    pub fn all_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values().chain(
            self.discriminator.iter().flat_map(|d| d.variants.values().flat_map(|v| v.attributes.values())),
        )
    }

    pub fn attribute_named(&self, name: &str) -> Option<&Attribute> {
        self.all_attributes().find(|a| a.name == name)
    }

    pub fn association_named(&self, name: &str) -> Option<&Association> {
        self.associations.get(name)
    }

    /// Type of the primary key, `integer` unless declared otherwise.
    pub fn primary_key_type(&self) -> ScalarType {
        self.attributes
            .get(&self.primary_key)
            .and_then(Attribute::scalar_type)
            .unwrap_or(ScalarType::Integer)
    }

    /// Wire tag for a stored record, read from its storage-type field.
    pub fn tag_for_record(&self, record: &Value) -> Option<&str> {
        let disc = self.discriminator.as_ref()?;
        let storage = record.get(&disc.storage_field)?.as_str()?;
        disc.variant_for_storage_type(storage).map(|v| v.tag.as_str())
    }

    /// Fill inferred attribute types from the catalog and check invariants.
    pub fn resolve(&mut self, catalog: Option<&dyn ColumnCatalog>) -> ConfigResult<()> {
        let table = self.table.clone();
        let schema = self.name.clone();
        let variants = self.discriminator.iter_mut().flat_map(|d| d.variants.values_mut());
        let all = self.attributes.values_mut().chain(variants.flat_map(|v| v.attributes.values_mut()));
        for attr in all {
            if attr.ty != AttributeType::Inferred { continue; }
            let info = catalog
                .and_then(|c| c.column(&table, &attr.name))
                .ok_or_else(|| ConfigError::AttributeTypeUnknown {
                    schema: schema.clone(),
                    attribute: attr.name.clone(),
                })?;
            attr.ty = AttributeType::Scalar(info.ty);
            attr.nullable = attr.nullable || info.nullable;
        }

        if let Some(disc) = &self.discriminator {
            let mut seen: Vec<&str> = Vec::new();
            for v in disc.variants.values() {
                if seen.contains(&v.storage_type.as_str()) {
                    return Err(ConfigError::StorageTypeConflict {
                        schema: self.name.clone(),
                        storage_type: v.storage_type.clone(),
                    });
                }
                seen.push(&v.storage_type);
            }
        }
        Ok(())
    }
}

/// Plural root key for a singular resource name.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() { return String::new(); }
    let consonant_y = word.ends_with('y')
        && !matches!(word.chars().rev().nth(1), Some('a' | 'e' | 'i' | 'o' | 'u'));
    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}
