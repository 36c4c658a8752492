// src/schema/model.rs

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// One schema file as read from the `schemas` directory.
///
/// A file may hold any number of schemas:
///
/// ```toml
/// [schema.build]
/// description = "Compile a target"
///
/// [schema.build.fields.target]
/// type = "string"
/// required = true
/// allowed = ["debug", "release"]
///
/// [schema.build.fields.jobs]
/// type = "integer"
/// default = 4
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSchemaFile {
    #[serde(default)]
    pub schema: BTreeMap<String, SchemaDef>,
}

/// A named schema: a set of typed fields.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SchemaDef {
    #[serde(default)]
    pub description: Option<String>,

    /// Accept payload keys that are not declared in `fields`.
    #[serde(default)]
    pub allow_unknown: bool,

    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
}

/// `[schema.<name>.fields.<field>]`.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub ty: FieldType,

    #[serde(default)]
    pub required: bool,

    /// Value filled in when an optional field is absent.
    #[serde(default)]
    pub default: Option<toml::Value>,

    /// If set, the value must equal one of these.
    #[serde(default)]
    pub allowed: Option<Vec<toml::Value>>,

    /// Element type for `array` fields.
    #[serde(default)]
    pub items: Option<FieldType>,

    /// Nested schema for `table` fields.
    #[serde(default)]
    pub schema: Option<String>,
}

impl FieldDef {
    pub fn new(ty: FieldType) -> Self {
        Self {
            ty,
            required: false,
            default: None,
            allowed: None,
            items: None,
            schema: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Array,
    Table,
}

impl FieldType {
    /// Whether `value` has this type. Integers are accepted as floats.
    pub fn matches(self, value: &toml::Value) -> bool {
        use toml::Value;
        match (self, value) {
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Integer, Value::Integer(_)) => true,
            (FieldType::Float, Value::Float(_) | Value::Integer(_)) => true,
            (FieldType::Boolean, Value::Boolean(_)) => true,
            (FieldType::Array, Value::Array(_)) => true,
            (FieldType::Table, Value::Table(_)) => true,
            _ => false,
        }
    }

    /// Normalise an accepted value: integers in float fields become floats.
    pub fn coerce(self, value: &toml::Value) -> toml::Value {
        match (self, value) {
            (FieldType::Float, toml::Value::Integer(i)) => toml::Value::Float(*i as f64),
            _ => value.clone(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Table => "table",
        };
        f.write_str(s)
    }
}

/// Type name of a TOML value, for error messages.
pub(crate) fn value_type_name(value: &toml::Value) -> &'static str {
    match value {
        toml::Value::String(_) => "string",
        toml::Value::Integer(_) => "integer",
        toml::Value::Float(_) => "float",
        toml::Value::Boolean(_) => "boolean",
        toml::Value::Datetime(_) => "datetime",
        toml::Value::Array(_) => "array",
        toml::Value::Table(_) => "table",
    }
}
