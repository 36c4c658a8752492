// src/schema/registry.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::dag::JobSpec;
use crate::errors::{OrchestratorError, Result};
use crate::schema::model::{value_type_name, FieldDef, FieldType, RawSchemaFile, SchemaDef};

/// A payload that passed validation, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedPayload {
    /// Schema the payload was checked against (`None` for schemaless jobs).
    pub schema: Option<String>,
    pub values: toml::Table,
}

/// Read-only collection of named schemas.
///
/// Built once at startup; afterwards only shared references are handed out,
/// so it can be wrapped in an `Arc` and validated against concurrently.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, SchemaDef>,
}

impl SchemaRegistry {
    /// Load every `*.toml` file in `dir` (in file-name order).
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| {
            OrchestratorError::SchemaLoad(format!(
                "cannot read schema directory '{}': {e}",
                dir.display()
            ))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        let mut schemas = BTreeMap::new();
        for path in files {
            let contents = fs::read_to_string(&path)?;
            let raw: RawSchemaFile = toml::from_str(&contents).map_err(|e| {
                OrchestratorError::SchemaLoad(format!("{}: {e}", path.display()))
            })?;

            debug!(file = %path.display(), count = raw.schema.len(), "loaded schema file");

            for (name, def) in raw.schema {
                if schemas.contains_key(&name) {
                    return Err(OrchestratorError::SchemaLoad(format!(
                        "schema '{name}' is defined more than once (again in {})",
                        path.display()
                    )));
                }
                schemas.insert(name, def);
            }
        }

        let registry = Self::from_definitions(schemas)?;
        info!(dir = %dir.display(), schemas = registry.len(), "schema registry loaded");
        Ok(registry)
    }

    /// Build a registry from in-memory definitions, checking their integrity.
    pub fn from_definitions(schemas: BTreeMap<String, SchemaDef>) -> Result<Self> {
        let registry = Self { schemas };
        registry.check_integrity()?;
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&SchemaDef> {
        self.schemas.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Fail with `SchemaLoad` if any job references a schema that is not
    /// registered.
    pub fn check_references<'a>(&self, jobs: impl IntoIterator<Item = &'a JobSpec>) -> Result<()> {
        for job in jobs {
            if let Some(schema) = &job.schema {
                if !self.schemas.contains_key(schema) {
                    return Err(OrchestratorError::SchemaLoad(format!(
                        "job '{}' references unknown schema '{schema}'",
                        job.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate `payload` against the schema named `schema`.
    pub fn validate(&self, schema: &str, payload: &toml::Table) -> Result<ValidatedPayload> {
        let def = self.schemas.get(schema).ok_or_else(|| {
            OrchestratorError::SchemaValidation {
                schema: schema.to_string(),
                reason: "schema is not registered".to_string(),
            }
        })?;

        let values = self
            .validate_table(def, payload, "")
            .map_err(|reason| OrchestratorError::SchemaValidation {
                schema: schema.to_string(),
                reason,
            })?;

        Ok(ValidatedPayload {
            schema: Some(schema.to_string()),
            values,
        })
    }

    /// Validate a job's `params` against its declared schema.
    ///
    /// Jobs without a schema pass through unchanged.
    pub fn validate_job(&self, job: &JobSpec) -> Result<ValidatedPayload> {
        match &job.schema {
            None => Ok(ValidatedPayload {
                schema: None,
                values: job.params.clone(),
            }),
            Some(schema) => self.validate(schema, &job.params).map_err(|e| match e {
                OrchestratorError::SchemaValidation { schema, reason } => {
                    OrchestratorError::SchemaValidation {
                        schema,
                        reason: format!("job '{}': {reason}", job.id),
                    }
                }
                other => other,
            }),
        }
    }

    fn validate_table(
        &self,
        def: &SchemaDef,
        payload: &toml::Table,
        prefix: &str,
    ) -> std::result::Result<toml::Table, String> {
        let mut out = toml::Table::new();

        for key in payload.keys() {
            if !def.fields.contains_key(key) && !def.allow_unknown {
                return Err(format!("unknown field '{prefix}{key}'"));
            }
        }

        for (name, field) in &def.fields {
            let path = format!("{prefix}{name}");
            match payload.get(name) {
                Some(value) => {
                    let checked = self.validate_value(field, value, &path)?;
                    out.insert(name.clone(), checked);
                }
                None if field.required => {
                    return Err(format!("missing required field '{path}'"));
                }
                None => {
                    if let Some(default) = &field.default {
                        out.insert(name.clone(), field.ty.coerce(default));
                    }
                }
            }
        }

        if def.allow_unknown {
            for (key, value) in payload {
                if !def.fields.contains_key(key) {
                    out.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(out)
    }

    fn validate_value(
        &self,
        field: &FieldDef,
        value: &toml::Value,
        path: &str,
    ) -> std::result::Result<toml::Value, String> {
        if !field.ty.matches(value) {
            return Err(format!(
                "field '{path}' expected {}, got {}",
                field.ty,
                value_type_name(value)
            ));
        }

        let value = field.ty.coerce(value);

        if let Some(allowed) = &field.allowed {
            if !allowed.iter().any(|a| field.ty.coerce(a) == value) {
                return Err(format!("field '{path}' has a value outside its allowed set"));
            }
        }

        match (field.ty, value) {
            (FieldType::Array, toml::Value::Array(items)) => match field.items {
                Some(item_ty) => {
                    let mut checked = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        if !item_ty.matches(item) {
                            return Err(format!(
                                "field '{path}[{i}]' expected {item_ty}, got {}",
                                value_type_name(item)
                            ));
                        }
                        checked.push(item_ty.coerce(item));
                    }
                    Ok(toml::Value::Array(checked))
                }
                None => Ok(toml::Value::Array(items)),
            },
            (FieldType::Table, toml::Value::Table(table)) => match &field.schema {
                Some(nested) => {
                    let def = self
                        .schemas
                        .get(nested)
                        .ok_or_else(|| format!("nested schema '{nested}' is not registered"))?;
                    let checked = self.validate_table(def, &table, &format!("{path}."))?;
                    Ok(toml::Value::Table(checked))
                }
                None => Ok(toml::Value::Table(table)),
            },
            (_, value) => Ok(value),
        }
    }

    fn check_integrity(&self) -> Result<()> {
        for (schema_name, def) in &self.schemas {
            for (field_name, field) in &def.fields {
                let at = format!("schema '{schema_name}', field '{field_name}'");

                if let Some(default) = &field.default {
                    if !field.ty.matches(default) {
                        return Err(OrchestratorError::SchemaLoad(format!(
                            "{at}: default is {} but field type is {}",
                            value_type_name(default),
                            field.ty
                        )));
                    }
                    if field.required {
                        return Err(OrchestratorError::SchemaLoad(format!(
                            "{at}: a required field cannot have a default"
                        )));
                    }
                }

                if let Some(allowed) = &field.allowed {
                    if let Some(bad) = allowed.iter().find(|v| !field.ty.matches(v)) {
                        return Err(OrchestratorError::SchemaLoad(format!(
                            "{at}: allowed value of type {} does not match field type {}",
                            value_type_name(bad),
                            field.ty
                        )));
                    }
                }

                if field.items.is_some() && field.ty != FieldType::Array {
                    return Err(OrchestratorError::SchemaLoad(format!(
                        "{at}: `items` is only valid on array fields"
                    )));
                }

                if let Some(nested) = &field.schema {
                    if field.ty != FieldType::Table {
                        return Err(OrchestratorError::SchemaLoad(format!(
                            "{at}: `schema` is only valid on table fields"
                        )));
                    }
                    if !self.schemas.contains_key(nested) {
                        return Err(OrchestratorError::SchemaLoad(format!(
                            "{at}: references missing schema '{nested}'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
