// src/schema/mod.rs

//! Declarative job schemas.
//!
//! - [`model`] is the TOML-backed schema definition format.
//! - [`registry`] loads schema files once and validates job payloads.

pub mod model;
pub mod registry;

pub use model::{FieldDef, FieldType, RawSchemaFile, SchemaDef};
pub use registry::{SchemaRegistry, ValidatedPayload};
