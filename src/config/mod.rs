// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file or directory from disk (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).
//! - Hold the immutable snapshot and swap it on reload (`store.rs`).

pub mod loader;
pub mod model;
pub mod store;
pub mod validate;

pub use loader::{default_config_path, load, load_from_path};
pub use model::{
    ConfigFile, JobConfig, OrchestratorSection, RawConfigFile, RetrySection, WorkerConfig,
    WorkersSection,
};
pub use store::ConfigStore;
pub use validate::validate_raw_config;
