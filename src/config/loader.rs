// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{OrchestratorError, Result};

/// Environment variable consulted by [`default_config_path`].
pub const CONFIG_ENV_VAR: &str = "ORCHESTRATOR_CONFIG";

/// Load raw configuration from a file or a directory of `*.toml` files.
///
/// This only performs TOML deserialization (and, for directories, merging);
/// it does **not** run semantic validation. Use [`load`] for that.
///
/// Directory files are merged in file-name order at section level: two files
/// may both contribute to `[job]`, but the same `[job.<name>]` (or the same
/// key in `[orchestrator]` etc.) may only appear once.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();

    let merged = if path.is_dir() {
        let mut merged = toml::Table::new();
        for file in toml_files_in(path)? {
            let table = read_table(&file)?;
            merge_sections(&mut merged, table, &file)?;
            debug!(file = %file.display(), "merged config file");
        }
        merged
    } else if path.is_file() {
        read_table(path)?
    } else {
        return Err(OrchestratorError::Config(format!(
            "config path '{}' does not exist",
            path.display()
        )));
    };

    let raw: RawConfigFile = toml::Value::Table(merged).try_into()?;
    Ok(raw)
}

/// Load configuration from `path` and validate it.
///
/// This is the entry point the rest of the crate uses. Relative paths inside
/// the config (`schemas_dir`, `record_log`) resolve against the config
/// directory, or the file's parent directory for a single file.
pub fn load(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    let config = ConfigFile::try_from(raw)?.with_base_dir(config_root_dir(path));
    Ok(config)
}

/// Resolve the default config location.
///
/// `ORCHESTRATOR_CONFIG` if set, otherwise `config` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"))
}

fn config_root_dir(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn toml_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(OrchestratorError::Config(format!(
            "config directory '{}' contains no .toml files",
            dir.display()
        )));
    }
    Ok(files)
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let contents = fs::read_to_string(path).map_err(|e| {
        OrchestratorError::Config(format!("cannot read '{}': {e}", path.display()))
    })?;
    let table: toml::Table = toml::from_str(&contents)?;
    Ok(table)
}

fn merge_sections(into: &mut toml::Table, from: toml::Table, file: &Path) -> Result<()> {
    for (section, value) in from {
        match (into.get_mut(&section), value) {
            (None, value) => {
                into.insert(section, value);
            }
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                for (key, v) in incoming {
                    if existing.contains_key(&key) {
                        return Err(OrchestratorError::Config(format!(
                            "'{section}.{key}' in '{}' is already defined by an earlier file",
                            file.display()
                        )));
                    }
                    existing.insert(key, v);
                }
            }
            (Some(_), _) => {
                return Err(OrchestratorError::Config(format!(
                    "top-level key '{section}' in '{}' conflicts with an earlier file",
                    file.display()
                )));
            }
        }
    }
    Ok(())
}
