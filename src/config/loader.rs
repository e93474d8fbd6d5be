// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::builtin::WHEEL_PIPELINE;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a pipeline file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (DAG correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    load_from_str(&contents)
}

/// Deserialize a pipeline from TOML text.
pub fn load_from_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a pipeline file from path and validate it.
///
/// This is the recommended entry point for the rest of the application:
/// the returned [`ConfigFile`] is a static job table that already passed
/// cycle, reference, artifact and trigger checks.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    ConfigFile::try_from(raw_config)
}

/// Deserialize and validate a pipeline from TOML text.
pub fn load_and_validate_str(contents: &str) -> Result<ConfigFile> {
    ConfigFile::try_from(load_from_str(contents)?)
}

/// The built-in wheel pipeline, validated through the same path as files.
pub fn load_builtin() -> Result<ConfigFile> {
    load_and_validate_str(WHEEL_PIPELINE)
}

/// Conventional pipeline file name in a project root.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Shipdag.toml")
}
