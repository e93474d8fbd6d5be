// src/config/mod.rs

//! Pipeline configuration for shipdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a pipeline from disk or the built-in table (`loader.rs`, `builtin.rs`).
//! - Validate static invariants before any run (`validate.rs`).
//! - Derive the immutable per-process [`Settings`] (`settings.rs`).

pub mod builtin;
pub mod loader;
pub mod model;
pub mod settings;
pub mod validate;

pub use loader::{
    load_and_validate, load_and_validate_str, load_builtin, load_from_path, load_from_str,
};
pub use model::{
    ConfigFile, ConfigSection, JobAction, JobConfig, RawConfigFile, TriggerRule,
};
pub use settings::Settings;
