// src/config/settings.rs

//! Immutable process-wide settings threaded into every run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::ConfigFile;
use crate::errors::{Result, ShipdagError};
use crate::types::SupersededRunBehaviour;

/// Values shared by every job of every run: toolchain pins, trigger policy
/// inputs and filesystem locations. Built once at startup and shared via
/// `Arc`; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub default_branch: String,
    pub release_tag_pattern: String,
    pub superseded_run_behaviour: SupersededRunBehaviour,
    pub cancel_grace_period: Duration,
    pub source_root: PathBuf,
    pub work_dir: PathBuf,
    pub attest_when_not_publishing: bool,
    pub toolchain: BTreeMap<String, String>,
    /// Command of the command-backed build producer; part of build cache keys.
    pub build_cmd: Option<String>,
}

impl Settings {
    pub fn from_config(cfg: &ConfigFile, source_root: impl AsRef<Path>) -> Result<Self> {
        let section = cfg.config();
        let source_root = source_root.as_ref().to_path_buf();
        let cancel_grace_period = section
            .grace_period()
            .map_err(|e| ShipdagError::ConfigError(format!("[config].cancel_grace_period: {e}")))?;

        Ok(Self {
            default_branch: section.default_branch.clone(),
            release_tag_pattern: section.release_tag_pattern.clone(),
            superseded_run_behaviour: section.superseded_run_behaviour,
            cancel_grace_period,
            work_dir: source_root.join(&section.work_dir),
            source_root,
            attest_when_not_publishing: section.attest_when_not_publishing,
            toolchain: cfg.toolchain().clone(),
            build_cmd: section.build_cmd.clone(),
        })
    }

    pub fn toolchain_pin(&self, name: &str) -> Option<&str> {
        self.toolchain.get(name).map(String::as_str)
    }
}
