// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::SupersededRunBehaviour;

/// Pipeline file as deserialized from TOML, before validation.
///
/// ```toml
/// [config]
/// default_branch = "main"
/// release_tag_pattern = "v*"
///
/// [toolchain]
/// python = "3.11"
///
/// [job.test]
/// action = "test"
///
/// [job.build-linux]
/// action = "build"
/// platform = "linux-x86_64"
/// after = ["test"]
/// produces = ["wheel-linux"]
/// publish_capable = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Shared version pins from `[toolchain]`, e.g. `python = "3.11"`.
    #[serde(default)]
    pub toolchain: BTreeMap<String, String>,

    /// All jobs from `[job.<name>]`.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

/// A pipeline file that passed validation.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`),
/// so holding one means the job table is acyclic and internally consistent.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    config: ConfigSection,
    toolchain: BTreeMap<String, String>,
    job: BTreeMap<String, JobConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        toolchain: BTreeMap<String, String>,
        job: BTreeMap<String, JobConfig>,
    ) -> Self {
        Self {
            config,
            toolchain,
            job,
        }
    }

    pub fn config(&self) -> &ConfigSection {
        &self.config
    }

    pub fn toolchain(&self) -> &BTreeMap<String, String> {
        &self.toolchain
    }

    pub fn jobs(&self) -> &BTreeMap<String, JobConfig> {
        &self.job
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Branch whose pushes (and PRs targeting it) run the pipeline.
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Glob that tags must match to count as a release.
    #[serde(default = "default_release_tag_pattern")]
    pub release_tag_pattern: String,

    /// What happens to an active run when a newer event arrives on its ref.
    #[serde(default)]
    pub superseded_run_behaviour: SupersededRunBehaviour,

    /// How long a cancelled job may take to stop before it is killed
    /// (e.g. `"30s"`).
    #[serde(default = "default_cancel_grace_period")]
    pub cancel_grace_period: String,

    /// Scratch directory for job outputs, relative to the source root.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Whether publishable artifacts are signed and attested on
    /// non-publishing runs (pull requests). Signing talks to key material
    /// and transparency logs, so it is off unless asked for.
    #[serde(default)]
    pub attest_when_not_publishing: bool,

    /// Shell command used by the command-backed build producer.
    #[serde(default)]
    pub build_cmd: Option<String>,

    /// Shell command used by the command-backed test runner.
    #[serde(default)]
    pub test_cmd: Option<String>,

    /// Secret the local attestor derives its signing key from.
    #[serde(default)]
    pub signing_key: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_release_tag_pattern() -> String {
    "v*".to_string()
}

fn default_cancel_grace_period() -> String {
    "30s".to_string()
}

fn default_work_dir() -> String {
    ".shipdag/work".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            release_tag_pattern: default_release_tag_pattern(),
            superseded_run_behaviour: SupersededRunBehaviour::default(),
            cancel_grace_period: default_cancel_grace_period(),
            work_dir: default_work_dir(),
            attest_when_not_publishing: false,
            build_cmd: None,
            test_cmd: None,
            signing_key: None,
        }
    }
}

/// What a job does when dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    /// Call the build producer for the job's platform.
    Build,
    /// Call the test runner against the source.
    Test,
    /// Run the release gate.
    Release,
    /// Run the job's own shell command.
    Passthrough,
}

/// Which events a job is eligible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerRule {
    /// Release tags, pushes and PRs to the default branch, manual dispatch.
    #[default]
    Standard,
    /// Release tags only.
    Release,
}

/// `[job.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub action: JobAction,

    /// Shell command; only meaningful (and required) for `passthrough` jobs.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Runtime platform tag, e.g. `"linux-x86_64"`.
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Jobs that must succeed before this one runs.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub trigger: TriggerRule,

    /// Artifact names this job writes.
    #[serde(default)]
    pub produces: Vec<String>,

    /// Artifact names this job reads from its upstream jobs.
    #[serde(default)]
    pub consumes: Vec<String>,

    /// Artifacts of publish-capable jobs are publishable, and such jobs run
    /// with `publishing = false` on pull requests.
    #[serde(default)]
    pub publish_capable: bool,

    /// Name of the `[toolchain]` pin that goes into the cache key.
    #[serde(default)]
    pub toolchain: Option<String>,

    /// Lock/config files (relative to the source root) hashed into the key.
    #[serde(default)]
    pub cache_files: Vec<String>,

    /// Whether the source tree hash goes into the cache key.
    #[serde(default)]
    pub hash_source: bool,
}

fn default_platform() -> String {
    "linux-x86_64".to_string()
}

impl ConfigSection {
    pub fn grace_period(&self) -> Result<Duration, String> {
        parse_duration(&self.cancel_grace_period)
    }
}

/// Parse strings like `"500ms"`, `"30s"`, `"5m"`, `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let seconds_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}
