#![allow(dead_code)]

use std::collections::BTreeMap;

use shipdag::config::{
    ConfigFile, ConfigSection, JobAction, JobConfig, RawConfigFile, TriggerRule,
};
use shipdag::errors::Result;
use shipdag::types::SupersededRunBehaviour;

/// Builder for `ConfigFile` to simplify test setup.
pub struct PipelineBuilder {
    config: RawConfigFile,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                toolchain: BTreeMap::new(),
                job: BTreeMap::new(),
            },
        }
    }

    pub fn with_job(mut self, name: &str, job: JobConfig) -> Self {
        self.config.job.insert(name.to_string(), job);
        self
    }

    pub fn with_toolchain(mut self, name: &str, version: &str) -> Self {
        self.config
            .toolchain
            .insert(name.to_string(), version.to_string());
        self
    }

    pub fn default_branch(mut self, branch: &str) -> Self {
        self.config.config.default_branch = branch.to_string();
        self
    }

    pub fn superseded_run_behaviour(mut self, behaviour: SupersededRunBehaviour) -> Self {
        self.config.config.superseded_run_behaviour = behaviour;
        self
    }

    pub fn cancel_grace_period(mut self, period: &str) -> Self {
        self.config.config.cancel_grace_period = period.to_string();
        self
    }

    pub fn attest_when_not_publishing(mut self, val: bool) -> Self {
        self.config.config.attest_when_not_publishing = val;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobConfig`.
pub struct JobConfigBuilder {
    job: JobConfig,
}

impl JobConfigBuilder {
    fn with_action(action: JobAction) -> Self {
        Self {
            job: JobConfig {
                action,
                cmd: None,
                platform: "linux-x86_64".to_string(),
                after: vec![],
                trigger: TriggerRule::Standard,
                produces: vec![],
                consumes: vec![],
                publish_capable: false,
                toolchain: None,
                cache_files: vec![],
                hash_source: false,
            },
        }
    }

    pub fn build_job() -> Self {
        Self::with_action(JobAction::Build)
    }

    pub fn test_job() -> Self {
        Self::with_action(JobAction::Test)
    }

    pub fn passthrough(cmd: &str) -> Self {
        let mut b = Self::with_action(JobAction::Passthrough);
        b.job.cmd = Some(cmd.to_string());
        b
    }

    /// A release gate job (action `release`, trigger `release`).
    pub fn release() -> Self {
        let mut b = Self::with_action(JobAction::Release);
        b.job.trigger = TriggerRule::Release;
        b
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.job.after.push(dep.to_string());
        self
    }

    pub fn platform(mut self, platform: &str) -> Self {
        self.job.platform = platform.to_string();
        self
    }

    pub fn trigger(mut self, trigger: TriggerRule) -> Self {
        self.job.trigger = trigger;
        self
    }

    pub fn produces(mut self, artifact: &str) -> Self {
        self.job.produces.push(artifact.to_string());
        self
    }

    pub fn consumes(mut self, artifact: &str) -> Self {
        self.job.consumes.push(artifact.to_string());
        self
    }

    pub fn publish_capable(mut self) -> Self {
        self.job.publish_capable = true;
        self
    }

    pub fn toolchain(mut self, name: &str) -> Self {
        self.job.toolchain = Some(name.to_string());
        self
    }

    pub fn cache_file(mut self, path: &str) -> Self {
        self.job.cache_files.push(path.to_string());
        self
    }

    pub fn hash_source(mut self) -> Self {
        self.job.hash_source = true;
        self
    }

    pub fn build(self) -> JobConfig {
        self.job
    }
}

/// Small wheel pipeline used across tests:
///
/// test -> build-linux -> smoke-linux -> release
/// test -> build-mac   ----------------> release
pub fn wheel_pipeline() -> PipelineBuilder {
    PipelineBuilder::new()
        .with_job("test", JobConfigBuilder::test_job().build())
        .with_job(
            "build-linux",
            JobConfigBuilder::build_job()
                .after("test")
                .produces("wheel-linux-x86_64")
                .publish_capable()
                .build(),
        )
        .with_job(
            "build-mac",
            JobConfigBuilder::build_job()
                .platform("macos-arm64")
                .after("test")
                .produces("wheel-macos-arm64")
                .publish_capable()
                .build(),
        )
        .with_job(
            "smoke-linux",
            JobConfigBuilder::passthrough("test -s \"$SHIPDAG_ARTIFACT_DIR/wheel-linux-x86_64\"")
                .after("build-linux")
                .consumes("wheel-linux-x86_64")
                .build(),
        )
        .with_job(
            "release",
            JobConfigBuilder::release()
                .after("smoke-linux")
                .after("build-mac")
                .build(),
        )
}
