mod common;

use std::fs;

use common::builders::{wheel_pipeline, JobConfigBuilder, PipelineBuilder};
use shipdag::config::{load_and_validate, load_builtin, JobAction, TriggerRule};
use shipdag::dag::Pipeline;
use shipdag::errors::ShipdagError;
use tempfile::tempdir;

#[test]
fn pipeline_file_on_disk_loads() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Shipdag.toml");
    fs::write(
        &path,
        r#"
[config]
default_branch = "trunk"
cancel_grace_period = "5s"

[toolchain]
python = "3.12"

[job.test]
action = "test"
toolchain = "python"

[job.build]
action = "build"
after = ["test"]
produces = ["wheel-linux-x86_64"]
publish_capable = true

[job.release]
action = "release"
trigger = "release"
after = ["build"]
"#,
    )
    .unwrap();

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.config().default_branch, "trunk");
    assert_eq!(cfg.jobs()["release"].action, JobAction::Release);
    assert_eq!(cfg.jobs()["release"].trigger, TriggerRule::Release);
    assert_eq!(cfg.jobs()["build"].platform, "linux-x86_64");

    let pipeline = Pipeline::from_config(&cfg);
    let order: Vec<_> = pipeline.topological_order().collect();
    assert_eq!(order, vec!["test", "build", "release"]);
}

#[test]
fn builtin_pipeline_is_valid() {
    let cfg = load_builtin().unwrap();
    assert!(cfg.jobs().values().any(|j| j.action == JobAction::Release));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = load_and_validate(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ShipdagError::IoError(_)));
}

#[test]
fn malformed_toml_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Shipdag.toml");
    fs::write(&path, "[job.test\naction = \"test\"\n").unwrap();

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, ShipdagError::TomlError(_)));
}

#[test]
fn unknown_action_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Shipdag.toml");
    fs::write(&path, "[job.test]\naction = \"deploy\"\n").unwrap();

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, ShipdagError::TomlError(_)));
}

#[test]
fn cycles_are_rejected() {
    let err = PipelineBuilder::new()
        .with_job("a", JobConfigBuilder::test_job().after("c").build())
        .with_job("b", JobConfigBuilder::test_job().after("a").build())
        .with_job("c", JobConfigBuilder::test_job().after("b").build())
        .try_build()
        .unwrap_err();
    assert!(matches!(err, ShipdagError::DagCycle(_)));
}

#[test]
fn consuming_an_artifact_nobody_upstream_produces_is_rejected() {
    // build-mac produces the wheel, but smoke does not depend on it.
    let err = PipelineBuilder::new()
        .with_job(
            "build-mac",
            JobConfigBuilder::build_job()
                .platform("macos-arm64")
                .produces("wheel-macos-arm64")
                .build(),
        )
        .with_job("test", JobConfigBuilder::test_job().build())
        .with_job(
            "smoke",
            JobConfigBuilder::passthrough("true")
                .after("test")
                .consumes("wheel-macos-arm64")
                .build(),
        )
        .try_build()
        .unwrap_err();

    match err {
        ShipdagError::UnproducedArtifact { job, artifact } => {
            assert_eq!(job, "smoke");
            assert_eq!(artifact, "wheel-macos-arm64");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn depending_on_a_release_only_job_is_rejected() {
    let err = wheel_pipeline()
        .with_job(
            "announce",
            JobConfigBuilder::passthrough("echo released").after("release").build(),
        )
        .try_build()
        .unwrap_err();

    assert!(matches!(
        err,
        ShipdagError::UnreachableDependency { ref job, ref dependency }
            if job == "announce" && dependency == "release"
    ));
}

#[test]
fn release_only_follow_up_is_fine() {
    wheel_pipeline()
        .with_job(
            "announce",
            JobConfigBuilder::passthrough("echo released")
                .trigger(TriggerRule::Release)
                .after("release")
                .build(),
        )
        .build();
}

#[test]
fn bad_grace_period_is_rejected() {
    let err = wheel_pipeline()
        .cancel_grace_period("soon")
        .try_build()
        .unwrap_err();
    assert!(matches!(err, ShipdagError::ConfigError(ref msg) if msg.contains("cancel_grace_period")));
}
