#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::builders::{JobConfigBuilder, PipelineBuilder};
use common::fakes::{FakeBuildProducer, FakeTestRunner};
use common::{init_tracing, run_events, FakeContext};
use shipdag::errors::ShipdagError;
use shipdag::report::RunStatus;
use shipdag::types::{Event, JobOutcome};
use tempfile::tempdir;

#[tokio::test]
async fn superseded_shell_job_is_killed_and_the_new_run_completes() {
    init_tracing();
    let dir = tempdir().unwrap();
    let cfg = PipelineBuilder::new()
        .with_job(
            "lint",
            JobConfigBuilder::passthrough(
                "if [ \"$SHIPDAG_COMMIT\" = slow ]; then sleep 30; fi",
            )
            .build(),
        )
        .build();
    let fake = FakeContext::new(&cfg, dir.path());

    let started = Instant::now();
    let reports = run_events(
        &cfg,
        &fake,
        vec![Event::push("main", "slow"), Event::push("main", "fast")],
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].status(), RunStatus::Cancelled);
    assert_eq!(reports[0].outcome_of("lint"), Some(JobOutcome::Cancelled));
    assert!(reports[1].succeeded(), "{}", reports[1]);
    assert_eq!(reports[1].event.commit, "fast");
}

#[tokio::test]
async fn job_ignoring_cancellation_is_aborted_after_the_grace_period() {
    init_tracing();
    let dir = tempdir().unwrap();
    let cfg = PipelineBuilder::new()
        .cancel_grace_period("100ms")
        .with_job(
            "build",
            JobConfigBuilder::build_job()
                .produces("wheel-linux-x86_64")
                .build(),
        )
        .build();
    let fake = FakeContext::with_fakes(
        &cfg,
        dir.path(),
        FakeBuildProducer::new()
            .with_delay(Duration::from_millis(800))
            .ignore_cancel(),
        FakeTestRunner::new(),
    );

    let reports = run_events(
        &cfg,
        &fake,
        vec![Event::push("main", "c1"), Event::push("main", "c2")],
    )
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(reports[0].status(), RunStatus::Cancelled);
    assert!(reports[1].succeeded());
    assert_eq!(fake.producer.calls().len(), 2);

    // A job that ran to the end removes its workspace; the aborted one
    // never got that far.
    let aborted_ws = dir.path().join(".shipdag/work/run-1/build");
    assert!(aborted_ws.is_dir(), "run 1 build was not aborted");
    assert!(!dir.path().join(".shipdag/work/run-2/build").exists());

    assert!(matches!(
        fake.artifacts.get(1, "build", "wheel-linux-x86_64"),
        Err(ShipdagError::StaleArtifact { run_id: 1 })
    ));
}
