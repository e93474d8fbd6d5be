mod common;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use common::builders::{wheel_pipeline, JobConfigBuilder, PipelineBuilder};
use common::fakes::{ExecRecord, FakeExecutor};
use common::{init_tracing, with_timeout};
use shipdag::artifact::ArtifactStore;
use shipdag::config::{ConfigFile, Settings};
use shipdag::dag::Pipeline;
use shipdag::engine::{CoreRuntime, RunBoard, Runtime, RuntimeEvent, RuntimeOptions};
use shipdag::report::{RunReport, RunStatus};
use shipdag::trigger::TriggerPolicy;
use shipdag::types::{Event, JobOutcome, SupersededRunBehaviour};

struct Harness {
    reports: Vec<RunReport>,
    log: Vec<ExecRecord>,
    board: RunBoard,
}

/// Feed `events` to a runtime backed by a `FakeExecutor` and wait until it
/// goes idle.
async fn drive(
    cfg: ConfigFile,
    events: Vec<Event>,
    configure: impl FnOnce(FakeExecutor) -> FakeExecutor,
) -> Harness {
    init_tracing();

    let settings = Settings::from_config(&cfg, ".").unwrap();
    let pipeline = Arc::new(Pipeline::from_config(&cfg));
    let policy = TriggerPolicy::from_settings(&settings).unwrap();

    // Large enough that the fake never blocks while the runtime is busy
    // dispatching to it.
    let (tx, rx) = mpsc::channel(256);
    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = configure(FakeExecutor::new(tx.clone(), Arc::clone(&log)));

    for event in events {
        tx.send(RuntimeEvent::EventReceived(event)).await.unwrap();
    }

    let core = CoreRuntime::new(
        pipeline,
        policy,
        settings.superseded_run_behaviour,
        RuntimeOptions {
            exit_when_idle: true,
        },
    );
    let board = RunBoard::new();
    let runtime = Runtime::new(core, rx, executor, ArtifactStore::new(), board.clone());

    let reports = with_timeout(runtime.run()).await.unwrap();
    let log = log.lock().unwrap().clone();
    Harness {
        reports,
        log,
        board,
    }
}

fn dispatched(log: &[ExecRecord], run_id: u64) -> Vec<String> {
    log.iter()
        .filter_map(|r| match r {
            ExecRecord::Dispatched { run_id: id, job } if *id == run_id => Some(job.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn push_to_default_branch_runs_everything_but_the_release() {
    let h = drive(wheel_pipeline().build(), vec![Event::push("main", "c1")], |e| e).await;

    assert_eq!(h.reports.len(), 1);
    let report = &h.reports[0];
    assert!(report.succeeded(), "{report}");
    assert_eq!(report.outcome_of("release"), Some(JobOutcome::Skipped));

    let order = dispatched(&h.log, 1);
    assert_eq!(order.first().map(String::as_str), Some("test"));
    let pos = |job: &str| order.iter().position(|j| j == job).unwrap();
    assert!(pos("build-linux") < pos("smoke-linux"));
    assert!(!order.contains(&"release".to_string()));
}

#[tokio::test]
async fn release_tag_runs_the_release_job_last() {
    let h = drive(wheel_pipeline().build(), vec![Event::tag("v1.0.0", "c1")], |e| e).await;

    let report = &h.reports[0];
    assert!(report.succeeded(), "{report}");
    assert_eq!(report.outcome_of("release"), Some(JobOutcome::Succeeded));
    assert_eq!(dispatched(&h.log, 1).last().map(String::as_str), Some("release"));
}

#[tokio::test]
async fn failed_build_skips_its_dependents_only() {
    let h = drive(
        wheel_pipeline().build(),
        vec![Event::tag("v1.0.0", "c1")],
        |e| e.failing("build-linux"),
    )
    .await;

    let report = &h.reports[0];
    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(report.outcome_of("build-linux"), Some(JobOutcome::Failed));
    assert_eq!(report.outcome_of("build-mac"), Some(JobOutcome::Succeeded));
    assert_eq!(report.outcome_of("smoke-linux"), Some(JobOutcome::Skipped));
    assert_eq!(report.outcome_of("release"), Some(JobOutcome::Skipped));

    let diagnostics = report.jobs["build-linux"].diagnostics.as_deref().unwrap();
    assert!(diagnostics.contains("build-linux exploded"));
}

#[tokio::test]
async fn newer_push_cancels_the_active_run_before_dispatching() {
    let h = drive(
        wheel_pipeline().build(),
        vec![Event::push("main", "c1"), Event::push("main", "c2")],
        |e| e,
    )
    .await;

    assert_eq!(h.reports.len(), 2);
    assert_eq!(h.reports[0].run_id, 1);
    assert_eq!(h.reports[0].status(), RunStatus::Cancelled);
    assert_eq!(h.reports[0].outcome_of("test"), Some(JobOutcome::Cancelled));
    assert!(h.reports[1].succeeded());
    assert_eq!(h.reports[1].event.commit, "c2");

    let cancel_pos = h
        .log
        .iter()
        .position(|r| matches!(r, ExecRecord::Cancelled { run_id: 1, .. }))
        .expect("run 1 was cancelled");
    let first_run2_dispatch = h
        .log
        .iter()
        .position(|r| matches!(r, ExecRecord::Dispatched { run_id: 2, .. }))
        .expect("run 2 dispatched jobs");
    assert!(cancel_pos < first_run2_dispatch, "{:?}", h.log);

    assert_eq!(
        h.log[cancel_pos],
        ExecRecord::Cancelled {
            run_id: 1,
            jobs: vec!["test".to_string()]
        }
    );
    // The late completion of run 1's test job was ignored.
    assert_eq!(dispatched(&h.log, 1), vec!["test".to_string()]);
}

#[tokio::test]
async fn runs_on_different_refs_proceed_concurrently() {
    let h = drive(
        wheel_pipeline().build(),
        vec![
            Event::push("main", "c1"),
            Event::pull_request("main", "c2"),
            Event::push("feature", "c3"),
        ],
        |e| e,
    )
    .await;

    assert_eq!(h.reports.len(), 3);
    assert!(h.reports.iter().all(|r| r.status() != RunStatus::Cancelled));
    assert!(!h.log.iter().any(|r| matches!(r, ExecRecord::Cancelled { .. })));

    let feature = h
        .reports
        .iter()
        .find(|r| r.event.commit == "c3")
        .unwrap();
    // Non-default branch pushes are not eligible for anything.
    assert!(feature.jobs.values().all(|j| j.outcome == JobOutcome::Skipped));
}

#[tokio::test]
async fn queue_mode_runs_only_the_latest_waiting_event() {
    let cfg = wheel_pipeline()
        .superseded_run_behaviour(SupersededRunBehaviour::Queue)
        .build();
    let h = drive(
        cfg,
        vec![
            Event::push("main", "c1"),
            Event::push("main", "c2"),
            Event::push("main", "c3"),
        ],
        |e| e,
    )
    .await;

    let commits: Vec<_> = h.reports.iter().map(|r| r.event.commit.as_str()).collect();
    assert_eq!(commits, vec!["c1", "c3"]);
    assert!(h.reports.iter().all(|r| r.succeeded()));
    assert!(!h.log.iter().any(|r| matches!(r, ExecRecord::Cancelled { .. })));
}

#[tokio::test]
async fn board_tracks_final_outcomes() {
    let cfg = PipelineBuilder::new()
        .with_job("a", JobConfigBuilder::test_job().build())
        .with_job("b", JobConfigBuilder::test_job().after("a").build())
        .build();
    let h = drive(cfg, vec![Event::manual("anything", "c1")], |e| e.failing("a")).await;

    assert_eq!(h.board.outcome_of(1, "a"), Some(JobOutcome::Failed));
    assert_eq!(h.board.outcome_of(1, "b"), Some(JobOutcome::Skipped));
    assert!(h.board.active_runs().is_empty());
    let snapshot = h.board.snapshot(1).unwrap();
    assert_eq!(snapshot.status, Some(RunStatus::Failed));
}
