#![allow(dead_code)]

pub use shipdag_test_utils::{builders, fakes, init_tracing, with_timeout, FakeContext};

use std::sync::Arc;

use tokio::sync::mpsc;

use shipdag::config::ConfigFile;
use shipdag::dag::Pipeline;
use shipdag::engine::{CoreRuntime, RunBoard, Runtime, RuntimeEvent, RuntimeOptions};
use shipdag::exec::RealExecutorBackend;
use shipdag::report::RunReport;
use shipdag::trigger::TriggerPolicy;
use shipdag::types::Event;

/// Run `events` through a real executor wired to the fakes of `fake`, until
/// no run is active.
///
/// All events are queued before the runtime starts, so an event arriving
/// on a busy ref supersedes (or queues behind) the run before it. The first
/// event must make at least one job eligible, otherwise the runtime goes
/// idle before it sees the rest.
pub async fn run_events(cfg: &ConfigFile, fake: &FakeContext, events: Vec<Event>) -> Vec<RunReport> {
    let settings = Arc::clone(&fake.ctx.settings);
    let pipeline = Arc::new(Pipeline::from_config(cfg));
    let policy = TriggerPolicy::from_settings(&settings).unwrap();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = RealExecutorBackend::new(
        tx.clone(),
        Arc::clone(&fake.ctx),
        settings.cancel_grace_period,
    );

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
    let runtime = Runtime::new(core, rx, executor, fake.artifacts.clone(), RunBoard::new());

    with_timeout(runtime.run()).await.unwrap()
}
