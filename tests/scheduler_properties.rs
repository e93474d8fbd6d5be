use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use shipdag::config::ConfigFile;
use shipdag::dag::{Pipeline, Scheduler};
use shipdag::engine::JobResult;
use shipdag::trigger::TriggerPolicy;
use shipdag::types::{Event, JobOutcome};
use shipdag_test_utils::builders::{JobConfigBuilder, PipelineBuilder};

// Strategy to generate a valid DAG configuration.
// Acyclic by construction: job N may only depend on jobs 0..N-1.
fn dag_config_strategy(max_jobs: usize) -> impl Strategy<Value = ConfigFile> {
    (1..=max_jobs).prop_flat_map(|num_jobs| {
        let deps_strat = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_jobs),
            num_jobs,
        );

        deps_strat.prop_map(move |raw_deps| {
            let mut builder = PipelineBuilder::new();
            for (i, potential_deps) in raw_deps.into_iter().enumerate() {
                let mut job = JobConfigBuilder::test_job();

                let valid_deps: HashSet<usize> = if i == 0 {
                    HashSet::new()
                } else {
                    potential_deps.into_iter().map(|d| d % i).collect()
                };
                for dep_idx in valid_deps {
                    job = job.after(&format!("job_{dep_idx}"));
                }
                builder = builder.with_job(&format!("job_{i}"), job.build());
            }
            builder.build()
        })
    })
}

struct Simulation {
    scheduler: Scheduler,
    dispatched: Vec<String>,
}

/// Drive one run to the end, completing jobs FIFO. Checks at every
/// dispatch that the job's dependencies have all succeeded.
fn simulate(cfg: &ConfigFile, failing: &HashSet<String>) -> Result<Simulation, TestCaseError> {
    let pipeline = Arc::new(Pipeline::from_config(cfg));
    let policy = TriggerPolicy::new("main", "v*").unwrap();
    let mut scheduler = Scheduler::for_run(pipeline, &policy, 1, Event::push("main", "abc"));

    let mut executing: Vec<String> = Vec::new();
    let mut dispatched = Vec::new();

    let step = scheduler.start();
    for job in step.newly_scheduled {
        prop_assert_eq!(scheduler.deps_satisfied(&job.name), Some(true));
        executing.push(job.name);
    }

    let max_steps = 1000;
    let mut steps = 0;
    while !executing.is_empty() {
        steps += 1;
        prop_assert!(steps <= max_steps, "simulation did not converge");

        let job = executing.remove(0);
        let result = if failing.contains(&job) {
            JobResult::failed(Some(1), "boom")
        } else {
            JobResult::Success
        };
        dispatched.push(job.clone());

        let step = scheduler.step_completion(&job, result);
        for next in step.newly_scheduled {
            prop_assert_eq!(
                scheduler.deps_satisfied(&next.name),
                Some(true),
                "{} dispatched before its dependencies succeeded",
                next.name
            );
            executing.push(next.name);
        }
    }

    Ok(Simulation {
        scheduler,
        dispatched,
    })
}

fn failing_set(cfg: &ConfigFile, indices: &[usize]) -> HashSet<String> {
    let n = cfg.jobs().len();
    indices.iter().map(|i| format!("job_{}", i % n)).collect()
}

proptest! {
    #[test]
    fn every_run_terminates(
        cfg in dag_config_strategy(12),
        failing in proptest::collection::vec(0..12usize, 0..4),
    ) {
        let failing = failing_set(&cfg, &failing);
        let sim = simulate(&cfg, &failing)?;

        prop_assert!(sim.scheduler.is_terminal());
        for (job, outcome) in sim.scheduler.outcomes() {
            prop_assert!(
                outcome.is_terminal(),
                "{} left in {:?} after the run drained", job, outcome
            );
        }
    }

    #[test]
    fn every_job_runs_exactly_once_when_nothing_fails(cfg in dag_config_strategy(12)) {
        let sim = simulate(&cfg, &HashSet::new())?;
        let unique: HashSet<_> = sim.dispatched.iter().collect();
        prop_assert_eq!(unique.len(), sim.dispatched.len());
        prop_assert_eq!(sim.dispatched.len(), cfg.jobs().len());
        prop_assert!(sim.scheduler.report().succeeded());
    }

    #[test]
    fn failure_propagates_as_skips(
        cfg in dag_config_strategy(12),
        failing in proptest::collection::vec(0..12usize, 1..4),
    ) {
        let failing = failing_set(&cfg, &failing);
        let sim = simulate(&cfg, &failing)?;
        let outcomes = sim.scheduler.outcomes();

        for (name, job) in cfg.jobs() {
            let deps_ok = job
                .after
                .iter()
                .all(|d| outcomes.get(d) == Some(&JobOutcome::Succeeded));
            let expected = match (deps_ok, failing.contains(name)) {
                (false, _) => JobOutcome::Skipped,
                (true, true) => JobOutcome::Failed,
                (true, false) => JobOutcome::Succeeded,
            };
            prop_assert_eq!(outcomes.get(name), Some(&expected), "job {}", name);
        }
        prop_assert!(!sim.scheduler.report().succeeded());
    }
}
