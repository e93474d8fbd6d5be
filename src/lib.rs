// src/lib.rs

pub mod artifact;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod release;
pub mod report;
pub mod trigger;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactStore;
use crate::cache::{CacheResolver, DirCacheStore};
use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, load_and_validate, load_builtin};
use crate::config::{ConfigFile, Settings};
use crate::dag::Pipeline;
use crate::engine::{CoreRuntime, RunBoard, Runtime, RuntimeEvent, RuntimeOptions};
use crate::exec::{CommandBuildProducer, CommandTestRunner, ExecContext, RealExecutorBackend};
use crate::release::{Attestor, DirReleaseStore, LocalAttestor};
use crate::report::RunReport;
use crate::trigger::{Eligibility, TriggerPolicy};
use crate::types::{Event, EventKind};

/// Environment variable that overrides `[config].signing_key`.
pub const SIGNING_KEY_ENV: &str = "SHIPDAG_SIGNING_KEY";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline loading and validation
/// - trigger policy / core runtime / async shell
/// - executor, cache, artifact and release stores
/// - Ctrl-C handling
///
/// Returns whether every run triggered by the event succeeded.
pub async fn run(args: CliArgs) -> Result<bool> {
    let (cfg, project_dir) = load_pipeline(args.config.as_deref())?;
    let source_root = args
        .source_root
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or(project_dir);

    let settings = Arc::new(Settings::from_config(&cfg, &source_root)?);
    let pipeline = Arc::new(Pipeline::from_config(&cfg));
    let policy = TriggerPolicy::from_settings(&settings)?;

    let kind: EventKind = match args.event.parse() {
        Ok(kind) => kind,
        Err(never) => match never {},
    };
    let event = Event::new(kind, args.git_ref.as_str(), args.commit.as_str());

    if args.dry_run {
        print_dry_run(&cfg, &pipeline, &policy, &event);
        return Ok(true);
    }

    let artifacts = ArtifactStore::new();
    let ctx = Arc::new(ExecContext {
        settings: Arc::clone(&settings),
        artifacts: artifacts.clone(),
        cache: CacheResolver::new(Arc::new(DirCacheStore::new(&args.cache_dir))),
        producer: Arc::new(CommandBuildProducer::new(cfg.config().build_cmd.clone())),
        tests: Arc::new(CommandTestRunner::new(cfg.config().test_cmd.clone())),
        attestor: signing_attestor(&cfg),
        releases: Arc::new(DirReleaseStore::new(&args.release_dir)),
    });

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let executor = RealExecutorBackend::new(rt_tx.clone(), ctx, settings.cancel_grace_period);

    // Ctrl-C → cancel active runs and exit.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    info!(%event, jobs = pipeline.jobs().count(), "submitting event");
    rt_tx
        .send(RuntimeEvent::EventReceived(event))
        .await
        .context("submitting event to runtime")?;

    let options = RuntimeOptions {
        exit_when_idle: true,
    };

    // Construct the pure core runtime (single source of truth for semantics).
    let core = CoreRuntime::new(pipeline, policy, settings.superseded_run_behaviour, options);

    // Construct the async IO shell around the core.
    let runtime = Runtime::new(core, rt_rx, executor, artifacts, RunBoard::new());
    let reports = runtime.run().await?;

    print_reports(&reports);
    Ok(!reports.is_empty() && reports.iter().all(RunReport::succeeded))
}

/// Load `--config`, else `Shipdag.toml` in the current directory, else the
/// built-in wheel pipeline. Also returns the project directory.
fn load_pipeline(config: Option<&str>) -> Result<(ConfigFile, PathBuf)> {
    let explicit = config.map(PathBuf::from);
    let path = explicit.or_else(|| {
        let default = default_config_path();
        default.is_file().then_some(default)
    });

    match path {
        Some(path) => {
            let cfg = load_and_validate(&path)
                .with_context(|| format!("loading pipeline {}", path.display()))?;
            Ok((cfg, config_root_dir(&path)))
        }
        None => {
            info!("no pipeline file given; using the built-in wheel pipeline");
            let cfg = load_builtin().context("loading built-in pipeline")?;
            Ok((cfg, current_dir()))
        }
    }
}

/// Figure out the project root of a pipeline file.
///
/// - If the path has a non-empty parent (e.g. "ci/Shipdag.toml"), we use
///   that directory.
/// - If it's just a bare filename like "Shipdag.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => current_dir(),
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn signing_attestor(cfg: &ConfigFile) -> Option<Arc<dyn Attestor>> {
    let key = std::env::var(SIGNING_KEY_ENV)
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(|| cfg.config().signing_key.clone());

    match key {
        Some(key) => Some(Arc::new(LocalAttestor::new(&key))),
        None => {
            warn!("no signing key configured; publishable artifacts will not be attested");
            None
        }
    }
}

fn print_reports(reports: &[RunReport]) {
    for report in reports {
        println!("{report}");
    }
}

/// Dry-run output: jobs in topological order with their eligibility for
/// the event.
fn print_dry_run(cfg: &ConfigFile, pipeline: &Pipeline, policy: &TriggerPolicy, event: &Event) {
    println!("shipdag dry-run for {event}");
    println!("  config.default_branch = {}", cfg.config().default_branch);
    println!("  config.release_tag_pattern = {}", cfg.config().release_tag_pattern);
    println!(
        "  config.superseded_run_behaviour = {:?}",
        cfg.config().superseded_run_behaviour
    );
    println!();

    println!("jobs ({}):", pipeline.jobs().count());
    for name in pipeline.topological_order() {
        let Some(spec) = pipeline.job(name) else {
            continue;
        };
        let eligibility = match policy.evaluate(spec, event) {
            Eligibility::Eligible { publishing: true } => "run (publishing)",
            Eligibility::Eligible { publishing: false } => "run (not publishing)",
            Eligibility::Ineligible => "skip",
        };
        println!("  - {name} [{:?}, {}] -> {eligibility}", spec.action, spec.platform);
        if !spec.deps.is_empty() {
            println!("      after: {:?}", spec.deps);
        }
        if !spec.produces.is_empty() {
            println!("      produces: {:?}", spec.produces);
        }
        if !spec.consumes.is_empty() {
            println!("      consumes: {:?}", spec.consumes);
        }
        if let Some(cmd) = &spec.cmd {
            println!("      cmd: {cmd}");
        }
    }

    debug!("dry-run complete (no execution)");
}
