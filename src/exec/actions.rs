// src/exec/actions.rs

//! What each job action does, from staging inputs to staging outputs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};

use crate::artifact::PutOptions;
use crate::cache::{pack_outputs, unpack_outputs, CacheInputs, CacheKey, CacheResolver};
use crate::config::JobAction;
use crate::dag::ScheduledJob;
use crate::engine::JobResult;
use crate::exec::cancel::CancelToken;
use crate::exec::context::ExecContext;
use crate::exec::process::{run_shell, ShellCommand};
use crate::exec::producer::{job_env, BuildRequest, TestRequest};
use crate::release::{ProvenanceMetadata, ReleaseGate};
use crate::types::Payload;

type Outputs = Vec<(String, Payload)>;

/// Run the action of `job` and report its result. Never panics on
/// collaborator errors; those become a failed result with diagnostics.
pub async fn execute(ctx: &ExecContext, job: &ScheduledJob, cancel: &CancelToken) -> JobResult {
    let result = match job.spec.action {
        JobAction::Build | JobAction::Passthrough => run_producing(ctx, job, cancel).await,
        JobAction::Test => run_test(ctx, job, cancel).await,
        JobAction::Release => run_release(ctx, job).await,
    };

    match result {
        Ok(r) => r,
        Err(e) => JobResult::failed(None, format!("{e:#}")),
    }
}

/// Per-job scratch directories under the work dir.
struct Workspace {
    root: PathBuf,
    in_dir: PathBuf,
    out_dir: PathBuf,
}

impl Workspace {
    async fn prepare(ctx: &ExecContext, job: &ScheduledJob) -> Result<Self> {
        let root = ctx
            .settings
            .work_dir
            .join(format!("run-{}", job.run_id))
            .join(&job.name);
        if tokio::fs::try_exists(&root).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&root)
                .await
                .with_context(|| format!("clearing job workspace {:?}", root))?;
        }

        let in_dir = root.join("in");
        let out_dir = root.join("out");
        tokio::fs::create_dir_all(&in_dir)
            .await
            .with_context(|| format!("creating {:?}", in_dir))?;
        tokio::fs::create_dir_all(&out_dir)
            .await
            .with_context(|| format!("creating {:?}", out_dir))?;

        Ok(Self {
            root,
            in_dir,
            out_dir,
        })
    }

    async fn cleanup(self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.root).await {
            debug!(path = ?self.root, error = %e, "could not remove job workspace");
        }
    }
}

/// Copy every consumed artifact into the workspace input directory.
async fn stage_inputs(ctx: &ExecContext, job: &ScheduledJob, ws: &Workspace) -> Result<()> {
    for input in &job.inputs {
        let payload = ctx.artifacts.get(job.run_id, &input.job, &input.name)?;
        let path = ws.in_dir.join(&input.name);
        tokio::fs::write(&path, payload.as_bytes())
            .await
            .with_context(|| format!("writing input artifact {:?}", path))?;
        debug!(job = %job.name, artifact = %input.name, from = %input.job, "staged input");
    }
    Ok(())
}

/// Cache key of a build or passthrough job that declares cache inputs.
async fn cache_key(ctx: &ExecContext, job: &ScheduledJob) -> Option<CacheKey> {
    if job.spec.cache_files.is_empty() && !job.spec.hash_source {
        return None;
    }

    let mut consumed = Vec::with_capacity(job.inputs.len());
    for input in &job.inputs {
        match ctx.artifacts.get_artifact(job.run_id, &input.job, &input.name) {
            Ok(artifact) => consumed.push((
                format!("{}/{}", input.job, input.name),
                artifact.content_hash.clone(),
            )),
            Err(e) => {
                warn!(job = %job.name, error = %e, "consumed artifact unavailable; running uncached");
                return None;
            }
        }
    }

    let spec = Arc::clone(&job.spec);
    let settings = Arc::clone(&ctx.settings);
    let collected = tokio::task::spawn_blocking(move || CacheInputs::collect(&spec, &settings)).await;

    match collected {
        Ok(Ok(inputs)) => Some(CacheResolver::resolve(
            &job.name,
            &inputs.with_artifacts(consumed),
        )),
        Ok(Err(e)) => {
            warn!(job = %job.name, error = %e, "could not hash cache inputs; running uncached");
            None
        }
        Err(e) => {
            warn!(job = %job.name, error = %e, "cache input hashing panicked; running uncached");
            None
        }
    }
}

fn cached_outputs(ctx: &ExecContext, job: &ScheduledJob, key: &CacheKey) -> Option<Outputs> {
    let payload = ctx.cache.lookup(key)?;
    match unpack_outputs(&payload) {
        Ok(outputs) => {
            let complete = job
                .spec
                .produces
                .iter()
                .all(|name| outputs.iter().any(|(n, _)| n == name));
            if complete {
                Some(outputs)
            } else {
                warn!(job = %job.name, key = %key, "cached outputs incomplete; rebuilding");
                None
            }
        }
        Err(e) => {
            warn!(job = %job.name, key = %key, error = %e, "unreadable cache entry; rebuilding");
            None
        }
    }
}

/// Build and passthrough jobs: reuse cached outputs or run, then stage
/// the declared outputs as artifacts.
async fn run_producing(
    ctx: &ExecContext,
    job: &ScheduledJob,
    cancel: &CancelToken,
) -> Result<JobResult> {
    let key = cache_key(ctx, job).await;
    if let Some(outputs) = key.as_ref().and_then(|k| cached_outputs(ctx, job, k)) {
        info!(job = %job.name, run_id = job.run_id, "reusing cached outputs");
        stage_outputs(ctx, job, outputs)?;
        return Ok(JobResult::Success);
    }

    let ws = Workspace::prepare(ctx, job).await?;
    let result = produce(ctx, job, cancel, &ws).await;
    ws.cleanup().await;

    let outputs = match result? {
        Ok(outputs) => outputs,
        Err(failed) => return Ok(failed),
    };

    if let Some(key) = &key {
        match pack_outputs(&outputs) {
            Ok(bundle) => ctx.cache.store(&job.name, key, &bundle),
            Err(e) => warn!(job = %job.name, key = %key, error = %e, "could not bundle outputs for the cache"),
        }
    }
    stage_outputs(ctx, job, outputs)?;
    Ok(JobResult::Success)
}

/// Runs the job in its workspace. The inner `Err` is a job failure.
async fn produce(
    ctx: &ExecContext,
    job: &ScheduledJob,
    cancel: &CancelToken,
    ws: &Workspace,
) -> Result<std::result::Result<Outputs, JobResult>> {
    stage_inputs(ctx, job, ws).await?;
    let toolchain = toolchain_pin(ctx, job);

    let (exit_code, diagnostics, files) = match job.spec.action {
        JobAction::Build => {
            let out = ctx
                .producer
                .build(BuildRequest {
                    run_id: job.run_id,
                    job: job.name.clone(),
                    platform: job.spec.platform.clone(),
                    source_ref: job.event.short_ref().to_string(),
                    commit: job.event.commit.clone(),
                    source_root: ctx.settings.source_root.clone(),
                    out_dir: ws.out_dir.clone(),
                    publishing: job.publishing,
                    toolchain,
                    cancel: cancel.clone(),
                })
                .await?;
            (out.exit_code, out.diagnostics, out.artifacts)
        }
        _ => {
            let cmd = job
                .spec
                .cmd
                .clone()
                .ok_or_else(|| anyhow!("passthrough job '{}' has no cmd", job.name))?;
            let mut env = job_env(
                job.run_id,
                &job.name,
                &job.spec.platform,
                job.event.short_ref(),
                &job.event.commit,
                job.publishing,
            );
            env.push(("SHIPDAG_OUT_DIR".into(), ws.out_dir.display().to_string()));
            env.push(("SHIPDAG_ARTIFACT_DIR".into(), ws.in_dir.display().to_string()));
            if let Some(pin) = toolchain {
                env.push(("SHIPDAG_TOOLCHAIN".into(), pin));
            }

            let shell = ShellCommand {
                job: job.name.clone(),
                cmd,
                cwd: ctx.settings.source_root.clone(),
                env,
            };
            let out = run_shell(&shell, cancel).await?;
            let files: Vec<(String, PathBuf)> = job
                .spec
                .produces
                .iter()
                .map(|name| (name.clone(), ws.out_dir.join(name)))
                .filter(|(_, path)| path.is_file())
                .collect();
            let code = if out.cancelled { None } else { out.exit_code };
            (code, out.output, files)
        }
    };

    if exit_code != Some(0) {
        return Ok(Err(JobResult::failed(exit_code, diagnostics)));
    }

    let mut outputs = Vec::with_capacity(job.spec.produces.len());
    for name in &job.spec.produces {
        let Some((_, path)) = files.iter().find(|(n, _)| n == name) else {
            return Ok(Err(JobResult::failed(
                exit_code,
                format!("job did not produce declared artifact '{name}'\n{diagnostics}"),
            )));
        };
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading output {:?}", path))?;
        outputs.push((name.clone(), Payload::new(bytes)));
    }

    Ok(Ok(outputs))
}

/// Write outputs to the artifact store, attesting them when they may be
/// published (or when configured to attest regardless).
fn stage_outputs(ctx: &ExecContext, job: &ScheduledJob, outputs: Outputs) -> Result<()> {
    let publishable = job.spec.publish_capable && job.publishing;
    let attest = publishable || (job.spec.publish_capable && ctx.settings.attest_when_not_publishing);

    for (name, payload) in outputs {
        let attestation = match (&ctx.attestor, attest) {
            (Some(attestor), true) => {
                let meta = ProvenanceMetadata {
                    run_id: job.run_id,
                    job: job.name.clone(),
                    artifact: name.clone(),
                    platform: job.spec.platform.clone(),
                    source_ref: job.event.short_ref().to_string(),
                    commit: job.event.commit.clone(),
                };
                Some(attestor.bundle(&payload, &meta)?)
            }
            (None, true) => {
                warn!(job = %job.name, artifact = %name, "no signing key configured; artifact left unattested");
                None
            }
            (_, false) => None,
        };

        ctx.artifacts.put_with(
            job.run_id,
            &job.name,
            &name,
            payload,
            PutOptions {
                publishable,
                attestation,
            },
        )?;
    }
    Ok(())
}

async fn run_test(ctx: &ExecContext, job: &ScheduledJob, cancel: &CancelToken) -> Result<JobResult> {
    let out = ctx
        .tests
        .test(TestRequest {
            run_id: job.run_id,
            job: job.name.clone(),
            platform: job.spec.platform.clone(),
            source_ref: job.event.short_ref().to_string(),
            commit: job.event.commit.clone(),
            source_root: ctx.settings.source_root.clone(),
            publishing: job.publishing,
            toolchain: toolchain_pin(ctx, job),
            cancel: cancel.clone(),
        })
        .await?;

    if out.succeeded() {
        Ok(JobResult::Success)
    } else {
        Ok(JobResult::failed(out.exit_code, out.report))
    }
}

async fn run_release(ctx: &ExecContext, job: &ScheduledJob) -> Result<JobResult> {
    if !job.publishing {
        info!(job = %job.name, run_id = job.run_id, "run is not publishing; release gate has nothing to do");
        return Ok(JobResult::Success);
    }

    let gate = ReleaseGate::new(ctx.artifacts.clone(), Arc::clone(&ctx.releases));
    let run_id = job.run_id;
    let release_id = job.event.short_ref().to_string();
    let outcome = tokio::task::spawn_blocking(move || gate.run(run_id, &release_id))
        .await
        .context("release gate task failed")?;

    match outcome {
        Ok(outcome) => {
            info!(job = %job.name, run_id, release = %job.event.short_ref(), %outcome, "release gate passed");
            Ok(JobResult::Success)
        }
        Err(e) => Ok(JobResult::failed(None, e.to_string())),
    }
}

fn toolchain_pin(ctx: &ExecContext, job: &ScheduledJob) -> Option<String> {
    let name = job.spec.toolchain.as_deref()?;
    ctx.settings
        .toolchain_pin(name)
        .map(|pin| format!("{name}={pin}"))
}
