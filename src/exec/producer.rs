// src/exec/producer.rs

//! Build producer and test runner capabilities.
//!
//! The scheduler never looks inside a build: it hands a [`BuildRequest`] to
//! whatever [`BuildProducer`] is configured and inspects the exit code and
//! declared outputs. The command-backed implementations run the configured
//! `build_cmd` / `test_cmd` through the shell.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::{Context, Result, anyhow};

use crate::exec::cancel::CancelToken;
use crate::exec::process::{run_shell, ShellCommand};
use crate::types::RunId;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a build gets to know about the job it runs for.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub run_id: RunId,
    pub job: String,
    pub platform: String,
    pub source_ref: String,
    pub commit: String,
    pub source_root: PathBuf,
    /// Where the build must leave its outputs.
    pub out_dir: PathBuf,
    pub publishing: bool,
    /// `name=version` of the job's toolchain pin, if any.
    pub toolchain: Option<String>,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub exit_code: Option<i32>,
    /// `(artifact name, file)` pairs.
    pub artifacts: Vec<(String, PathBuf)>,
    pub diagnostics: String,
}

impl BuildOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct TestRequest {
    pub run_id: RunId,
    pub job: String,
    pub platform: String,
    pub source_ref: String,
    pub commit: String,
    pub source_root: PathBuf,
    pub publishing: bool,
    pub toolchain: Option<String>,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone, Default)]
pub struct TestOutput {
    pub exit_code: Option<i32>,
    pub report: String,
}

impl TestOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Compiles native artifacts for one platform.
///
/// Implementations should watch `request.cancel` and return early; the
/// executor aborts builds that ignore it after the grace period.
pub trait BuildProducer: Send + Sync {
    fn build(&self, request: BuildRequest) -> BoxFuture<'_, Result<BuildOutput>>;
}

/// Runs the test suite against the source tree.
pub trait TestRunner: Send + Sync {
    fn test(&self, request: TestRequest) -> BoxFuture<'_, Result<TestOutput>>;
}

/// `SHIPDAG_*` environment shared by every command a job runs.
pub(crate) fn job_env(
    run_id: RunId,
    job: &str,
    platform: &str,
    source_ref: &str,
    commit: &str,
    publishing: bool,
) -> Vec<(String, String)> {
    vec![
        ("SHIPDAG_RUN_ID".into(), run_id.to_string()),
        ("SHIPDAG_JOB".into(), job.to_string()),
        ("SHIPDAG_PLATFORM".into(), platform.to_string()),
        ("SHIPDAG_SOURCE_REF".into(), source_ref.to_string()),
        ("SHIPDAG_COMMIT".into(), commit.to_string()),
        ("SHIPDAG_PUBLISH".into(), if publishing { "1" } else { "0" }.into()),
    ]
}

/// Runs `build_cmd`; every regular file left in `SHIPDAG_OUT_DIR` is an
/// output, named after the file.
#[derive(Debug, Clone)]
pub struct CommandBuildProducer {
    cmd: Option<String>,
}

impl CommandBuildProducer {
    pub fn new(cmd: Option<String>) -> Self {
        Self { cmd }
    }
}

impl BuildProducer for CommandBuildProducer {
    fn build(&self, request: BuildRequest) -> BoxFuture<'_, Result<BuildOutput>> {
        Box::pin(async move {
            let cmd = self
                .cmd
                .clone()
                .ok_or_else(|| anyhow!("no [config].build_cmd configured for build jobs"))?;

            let mut env = job_env(
                request.run_id,
                &request.job,
                &request.platform,
                &request.source_ref,
                &request.commit,
                request.publishing,
            );
            env.push((
                "SHIPDAG_OUT_DIR".into(),
                request.out_dir.display().to_string(),
            ));
            if let Some(pin) = &request.toolchain {
                env.push(("SHIPDAG_TOOLCHAIN".into(), pin.clone()));
            }

            let shell = ShellCommand {
                job: request.job.clone(),
                cmd,
                cwd: request.source_root.clone(),
                env,
            };
            let out = run_shell(&shell, &request.cancel).await?;

            let artifacts = if out.success {
                list_outputs(&request.out_dir).await?
            } else {
                Vec::new()
            };

            Ok(BuildOutput {
                exit_code: out.exit_code,
                artifacts,
                diagnostics: out.output,
            })
        })
    }
}

async fn list_outputs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut outputs = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("listing build outputs in {:?}", dir))?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        outputs.push((name, entry.path()));
    }
    outputs.sort();
    Ok(outputs)
}

/// Runs `test_cmd` in the source tree.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    cmd: Option<String>,
}

impl CommandTestRunner {
    pub fn new(cmd: Option<String>) -> Self {
        Self { cmd }
    }
}

impl TestRunner for CommandTestRunner {
    fn test(&self, request: TestRequest) -> BoxFuture<'_, Result<TestOutput>> {
        Box::pin(async move {
            let cmd = self
                .cmd
                .clone()
                .ok_or_else(|| anyhow!("no [config].test_cmd configured for test jobs"))?;

            let mut env = job_env(
                request.run_id,
                &request.job,
                &request.platform,
                &request.source_ref,
                &request.commit,
                request.publishing,
            );
            if let Some(pin) = &request.toolchain {
                env.push(("SHIPDAG_TOOLCHAIN".into(), pin.clone()));
            }

            let shell = ShellCommand {
                job: request.job.clone(),
                cmd,
                cwd: request.source_root.clone(),
                env,
            };
            let out = run_shell(&shell, &request.cancel).await?;

            Ok(TestOutput {
                exit_code: out.exit_code,
                report: out.output,
            })
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_producer_reports_files_left_in_out_dir() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let producer = CommandBuildProducer::new(Some(
            "printf wheel > \"$SHIPDAG_OUT_DIR/wheel-$SHIPDAG_PLATFORM\"".to_string(),
        ));
        let output = producer
            .build(BuildRequest {
                run_id: 1,
                job: "build".into(),
                platform: "linux".into(),
                source_ref: "main".into(),
                commit: "abc".into(),
                source_root: src.path().to_path_buf(),
                out_dir: out.path().to_path_buf(),
                publishing: true,
                toolchain: None,
                cancel: CancelToken::never(),
            })
            .await
            .unwrap();

        assert!(output.succeeded());
        assert_eq!(output.artifacts.len(), 1);
        assert_eq!(output.artifacts[0].0, "wheel-linux");
    }

    #[tokio::test]
    async fn missing_command_is_an_error() {
        let runner = CommandTestRunner::new(None);
        let err = runner
            .test(TestRequest {
                run_id: 1,
                job: "test".into(),
                platform: "linux".into(),
                source_ref: "main".into(),
                commit: "abc".into(),
                source_root: std::env::temp_dir(),
                publishing: false,
                toolchain: None,
                cancel: CancelToken::never(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("test_cmd"));
    }
}
