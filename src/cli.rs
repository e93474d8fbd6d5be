// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `shipdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "shipdag",
    version,
    about = "Run the build/test/release job graph for one CI event.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to a pipeline file (TOML).
    ///
    /// If omitted, the built-in wheel pipeline is used.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Event kind: push, pull_request, tag or manual.
    ///
    /// Unrecognised kinds are accepted and make no job eligible.
    #[arg(long, value_name = "KIND", default_value = "push")]
    pub event: String,

    /// Git ref of the event (branch, tag, or PR target branch).
    #[arg(long = "ref", value_name = "REF", default_value = "main")]
    pub git_ref: String,

    /// Commit the event points at.
    #[arg(long, value_name = "SHA", default_value = "HEAD")]
    pub commit: String,

    /// Source checkout used for cache keys and as the working directory of
    /// commands. Defaults to the directory containing the config file.
    #[arg(long, value_name = "DIR")]
    pub source_root: Option<String>,

    /// Directory of the cross-run cache.
    #[arg(long, value_name = "DIR", default_value = ".shipdag/cache")]
    pub cache_dir: String,

    /// Directory of the long-lived release store.
    #[arg(long, value_name = "DIR", default_value = ".shipdag/releases")]
    pub release_dir: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SHIPDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the pipeline, print the DAG and eligibility for the event,
    /// but don't execute any jobs.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
