// src/exec/mod.rs

//! Job execution layer.
//!
//! This module is responsible for actually running job actions and
//! reporting back to the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the main loop which manages job tasks and
//!   cancellation with a grace period.
//! - [`job_runner`] runs one job and reports its completion.
//! - [`actions`] implements build, test, passthrough and release actions.
//! - [`producer`] defines the build producer and test runner capabilities
//!   and their command-backed implementations.
//! - [`process`] runs shell commands with captured output.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod actions;
pub mod backend;
pub mod cancel;
pub mod context;
pub mod executor_loop;
pub mod job_runner;
pub mod process;
pub mod producer;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use context::ExecContext;
pub use executor_loop::{spawn_executor, ExecutorCommand};
pub use producer::{
    BoxFuture, BuildOutput, BuildProducer, BuildRequest, CommandBuildProducer, CommandTestRunner,
    TestOutput, TestRequest, TestRunner,
};
