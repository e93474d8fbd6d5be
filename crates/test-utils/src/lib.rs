pub mod builders;
pub mod fakes;

use std::path::Path;
use std::sync::{Arc, Once};

use shipdag::artifact::ArtifactStore;
use shipdag::cache::{CacheResolver, MemoryCacheStore};
use shipdag::config::{ConfigFile, Settings};
use shipdag::exec::ExecContext;
use shipdag::release::{LocalAttestor, MemoryReleaseStore};
use tracing_subscriber::{fmt, EnvFilter};

use crate::fakes::{FakeBuildProducer, FakeTestRunner};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// An `ExecContext` wired to in-memory stores and fake collaborators, plus
/// handles to inspect them.
pub struct FakeContext {
    pub ctx: Arc<ExecContext>,
    pub artifacts: ArtifactStore,
    pub cache: Arc<MemoryCacheStore>,
    pub releases: Arc<MemoryReleaseStore>,
    pub producer: Arc<FakeBuildProducer>,
    pub tests: Arc<FakeTestRunner>,
}

impl FakeContext {
    pub fn new(cfg: &ConfigFile, source_root: &Path) -> Self {
        Self::with_fakes(cfg, source_root, FakeBuildProducer::new(), FakeTestRunner::new())
    }

    pub fn with_fakes(
        cfg: &ConfigFile,
        source_root: &Path,
        producer: FakeBuildProducer,
        tests: FakeTestRunner,
    ) -> Self {
        let settings = Settings::from_config(cfg, source_root).expect("valid settings");
        let artifacts = ArtifactStore::new();
        let cache = Arc::new(MemoryCacheStore::new());
        let releases = Arc::new(MemoryReleaseStore::new());
        let producer = Arc::new(producer);
        let tests = Arc::new(tests);

        let ctx = Arc::new(ExecContext {
            settings: Arc::new(settings),
            artifacts: artifacts.clone(),
            cache: CacheResolver::new(cache.clone()),
            producer: producer.clone(),
            tests: tests.clone(),
            attestor: Some(Arc::new(LocalAttestor::new("test-signing-key"))),
            releases: releases.clone(),
        });

        Self {
            ctx,
            artifacts,
            cache,
            releases,
            producer,
            tests,
        }
    }

    /// Same stores and fakes, but no signing key.
    pub fn without_attestor(mut self) -> Self {
        let mut ctx = (*self.ctx).clone();
        ctx.attestor = None;
        self.ctx = Arc::new(ctx);
        self
    }
}
