// src/config/builtin.rs

//! The wheel pipeline shipdag runs when no pipeline file is given.
//!
//! test -> container image
//! test -> build-<platform> -> smoke-<platform> -> release

pub const WHEEL_PIPELINE: &str = r#"
[config]
default_branch = "main"
release_tag_pattern = "v*"
superseded_run_behaviour = "cancel"
cancel_grace_period = "30s"
build_cmd = "docker/build-entrypoint.sh build"
test_cmd = "docker/build-entrypoint.sh test"

[toolchain]
python = "3.11"
cmake = "3.28"
rust = "1.80"

[job.test]
action = "test"
platform = "linux-x86_64"
toolchain = "python"
cache_files = ["pyproject.toml", "requirements-dev.txt"]

[job.image]
action = "passthrough"
cmd = "docker/build-entrypoint.sh image"
platform = "linux-x86_64"
after = ["test"]
publish_capable = true
cache_files = ["docker/Dockerfile", ".dockerignore"]

[job.build-linux-x86_64]
action = "build"
platform = "linux-x86_64"
after = ["test"]
produces = ["wheel-linux-x86_64"]
publish_capable = true
toolchain = "cmake"
cache_files = ["docker/config.cmake", "CMakeLists.txt"]
hash_source = true

[job.build-macos-arm64]
action = "build"
platform = "macos-arm64"
after = ["test"]
produces = ["wheel-macos-arm64"]
publish_capable = true
toolchain = "cmake"
cache_files = ["docker/config.cmake", "CMakeLists.txt"]
hash_source = true

[job.build-windows-x86_64]
action = "build"
platform = "windows-x86_64"
after = ["test"]
produces = ["wheel-windows-x86_64"]
publish_capable = true
toolchain = "cmake"
cache_files = ["docker/config.cmake", "CMakeLists.txt"]
hash_source = true

[job.smoke-linux-x86_64]
action = "passthrough"
cmd = "docker/build-entrypoint.sh smoke \"$SHIPDAG_ARTIFACT_DIR\""
platform = "linux-x86_64"
after = ["build-linux-x86_64"]
consumes = ["wheel-linux-x86_64"]

[job.smoke-macos-arm64]
action = "passthrough"
cmd = "docker/build-entrypoint.sh smoke \"$SHIPDAG_ARTIFACT_DIR\""
platform = "macos-arm64"
after = ["build-macos-arm64"]
consumes = ["wheel-macos-arm64"]

[job.smoke-windows-x86_64]
action = "passthrough"
cmd = "docker/build-entrypoint.sh smoke \"$SHIPDAG_ARTIFACT_DIR\""
platform = "windows-x86_64"
after = ["build-windows-x86_64"]
consumes = ["wheel-windows-x86_64"]

[job.release]
action = "release"
trigger = "release"
after = ["image", "smoke-linux-x86_64", "smoke-macos-arm64", "smoke-windows-x86_64"]
"#;

#[cfg(test)]
mod tests {
    use crate::config::load_builtin;

    #[test]
    fn builtin_pipeline_validates() {
        let cfg = load_builtin().expect("built-in pipeline must be valid");
        assert!(cfg.jobs().contains_key("release"));
        assert_eq!(cfg.jobs()["release"].after.len(), 4);
        assert_eq!(cfg.toolchain()["python"], "3.11");
    }
}
