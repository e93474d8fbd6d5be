// src/config/validate.rs

use std::collections::{BTreeMap, HashMap, HashSet};

use globset::Glob;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{
    parse_duration, ConfigFile, JobAction, JobConfig, RawConfigFile, TriggerRule,
};
use crate::errors::{Result, ShipdagError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ShipdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.toolchain, raw.job))
    }
}

/// Static checks run once, before any run starts:
/// - at least one job, sane `[config]` values
/// - `after` references exist and are not self-references
/// - per-action requirements (`cmd`, release trigger, toolchain pins)
/// - the dependency graph is acyclic
/// - artifact names are unique and every consumed artifact is produced
///   upstream
/// - no job depends on a job that some of its triggering events skip
fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_jobs(cfg)?;
    validate_global_config(cfg)?;
    validate_job_dependencies(cfg)?;
    validate_job_actions(cfg)?;
    validate_dag(cfg)?;
    validate_artifacts(cfg)?;
    validate_trigger_reachability(cfg)?;
    Ok(())
}

fn ensure_has_jobs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.is_empty() {
        return Err(ShipdagError::ConfigError(
            "pipeline must contain at least one [job.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.default_branch.trim().is_empty() {
        return Err(ShipdagError::ConfigError(
            "[config].default_branch must not be empty".to_string(),
        ));
    }

    Glob::new(&cfg.config.release_tag_pattern).map_err(|e| {
        ShipdagError::ConfigError(format!(
            "[config].release_tag_pattern '{}' is not a valid glob: {}",
            cfg.config.release_tag_pattern, e
        ))
    })?;

    parse_duration(&cfg.config.cancel_grace_period).map_err(|e| {
        ShipdagError::ConfigError(format!("[config].cancel_grace_period: {e}"))
    })?;

    Ok(())
}

fn validate_job_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, job) in cfg.job.iter() {
        for dep in job.after.iter() {
            if !cfg.job.contains_key(dep) {
                return Err(ShipdagError::ConfigError(format!(
                    "job '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(ShipdagError::ConfigError(format!(
                    "job '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_job_actions(cfg: &RawConfigFile) -> Result<()> {
    for (name, job) in cfg.job.iter() {
        match (job.action, job.cmd.as_deref()) {
            (JobAction::Passthrough, None) => {
                return Err(ShipdagError::ConfigError(format!(
                    "passthrough job '{}' needs a `cmd`",
                    name
                )));
            }
            (JobAction::Passthrough, Some(_)) => {}
            (_, Some(_)) => {
                return Err(ShipdagError::ConfigError(format!(
                    "job '{}' sets `cmd`, which only passthrough jobs use",
                    name
                )));
            }
            (_, None) => {}
        }

        if job.action == JobAction::Release && job.trigger != TriggerRule::Release {
            return Err(ShipdagError::ConfigError(format!(
                "release job '{}' must use trigger = \"release\"",
                name
            )));
        }

        if job.action == JobAction::Release && !job.produces.is_empty() {
            return Err(ShipdagError::ConfigError(format!(
                "release job '{}' cannot produce artifacts",
                name
            )));
        }

        if let Some(pin) = job.toolchain.as_deref() {
            if !cfg.toolchain.contains_key(pin) {
                return Err(ShipdagError::ConfigError(format!(
                    "job '{}' refers to unknown toolchain pin '{}'",
                    name, pin
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> job. For `[job.B] after = ["A"]` we add A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.job.keys() {
        graph.add_node(name.as_str());
    }

    for (name, job) in cfg.job.iter() {
        for dep in job.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(ShipdagError::DagCycle(format!(
                "cycle detected in job DAG involving job '{}'",
                node
            )))
        }
    }
}

fn validate_artifacts(cfg: &RawConfigFile) -> Result<()> {
    let mut producers: HashMap<&str, &str> = HashMap::new();
    for (name, job) in cfg.job.iter() {
        for artifact in job.produces.iter() {
            if let Some(previous) = producers.insert(artifact.as_str(), name.as_str()) {
                return Err(ShipdagError::ConfigError(format!(
                    "artifact '{}' is produced by both '{}' and '{}'",
                    artifact, previous, name
                )));
            }
        }
    }

    for (name, job) in cfg.job.iter() {
        let upstream = ancestors_of(&cfg.job, name);
        for artifact in job.consumes.iter() {
            let produced_upstream = producers
                .get(artifact.as_str())
                .is_some_and(|producer| upstream.contains(*producer));
            if !produced_upstream {
                return Err(ShipdagError::UnproducedArtifact {
                    job: name.clone(),
                    artifact: artifact.clone(),
                });
            }
        }
    }

    Ok(())
}

fn validate_trigger_reachability(cfg: &RawConfigFile) -> Result<()> {
    for (name, job) in cfg.job.iter() {
        let wanted = job.trigger.event_classes();
        for dep in job.after.iter() {
            let available = cfg.job[dep].trigger.event_classes();
            if wanted.iter().any(|class| !available.contains(class)) {
                return Err(ShipdagError::UnreachableDependency {
                    job: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Transitive dependencies of `name`. Assumes references are valid and the
/// graph is acyclic (checked earlier).
pub(crate) fn ancestors_of<'a>(
    jobs: &'a BTreeMap<String, JobConfig>,
    name: &str,
) -> HashSet<&'a str> {
    let mut seen: HashSet<&'a str> = HashSet::new();
    let mut stack: Vec<&'a str> = jobs
        .get(name)
        .map(|j| j.after.iter().map(String::as_str).collect())
        .unwrap_or_default();

    while let Some(dep) = stack.pop() {
        if !seen.insert(dep) {
            continue;
        }
        if let Some(job) = jobs.get(dep) {
            stack.extend(job.after.iter().map(String::as_str));
        }
    }

    seen
}
