// src/dag/pipeline.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::model::ConfigFile;
use crate::dag::graph::DagGraph;
use crate::dag::job_info::{ArtifactInput, JobSpec};
use crate::types::JobName;

/// The static job table of a validated pipeline: graph plus job specs.
///
/// Built once at startup and shared (`Arc`) by every run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    graph: DagGraph,
    jobs: BTreeMap<JobName, Arc<JobSpec>>,
    /// artifact name -> producing job
    producers: HashMap<String, JobName>,
}

impl Pipeline {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let graph = DagGraph::from_config(cfg);
        let mut jobs = BTreeMap::new();
        let mut producers = HashMap::new();

        for (name, jc) in cfg.jobs().iter() {
            for artifact in jc.produces.iter() {
                producers.insert(artifact.clone(), name.clone());
            }
            jobs.insert(name.clone(), Arc::new(JobSpec::from_config(name.clone(), jc)));
        }

        Self {
            graph,
            jobs,
            producers,
        }
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn job(&self, name: &str) -> Option<&Arc<JobSpec>> {
        self.jobs.get(name)
    }

    /// Job specs sorted by name.
    pub fn jobs(&self) -> impl Iterator<Item = &Arc<JobSpec>> {
        self.jobs.values()
    }

    /// Job names in topological order.
    pub fn topological_order(&self) -> impl Iterator<Item = &str> {
        self.graph.jobs()
    }

    pub fn producer_of(&self, artifact: &str) -> Option<&str> {
        self.producers.get(artifact).map(String::as_str)
    }

    /// Resolve a job's `consumes` list into `(producer, artifact)` pairs.
    pub fn inputs_of(&self, spec: &JobSpec) -> Vec<ArtifactInput> {
        spec.consumes
            .iter()
            .filter_map(|name| {
                self.producer_of(name).map(|job| ArtifactInput {
                    job: job.to_string(),
                    name: name.clone(),
                })
            })
            .collect()
    }
}
