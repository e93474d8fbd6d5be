// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::ConfigFile;
use crate::types::JobName;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct dependencies: jobs that must succeed before this one can run.
    deps: Vec<JobName>,
    /// Direct dependents: jobs that depend on this one.
    dependents: Vec<JobName>,
}

/// In-memory DAG keyed by job name.
///
/// Acyclicity is already checked in `config::validate`; here we keep
/// adjacency information plus a precomputed topological order.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<JobName, DagNode>,
    order: Vec<JobName>,
}

impl DagGraph {
    /// Build a DAG from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut nodes: HashMap<JobName, DagNode> = HashMap::new();

        for (name, job) in cfg.jobs().iter() {
            nodes.insert(
                name.clone(),
                DagNode {
                    deps: job.after.clone(),
                    dependents: Vec::new(),
                },
            );
        }

        // Iterate the config (sorted) rather than the HashMap so dependents
        // lists have a stable order.
        for (name, job) in cfg.jobs().iter() {
            for dep in job.after.iter() {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(name.clone());
                }
            }
        }

        let order = topological_order(cfg);
        Self { nodes, order }
    }

    /// All job names in topological order (dependencies first).
    pub fn jobs(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate dependencies of a job (the jobs listed in its `after`).
    pub fn dependencies_of(&self, name: &str) -> &[JobName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a job (jobs that list this one in `after`).
    pub fn dependents_of(&self, name: &str) -> &[JobName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}

fn topological_order(cfg: &ConfigFile) -> Vec<JobName> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in cfg.jobs().keys() {
        graph.add_node(name.as_str());
    }
    for (name, job) in cfg.jobs().iter() {
        for dep in job.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => order.into_iter().map(str::to_string).collect(),
        // Unreachable for a validated config; fall back to name order.
        Err(_) => cfg.jobs().keys().cloned().collect(),
    }
}
