//! DAG resolution for job dependencies.

use gantry_core::ids::JobId;
use gantry_core::pipeline::{JobDefinition, PipelineDefinition};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DagError {
    #[error("Cycle detected in job dependencies")]
    CycleDetected,
    #[error("Unknown job dependency: {0}")]
    UnknownDependency(String),
    #[error("Duplicate job name: {0}")]
    DuplicateJob(String),
    #[error("Empty pipeline")]
    EmptyPipeline,
}

/// A node in the job DAG.
#[derive(Debug, Clone)]
pub struct JobNode {
    pub id: JobId,
    pub name: String,
    pub definition: JobDefinition,
}

/// Directed acyclic graph of job dependencies, edges pointing from a
/// dependency to its dependents.
#[derive(Debug)]
pub struct JobGraph {
    graph: DiGraph<JobNode, ()>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl JobGraph {
    /// Build the graph from a pipeline definition, validating `needs`
    /// references and rejecting cycles.
    pub fn build(pipeline: &PipelineDefinition) -> Result<Self, DagError> {
        if pipeline.jobs.is_empty() {
            return Err(DagError::EmptyPipeline);
        }

        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for job in &pipeline.jobs {
            if name_to_index.contains_key(&job.name) {
                return Err(DagError::DuplicateJob(job.name.clone()));
            }
            let node = JobNode {
                id: JobId::new(&job.name),
                name: job.name.clone(),
                definition: job.clone(),
            };
            let idx = graph.add_node(node);
            name_to_index.insert(job.name.clone(), idx);
        }

        for job in &pipeline.jobs {
            let job_idx = name_to_index[&job.name];
            for dep in &job.needs {
                let dep_idx = name_to_index
                    .get(dep)
                    .ok_or_else(|| DagError::UnknownDependency(dep.clone()))?;
                graph.add_edge(*dep_idx, job_idx, ());
            }
        }

        let dag = JobGraph {
            graph,
            name_to_index,
        };

        // Verify no cycles
        dag.topological_order()?;

        Ok(dag)
    }

    /// Jobs with no dependencies.
    pub fn roots(&self) -> Vec<&JobNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .count()
                    == 0
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Jobs that may become ready once the given job completes.
    pub fn successors(&self, job_name: &str) -> Vec<&JobNode> {
        self.name_to_index
            .get(job_name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Outgoing)
                    .filter_map(|n| self.graph.node_weight(n))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Jobs that must complete before the given job can run.
    pub fn predecessors(&self, job_name: &str) -> Vec<&JobNode> {
        self.name_to_index
            .get(job_name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .filter_map(|n| self.graph.node_weight(n))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Topologically sorted jobs.
    pub fn topological_order(&self) -> Result<Vec<&JobNode>, DagError> {
        toposort(&self.graph, None)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx))
                    .collect()
            })
            .map_err(|_| DagError::CycleDetected)
    }

    /// All jobs.
    pub fn jobs(&self) -> Vec<&JobNode> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Whether every dependency of the job is in the satisfied set.
    pub fn is_ready(&self, job_name: &str, satisfied: &HashSet<String>) -> bool {
        self.predecessors(job_name)
            .iter()
            .all(|pred| satisfied.contains(&pred.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::pipeline::StepDefinition;
    use std::collections::HashMap;

    fn make_job(name: &str, needs: Vec<&str>) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            display_name: None,
            needs: needs.iter().map(|s| s.to_string()).collect(),
            condition: None,
            optional: false,
            runs_on: None,
            env: HashMap::new(),
            secrets: vec![],
            timeout_minutes: 60,
            steps: vec![StepDefinition {
                name: "noop".to_string(),
                run: Some("true".to_string()),
                uses: None,
                with: HashMap::new(),
                env: HashMap::new(),
                continue_on_error: false,
                ignore_failure: false,
                timeout_minutes: 30,
            }],
        }
    }

    fn make_pipeline(jobs: Vec<JobDefinition>) -> PipelineDefinition {
        PipelineDefinition {
            name: "test".to_string(),
            description: None,
            triggers: vec![],
            env: HashMap::new(),
            jobs,
            concurrency: None,
        }
    }

    #[test]
    fn test_linear_dag() {
        let pipeline = make_pipeline(vec![
            make_job("build", vec![]),
            make_job("test", vec!["build"]),
            make_job("deploy", vec!["test"]),
        ]);

        let dag = JobGraph::build(&pipeline).unwrap();

        let roots = dag.roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].name, "build");

        let order = dag.topological_order().unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0].name, "build");
    }

    #[test]
    fn test_diamond_dag() {
        let pipeline = make_pipeline(vec![
            make_job("build", vec![]),
            make_job("test", vec!["build"]),
            make_job("scan", vec!["build"]),
            make_job("push", vec!["test", "scan"]),
        ]);

        let dag = JobGraph::build(&pipeline).unwrap();
        assert_eq!(dag.successors("build").len(), 2);
        assert_eq!(dag.predecessors("push").len(), 2);
    }

    #[test]
    fn test_ready_set_gating() {
        let pipeline = make_pipeline(vec![
            make_job("build", vec![]),
            make_job("push", vec!["build", "scan"]),
            make_job("scan", vec!["build"]),
        ]);

        let dag = JobGraph::build(&pipeline).unwrap();
        let mut satisfied = HashSet::new();
        assert!(dag.is_ready("build", &satisfied));
        assert!(!dag.is_ready("push", &satisfied));

        satisfied.insert("build".to_string());
        assert!(dag.is_ready("scan", &satisfied));
        assert!(!dag.is_ready("push", &satisfied));

        satisfied.insert("scan".to_string());
        assert!(dag.is_ready("push", &satisfied));
    }

    #[test]
    fn test_cycle_detected() {
        // Cycle spanning three jobs; build order must not matter.
        for rotation in 0..3 {
            let mut jobs = vec![
                make_job("a", vec!["c"]),
                make_job("b", vec!["a"]),
                make_job("c", vec!["b"]),
            ];
            jobs.rotate_left(rotation);
            let err = JobGraph::build(&make_pipeline(jobs)).unwrap_err();
            assert!(matches!(err, DagError::CycleDetected));
        }
    }

    #[test]
    fn test_self_cycle() {
        let err =
            JobGraph::build(&make_pipeline(vec![make_job("a", vec!["a"])])).unwrap_err();
        assert!(matches!(err, DagError::CycleDetected));
    }

    #[test]
    fn test_unknown_dependency() {
        let err = JobGraph::build(&make_pipeline(vec![make_job("a", vec!["ghost"])]))
            .unwrap_err();
        assert!(matches!(err, DagError::UnknownDependency(ref d) if d == "ghost"));
    }

    #[test]
    fn test_duplicate_job() {
        let err = JobGraph::build(&make_pipeline(vec![
            make_job("a", vec![]),
            make_job("a", vec![]),
        ]))
        .unwrap_err();
        assert!(matches!(err, DagError::DuplicateJob(_)));
    }

    #[test]
    fn test_empty_pipeline() {
        let err = JobGraph::build(&make_pipeline(vec![])).unwrap_err();
        assert!(matches!(err, DagError::EmptyPipeline));
    }
}
