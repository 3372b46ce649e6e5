//! Pipeline definition types.
//!
//! These types represent the user-authored pipeline YAML document. They are
//! immutable once loaded; everything runtime-mutable lives in [`crate::run`].

use crate::condition::Condition;
use crate::secrets::SecretReference;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub triggers: Vec<TriggerRule>,
    /// Environment shared by every job in the pipeline.
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub jobs: Vec<JobDefinition>,
    /// Maximum number of jobs running at once. Unrestricted when absent.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl PipelineDefinition {
    /// Parse a pipeline definition from a YAML document.
    pub fn from_yaml(input: &str) -> crate::Result<Self> {
        let definition: Self = serde_yaml::from_str(input)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Structural validation that does not require the job graph.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::InvalidPipeline(
                "pipeline name must not be empty".to_string(),
            ));
        }
        for job in &self.jobs {
            if job.steps.is_empty() {
                return Err(crate::Error::InvalidPipeline(format!(
                    "job '{}' has no steps",
                    job.name
                )));
            }
            for step in &job.steps {
                match (&step.run, &step.uses) {
                    (Some(_), Some(_)) => {
                        return Err(crate::Error::InvalidPipeline(format!(
                            "step '{}' in job '{}' sets both 'run' and 'uses'",
                            step.name, job.name
                        )));
                    }
                    (None, None) => {
                        return Err(crate::Error::InvalidPipeline(format!(
                            "step '{}' in job '{}' sets neither 'run' nor 'uses'",
                            step.name, job.name
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    pub fn job(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

/// A rule deciding whether an incoming event starts a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRule {
    pub event: TriggerKind,
    /// Branch glob patterns; empty matches every branch.
    #[serde(default)]
    pub branches: Vec<String>,
    /// Five-field cron expression, required for `schedule` triggers.
    #[serde(default)]
    pub cron: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Push,
    PullRequest,
    Manual,
    Schedule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Names of jobs that must reach a terminal state before this one starts.
    #[serde(default)]
    pub needs: Vec<String>,
    /// Evaluated lazily, immediately before dispatch. When absent, the job
    /// runs only if every required dependency succeeded.
    #[serde(default, rename = "if")]
    pub condition: Option<Condition>,
    /// An optional job's failure does not fail the run or block dependents.
    #[serde(default)]
    pub optional: bool,
    /// Runner label the dispatching worker must carry.
    #[serde(default)]
    pub runs_on: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub secrets: Vec<SecretReference>,
    #[serde(default = "default_job_timeout")]
    pub timeout_minutes: u64,
    pub steps: Vec<StepDefinition>,
}

fn default_job_timeout() -> u64 {
    60
}

/// One step of a job: a shell command or a reusable action reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    /// Shell command, mutually exclusive with `uses`.
    #[serde(default)]
    pub run: Option<String>,
    /// Reusable action reference, e.g. `artifact/upload`.
    #[serde(default)]
    pub uses: Option<String>,
    /// Flat configuration mapping passed to the action.
    #[serde(default)]
    pub with: HashMap<String, String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Keep executing later steps if this one fails. The job still ends
    /// `failure` unless the failure is also ignored.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Do not let this step's failure affect the job status.
    #[serde(default)]
    pub ignore_failure: bool,
    #[serde(default = "default_step_timeout")]
    pub timeout_minutes: u64,
}

fn default_step_timeout() -> u64 {
    30
}

impl StepDefinition {
    /// A failing step tolerated in any form lets the job keep going.
    pub fn tolerates_failure(&self) -> bool {
        self.continue_on_error || self.ignore_failure
    }
}
