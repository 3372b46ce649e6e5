//! Run conditions as a tagged expression AST.
//!
//! Conditions are declarative data, not interpolated strings. They are
//! evaluated lazily against the run's state immediately before a job is
//! dispatched, because predicates like [`Condition::JobFailed`] depend on
//! runtime status unknown at graph-build time.

use crate::pattern;
use crate::pipeline::TriggerKind;
use crate::run::JobStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Run regardless of dependency outcomes (cleanup jobs).
    Always,
    Never,
    /// The named job reached `success` (or was skipped).
    JobSucceeded(String),
    /// The named job reached `failure`.
    JobFailed(String),
    /// The run's branch matches a glob pattern.
    Branch(String),
    /// The run was started by this kind of trigger event.
    Event(TriggerKind),
    Not(Box<Condition>),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

/// Snapshot of run state a condition is evaluated against.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub branch: Option<String>,
    pub event: Option<TriggerKind>,
    pub job_status: HashMap<String, JobStatus>,
}

impl Condition {
    pub fn evaluate(&self, ctx: &RunContext) -> bool {
        match self {
            Condition::Always => true,
            Condition::Never => false,
            Condition::JobSucceeded(name) => matches!(
                ctx.job_status.get(name),
                Some(JobStatus::Success) | Some(JobStatus::Skipped)
            ),
            Condition::JobFailed(name) => {
                matches!(ctx.job_status.get(name), Some(JobStatus::Failure))
            }
            Condition::Branch(pattern) => ctx
                .branch
                .as_deref()
                .is_some_and(|b| pattern::glob_match(pattern, b)),
            Condition::Event(kind) => ctx.event == Some(*kind),
            Condition::Not(inner) => !inner.evaluate(ctx),
            Condition::All(inner) => inner.iter().all(|c| c.evaluate(ctx)),
            Condition::Any(inner) => inner.iter().any(|c| c.evaluate(ctx)),
        }
    }
}
