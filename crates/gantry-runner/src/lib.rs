//! Step execution engine for Gantry.
//!
//! Executes one job's steps strictly in order on a single worker:
//! shell commands through a [`gantry_core::ports::CommandWorker`], reusable
//! actions through the [`actions::ActionRegistry`]. Output is captured into
//! the per-job log with secrets masked; environment mutations accumulate
//! across steps of the same job and never leak outside it.

pub mod actions;
pub mod executor;
pub mod shell;

pub use actions::{ActionAdapter, ActionContext, ActionOutcome, ActionRegistry};
pub use executor::StepExecutor;
pub use shell::ShellWorker;
