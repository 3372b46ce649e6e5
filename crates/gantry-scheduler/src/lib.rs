//! Pipeline scheduling and orchestration for Gantry.

pub mod dag;
pub mod scheduler;
pub mod triggers;

pub use dag::{DagError, JobGraph};
pub use scheduler::{JobExecutor, Scheduler, SchedulerConfig};
pub use triggers::{TriggerEvent, TriggerMatcher};
