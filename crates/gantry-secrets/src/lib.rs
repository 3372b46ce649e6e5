//! Secret resolution for Gantry.
//!
//! Secrets are resolved once, at JobRun construction, into the job's
//! environment. Nothing here persists values or lets a job reach ambient
//! secret state at execution time.

pub mod manager;
pub mod providers;

pub use manager::{ResolvedSecrets, SecretManager};
pub use providers::{EnvProvider, StaticProvider};
