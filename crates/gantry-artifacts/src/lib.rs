//! Artifact storage for Gantry.
//!
//! Artifacts are named blobs owned by the run that produced them, packed as
//! plain tar archives and stored behind the [`gantry_core::ports::BlobStore`]
//! contract. Any durable backend works; a filesystem store ships here.

pub mod archive;
pub mod fs;
pub mod store;

pub use fs::FilesystemStore;
pub use store::{Artifact, ArtifactStore};
