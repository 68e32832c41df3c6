//! Job orchestration: multi-stage pipelines, the job registry, artifact
//! storage, and the bounded job runner tying them together.

pub mod error;
pub mod registry;
pub mod runner;
pub mod stages;
pub mod storage;

pub use error::{PipelineError, StorageError};
pub use registry::{JobRecord, JobRegistry, JobStatus};
pub use runner::{JobRequest, JobResult, JobRunner, JobRunnerConfig};
pub use stages::PipelineRunner;
pub use storage::{ArtifactHandle, ArtifactStore, LocalArtifactStore};
