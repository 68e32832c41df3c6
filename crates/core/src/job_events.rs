//! WebSocket message type constants for job progress events.
//!
//! Used by the progress broadcaster when serialising events for
//! subscribers of a single job.

/// Progress update during job execution (fraction + message).
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Job completed successfully.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed with an error.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Message reported when a job starts processing.
pub const MESSAGE_STARTING: &str = "Starting upscale…";

/// Message reported when a job completes.
pub const MESSAGE_COMPLETED: &str = "Image upscaled successfully!";
