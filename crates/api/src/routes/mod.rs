//! Route tables. Handlers live in [`crate::handlers`] and [`crate::ws`].
//!
//! ```text
//! GET    /                   -> health::root
//! GET    /health             -> health::health_check
//! GET    /models             -> health::list_models
//! POST   /upscale            -> jobs::upscale
//! GET    /job/{job_id}       -> jobs::get_job
//! DELETE /job/{job_id}       -> jobs::delete_job
//! GET    /download/{job_id}  -> jobs::download
//! GET    /ws/{job_id}        -> ws::ws_handler
//! ```

pub mod health;
pub mod jobs;
pub mod ws;
