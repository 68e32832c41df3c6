//! Domain layer for the image upscaler service.
//!
//! Pure types, validation, and boundary conversions shared by the engine,
//! pipeline, and API crates. Has no dependency on other workspace crates.

pub mod codec;
pub mod error;
pub mod job_events;
pub mod naming;
pub mod progress;
pub mod raster;
pub mod types;
pub mod validation;
