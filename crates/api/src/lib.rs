//! Image upscaler HTTP / WebSocket server library.
//!
//! Exposes config, state, error handling, routes and the progress socket so
//! integration tests and the binary entrypoint share the same building blocks.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
