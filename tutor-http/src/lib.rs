//! Tutor HTTP API Server
//!
//! Exposes the answer pipeline of `tutor-core` as `POST /ask`, plus health,
//! status and conversation history endpoints and the OpenAPI docs.

pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{AppState, ServerConfig, build_app, start_server};
