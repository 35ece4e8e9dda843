//! Portico batch server
//!
//! Hosts the batch engine over HTTP:
//! - `POST /api/v1/batches` runs a list of Sub-Requests, independently or in one transaction
//! - Reference resource handlers over an in-memory store
//! - Prometheus metrics, structured logging and optional OTLP tracing

#![allow(
    clippy::type_complexity,         // Complex types are acceptable when they represent domain concepts
)]

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod request_context;
pub mod resources;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
