//! Middleware stack for the API

pub mod layers;
pub mod metrics;
pub mod request_id;

pub use layers::{body_limit, compression, cors};
pub use metrics::metrics_middleware;
pub use request_id::request_id_middleware;
