//! Request handlers for API endpoints

pub mod batch;
pub mod metrics;

pub use batch::*;
pub use metrics::*;
