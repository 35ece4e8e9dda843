//! Route tables

pub mod batch;
pub mod metrics;
