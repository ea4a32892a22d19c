//! Taurus API: queued, single-flight execution of Taurus load tests.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
