//! Job submission and execution.
//!
//! Core components:
//! - `model`: ids, media types, on-disk layout, derived status
//! - `store`: filesystem-backed job directories (get, list, cleanup)
//! - `ids`: id allocation (in-memory or persisted `last` file)
//! - `queue`: FIFO of admitted jobs
//! - `admission`: directory creation and queue-depth limit
//! - `config_builder`: forced Taurus settings over the submitted document
//! - `executor`: runs `bzt` and captures its output
//! - `worker`: single loop executing one job at a time
//! - `service`: owns all of the above; what the HTTP layer calls

pub mod admission;
pub mod config_builder;
pub mod executor;
pub mod ids;
pub mod model;
pub mod queue;
pub mod service;
pub mod store;
pub mod worker;

pub use model::{JobId, JobStatus, MediaType};
pub use service::JobService;
pub use worker::WorkerHandle;
