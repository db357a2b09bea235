//! # Tessera Worker
//!
//! The worker runtime: a long-lived process that consumes jobs from one
//! orchestrator queue, invokes user logic, and reports lifecycle
//! transitions back to the cluster manager. The worker keeps its own
//! status mirror, which is the source of truth for its `get_status`
//! endpoint and is written before every cluster callback.

pub mod error;
pub mod http;
pub mod processor;
pub mod runtime;
pub mod status;

pub use error::{WorkerError, WorkerResult};
pub use http::{serve_worker, worker_router, WorkerServer};
pub use processor::WorkerProcessor;
pub use runtime::WorkerRuntime;
pub use status::LocalStatus;
