//! Background services: lifecycle, promises, worker pools, deduplication.
//!
//! The layering, leaf to root:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     AlgorithmService                         │
//! │  submit(resource) -> Promise; dedups by content fingerprint  │
//! ├──────────────────────────┬──────────────────────────────────┤
//! │        Lifecycle         │            WorkerPool             │
//! │  start/stop/status       │  N workers, credit admission      │
//! └──────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! An [`AlgorithmService`] composes a [`Lifecycle`] (the start/stop state
//! machine) with a [`WorkerPool`] (bounded parallel execution) and tracks one
//! [`Promise`] per in-flight content fingerprint so duplicate submissions
//! share a single computation.

mod algorithm_service;
mod error;
mod lifecycle;
mod promise;
mod status;
mod worker_pool;

pub use algorithm_service::AlgorithmService;
pub use error::ServiceError;
pub use lifecycle::Lifecycle;
pub use promise::{promise_pair, Promise, PromiseFulfiller};
pub use status::ServiceStatus;
pub use worker_pool::{JobCompletion, WorkerPool};
