use thiserror::Error;

/// Construction-time service failures.
///
/// Runtime algorithm failures never surface here; they travel through the
/// data path as error-resources.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The requested algorithm key has no registry entry.
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// A pool was configured with zero workers.
    #[error("worker pool size must be at least 1 (got {0})")]
    InvalidPoolSize(usize),
}
