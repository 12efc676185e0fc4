//! Algorithm contract and worker-side execution wrapper.
//!
//! An [`Algorithm`] is a black box mapping one input [`Resource`] to a result
//! resource. Algorithms are expensive to construct (they load a model), so a
//! worker pool instantiates each one exactly once per worker through an
//! [`AlgorithmFactory`] and keeps it alive for the worker's lifetime.
//!
//! Failures never cross the worker boundary as errors: [`run_algorithm`]
//! converts every failure path into an error-resource flowing through the
//! normal completion channel.

mod registry;

pub use registry::{AlgorithmEntry, AlgorithmRegistry};

use crate::config::Device;
use crate::resource::Resource;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Error returned by an algorithm's processing step.
///
/// This type only exists inside a worker; [`run_algorithm`] converts it into
/// an error-resource before the result leaves the worker.
#[derive(Debug, Error)]
pub enum AlgorithmError {
    /// The algorithm's internal model rejected or failed on the input.
    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    /// The input resource kind is not handled by this algorithm.
    #[error("resource type is not admitted by the algorithm")]
    NotProcessable,

    /// The input resource had no loaded content to analyze.
    #[error("resource was empty; cannot analyze an unloaded resource")]
    EmptyResource,
}

/// A stateful analysis algorithm applied to resources.
///
/// Implementations hold loaded model state and are owned by exactly one
/// worker thread, so they only need `Send`, not `Sync`.
pub trait Algorithm: Send {
    /// Short machine name, lower case with underscores.
    fn name(&self) -> &str;

    /// Human description, useful for reports and service listings.
    fn description(&self) -> &str;

    /// Whether this algorithm can process the given resource.
    fn is_processable(&self, resource: &Resource) -> bool;

    /// Applies the algorithm, producing a result resource with metadata set.
    fn process(&self, resource: &Resource) -> Result<Resource, AlgorithmError>;
}

/// Constructs algorithm instances, one per worker.
pub trait AlgorithmFactory: Send + Sync {
    fn create(&self, device: Device) -> Box<dyn Algorithm>;
}

impl<F> AlgorithmFactory for F
where
    F: Fn(Device) -> Box<dyn Algorithm> + Send + Sync,
{
    fn create(&self, device: Device) -> Box<dyn Algorithm> {
        self(device)
    }
}

/// The outcome of one algorithm execution: the result resource and the time
/// the processing step took.
#[derive(Clone, Debug)]
pub struct ProcessOutcome {
    pub resource: Resource,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    fn failure(message: String) -> Self {
        Self {
            resource: Resource::error(message),
            elapsed: Duration::ZERO,
        }
    }
}

/// Runs an algorithm against a resource, capturing every failure as data.
///
/// Checks admission (`is_processable`, loaded content) before processing and
/// catches panics from the algorithm's internals, so the worker loop survives
/// any input. Successful results get a derived uri built from the input uri
/// and the algorithm name.
pub fn run_algorithm(algorithm: &dyn Algorithm, resource: &Resource) -> ProcessOutcome {
    if !algorithm.is_processable(resource) {
        return ProcessOutcome::failure(AlgorithmError::NotProcessable.to_string());
    }

    if !resource.is_loaded() {
        return ProcessOutcome::failure(AlgorithmError::EmptyResource.to_string());
    }

    let start = Instant::now();
    let processed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        algorithm.process(resource)
    }));

    match processed {
        Ok(Ok(result)) => {
            let elapsed = start.elapsed();
            debug!(
                algorithm = algorithm.name(),
                resource_id = resource.id(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Algorithm finished"
            );
            let result = rewrite_result_uri(result, resource, algorithm.name());
            ProcessOutcome {
                resource: result,
                elapsed,
            }
        }
        Ok(Err(err)) => ProcessOutcome::failure(err.to_string()),
        Err(panic) => {
            let message = panic_message(&panic);
            ProcessOutcome::failure(format!("algorithm panicked: {message}"))
        }
    }
}

/// Derives the result uri: the parent path with the algorithm name appended.
fn rewrite_result_uri(result: Resource, input: &Resource, algorithm_name: &str) -> Resource {
    let uri = input.uri();
    let derived = match uri.rsplit_once('/') {
        Some((path, file)) => format!("{path}_{algorithm_name}/{file}"),
        None => format!("{uri}_{algorithm_name}"),
    };

    let mut rewritten = Resource::new(result.id().to_string(), derived);
    if let Some(metadata) = result.metadata() {
        rewritten = rewritten.with_metadata(metadata.clone());
    }
    rewritten
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
