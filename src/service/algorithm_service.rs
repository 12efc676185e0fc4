//! Long-running algorithm service with submission deduplication.
//!
//! An [`AlgorithmService`] wires a [`Lifecycle`] to a [`WorkerPool`] and
//! deduplicates concurrent submissions by resource fingerprint: while a
//! resource is in flight, every further submission of an equal resource
//! joins the existing [`Promise`] instead of queuing more work. A notifier
//! task drains the pool's completion channel, fulfills promises, restores
//! admission credits and re-drains the pending queue.

use crate::algorithm::{AlgorithmFactory, AlgorithmRegistry};
use crate::config::{Device, PoolSize, ServiceSettings};
use crate::resource::{Fingerprint, Resource};
use crate::service::lifecycle::Lifecycle;
use crate::service::promise::{promise_pair, Promise, PromiseFulfiller};
use crate::service::status::ServiceStatus;
use crate::service::worker_pool::{JobCompletion, WorkerPool};
use crate::service::ServiceError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct InFlightEntry {
    fulfiller: PromiseFulfiller,
    promise: Promise,
}

/// A background service running one algorithm over a bounded worker pool.
pub struct AlgorithmService {
    public_name: String,
    description: String,
    pool_size: usize,
    device: Device,
    factory: Arc<dyn AlgorithmFactory>,
    lifecycle: Lifecycle,
    /// Present only while Running; recreated on each start.
    pool: StdMutex<Option<Arc<WorkerPool>>>,
    in_flight: Mutex<HashMap<Fingerprint, InFlightEntry>>,
    notifier: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AlgorithmService {
    /// Builds a service from settings, resolving the algorithm through the
    /// registry.
    pub fn from_settings(
        settings: &ServiceSettings,
        registry: &AlgorithmRegistry,
    ) -> Result<Self, ServiceError> {
        if let PoolSize::Fixed(0) = settings.workers {
            return Err(ServiceError::InvalidPoolSize(0));
        }
        let entry = registry
            .get(&settings.algorithm)
            .ok_or_else(|| ServiceError::UnknownAlgorithm(settings.algorithm.clone()))?;

        Self::from_factory(
            &settings.public_name,
            &settings.description,
            settings.workers.resolve(),
            settings.device,
            Arc::clone(&entry.factory),
        )
    }

    /// Builds a service around an explicit algorithm factory.
    pub fn from_factory(
        public_name: impl Into<String>,
        description: impl Into<String>,
        pool_size: usize,
        device: Device,
        factory: Arc<dyn AlgorithmFactory>,
    ) -> Result<Self, ServiceError> {
        if pool_size == 0 {
            return Err(ServiceError::InvalidPoolSize(0));
        }
        Ok(Self {
            public_name: public_name.into(),
            description: description.into(),
            pool_size,
            device,
            factory,
            lifecycle: Lifecycle::new(),
            pool: StdMutex::new(None),
            in_flight: Mutex::new(HashMap::new()),
            notifier: StdMutex::new(None),
        })
    }

    pub fn public_name(&self) -> &str {
        &self.public_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ServiceStatus {
        self.lifecycle.status()
    }

    /// Starts the worker pool and the notifier task. No-op when the service
    /// is already Running or Stopping; fully restartable after a stop.
    pub fn start(self: &Arc<Self>) {
        let Some(token) = self.lifecycle.begin_start() else {
            debug!(service = %self.public_name, "Start ignored: service already active");
            return;
        };

        let (pool, completion_rx) =
            WorkerPool::new(self.pool_size, self.device, Arc::clone(&self.factory));
        let pool = Arc::new(pool);
        {
            let mut slot = self.pool.lock().expect("pool lock poisoned");
            *slot = Some(Arc::clone(&pool));
        }

        let service = Arc::clone(self);
        let handle =
            tokio::spawn(async move { service.notifier_loop(pool, completion_rx, token).await });
        {
            let mut notifier = self.notifier.lock().expect("notifier lock poisoned");
            *notifier = Some(handle);
        }

        info!(
            service = %self.public_name,
            pool_size = self.pool_size,
            device = %self.device,
            "Service started"
        );
    }

    /// Requests a stop. With `wait_for_finish` the call returns only after
    /// the notifier has terminated the pool and the status reads Stopped.
    /// No-op when already Stopped.
    pub async fn stop(&self, wait_for_finish: bool) {
        self.lifecycle.request_stop();
        if wait_for_finish {
            self.lifecycle.wait_until_stopped().await;
        }
    }

    /// Submits a resource for processing and returns a promise for its
    /// result.
    ///
    /// Submissions with a fingerprint already in flight join the existing
    /// promise; no extra work is queued and every duplicate submitter
    /// observes the same result value. When the service is not running the
    /// returned promise is already fulfilled with an error-resource.
    pub async fn submit(&self, resource: Resource, extra: Option<Value>) -> Promise {
        let pool = {
            let slot = self.pool.lock().expect("pool lock poisoned");
            slot.clone()
        };
        let Some(pool) = pool else {
            warn!(
                service = %self.public_name,
                resource = resource.id(),
                "Submission rejected: service is not running"
            );
            let (fulfiller, promise) = promise_pair();
            fulfiller.fulfill(Resource::error("service is not running"));
            return promise;
        };

        let fingerprint = resource.fingerprint();
        let promise = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(entry) = in_flight.get(&fingerprint) {
                debug!(
                    service = %self.public_name,
                    %fingerprint,
                    "Duplicate submission joined in-flight job"
                );
                return entry.promise.clone();
            }
            let (fulfiller, promise) = promise_pair();
            in_flight.insert(
                fingerprint.clone(),
                InFlightEntry {
                    fulfiller,
                    promise: promise.clone(),
                },
            );
            promise
        };

        debug!(service = %self.public_name, %fingerprint, "New job accepted");
        pool.submit_for_processing(resource, extra);
        pool.dispatch_pending();

        // A stop can tear the pool down between the slot read above and the
        // enqueue; such a job will never complete, so fail its promise now
        // instead of leaving a stale entry for the next start to dedup onto.
        let torn_down = {
            let slot = self.pool.lock().expect("pool lock poisoned");
            !slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, &pool))
        };
        if torn_down {
            let entry = {
                let mut in_flight = self.in_flight.lock().await;
                in_flight.remove(&fingerprint)
            };
            if let Some(entry) = entry {
                entry
                    .fulfiller
                    .fulfill(Resource::error("service is not running"));
            }
        }
        promise
    }

    /// Drains completions and the cancellation token until stop.
    async fn notifier_loop(
        self: Arc<Self>,
        pool: Arc<WorkerPool>,
        mut completion_rx: mpsc::UnboundedReceiver<JobCompletion>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                maybe = completion_rx.recv() => match maybe {
                    Some(completion) => self.handle_completion(&pool, completion).await,
                    None => break,
                },
                _ = token.cancelled() => break,
            }
        }

        // Joining worker threads can take one full algorithm execution, so
        // keep it off the async workers.
        let closing = Arc::clone(&pool);
        let _ = tokio::task::spawn_blocking(move || closing.terminate()).await;
        {
            let mut slot = self.pool.lock().expect("pool lock poisoned");
            *slot = None;
        }
        self.fail_abandoned_jobs().await;
        self.lifecycle.mark_stopped();
        info!(service = %self.public_name, "Service stopped");
    }

    /// Fails every promise still registered when the service stops.
    ///
    /// Waiters unblock with an error-resource instead of hanging, and the
    /// next start sees a clean dedup map: a resubmission of equal content
    /// must run fresh, not join a dead entry.
    async fn fail_abandoned_jobs(&self) {
        let abandoned: Vec<InFlightEntry> = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.drain().map(|(_, entry)| entry).collect()
        };
        if abandoned.is_empty() {
            return;
        }

        warn!(
            service = %self.public_name,
            count = abandoned.len(),
            "Failing promises abandoned by service stop"
        );
        for entry in abandoned {
            entry
                .fulfiller
                .fulfill(Resource::error("service stopped before the job completed"));
        }
    }

    async fn handle_completion(&self, pool: &WorkerPool, completion: JobCompletion) {
        let fingerprint = completion.resource.fingerprint();
        let entry = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.remove(&fingerprint)
        };

        match entry {
            Some(entry) => {
                debug!(
                    service = %self.public_name,
                    %fingerprint,
                    elapsed_ms = completion.elapsed.as_millis() as u64,
                    failed = completion.result.is_error(),
                    "Job completed"
                );
                entry.fulfiller.fulfill(completion.result);
            }
            None => {
                warn!(
                    service = %self.public_name,
                    %fingerprint,
                    "Completion without a registered promise; discarding"
                );
            }
        }

        pool.release_credit();
        pool.dispatch_pending();
    }
}

impl std::fmt::Debug for AlgorithmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmService")
            .field("public_name", &self.public_name)
            .field("pool_size", &self.pool_size)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{Algorithm, AlgorithmError};
    use image::RgbaImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowEcho {
        executions: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl Algorithm for SlowEcho {
        fn name(&self) -> &str {
            "slow-echo"
        }
        fn description(&self) -> &str {
            "echoes after a delay"
        }
        fn is_processable(&self, _resource: &Resource) -> bool {
            true
        }
        fn process(&self, resource: &Resource) -> Result<Resource, AlgorithmError> {
            std::thread::sleep(self.delay);
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(Resource::new(format!("echo {}", resource.id()), resource.uri())
                .with_metadata(serde_json::json!({"echoed": true})))
        }
    }

    fn echo_service(delay: Duration) -> (Arc<AlgorithmService>, Arc<AtomicUsize>) {
        let executions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&executions);
        let factory = Arc::new(move |_device: Device| {
            Box::new(SlowEcho {
                executions: Arc::clone(&counter),
                delay,
            }) as Box<dyn Algorithm>
        });
        let service =
            AlgorithmService::from_factory("echo", "test echo service", 2, Device::Cpu, factory)
                .expect("valid service");
        (Arc::new(service), executions)
    }

    fn pixels(seed: u8) -> RgbaImage {
        RgbaImage::from_pixel(2, 2, image::Rgba([seed, seed, seed, 255]))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_and_wait_round_trip() {
        let (service, _) = echo_service(Duration::ZERO);
        service.start();

        let promise = service
            .submit(Resource::from_content("a", "/a.png", pixels(1)), None)
            .await;
        let result = promise.wait().await;

        assert_eq!(result.id(), "echo a");
        assert!(!result.is_error());
        service.stop(true).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_submissions_share_one_execution() {
        let (service, executions) = echo_service(Duration::from_millis(50));
        service.start();

        let resource = Resource::from_content("same", "/same.png", pixels(9));
        let mut promises = Vec::new();
        for _ in 0..8 {
            promises.push(service.submit(resource.clone(), None).await);
        }

        let mut ids = Vec::new();
        for promise in promises {
            ids.push(promise.wait().await.id().to_string());
        }

        assert!(ids.iter().all(|id| id == "echo same"));
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        service.stop(true).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_distinct_resources_each_execute() {
        let (service, executions) = echo_service(Duration::ZERO);
        service.start();

        let first = service
            .submit(Resource::from_content("a", "/a.png", pixels(1)), None)
            .await;
        let second = service
            .submit(Resource::from_content("b", "/b.png", pixels(2)), None)
            .await;

        first.wait().await;
        second.wait().await;
        assert_eq!(executions.load(Ordering::SeqCst), 2);
        service.stop(true).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_while_stopped_yields_error_resource() {
        let (service, executions) = echo_service(Duration::ZERO);

        let promise = service
            .submit(Resource::from_content("a", "/a.png", pixels(1)), None)
            .await;
        let result = promise.wait().await;

        assert!(result.is_error());
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restart_after_stop() {
        let (service, _) = echo_service(Duration::ZERO);

        service.start();
        service.stop(true).await;
        assert_eq!(service.status(), ServiceStatus::Stopped);

        service.start();
        assert_eq!(service.status(), ServiceStatus::Running);

        let result = service
            .submit(Resource::from_content("a", "/a.png", pixels(3)), None)
            .await
            .wait()
            .await;
        assert_eq!(result.id(), "echo a");
        service.stop(true).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_fails_abandoned_promises_and_clears_dedup_map() {
        let (service, _) = echo_service(Duration::from_millis(300));
        service.start();

        let resource = Resource::from_content("same", "/same.png", pixels(5));
        let promise = service.submit(resource.clone(), None).await;

        // Stop while the job is mid-flight; the waiter must unblock with an
        // error-resource instead of hanging on a dead fulfiller.
        service.stop(true).await;
        let abandoned = tokio::time::timeout(Duration::from_secs(2), promise.wait())
            .await
            .expect("abandoned promise never resolved");
        assert!(abandoned.is_error());

        // A resubmission of equal content after restart must run fresh
        // rather than joining a stale in-flight entry.
        service.start();
        let promise = service.submit(resource, None).await;
        let result = tokio::time::timeout(Duration::from_secs(2), promise.wait())
            .await
            .expect("resubmission after restart never resolved");
        assert_eq!(result.id(), "echo same");

        service.stop(true).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_double_start_is_noop() {
        let (service, _) = echo_service(Duration::ZERO);
        service.start();
        service.start();
        assert_eq!(service.status(), ServiceStatus::Running);
        service.stop(true).await;
    }

    #[test]
    fn test_from_settings_rejects_unknown_algorithm() {
        let registry = AlgorithmRegistry::new();
        let settings = ServiceSettings::new("missing", "Missing");
        let err = AlgorithmService::from_settings(&settings, &registry).unwrap_err();
        assert!(matches!(err, ServiceError::UnknownAlgorithm(key) if key == "missing"));
    }

    #[test]
    fn test_from_settings_rejects_zero_workers() {
        let registry = AlgorithmRegistry::new();
        let settings = ServiceSettings::new("any", "Any").with_workers(PoolSize::Fixed(0));
        let err = AlgorithmService::from_settings(&settings, &registry).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidPoolSize(0)));
    }
}
