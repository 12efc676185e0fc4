//! Single-assignment result handles.
//!
//! A [`Promise`] hands a not-yet-computed [`Resource`] to one or many
//! callers. Every clone observes the identical fulfilled value, and waiting
//! on an already fulfilled promise never blocks. Fulfillment consumes the
//! [`PromiseFulfiller`], so a second assignment is impossible by
//! construction.

use crate::resource::Resource;
use tokio::sync::watch;

/// Creates a linked fulfiller/promise pair.
pub fn promise_pair() -> (PromiseFulfiller, Promise) {
    let (tx, rx) = watch::channel(None);
    (PromiseFulfiller { tx }, Promise { rx })
}

/// Read side: a cloneable, blocking-read handle to a future resource.
#[derive(Clone)]
pub struct Promise {
    rx: watch::Receiver<Option<Resource>>,
}

impl Promise {
    /// Waits for fulfillment and returns the resource.
    ///
    /// May be called any number of times on any clone; every call returns an
    /// equal value. If the fulfiller is dropped without fulfilling (the
    /// owning service was torn down), an error-resource is returned instead
    /// of hanging forever.
    pub async fn wait(&self) -> Resource {
        let mut rx = self.rx.clone();
        // Clone the value out before the channel ref is released.
        let fulfilled = rx.wait_for(|slot| slot.is_some()).await.map(|slot| slot.clone());
        match fulfilled {
            Ok(Some(resource)) => resource,
            Ok(None) | Err(_) => {
                Resource::error("promise abandoned: owning service was terminated")
            }
        }
    }

    /// Returns the fulfilled resource without waiting, if available.
    pub fn try_get(&self) -> Option<Resource> {
        self.rx.borrow().clone()
    }

    /// Returns true once the promise has been fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("fulfilled", &self.is_fulfilled())
            .finish()
    }
}

/// Write side: fulfills the linked promise exactly once.
pub struct PromiseFulfiller {
    tx: watch::Sender<Option<Resource>>,
}

impl PromiseFulfiller {
    /// Fulfills the promise, waking every waiter.
    pub fn fulfill(self, resource: Resource) {
        let _ = self.tx.send(Some(resource));
    }
}

impl std::fmt::Debug for PromiseFulfiller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseFulfiller").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_wait_returns_fulfilled_value() {
        let (fulfiller, promise) = promise_pair();
        fulfiller.fulfill(Resource::new("done", "/r.png"));

        let resource = promise.wait().await;
        assert_eq!(resource.id(), "done");
    }

    #[tokio::test]
    async fn test_wait_blocks_until_fulfilled() {
        let (fulfiller, promise) = promise_pair();

        let waiter = tokio::spawn(async move { promise.wait().await });

        sleep(Duration::from_millis(20)).await;
        fulfiller.fulfill(Resource::new("late", "/r.png"));

        let resource = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait timed out")
            .unwrap();
        assert_eq!(resource.id(), "late");
    }

    #[tokio::test]
    async fn test_repeated_wait_returns_same_value() {
        let (fulfiller, promise) = promise_pair();
        fulfiller.fulfill(Resource::new("value", "/r.png"));

        let first = promise.wait().await;
        let second = promise.wait().await;
        assert_eq!(first.id(), second.id());
        assert_eq!(first.uri(), second.uri());
    }

    #[tokio::test]
    async fn test_all_clones_observe_identical_value() {
        let (fulfiller, promise) = promise_pair();
        let clones: Vec<Promise> = (0..5).map(|_| promise.clone()).collect();

        let waiters: Vec<_> = clones
            .into_iter()
            .map(|p| tokio::spawn(async move { p.wait().await }))
            .collect();

        fulfiller.fulfill(Resource::new("shared", "/r.png"));

        for waiter in waiters {
            let resource = timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter timed out")
                .unwrap();
            assert_eq!(resource.id(), "shared");
        }
    }

    #[tokio::test]
    async fn test_try_get() {
        let (fulfiller, promise) = promise_pair();
        assert!(promise.try_get().is_none());
        assert!(!promise.is_fulfilled());

        fulfiller.fulfill(Resource::new("x", "/x.png"));
        assert!(promise.is_fulfilled());
        assert_eq!(promise.try_get().unwrap().id(), "x");
    }

    #[tokio::test]
    async fn test_dropped_fulfiller_yields_error_resource() {
        let (fulfiller, promise) = promise_pair();
        drop(fulfiller);

        let resource = timeout(Duration::from_secs(1), promise.wait())
            .await
            .expect("wait timed out");
        assert!(resource.is_error());
    }
}
