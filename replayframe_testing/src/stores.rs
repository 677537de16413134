//! Mock stores with fixed behaviour.

use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use replayframe::{
    framer::RequestBurst,
    mock::{MockStore, RecordedExchange, StoreError},
};

/// A store whose every lookup fails.
#[derive(Clone, Debug)]
pub struct FailingStore {
    message: &'static str,
}

impl FailingStore {
    /// Fail every lookup with `message`.
    #[must_use]
    pub fn new(message: &'static str) -> Self { Self { message } }
}

#[async_trait]
impl MockStore for FailingStore {
    async fn find_match(&self, _burst: &RequestBurst) -> Result<Option<RecordedExchange>, StoreError> {
        Err(StoreError::new(self.message))
    }
}

/// Wraps a store and records every burst it is asked about.
pub struct CountingStore<M> {
    inner: M,
    lookups: AtomicUsize,
    bursts: Mutex<Vec<RequestBurst>>,
}

impl<M: MockStore> CountingStore<M> {
    /// Count lookups made against `inner`.
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
            bursts: Mutex::new(Vec::new()),
        }
    }

    /// Number of lookups so far.
    #[must_use]
    pub fn lookups(&self) -> usize { self.lookups.load(Ordering::SeqCst) }

    /// Every burst looked up so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if a lookup panicked while recording its burst.
    #[must_use]
    pub fn bursts(&self) -> Vec<RequestBurst> { self.bursts.lock().expect("bursts poisoned").clone() }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &M { &self.inner }
}

#[async_trait]
impl<M: MockStore> MockStore for CountingStore<M> {
    async fn find_match(&self, burst: &RequestBurst) -> Result<Option<RecordedExchange>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.bursts.lock().expect("bursts poisoned").push(burst.clone());
        self.inner.find_match(burst).await
    }
}
