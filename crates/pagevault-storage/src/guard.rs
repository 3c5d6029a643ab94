//! Circuit breaker around a key-value store
//!
//! A dead store otherwise costs every request a full store timeout. After
//! `failure_threshold` consecutive unavailability errors the guard opens and
//! fails fast until `reset_timeout` has passed, then lets a single trial call
//! through. A call dropped before it completes, as when an outer timeout
//! cancels it, counts as a failure.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pagevault_core::{CacheError, KvStore, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Closed,
    Open(Instant),
    /// A trial call is in flight
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: State,
    failures: u32,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<Inner>>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Closed,
                failures: 0,
            })),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }

    /// Check if a call may go to the store
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => true,
            State::Open(opened_at) if opened_at.elapsed() >= self.reset_timeout => {
                inner.state = State::HalfOpen;
                true
            }
            State::Open(_) | State::HalfOpen => false,
        }
    }

    pub fn report_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = State::Closed;
        inner.failures = 0;
    }

    pub fn report_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => {
                inner.failures += 1;
                if inner.failures >= self.failure_threshold {
                    tracing::warn!(failures = inner.failures, "store guard opened");
                    inner.state = State::Open(Instant::now());
                }
            }
            State::HalfOpen => {
                tracing::warn!("store trial call failed, guard reopened");
                inner.state = State::Open(Instant::now());
            }
            State::Open(_) => {}
        }
    }

    /// Release a half-open trial call that ended without a verdict
    fn report_neutral(&self) {
        let mut inner = self.inner.lock();
        if inner.state == State::HalfOpen {
            inner.state = State::Closed;
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.lock().state, State::Open(_))
    }
}

/// A [`KvStore`] that stops calling its inner store while it is failing
#[derive(Debug, Clone)]
pub struct GuardedStore<S> {
    inner: S,
    breaker: CircuitBreaker,
}

impl<S: KvStore> GuardedStore<S> {
    pub fn new(inner: S, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(failure_threshold, reset_timeout),
        }
    }

    /// Wrap with 5 failures / 30 seconds
    pub fn with_defaults(inner: S) -> Self {
        Self::new(inner, 5, Duration::from_secs(30))
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn admit(&self) -> Result<Call<'_>> {
        if self.breaker.allow_request() {
            Ok(Call {
                breaker: &self.breaker,
                settled: false,
            })
        } else {
            Err(CacheError::Connection(format!(
                "{} store guard is open",
                self.inner.name()
            )))
        }
    }
}

/// An admitted store call; dropping it unsettled reports a failure
struct Call<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Call<'_> {
    fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        self.settled = true;
        match &result {
            Ok(_) => self.breaker.report_success(),
            Err(e) if e.is_unavailable() => self.breaker.report_failure(),
            Err(_) => self.breaker.report_neutral(),
        }
        result
    }
}

impl Drop for Call<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!("store call dropped before completing");
            self.breaker.report_failure();
        }
    }
}

#[async_trait]
impl<S: KvStore> KvStore for GuardedStore<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let call = self.admit()?;
        call.finish(self.inner.get(key).await)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let call = self.admit()?;
        call.finish(self.inner.set(key, value, ttl).await)
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let call = self.admit()?;
        call.finish(self.inner.add(key, value, ttl).await)
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let call = self.admit()?;
        call.finish(self.inner.increment(key, delta).await)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let call = self.admit()?;
        call.finish(self.inner.delete(key).await)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
