//! Core fixed-capacity object pool

use crate::config::{Destructor, PoolConfiguration};
use crate::errors::{CancelReason, ConfigError, PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics};

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

/// A pooled object that automatically returns to the pool when dropped
pub struct PooledObject<T> {
    value: Option<T>,
    pool: ObjectPool<T>,
}

impl<T> PooledObject<T> {
    fn new(value: T, pool: ObjectPool<T>) -> Self {
        Self {
            value: Some(value),
            pool,
        }
    }

    /// Take the inner value out of the guard without returning it
    ///
    /// The caller now holds custody and must hand the object back with
    /// [`ObjectPool::put`]; a pool being stopped waits for it.
    pub fn into_inner(mut self) -> T {
        self.value.take().expect("Value already taken")
    }
}

impl<T> Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("Value already taken")
    }
}

impl<T> DerefMut for PooledObject<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("Value already taken")
    }
}

impl<T> Drop for PooledObject<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.put(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledObject").field(&self.value).finish()
    }
}

/// Idle objects and blocked borrowers
///
/// `put` hands an object to the oldest live waiter before it ever reaches
/// `idle`, so `idle` is only non-empty while no one is waiting.
struct Slots<T> {
    /// Idle objects, longest idle first
    idle: VecDeque<T>,
    /// Blocked borrowers, longest waiting first
    waiters: VecDeque<oneshot::Sender<T>>,
    stopping: bool,
}

enum Checkout<T> {
    Ready(T),
    Wait(oneshot::Receiver<T>),
}

struct PoolInner<T> {
    slots: Mutex<Slots<T>>,
    /// Woken by `put` once stop has begun so the drain can collect returns
    returned: Notify,
    destructor: Option<Arc<Destructor<T>>>,
    metrics: MetricsTracker,
    capacity: usize,
}

impl<T> PoolInner<T> {
    fn destroy(&self, object: T) {
        if let Some(ref destructor) = self.destructor {
            destructor(object);
        }
        self.metrics.total_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    /// Give an object to the oldest live waiter, or park it as idle
    fn release(&self, mut object: T) {
        let mut slots = self.slots.lock();

        while let Some(waiter) = slots.waiters.pop_front() {
            match waiter.send(object) {
                Ok(()) => return,
                // That waiter gave up; try the next one.
                Err(unclaimed) => object = unclaimed,
            }
        }

        if slots.idle.len() >= self.capacity {
            drop(slots);
            tracing::warn!(
                capacity = self.capacity,
                "put on a pool with no borrowed objects, destroying surplus object"
            );
            self.destroy(object);
            return;
        }

        slots.idle.push_back(object);
        let stopping = slots.stopping;
        drop(slots);

        if stopping {
            self.returned.notify_one();
        }
    }

    fn checkout(&self) -> Option<Checkout<T>> {
        let mut slots = self.slots.lock();
        if slots.stopping {
            return None;
        }
        if let Some(object) = slots.idle.pop_front() {
            return Some(Checkout::Ready(object));
        }

        let (sender, receiver) = oneshot::channel();
        slots.waiters.push_back(sender);
        Some(Checkout::Wait(receiver))
    }

    fn forget_abandoned_waiters(&self) {
        self.slots.lock().waiters.retain(|waiter| !waiter.is_closed());
    }
}

/// A place in the waiter queue
///
/// Dropping it before the hand-off is observed withdraws from the queue; an
/// object that was handed over in the meantime is passed on to the next
/// waiter instead of being lost.
struct Waiter<'a, T> {
    receiver: oneshot::Receiver<T>,
    pool: &'a PoolInner<T>,
    settled: bool,
}

impl<T> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.receiver.close();
        match self.receiver.try_recv() {
            Ok(object) => self.pool.release(object),
            Err(_) => self.pool.forget_abandoned_waiters(),
        }
    }
}

/// Thread-safe object pool owning a fixed set of objects
///
/// All objects are built by [`ObjectPool::new`] and destroyed by
/// [`ObjectPool::stop`]; in between they cycle between idle and borrowed.
/// Cloning the pool is cheap and yields another handle to the same objects.
///
/// Dropping every handle without calling `stop` drops idle objects
/// without running the destructor.
///
/// # Examples
///
/// ```
/// use esox_fixedpool::{ObjectPool, PoolConfiguration};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let pool = ObjectPool::new(
///     PoolConfiguration::new()
///         .with_count(2)
///         .with_constructor(|| Ok::<_, std::io::Error>(Vec::<u8>::with_capacity(4096))),
/// )
/// .unwrap();
///
/// let mut buf = pool.get(&CancellationToken::new()).await.unwrap();
/// buf.extend_from_slice(b"hello");
/// buf.clear();
/// pool.put(buf);
///
/// pool.stop().await;
/// # }
/// ```
pub struct ObjectPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.inner.capacity)
            .field("idle", &self.idle_count())
            .field("borrowed", &self.borrowed_count())
            .field("waiting", &self.waiter_count())
            .field("stopping", &self.is_stopping())
            .finish()
    }
}

impl<T> ObjectPool<T> {
    /// Create a new pool and build all of its objects
    ///
    /// The configuration is validated before anything is allocated. If the
    /// constructor fails, the objects built so far are destroyed in the order
    /// they were built and [`PoolError::Creation`] is returned.
    pub fn new(config: PoolConfiguration<T>) -> PoolResult<Self> {
        config.validate()?;

        let PoolConfiguration {
            count,
            constructor,
            destructor,
        } = config;
        let constructor = constructor.ok_or(ConfigError::MissingConstructor)?;

        let mut idle = VecDeque::with_capacity(count);
        for built in 0..count {
            match constructor() {
                Ok(object) => idle.push_back(object),
                Err(source) => {
                    tracing::debug!(built, count, "object construction failed, rolling back");
                    for object in idle {
                        if let Some(ref destructor) = destructor {
                            destructor(object);
                        }
                    }
                    return Err(PoolError::Creation(source));
                }
            }
        }

        tracing::debug!(count, "object pool created");

        Ok(Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(Slots {
                    idle,
                    waiters: VecDeque::new(),
                    stopping: false,
                }),
                returned: Notify::new(),
                destructor,
                metrics: MetricsTracker::new(),
                capacity: count,
            }),
        })
    }

    /// Borrow an object, waiting until one is idle
    ///
    /// Idle objects are handed out oldest first and waiting callers are
    /// served in arrival order. The wait ends early with
    /// [`PoolError::Cancelled`] when `cancel` fires, or with
    /// [`PoolError::StoppingOrStopped`] once [`stop`](Self::stop) begins.
    /// When several of these are ready at once the winner is arbitrary.
    ///
    /// A token that is already cancelled fails without touching the pool.
    pub async fn get(&self, cancel: &CancellationToken) -> PoolResult<T> {
        if cancel.is_cancelled() {
            return Err(self.cancelled(CancelReason::Cancelled));
        }

        tokio::select! {
            result = self.acquire() => result,
            _ = cancel.cancelled() => Err(self.cancelled(CancelReason::Cancelled)),
        }
    }

    /// Borrow an object, giving up after `timeout`
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_fixedpool::{CancelReason, ObjectPool, PoolConfiguration, PoolError};
    /// use std::time::Duration;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let pool = ObjectPool::new(
    ///     PoolConfiguration::new()
    ///         .with_count(1)
    ///         .with_constructor(|| Ok::<_, std::io::Error>(42)),
    /// )
    /// .unwrap();
    ///
    /// let held = pool.get_timeout(Duration::from_millis(10)).await.unwrap();
    /// let second = pool.get_timeout(Duration::from_millis(10)).await;
    /// assert!(matches!(
    ///     second,
    ///     Err(PoolError::Cancelled(CancelReason::DeadlineExceeded(_)))
    /// ));
    /// pool.put(held);
    /// # }
    /// ```
    pub async fn get_timeout(&self, timeout: Duration) -> PoolResult<T> {
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(result) => result,
            Err(_) => Err(self.cancelled(CancelReason::DeadlineExceeded(timeout))),
        }
    }

    /// Borrow an object only if one is idle right now
    ///
    /// Never jumps ahead of callers already waiting in [`get`](Self::get).
    pub fn try_get(&self) -> PoolResult<T> {
        let mut slots = self.inner.slots.lock();
        if slots.stopping {
            drop(slots);
            return Err(self.rejected());
        }
        match slots.idle.pop_front() {
            Some(object) => {
                drop(slots);
                self.inner.metrics.record_retrieved();
                Ok(object)
            }
            None => {
                drop(slots);
                self.inner.metrics.empty_events.fetch_add(1, Ordering::Relaxed);
                Err(PoolError::PoolEmpty)
            }
        }
    }

    /// Borrow an object wrapped in a guard that puts it back on drop
    pub async fn get_object(&self, cancel: &CancellationToken) -> PoolResult<PooledObject<T>> {
        let value = self.get(cancel).await?;
        Ok(PooledObject::new(value, self.clone()))
    }

    /// Return a borrowed object to the pool
    ///
    /// Hands the object straight to the longest waiting [`get`](Self::get),
    /// if any. Once stop has begun the object is destroyed by the running
    /// stop instead of being handed out again.
    ///
    /// Only objects obtained from this pool may be put, each exactly once.
    pub fn put(&self, object: T) {
        self.inner.metrics.record_returned();
        self.inner.release(object);
    }

    /// Stop the pool and destroy every object
    ///
    /// The first call closes the pool to new and waiting borrowers, destroys
    /// the idle objects oldest first, then waits for each borrowed object to
    /// be put back and destroys it. It returns once all objects have been
    /// destroyed. Any other call returns immediately.
    ///
    /// Dropping the returned future before it completes leaves the remaining
    /// objects undestroyed.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let waiters = {
            let mut slots = inner.slots.lock();
            if slots.stopping {
                return;
            }
            slots.stopping = true;
            mem::take(&mut slots.waiters)
        };
        // Dropping the senders fails every blocked `get`.
        drop(waiters);

        tracing::debug!(
            capacity = inner.capacity,
            borrowed = inner.metrics.borrowed(),
            "stopping object pool"
        );

        let mut destroyed = 0;
        loop {
            let drained = mem::take(&mut inner.slots.lock().idle);
            for object in drained {
                inner.destroy(object);
                destroyed += 1;
            }
            if destroyed >= inner.capacity {
                break;
            }
            tracing::trace!(outstanding = inner.capacity - destroyed, "waiting for borrowed objects");
            inner.returned.notified().await;
        }

        tracing::debug!(destroyed, "object pool stopped");
    }

    /// Whether [`stop`](Self::stop) has been called
    pub fn is_stopping(&self) -> bool {
        self.inner.slots.lock().stopping
    }

    /// Fixed number of objects owned by the pool
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Get idle count
    pub fn idle_count(&self) -> usize {
        self.inner.slots.lock().idle.len()
    }

    /// Get borrowed count
    pub fn borrowed_count(&self) -> usize {
        self.inner.metrics.borrowed()
    }

    /// Number of callers currently blocked in `get`
    pub fn waiter_count(&self) -> usize {
        self.inner
            .slots
            .lock()
            .waiters
            .iter()
            .filter(|waiter| !waiter.is_closed())
            .count()
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.idle_count(),
            self.borrowed_count(),
            self.inner.capacity,
            self.is_stopping(),
        )
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.inner
            .metrics
            .get_metrics(self.idle_count(), self.inner.capacity, self.is_stopping())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> Result<String, prometheus::Error> {
        crate::metrics::MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    async fn acquire(&self) -> PoolResult<T> {
        let receiver = match self.inner.checkout() {
            Some(Checkout::Ready(object)) => {
                self.inner.metrics.record_retrieved();
                return Ok(object);
            }
            Some(Checkout::Wait(receiver)) => receiver,
            None => return Err(self.rejected()),
        };

        let mut waiter = Waiter {
            receiver,
            pool: &*self.inner,
            settled: false,
        };
        let received = (&mut waiter.receiver).await;
        waiter.settled = true;

        match received {
            Ok(object) => {
                self.inner.metrics.record_retrieved();
                Ok(object)
            }
            // Only stop drops a queued sender.
            Err(_) => Err(self.rejected()),
        }
    }

    fn cancelled(&self, reason: CancelReason) -> PoolError {
        self.inner.metrics.cancelled_waits.fetch_add(1, Ordering::Relaxed);
        PoolError::Cancelled(reason)
    }

    fn rejected(&self) -> PoolError {
        self.inner.metrics.rejected_waits.fetch_add(1, Ordering::Relaxed);
        PoolError::StoppingOrStopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BoxError;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::AtomicUsize;
    use std::task::Poll;

    fn counting_pool(count: usize) -> ObjectPool<usize> {
        let next = Arc::new(AtomicUsize::new(0));
        ObjectPool::new(
            PoolConfiguration::new()
                .with_count(count)
                .with_constructor(move || Ok::<_, BoxError>(next.fetch_add(1, Ordering::SeqCst))),
        )
        .unwrap()
    }

    #[test]
    fn test_object_pool_basic() {
        let pool = counting_pool(3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.idle_count(), 3);
        assert_eq!(pool.borrowed_count(), 0);

        let obj = pool.try_get().unwrap();
        assert_eq!(obj, 0);
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.borrowed_count(), 1);

        pool.put(obj);
        assert_eq!(pool.idle_count(), 3);
        assert_eq!(pool.borrowed_count(), 0);
    }

    #[test]
    fn test_missing_constructor() {
        let result = ObjectPool::<u8>::new(PoolConfiguration::new().with_count(1));
        assert!(matches!(
            result,
            Err(PoolError::InvalidConfiguration(ConfigError::MissingConstructor))
        ));
    }

    #[test]
    fn test_try_get_empty() {
        let pool = counting_pool(1);
        let obj = pool.try_get().unwrap();

        assert!(matches!(pool.try_get(), Err(PoolError::PoolEmpty)));
        assert_eq!(pool.get_metrics().empty_events, 1);
        pool.put(obj);
    }

    #[tokio::test]
    async fn test_async_get() {
        let pool = counting_pool(2);
        let token = CancellationToken::new();

        let first = pool.get(&token).await.unwrap();
        let second = pool.get(&token).await.unwrap();
        assert_eq!((first, second), (0, 1));

        pool.put(first);
        pool.put(second);
        pool.stop().await;
        assert_eq!(pool.get_metrics().total_destroyed, 2);
    }

    #[tokio::test]
    async fn test_pooled_object_returns_on_drop() {
        let pool = counting_pool(1);

        {
            let mut obj = pool.get_object(&CancellationToken::new()).await.unwrap();
            *obj += 10;
            assert_eq!(pool.borrowed_count(), 1);
        }

        assert_eq!(pool.borrowed_count(), 0);
        assert_eq!(pool.try_get().unwrap(), 10);
    }

    #[tokio::test]
    async fn test_pooled_object_into_inner() {
        let pool = counting_pool(1);
        let obj = pool.get_object(&CancellationToken::new()).await.unwrap();

        let value = obj.into_inner();
        assert_eq!(pool.idle_count(), 0);
        pool.put(value);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_rejects_try_get() {
        let pool = counting_pool(2);
        pool.stop().await;

        assert!(pool.is_stopping());
        assert!(matches!(pool.try_get(), Err(PoolError::StoppingOrStopped)));
        assert!(!pool.get_health_status().is_healthy());
    }

    #[test]
    fn test_surplus_put_is_destroyed() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&destroyed);
        let pool = ObjectPool::new(
            PoolConfiguration::new()
                .with_count(1)
                .with_constructor(|| Ok::<_, BoxError>(1))
                .with_destructor(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .unwrap();

        pool.put(2);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_put_into_empty_pool_is_destroyed() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&destroyed);
        let pool = ObjectPool::new(
            PoolConfiguration::new()
                .with_constructor(|| Ok::<_, BoxError>(1))
                .with_destructor(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .unwrap();

        pool.put(7);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 0);
        assert!(matches!(pool.try_get(), Err(PoolError::PoolEmpty)));
    }

    #[tokio::test]
    async fn test_put_hands_object_to_waiter() {
        let pool = counting_pool(1);
        let held = pool.try_get().unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get(&CancellationToken::new()).await })
        };
        while pool.waiter_count() == 0 {
            tokio::task::yield_now().await;
        }

        pool.put(held);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(waiter.await.unwrap().unwrap(), held);
    }

    #[tokio::test]
    async fn test_abandoned_wait_passes_object_on() {
        let pool = counting_pool(1);
        let held = pool.try_get().unwrap();

        let mut wait = Box::pin(pool.acquire());
        assert!(poll_once(wait.as_mut()).await.is_none());
        assert_eq!(pool.waiter_count(), 1);

        // The hand-off lands after the waiter stopped polling.
        pool.put(held);
        drop(wait);

        assert_eq!(pool.waiter_count(), 0);
        assert_eq!(pool.try_get().unwrap(), held);
    }

    async fn poll_once<F: Future + Unpin>(mut fut: F) -> Option<F::Output> {
        std::future::poll_fn(|cx| match Pin::new(&mut fut).poll(cx) {
            Poll::Ready(out) => Poll::Ready(Some(out)),
            Poll::Pending => Poll::Ready(None),
        })
        .await
    }
}
