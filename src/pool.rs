//! Core pool engine

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
#[cfg(feature = "metrics")]
use crate::metrics::MetricsExporter;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::reaper::{self, Reaper};
use crate::resource::{Outcome, Resource};
use crate::scope::PooledObject;
use crate::store::{Slot, SlotStore};

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// A consistent snapshot of pool occupancy
///
/// `borrowed <= live` and `live + pending <= capacity` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Instances constructed and not yet destroyed
    pub live: usize,
    /// Instances currently checked out
    pub borrowed: usize,
    /// Instances waiting in the idle store
    pub idle: usize,
    /// Constructions in progress
    pub pending: usize,
    /// Configured capacity
    pub capacity: usize,
}

struct PoolState<T> {
    idle: SlotStore<T>,
    live: usize,
    borrowed: usize,
    pending: usize,
    closed: bool,
}

/// State shared between the pool handle, borrowed objects and the reaper
pub(crate) struct Shared<R: Resource> {
    resource: R,
    construction_config: R::Config,
    name: String,
    capacity: usize,
    idle_limit: Option<Duration>,
    state: Mutex<PoolState<R::Instance>>,
    available: Condvar,
    metrics: MetricsTracker,
}

/// A capacity slot claimed for a construction in progress.
///
/// Dropping it without `commit` hands the slot back, so a failed or
/// panicking construction never leaks capacity.
struct Reservation<'a, R: Resource> {
    shared: &'a Shared<R>,
    active: bool,
}

impl<'a, R: Resource> Reservation<'a, R> {
    /// Must be created right after `pending` was incremented under the lock
    fn new(shared: &'a Shared<R>) -> Self {
        Self { shared, active: true }
    }

    /// Turn the reservation into a live instance, returning the held lock
    fn commit(mut self) -> MutexGuard<'a, PoolState<R::Instance>> {
        self.active = false;
        let shared = self.shared;
        let mut state = shared.state.lock();
        state.pending -= 1;
        state.live += 1;
        state
    }
}

impl<R: Resource> Drop for Reservation<'_, R> {
    fn drop(&mut self) {
        if self.active {
            self.shared.state.lock().pending -= 1;
            self.shared.available.notify_one();
        }
    }
}

/// Capacity still held by instances taken out of circulation.
///
/// `live` drops and waiters wake only once the guard goes away, after
/// `destroy` has returned (or unwound).
struct Retirement<'a, R: Resource> {
    shared: &'a Shared<R>,
    count: usize,
}

impl<R: Resource> Drop for Retirement<'_, R> {
    fn drop(&mut self) {
        if self.count == 0 {
            return;
        }
        self.shared.state.lock().live -= self.count;
        if self.count == 1 {
            self.shared.available.notify_one();
        } else {
            self.shared.available.notify_all();
        }
    }
}

impl<R: Resource> Shared<R> {
    pub(crate) fn resource(&self) -> &R {
        &self.resource
    }

    pub(crate) fn acquire(
        self: &Arc<Self>,
        block: bool,
        timeout: Option<Duration>,
    ) -> PoolResult<PooledObject<R>> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Err(PoolError::Closed);
            }

            if let Some(slot) = state.idle.try_pop() {
                state.borrowed += 1;
                drop(state);
                return Ok(self.hand_out(slot));
            }

            if state.live + state.pending < self.capacity {
                state.pending += 1;
                drop(state);

                let reservation = Reservation::new(self);
                let slot = self.construct_slot()?;
                let mut state = reservation.commit();
                if state.closed {
                    drop(state);
                    self.retire(std::iter::once(slot));
                    return Err(PoolError::Closed);
                }
                state.borrowed += 1;
                drop(state);
                return Ok(self.hand_out(slot));
            }

            if !block {
                return Err(self.exhausted());
            }

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(self.exhausted());
                    }
                    self.available.wait_until(&mut state, deadline);
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    fn hand_out(self: &Arc<Self>, slot: Slot<R::Instance>) -> PooledObject<R> {
        MetricsTracker::incr(&self.metrics.total_borrowed);
        trace!(pool = %self.name, "instance borrowed");

        // the hook runs with the guard already armed so a panic still returns the slot
        let mut object = PooledObject::new(slot, Arc::clone(self));
        self.resource.before_use(&mut *object);
        object
    }

    fn exhausted(&self) -> PoolError {
        MetricsTracker::incr(&self.metrics.exhausted_events);
        trace!(pool = %self.name, "pool exhausted");
        PoolError::PoolExhausted
    }

    fn construct_slot(&self) -> PoolResult<Slot<R::Instance>> {
        let started = Instant::now();
        match self.resource.construct(&self.construction_config) {
            Ok(instance) => {
                MetricsTracker::incr(&self.metrics.total_constructed);
                debug!(
                    pool = %self.name,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "instance constructed"
                );
                Ok(Slot::new(instance))
            }
            Err(err) => {
                MetricsTracker::incr(&self.metrics.construction_failures);
                warn!(pool = %self.name, error = %err, "instance construction failed");
                Err(PoolError::construction(err))
            }
        }
    }

    fn destroy(&self, instance: R::Instance) {
        MetricsTracker::incr(&self.metrics.total_destroyed);
        if let Err(err) = self.resource.destroy(instance) {
            MetricsTracker::incr(&self.metrics.destroy_failures);
            warn!(pool = %self.name, error = %err, "instance destruction failed");
        }
    }

    /// Destroy slots already removed from the store, outside the lock.
    ///
    /// Their capacity stays counted in `live` until every `destroy` call
    /// has finished.
    fn retire<I>(&self, slots: I) -> usize
    where
        I: IntoIterator<Item = Slot<R::Instance>>,
        I::IntoIter: ExactSizeIterator,
    {
        let slots = slots.into_iter();
        let _retirement = Retirement {
            shared: self,
            count: slots.len(),
        };
        let mut destroyed = 0;
        for slot in slots {
            self.destroy(slot.instance);
            destroyed += 1;
        }
        destroyed
    }

    /// Take back a borrowed slot, recycling or destroying it
    pub(crate) fn return_instance(&self, mut slot: Slot<R::Instance>, outcome: Outcome<'_>) {
        self.resource.before_return(&mut slot.instance, outcome);
        let invalidated = !slot.valid || outcome.is_invalidating();

        let discarded = {
            let mut state = self.state.lock();
            state.borrowed -= 1;
            if invalidated || state.closed {
                Some(slot)
            } else {
                slot.touch();
                match state.idle.push(slot) {
                    Ok(()) => None,
                    Err(slot) => {
                        error!(pool = %self.name, "idle store full on return, destroying instance");
                        Some(slot)
                    }
                }
            }
        };
        MetricsTracker::incr(&self.metrics.total_returned);

        match discarded {
            Some(slot) => {
                if invalidated {
                    MetricsTracker::incr(&self.metrics.invalidated_discarded);
                    debug!(pool = %self.name, "invalidated instance discarded");
                }
                // the waiter is woken once the old instance is really gone
                self.retire(std::iter::once(slot));
            }
            None => {
                self.available.notify_one();
                trace!(pool = %self.name, "instance returned");
            }
        }
    }

    /// One reaper cycle: destroy idle instances past the idle limit
    pub(crate) fn evict_idle(&self) -> usize {
        let Some(limit) = self.idle_limit else {
            return 0;
        };

        let expired = {
            let mut state = self.state.lock();
            if state.idle.is_empty() {
                return 0;
            }
            let (expired, kept) =
                reaper::split_expired(state.idle.drain_for_scan(), limit, Instant::now());
            state.idle.restore(kept);
            expired
        };

        if expired.is_empty() {
            return 0;
        }
        MetricsTracker::add(&self.metrics.evicted_idle, expired.len());
        let evicted = self.retire(expired);
        debug!(pool = %self.name, evicted, "evicted idle instances");
        evicted
    }

    pub(crate) fn warmup(&self, count: usize) -> PoolResult<usize> {
        let mut created = 0;
        for _ in 0..count {
            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(PoolError::Closed);
                }
                if state.live + state.pending >= self.capacity {
                    break;
                }
                state.pending += 1;
            }

            let reservation = Reservation::new(self);
            let slot = self.construct_slot()?;
            let mut state = reservation.commit();
            if state.closed {
                drop(state);
                self.retire(std::iter::once(slot));
                return Err(PoolError::Closed);
            }
            if let Err(slot) = state.idle.push(slot) {
                error!(pool = %self.name, "idle store full during warm-up");
                drop(state);
                self.retire(std::iter::once(slot));
                break;
            }
            drop(state);
            self.available.notify_one();
            created += 1;
        }
        debug!(pool = %self.name, created, "warm-up finished");
        Ok(created)
    }

    /// Mark closed and destroy every idle instance; `None` if already closed
    fn close(&self) -> Option<usize> {
        let drained = {
            let mut state = self.state.lock();
            if state.closed {
                return None;
            }
            state.closed = true;
            state.idle.drain_for_scan()
        };
        // blocked borrowers see `closed` and fail
        self.available.notify_all();

        Some(self.retire(drained))
    }

    fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        PoolStatus {
            live: state.live,
            borrowed: state.borrowed,
            idle: state.idle.len(),
            pending: state.pending,
            capacity: state.idle.capacity(),
        }
    }
}

/// Bounded pool of exclusively borrowed resource instances.
///
/// Instances are constructed lazily up to the configured capacity, reused in
/// LIFO order, evicted by a background reaper once idle too long, and
/// destroyed on return when invalidated. Dropping the pool shuts it down.
///
/// # Examples
///
/// ```
/// use borrowpool::{Pool, PoolConfiguration, Resource};
/// use std::convert::Infallible;
///
/// struct Counter;
///
/// impl Resource for Counter {
///     type Config = ();
///     type Instance = u64;
///     type Error = Infallible;
///
///     fn construct(&self, _: &()) -> Result<u64, Infallible> {
///         Ok(0)
///     }
///
///     fn destroy(&self, _: u64) -> Result<(), Infallible> {
///         Ok(())
///     }
/// }
///
/// let pool = Pool::new(Counter, PoolConfiguration::default().with_capacity(2)).unwrap();
/// {
///     let mut counter = pool.get_object().unwrap();
///     *counter += 1;
/// }
/// assert_eq!(*pool.get_object().unwrap(), 1);
/// ```
pub struct Pool<R: Resource> {
    shared: Arc<Shared<R>>,
    reaper: Mutex<Option<Reaper>>,
    borrow_timeout: Option<Duration>,
}

impl<R: Resource> Pool<R> {
    /// Create a pool, running warm-up and starting the reaper as configured
    pub fn new(resource: R, config: PoolConfiguration<R::Config>) -> PoolResult<Self> {
        config.validate()?;
        let idle_limit = config.idle_limit();
        let reaper_period = config.effective_reaper_period();

        let shared = Arc::new(Shared {
            resource,
            construction_config: config.construction_config,
            name: config.name,
            capacity: config.capacity,
            idle_limit,
            state: Mutex::new(PoolState {
                idle: SlotStore::new(config.capacity),
                live: 0,
                borrowed: 0,
                pending: 0,
                closed: false,
            }),
            available: Condvar::new(),
            metrics: MetricsTracker::new(),
        });

        if let Some(count) = config.warmup_size
            && let Err(err) = shared.warmup(count)
        {
            shared.close();
            return Err(err);
        }

        let reaper = match reaper_period {
            Some(period) => match Reaper::start(Arc::downgrade(&shared), &shared.name, period) {
                Ok(reaper) => Some(reaper),
                Err(err) => {
                    shared.close();
                    return Err(err);
                }
            },
            None => None,
        };

        info!(pool = %shared.name, capacity = shared.capacity, "pool created");
        Ok(Self {
            shared,
            reaper: Mutex::new(reaper),
            borrow_timeout: config.borrow_timeout,
        })
    }

    /// Borrow an instance.
    ///
    /// With `block` false, fails immediately with `PoolExhausted` when no
    /// instance is idle and the pool is at capacity. With `block` true, waits
    /// up to `timeout` (forever when `None`).
    pub fn borrow(&self, block: bool, timeout: Option<Duration>) -> PoolResult<PooledObject<R>> {
        self.shared.acquire(block, timeout)
    }

    /// Borrow, waiting up to the configured borrow timeout
    pub fn get_object(&self) -> PoolResult<PooledObject<R>> {
        self.shared.acquire(true, self.borrow_timeout)
    }

    /// Borrow without waiting
    pub fn try_get_object(&self) -> Option<PooledObject<R>> {
        self.shared.acquire(false, None).ok()
    }

    /// Borrow on tokio's blocking pool, waiting up to the configured timeout
    pub async fn get_object_async(&self) -> PoolResult<PooledObject<R>> {
        let shared = Arc::clone(&self.shared);
        let timeout = self.borrow_timeout;

        tokio::task::spawn_blocking(move || shared.acquire(true, timeout))
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Run `f` against a borrowed instance.
    ///
    /// Borrow failures convert into `E`. An error returned by `f` is
    /// classified with [`Resource::is_invalidating_error`], the instance is
    /// returned or destroyed accordingly, and the error is passed through
    /// unchanged.
    pub fn with_object<T, E, F>(&self, block: bool, timeout: Option<Duration>, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut R::Instance) -> Result<T, E>,
        E: From<PoolError> + StdError + 'static,
    {
        let mut object = self.borrow(block, timeout)?;
        match f(&mut *object) {
            Ok(value) => {
                object.release();
                Ok(value)
            }
            Err(err) => {
                object.release_with_error(&err);
                Err(err)
            }
        }
    }

    /// Construct up to `count` idle instances, bounded by capacity
    pub fn warmup(&self, count: usize) -> PoolResult<usize> {
        self.shared.warmup(count)
    }

    /// Run one eviction cycle now, returning how many instances were destroyed
    pub fn evict_idle(&self) -> usize {
        self.shared.evict_idle()
    }

    /// Stop the reaper and destroy idle instances.
    ///
    /// Blocked borrowers fail with `Closed`; instances still borrowed are
    /// destroyed when they come back. Calling it again does nothing.
    pub fn shutdown(&self) {
        let reaper = self.reaper.lock().take();
        if let Some(mut reaper) = reaper {
            reaper.stop();
        }
        if let Some(destroyed) = self.shared.close() {
            info!(pool = %self.shared.name, destroyed, "pool shut down");
        }
    }

    pub fn status(&self) -> PoolStatus {
        self.shared.status()
    }

    pub fn live_count(&self) -> usize {
        self.status().live
    }

    pub fn borrowed_count(&self) -> usize {
        self.status().borrowed
    }

    pub fn idle_count(&self) -> usize {
        self.status().idle
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        let status = self.status();
        self.shared
            .metrics
            .get_metrics(status.live, status.borrowed, status.idle, status.capacity)
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format, labelled with the pool name
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        MetricsExporter::export_prometheus(&self.get_metrics(), &self.shared.name, tags)
    }
}

impl<R: Resource> Drop for Pool<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<R: Resource> std::fmt::Debug for Pool<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.name)
            .field("status", &self.status())
            .finish()
    }
}
