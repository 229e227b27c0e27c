//! Scoped ownership of one borrowed instance

use crate::pool::Shared;
use crate::resource::{Outcome, Resource};
use crate::store::Slot;

use std::error::Error as StdError;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

/// A borrowed instance that goes back to its pool when released or dropped.
///
/// Dropping it counts as a normal exit, or as [`Outcome::Panicked`] while
/// unwinding. Use [`release_with_error`](Self::release_with_error) to report
/// a failure so the pool can decide whether to recycle the instance.
pub struct PooledObject<R: Resource> {
    slot: Option<Slot<R::Instance>>,
    pool: Arc<Shared<R>>,
}

impl<R: Resource> PooledObject<R> {
    pub(crate) fn new(slot: Slot<R::Instance>, pool: Arc<Shared<R>>) -> Self {
        Self {
            slot: Some(slot),
            pool,
        }
    }

    /// Mark the instance unfit for reuse; it is destroyed on release
    pub fn invalidate(&mut self) {
        if let Some(slot) = self.slot.as_mut() {
            slot.valid = false;
        }
    }

    pub fn is_valid(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| slot.valid)
    }

    /// Time since the instance was constructed
    pub fn age(&self) -> Duration {
        self.slot
            .as_ref()
            .map(|slot| slot.created_at.elapsed())
            .unwrap_or_default()
    }

    /// Return the instance after a normal exit
    pub fn release(mut self) {
        self.finish(Outcome::Completed);
    }

    /// Return the instance after `error` escaped the unit of work.
    ///
    /// If the resource classifies the error as invalidating, the instance
    /// is destroyed instead of recycled.
    pub fn release_with_error(mut self, error: &(dyn StdError + 'static)) {
        let invalidating = self.pool.resource().is_invalidating_error(error);
        if invalidating {
            self.invalidate();
        }
        self.finish(Outcome::Failed { error, invalidating });
    }

    // takes the slot, so any later call is a no-op
    fn finish(&mut self, outcome: Outcome<'_>) {
        if let Some(slot) = self.slot.take() {
            self.pool.return_instance(slot, outcome);
        }
    }
}

impl<R: Resource> Deref for PooledObject<R> {
    type Target = R::Instance;

    fn deref(&self) -> &Self::Target {
        &self.slot.as_ref().expect("Instance already released").instance
    }
}

impl<R: Resource> DerefMut for PooledObject<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slot.as_mut().expect("Instance already released").instance
    }
}

impl<R: Resource> Drop for PooledObject<R> {
    fn drop(&mut self) {
        let outcome = if std::thread::panicking() {
            Outcome::Panicked
        } else {
            Outcome::Completed
        };
        self.finish(outcome);
    }
}

impl<R: Resource> fmt::Debug for PooledObject<R>
where
    R::Instance: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledObject")
            .field("instance", &self.slot.as_ref().map(|slot| &slot.instance))
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Outcome, Pool, PoolConfiguration, Resource};
    use parking_lot::Mutex;
    use std::error::Error as StdError;
    use std::io;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;

    #[derive(Default)]
    struct Log {
        outcomes: Vec<&'static str>,
        destroyed: usize,
    }

    struct Recording {
        log: Arc<Mutex<Log>>,
    }

    impl Resource for Recording {
        type Config = ();
        type Instance = String;
        type Error = io::Error;

        fn construct(&self, _: &()) -> io::Result<String> {
            Ok(String::new())
        }

        fn destroy(&self, _: String) -> io::Result<()> {
            self.log.lock().destroyed += 1;
            Ok(())
        }

        fn before_return(&self, _: &mut String, outcome: Outcome<'_>) {
            let label = match outcome {
                Outcome::Completed => "completed",
                Outcome::Failed { invalidating: true, .. } => "failed-invalidating",
                Outcome::Failed { .. } => "failed",
                Outcome::Panicked => "panicked",
            };
            self.log.lock().outcomes.push(label);
        }

        fn is_invalidating_error(&self, error: &(dyn StdError + 'static)) -> bool {
            error
                .downcast_ref::<io::Error>()
                .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
        }
    }

    fn recording_pool() -> (Pool<Recording>, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let resource = Recording { log: Arc::clone(&log) };
        let config = PoolConfiguration::default().with_capacity(2).without_reaper();
        (Pool::new(resource, config).unwrap(), log)
    }

    #[test]
    fn test_release_is_idempotent() {
        let (pool, log) = recording_pool();

        let mut object = pool.get_object().unwrap();
        object.finish(Outcome::Completed);
        object.finish(Outcome::Completed);
        drop(object);

        assert_eq!(pool.borrowed_count(), 0);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(log.lock().outcomes, vec!["completed"]);
    }

    #[test]
    fn test_explicit_invalidate() {
        let (pool, log) = recording_pool();

        let mut object = pool.get_object().unwrap();
        object.invalidate();
        assert!(!object.is_valid());
        object.release();

        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.borrowed_count(), 0);
        assert_eq!(log.lock().destroyed, 1);
    }

    #[test]
    fn test_release_with_error_classifies() {
        let (pool, log) = recording_pool();

        let object = pool.get_object().unwrap();
        object.release_with_error(&io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert_eq!(pool.idle_count(), 1);

        let object = pool.get_object().unwrap();
        object.release_with_error(&io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert_eq!(pool.live_count(), 0);

        let log = log.lock();
        assert_eq!(log.outcomes, vec!["failed", "failed-invalidating"]);
        assert_eq!(log.destroyed, 1);
    }

    #[test]
    fn test_panic_returns_instance() {
        let (pool, log) = recording_pool();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut object = pool.get_object().unwrap();
            object.push_str("half-written");
            panic!("caller bug");
        }));
        assert!(result.is_err());

        assert_eq!(pool.borrowed_count(), 0);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(log.lock().outcomes, vec!["panicked"]);
    }

    #[test]
    fn test_deref_mut_delegates() {
        let (pool, _) = recording_pool();
        {
            let mut object = pool.get_object().unwrap();
            object.push_str("select 1");
            assert_eq!(object.len(), 8);
            assert!(object.age() < std::time::Duration::from_secs(5));
        }
        assert_eq!(*pool.get_object().unwrap(), "select 1");
    }
}
