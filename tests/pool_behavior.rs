use borrowpool::{Pool, PoolConfiguration, PoolError, Resource};
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// An instance that detects concurrent use
struct Exclusive {
    id: usize,
    in_use: Arc<AtomicBool>,
}

#[derive(Default)]
struct Tracker {
    constructed: AtomicUsize,
    destroyed: AtomicUsize,
}

struct ExclusiveResource {
    tracker: Arc<Tracker>,
}

impl Resource for ExclusiveResource {
    type Config = Duration;
    type Instance = Exclusive;
    type Error = Infallible;

    fn construct(&self, delay: &Duration) -> Result<Exclusive, Infallible> {
        thread::sleep(*delay);
        let id = self.tracker.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Exclusive {
            id,
            in_use: Arc::new(AtomicBool::new(false)),
        })
    }

    fn destroy(&self, _: Exclusive) -> Result<(), Infallible> {
        self.tracker.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn exclusive_pool(config: PoolConfiguration<Duration>) -> (Arc<Pool<ExclusiveResource>>, Arc<Tracker>) {
    let tracker = Arc::new(Tracker::default());
    let resource = ExclusiveResource {
        tracker: Arc::clone(&tracker),
    };
    (Arc::new(Pool::new(resource, config).unwrap()), tracker)
}

#[test]
fn concurrent_borrowers_never_share_an_instance() {
    let config = PoolConfiguration::new(Duration::from_millis(1))
        .with_capacity(4)
        .without_reaper();
    let (pool, tracker) = exclusive_pool(config);
    let violations = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..16)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let violations = Arc::clone(&violations);
            thread::spawn(move || {
                for _ in 0..50 {
                    let object = pool.borrow(true, Some(Duration::from_secs(10))).unwrap();
                    if object.in_use.swap(true, Ordering::SeqCst) {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }

                    let status = pool.status();
                    if status.borrowed > status.live || status.live + status.pending > status.capacity {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }

                    thread::yield_now();
                    object.in_use.store(false, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert!(tracker.constructed.load(Ordering::SeqCst) <= 4);

    let status = pool.status();
    assert_eq!(status.borrowed, 0);
    assert_eq!(status.live, status.idle);
    assert_eq!(pool.get_metrics().total_borrowed, 16 * 50);
}

#[test]
fn exhaustion_with_single_slot() {
    let config = PoolConfiguration::new(Duration::ZERO)
        .with_capacity(1)
        .without_reaper();
    let (pool, _) = exclusive_pool(config);
    let held = pool.borrow(false, None).unwrap();

    assert!(matches!(pool.borrow(false, None), Err(PoolError::PoolExhausted)));

    let started = Instant::now();
    let result = pool.borrow(true, Some(Duration::from_millis(100)));
    let waited = started.elapsed();
    assert!(matches!(result, Err(PoolError::PoolExhausted)));
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_secs(5));

    let status = pool.status();
    assert_eq!((status.live, status.borrowed), (1, 1));
    drop(held);
}

#[test]
fn slow_construction_does_not_block_returns() {
    let config = PoolConfiguration::new(Duration::from_millis(200))
        .with_capacity(2)
        .without_reaper();
    let (pool, _) = exclusive_pool(config);
    let first = pool.borrow(false, None).unwrap();
    let first_id = first.id;

    let constructing = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.borrow(false, None).map(|object| object.id))
    };
    thread::sleep(Duration::from_millis(50));

    // the pool lock is free while the second instance is being built
    let started = Instant::now();
    first.release();
    assert!(started.elapsed() < Duration::from_millis(150));
    assert_eq!(pool.borrow(false, None).unwrap().id, first_id);

    assert!(constructing.join().unwrap().is_ok());
    assert_eq!(pool.live_count(), 2);
}

#[test]
fn recently_used_instance_survives_eviction() {
    let config = PoolConfiguration::new(Duration::ZERO)
        .with_capacity(2)
        .with_max_idle(Duration::from_millis(40))
        .without_reaper();
    let (pool, tracker) = exclusive_pool(config);

    let old = pool.borrow(false, None).unwrap();
    let recent = pool.borrow(false, None).unwrap();
    let recent_id = recent.id;
    drop(old);
    thread::sleep(Duration::from_millis(80));
    drop(recent);

    assert_eq!(pool.evict_idle(), 1);
    assert_eq!(pool.live_count(), 1);
    assert_eq!(tracker.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(pool.borrow(false, None).unwrap().id, recent_id);
}

#[test]
fn dropping_pool_destroys_idle_instances() {
    let config = PoolConfiguration::new(Duration::ZERO)
        .with_capacity(3)
        .with_warmup(3)
        .with_max_idle(Duration::from_secs(60));
    let (pool, tracker) = exclusive_pool(config);
    assert_eq!(pool.idle_count(), 3);

    drop(pool);
    assert_eq!(tracker.destroyed.load(Ordering::SeqCst), 3);
}
