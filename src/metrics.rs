//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use borrowpool::{Pool, PoolConfiguration, Resource};
/// use std::convert::Infallible;
///
/// struct Buffers;
///
/// impl Resource for Buffers {
///     type Config = usize;
///     type Instance = Vec<u8>;
///     type Error = Infallible;
///
///     fn construct(&self, size: &usize) -> Result<Vec<u8>, Infallible> {
///         Ok(Vec::with_capacity(*size))
///     }
///
///     fn destroy(&self, _buf: Vec<u8>) -> Result<(), Infallible> {
///         Ok(())
///     }
/// }
///
/// let pool = Pool::new(Buffers, PoolConfiguration::new(4096)).unwrap();
/// {
///     let _buf = pool.get_object().unwrap();
///     let metrics = pool.get_metrics();
///     assert_eq!(metrics.total_borrowed, 1);
///     assert_eq!(metrics.borrowed_instances, 1);
/// }
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Total successful borrows
    pub total_borrowed: usize,

    /// Total instances handed back (recycled or discarded)
    pub total_returned: usize,

    /// Total instances constructed
    pub total_constructed: usize,

    /// Total failed construction attempts
    pub construction_failures: usize,

    /// Total instances destroyed, for any reason
    pub total_destroyed: usize,

    /// Destroy calls that reported an error
    pub destroy_failures: usize,

    /// Instances destroyed by the idle reaper
    pub evicted_idle: usize,

    /// Instances discarded on return because they were invalidated
    pub invalidated_discarded: usize,

    /// Borrows that failed with `PoolExhausted`
    pub exhausted_events: usize,

    /// Instances currently alive (idle + borrowed)
    pub live_instances: usize,

    /// Instances currently checked out
    pub borrowed_instances: usize,

    /// Instances currently idle
    pub idle_instances: usize,

    /// Borrowed / capacity (0.0 to 1.0)
    pub utilization: f64,

    /// Configured capacity
    pub capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_borrowed".to_string(), self.total_borrowed.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("total_constructed".to_string(), self.total_constructed.to_string());
        metrics.insert("construction_failures".to_string(), self.construction_failures.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert("destroy_failures".to_string(), self.destroy_failures.to_string());
        metrics.insert("evicted_idle".to_string(), self.evicted_idle.to_string());
        metrics.insert("invalidated_discarded".to_string(), self.invalidated_discarded.to_string());
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("live_instances".to_string(), self.live_instances.to_string());
        metrics.insert("borrowed_instances".to_string(), self.borrowed_instances.to_string());
        metrics.insert("idle_instances".to_string(), self.idle_instances.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// Every series carries a `pool` label plus the given tags.
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            labels.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let registry = Registry::new_custom(Some("borrowpool".to_string()), Some(labels))?;

        let gauges = [
            ("instances_live", "Instances currently alive", metrics.live_instances),
            ("instances_borrowed", "Instances currently borrowed", metrics.borrowed_instances),
            ("instances_idle", "Instances currently idle", metrics.idle_instances),
            ("capacity", "Configured pool capacity", metrics.capacity),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::new(name, help)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let counters = [
            ("borrowed_total", "Total successful borrows", metrics.total_borrowed),
            ("returned_total", "Total instances returned", metrics.total_returned),
            ("constructed_total", "Total instances constructed", metrics.total_constructed),
            ("construction_failures_total", "Failed construction attempts", metrics.construction_failures),
            ("destroyed_total", "Total instances destroyed", metrics.total_destroyed),
            ("destroy_failures_total", "Destroy calls that failed", metrics.destroy_failures),
            ("evicted_idle_total", "Instances evicted for idleness", metrics.evicted_idle),
            ("invalidated_total", "Invalidated instances discarded", metrics.invalidated_discarded),
            ("exhausted_total", "Borrows that found the pool exhausted", metrics.exhausted_events),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::new(name, help)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_borrowed: AtomicUsize,
    pub total_returned: AtomicUsize,
    pub total_constructed: AtomicUsize,
    pub construction_failures: AtomicUsize,
    pub total_destroyed: AtomicUsize,
    pub destroy_failures: AtomicUsize,
    pub evicted_idle: AtomicUsize,
    pub invalidated_discarded: AtomicUsize,
    pub exhausted_events: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        Self::add(counter, 1);
    }

    pub fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, live: usize, borrowed: usize, idle: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            borrowed as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_borrowed: self.total_borrowed.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            total_constructed: self.total_constructed.load(Ordering::Relaxed),
            construction_failures: self.construction_failures.load(Ordering::Relaxed),
            total_destroyed: self.total_destroyed.load(Ordering::Relaxed),
            destroy_failures: self.destroy_failures.load(Ordering::Relaxed),
            evicted_idle: self.evicted_idle.load(Ordering::Relaxed),
            invalidated_discarded: self.invalidated_discarded.load(Ordering::Relaxed),
            exhausted_events: self.exhausted_events.load(Ordering::Relaxed),
            live_instances: live,
            borrowed_instances: borrowed,
            idle_instances: idle,
            utilization,
            capacity,
        }
    }
}
