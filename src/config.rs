//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

/// Configuration for resource pool behavior
///
/// `C` is the construction configuration handed verbatim to
/// [`Resource::construct`](crate::Resource::construct).
///
/// # Examples
///
/// ```
/// use borrowpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new("db.internal:5432".to_string())
///     .with_capacity(20)
///     .with_max_idle(Duration::from_secs(1800))
///     .with_borrow_timeout(Duration::from_secs(2));
///
/// assert_eq!(config.capacity, 20);
/// assert_eq!(config.idle_limit(), Some(Duration::from_secs(1800)));
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfiguration<C> {
    /// Name used in log events and metric labels
    pub name: String,

    /// Maximum number of instances alive at once (idle + borrowed)
    pub capacity: usize,

    /// Opaque value passed to `construct`
    pub construction_config: C,

    /// Idle instances unused for longer than this are destroyed by the reaper
    pub max_idle_duration: Option<Duration>,

    /// How often the idle reaper runs; `None` disables the background thread
    pub reaper_period: Option<Duration>,

    /// Wait limit used by `get_object` and `get_object_async`
    pub borrow_timeout: Option<Duration>,

    /// Number of instances to construct when the pool is created
    pub warmup_size: Option<usize>,
}

impl<C: Default> Default for PoolConfiguration<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C> PoolConfiguration<C> {
    /// Create a configuration with default values around a construction config
    pub fn new(construction_config: C) -> Self {
        Self {
            name: "pool".to_string(),
            capacity: 10,
            construction_config,
            max_idle_duration: None,
            reaper_period: Some(Duration::from_secs(10)),
            borrow_timeout: Some(Duration::from_secs(30)),
            warmup_size: None,
        }
    }

    /// Set the pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use borrowpool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::<()>::default().with_capacity(50);
    /// assert_eq!(config.capacity, 50);
    /// ```
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the maximum idle duration; zero disables eviction
    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle_duration = Some(max_idle);
        self
    }

    /// Set the reaper period
    pub fn with_reaper_period(mut self, period: Duration) -> Self {
        self.reaper_period = Some(period);
        self
    }

    /// Do not start the background reaper; `Pool::evict_idle` still works
    pub fn without_reaper(mut self) -> Self {
        self.reaper_period = None;
        self
    }

    /// Set the wait limit for `get_object`
    pub fn with_borrow_timeout(mut self, timeout: Duration) -> Self {
        self.borrow_timeout = Some(timeout);
        self
    }

    /// Wait forever in `get_object`
    pub fn without_borrow_timeout(mut self) -> Self {
        self.borrow_timeout = None;
        self
    }

    /// Set warm-up size
    pub fn with_warmup(mut self, size: usize) -> Self {
        self.warmup_size = Some(size);
        self
    }

    /// Effective idle limit, `None` when eviction is disabled
    pub fn idle_limit(&self) -> Option<Duration> {
        self.max_idle_duration.filter(|limit| !limit.is_zero())
    }

    /// Reaper period, `None` unless both a period and an idle limit are set
    pub(crate) fn effective_reaper_period(&self) -> Option<Duration> {
        self.idle_limit().and(self.reaper_period)
    }

    /// Check the configuration for values the pool cannot honor
    pub fn validate(&self) -> PoolResult<()> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfiguration(
                "capacity must be greater than 0".to_string(),
            ));
        }
        if let Some(warmup) = self.warmup_size
            && warmup > self.capacity
        {
            return Err(PoolError::InvalidConfiguration(format!(
                "warmup size ({}) must not exceed capacity ({})",
                warmup, self.capacity
            )));
        }
        if let Some(period) = self.effective_reaper_period()
            && period.is_zero()
        {
            return Err(PoolError::InvalidConfiguration(
                "reaper period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
