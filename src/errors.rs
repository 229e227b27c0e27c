//! Error types for the resource pool

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Pool exhausted - no instance became available")]
    PoolExhausted,

    #[error("Failed to construct pooled instance: {0}")]
    Construction(#[source] Arc<dyn StdError + Send + Sync>),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Pool has been shut down")]
    Closed,

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Failed to start idle reaper: {0}")]
    ReaperStart(String),
}

impl PoolError {
    pub(crate) fn construction<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        PoolError::Construction(Arc::new(err))
    }

    /// Whether retrying later may succeed (the pool was merely busy)
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PoolError::PoolExhausted)
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
