//! # borrowpool
//!
//! Bounded, thread-safe pool for expensive objects that must not be used
//! from two threads at once: database connections, SSH sessions, browser
//! drivers, raw sockets.
//!
//! ## Features
//!
//! - Lazy construction up to a fixed capacity
//! - LIFO reuse so a small working set stays warm
//! - Non-blocking, blocking and timed borrows, plus an async variant
//! - Automatic return of instances via RAII (Drop trait)
//! - Invalidation: instances that failed in a way that leaves them unusable
//!   are destroyed instead of recycled
//! - Background reaper for instances idle past a configured limit
//! - Lifecycle hooks before use and before return
//! - Metrics with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use borrowpool::{Pool, PoolConfiguration, Resource};
//! use std::io;
//! use std::net::TcpStream;
//!
//! struct Tcp;
//!
//! impl Resource for Tcp {
//!     type Config = String;
//!     type Instance = Option<TcpStream>;
//!     type Error = io::Error;
//!
//!     fn construct(&self, _addr: &String) -> io::Result<Option<TcpStream>> {
//!         // a real adapter would call TcpStream::connect(addr)
//!         Ok(None)
//!     }
//!
//!     fn destroy(&self, _stream: Option<TcpStream>) -> io::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let config = PoolConfiguration::new("127.0.0.1:6379".to_string()).with_capacity(4);
//! let pool = Pool::new(Tcp, config).unwrap();
//! {
//!     let stream = pool.get_object().unwrap();
//!     assert!(stream.is_none());
//!     // Instance automatically returned when `stream` goes out of scope
//! }
//! assert_eq!(pool.idle_count(), 1);
//! ```

mod config;
mod errors;
mod metrics;
mod pool;
mod reaper;
mod resource;
mod scope;
mod store;

pub use config::PoolConfiguration;
pub use errors::{PoolError, PoolResult};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::{Pool, PoolStatus};
pub use resource::{Outcome, Resource};
pub use scope::PooledObject;
