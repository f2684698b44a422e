//! # EsoxSolutions.FixedPool
//!
//! Fixed-capacity, thread-safe async object pool for Rust.
//!
//! The pool builds exactly `count` objects up front, lends them to
//! concurrent callers and takes them back. It never grows, shrinks or
//! rebuilds objects, so it also bounds concurrency to `count`.
//!
//! ## Features
//!
//! - All objects built at creation; a failed build rolls back cleanly
//! - FIFO reuse of idle objects and FIFO service of waiting callers
//! - Cancellable and time-limited borrows
//! - Idempotent stop that destroys every object exactly once, waiting for
//!   borrowed ones to come back
//! - RAII guards that return objects on drop
//! - Health status and metrics, with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_fixedpool::{ObjectPool, PoolConfiguration};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let pool = ObjectPool::new(
//!     PoolConfiguration::new()
//!         .with_count(3)
//!         .with_constructor(|| Ok::<_, std::io::Error>(String::new()))
//!         .with_destructor(|s| println!("destroying {:?}", s)),
//! )
//! .unwrap();
//!
//! {
//!     let obj = pool.get_object(&CancellationToken::new()).await.unwrap();
//!     println!("Got: {:?}", *obj);
//!     // Object automatically returned when `obj` goes out of scope
//! }
//!
//! pool.stop().await;
//! # }
//! ```

mod pool;
mod config;
mod metrics;
mod health;
mod errors;

pub use pool::{ObjectPool, PooledObject};
pub use config::{Constructor, Destructor, PoolConfiguration};
pub use metrics::PoolMetrics;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use health::HealthStatus;
pub use errors::{BoxError, CancelReason, ConfigError, PoolError, PoolResult};
