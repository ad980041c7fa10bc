//! Embeddable task farm.
//!
//! An embedder implements [`FarmServer`], attaches it to a [`Farm`] and
//! starts it with a [`FarmConfig`]. Submitted requests are queued by a
//! dispatch loop and executed by a fixed pool of workers; each submission
//! yields a [`ResultHandle`] for its response.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod farm;
pub mod job;
pub mod metrics;
pub mod registry;
pub mod traits;
mod worker;

pub use config::FarmConfig;
pub use dispatcher::ShutdownMode;
pub use error::FarmError;
pub use farm::{Farm, FarmStatus};
pub use job::ResultHandle;
pub use metrics::{FarmMetrics, MetricsSnapshot};
pub use registry::{FarmHandle, FarmId, FarmRegistry};
pub use traits::FarmServer;
