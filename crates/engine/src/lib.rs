#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Job execution engine for `dataforge` (dispatching, worker pool, job
//! registry, cancellation fabric, streaming producer, abort-signal store).

/// Public API for the engine crate.
pub mod api;

mod counters;
mod dispatch;
mod pool;
mod registry;
mod stop_store;
mod stream;

pub use api::{
    CountersSnapshot, Engine, EngineConfig, EngineError, JobInfo, PoolStats, StreamEvent,
    StreamTarget,
};
pub use dataforge_schema::{CacheStats, Mode, Preparer, PreparerStats};
pub use stop_store::StopStore;
